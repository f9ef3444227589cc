pub mod frame;
pub mod reader;
pub mod segmenter;

pub use frame::Frame;
pub use frame::FrameGeometry;
pub use reader::FrameReader;
pub use segmenter::FrameSegmenter;
