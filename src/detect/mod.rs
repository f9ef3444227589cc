pub mod annotator;
pub mod client;
pub mod framer;
pub mod jpeg;
pub mod object;
pub mod overlay;
pub mod tracker;

pub use annotator::ObjectAnnotator;
pub use client::DetectorClient;
pub use framer::{BracketFramer, LineFramer, ResponseFramer};
pub use object::DetectedObject;
pub use tracker::{SceneEvent, SceneTracker};
