//! External ffmpeg processes at either end of the pipeline.

mod ffmpeg;

pub use ffmpeg::{decoder_args, encoder_args, spawn_decoder, spawn_encoder, FfmpegProcess, FFMPEG};
