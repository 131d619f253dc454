//! # cadence-ffmpeg
//!
//! Stream pipeline for Cadence that decodes through an ffmpeg subprocess.
//!
//! Features:
//! - Any input ffmpeg understands, local or remote
//! - Seeks on the decoder side, so filter restarts resume in place
//! - Filters rendered into a single `-af` chain

mod filters;
mod pipeline;

pub use filters::{render_chain, render_filter};
pub use pipeline::{FfmpegPipeline, FfmpegStream};
