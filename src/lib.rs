// src/lib.rs

pub mod cloud;
pub mod config;
pub mod pipeline;
pub mod preview;
pub mod report;
pub mod source;
pub mod tracking;
pub mod types;
pub mod violation;
pub mod writer;

pub use pipeline::{spawn, PipelineOptions, RunContext};
pub use source::{FrameSource, JsonlFrameSource, StaticFrameSource};
pub use types::{Config, FrameInput, StreamRecord, TrackedObject};
pub use writer::{AsyncFrameWriter, FrameSink, MjpegFileSink};
