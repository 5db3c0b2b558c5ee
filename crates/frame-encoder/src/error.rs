use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unsupported wl_shm format {0:#x}")]
    UnsupportedFormat(u32),
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("pixel buffer is {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },
    #[error("encoder pipeline fault at {stage}: {reason}")]
    PipelineFault { stage: String, reason: String },
    #[error("sink {sink} produced nothing after {waited:?}")]
    PipelineStalled { sink: String, waited: Duration },
    #[error(
        "fragment {x},{y} {width}x{height} exceeds frame {frame_width}x{frame_height}"
    )]
    InvalidFragmentGeometry {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("encoded frame has no fragments")]
    EmptyFrame,
    #[error("media backend error: {0}")]
    Backend(String),
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
}

impl EncodeError {
    pub(crate) fn fault(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PipelineFault {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Short label used for the `kind` dimension of the fault counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::InvalidDimensions { .. } => "invalid_dimensions",
            Self::BufferSizeMismatch { .. } => "buffer_size",
            Self::PipelineFault { .. } => "pipeline_fault",
            Self::PipelineStalled { .. } => "pipeline_stalled",
            Self::InvalidFragmentGeometry { .. } | Self::EmptyFrame => "fragment_geometry",
            Self::Backend(_) => "backend",
            Self::Malformed(_) => "malformed",
        }
    }
}

pub type EncodeResult<T> = Result<T, EncodeError>;
