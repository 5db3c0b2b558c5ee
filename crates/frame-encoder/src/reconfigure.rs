//! Decides when a live pipeline needs its caps rewritten.
//!
//! Both strategies remember the `(width, height, format)` their pipeline was
//! last negotiated for. Any difference on an incoming buffer means the source
//! caps (and the stage sized from them) must be rewritten before the buffer
//! is pushed. Nothing else is reset: the encoder keeps its GOP position.

use crate::caps::{Padding, ScaleCaps, VideoCaps};
use crate::error::{EncodeError, EncodeResult};
use crate::format::{ShmFormat, BYTES_PER_PIXEL};

/// Parameters a pipeline is negotiated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub width: u32,
    pub height: u32,
    pub format: ShmFormat,
}

impl Negotiated {
    pub fn new(width: u32, height: u32, format: ShmFormat) -> EncodeResult<Self> {
        if width == 0 || height == 0 {
            return Err(EncodeError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            format,
        })
    }

    /// Byte length of a tightly packed buffer at these parameters.
    pub fn buffer_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
    }

    pub fn check_buffer(&self, len: usize) -> EncodeResult<()> {
        let expected = self
            .buffer_len()
            .ok_or(EncodeError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })?;
        if len != expected {
            return Err(EncodeError::BufferSizeMismatch {
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    pub fn source_caps(&self, framerate: u32) -> VideoCaps {
        VideoCaps {
            format: self.format.native(),
            width: self.width,
            height: self.height,
            framerate,
        }
    }

    pub fn scale_caps(&self) -> ScaleCaps {
        ScaleCaps::even(self.width, self.height)
    }

    pub fn padding(&self) -> Padding {
        Padding::for_size(self.width, self.height)
    }
}

/// Tracks the live configuration of one pipeline.
#[derive(Debug, Clone)]
pub struct ReconfigurePolicy {
    current: Negotiated,
}

impl ReconfigurePolicy {
    pub fn new(initial: Negotiated) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> Negotiated {
        self.current
    }

    /// Returns the parameters to rewrite the pipeline for, or `None` when the
    /// live configuration already matches.
    pub fn plan(&self, incoming: Negotiated) -> Option<Negotiated> {
        (incoming != self.current).then_some(incoming)
    }

    /// Records a rewrite that reached the backend.
    pub fn commit(&mut self, applied: Negotiated) {
        self.current = applied;
    }
}
