//! The frame encoder contract and the strategies implementing it.

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::backend::MediaBackend;
use crate::config::EncoderConfig;
use crate::error::EncodeResult;
use crate::format::ShmFormat;
use crate::frame::{CodecType, EncodedFrame};
use crate::metrics;
use crate::pipeline::Pipeline;
use crate::reconfigure::{Negotiated, ReconfigurePolicy};

pub mod h264_alpha;
pub mod png;

pub use h264_alpha::H264AlphaEncoder;
pub use png::PngEncoder;

/// Turns raw surface buffers into encoded frames.
///
/// One instance serves one (surface, destination) pair. Calls are sequential:
/// the previous `encode_buffer` must settle before the next one starts, which
/// `&mut self` enforces.
#[async_trait]
pub trait FrameEncoder: Send {
    fn codec(&self) -> CodecType;

    /// Encodes one tightly packed 32-bit buffer. `format` is a wl_shm code and
    /// `serial` is echoed unchanged on the returned frame.
    async fn encode_buffer(
        &mut self,
        pixels: Bytes,
        format: u32,
        width: u32,
        height: u32,
        serial: u64,
    ) -> EncodeResult<EncodedFrame>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderKind {
    /// Lossless stills for static or low-frequency surfaces.
    Png,
    /// Video-rate H.264 with alpha carried as a second stream.
    H264Alpha,
}

/// Strategy picked once at construction.
pub enum AnyEncoder {
    Png(PngEncoder),
    H264Alpha(H264AlphaEncoder),
}

impl AnyEncoder {
    pub fn create(
        kind: EncoderKind,
        backend: &dyn MediaBackend,
        config: &EncoderConfig,
        width: u32,
        height: u32,
        format: u32,
    ) -> EncodeResult<Self> {
        Ok(match kind {
            EncoderKind::Png => Self::Png(PngEncoder::create(backend, config, width, height, format)?),
            EncoderKind::H264Alpha => Self::H264Alpha(H264AlphaEncoder::create(
                backend, config, width, height, format,
            )?),
        })
    }

    pub fn kind(&self) -> EncoderKind {
        match self {
            Self::Png(_) => EncoderKind::Png,
            Self::H264Alpha(_) => EncoderKind::H264Alpha,
        }
    }
}

#[async_trait]
impl FrameEncoder for AnyEncoder {
    fn codec(&self) -> CodecType {
        match self {
            Self::Png(encoder) => encoder.codec(),
            Self::H264Alpha(encoder) => encoder.codec(),
        }
    }

    async fn encode_buffer(
        &mut self,
        pixels: Bytes,
        format: u32,
        width: u32,
        height: u32,
        serial: u64,
    ) -> EncodeResult<EncodedFrame> {
        match self {
            Self::Png(encoder) => {
                encoder
                    .encode_buffer(pixels, format, width, height, serial)
                    .await
            }
            Self::H264Alpha(encoder) => {
                encoder
                    .encode_buffer(pixels, format, width, height, serial)
                    .await
            }
        }
    }
}

/// A live pipeline and the parameters it was last negotiated for.
pub(crate) struct NegotiatedPipeline {
    pipeline: Pipeline,
    policy: ReconfigurePolicy,
    codec: CodecType,
}

impl NegotiatedPipeline {
    pub(crate) fn new(pipeline: Pipeline, initial: Negotiated, codec: CodecType) -> Self {
        Self {
            pipeline,
            policy: ReconfigurePolicy::new(initial),
            codec,
        }
    }

    pub(crate) fn current(&self) -> Negotiated {
        self.policy.current()
    }

    /// Validates the incoming buffer and rewrites caps when its parameters
    /// differ from the live ones. Returns the pipeline ready for a push.
    pub(crate) fn prepare(
        &mut self,
        len: usize,
        format: u32,
        width: u32,
        height: u32,
    ) -> EncodeResult<&mut Pipeline> {
        let incoming = Negotiated::new(width, height, ShmFormat::from_code(format)?)?;
        incoming.check_buffer(len)?;
        if let Some(next) = self.policy.plan(incoming) {
            self.pipeline.reconfigure(&next)?;
            self.policy.commit(next);
            metrics::RECONFIGURATIONS
                .with_label_values(&[self.codec.as_str()])
                .inc();
        }
        Ok(&mut self.pipeline)
    }
}

pub(crate) fn record_outcome(
    codec: CodecType,
    serial: u64,
    started: Instant,
    outcome: &EncodeResult<EncodedFrame>,
) {
    let label = codec.as_str();
    match outcome {
        Ok(frame) => {
            metrics::FRAMES_ENCODED.with_label_values(&[label]).inc();
            metrics::ENCODE_LATENCY
                .with_label_values(&[label])
                .observe(started.elapsed().as_secs_f64());
            for fragment in frame.fragments() {
                metrics::ENCODED_BYTES
                    .with_label_values(&[label, "opaque"])
                    .inc_by(fragment.opaque().len() as u64);
                metrics::ENCODED_BYTES
                    .with_label_values(&[label, "alpha"])
                    .inc_by(fragment.alpha().len() as u64);
            }
            debug!(
                serial,
                codec = label,
                width = frame.width(),
                height = frame.height(),
                bytes = frame.payload_len(),
                "frame encoded"
            );
        }
        Err(err) => {
            metrics::ENCODE_FAULTS
                .with_label_values(&[label, err.kind()])
                .inc();
            warn!(serial, codec = label, error = %err, "frame encode failed");
        }
    }
}
