//! H.264 with alpha carried as a second, greyscale H.264 stream.
//!
//! Mainstream H.264 profiles have no alpha plane. The pipeline tees the
//! source into an opaque branch and a branch that turns the alpha channel
//! into luma; both are encoded with identical settings and the remote decoder
//! recombines them. A fragment is emitted only once both branches delivered.

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;

use super::{record_outcome, FrameEncoder, NegotiatedPipeline};
use crate::backend::MediaBackend;
use crate::config::EncoderConfig;
use crate::error::EncodeResult;
use crate::format::ShmFormat;
use crate::frame::{CodecType, EncodedFrame, EncodedFrameFragment};
use crate::options::EncodingOptions;
use crate::pipeline::Pipeline;
use crate::reconfigure::Negotiated;

pub struct H264AlphaEncoder {
    live: NegotiatedPipeline,
}

impl H264AlphaEncoder {
    pub fn create(
        backend: &dyn MediaBackend,
        config: &EncoderConfig,
        width: u32,
        height: u32,
        format: u32,
    ) -> EncodeResult<Self> {
        let params = Negotiated::new(width, height, ShmFormat::from_code(format)?)?;
        let pipeline = Pipeline::h264_alpha(backend, config, &params)?;
        Ok(Self {
            live: NegotiatedPipeline::new(pipeline, params, CodecType::H264),
        })
    }

    pub fn negotiated(&self) -> Negotiated {
        self.live.current()
    }

    async fn encode(
        &mut self,
        pixels: Bytes,
        format: u32,
        width: u32,
        height: u32,
        serial: u64,
    ) -> EncodeResult<EncodedFrame> {
        let pipeline = self.live.prepare(pixels.len(), format, width, height)?;
        let payload = pipeline.encode_split(pixels).await?;
        let fragment =
            EncodedFrameFragment::new(0, 0, width, height, payload.opaque, payload.alpha);
        EncodedFrame::new(
            serial,
            CodecType::H264,
            EncodingOptions::empty().with_full_frame().with_split_alpha(),
            width,
            height,
            vec![fragment],
        )
    }
}

#[async_trait]
impl FrameEncoder for H264AlphaEncoder {
    fn codec(&self) -> CodecType {
        CodecType::H264
    }

    async fn encode_buffer(
        &mut self,
        pixels: Bytes,
        format: u32,
        width: u32,
        height: u32,
        serial: u64,
    ) -> EncodeResult<EncodedFrame> {
        let started = Instant::now();
        let outcome = self.encode(pixels, format, width, height, serial).await;
        record_outcome(CodecType::H264, serial, started, &outcome);
        outcome
    }
}
