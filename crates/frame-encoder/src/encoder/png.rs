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

/// Lossless single-pipeline strategy. Alpha stays embedded in the PNG, so
/// fragments carry no separate alpha payload.
pub struct PngEncoder {
    live: NegotiatedPipeline,
}

impl PngEncoder {
    pub fn create(
        backend: &dyn MediaBackend,
        config: &EncoderConfig,
        width: u32,
        height: u32,
        format: u32,
    ) -> EncodeResult<Self> {
        let params = Negotiated::new(width, height, ShmFormat::from_code(format)?)?;
        let pipeline = Pipeline::png(backend, config, &params)?;
        Ok(Self {
            live: NegotiatedPipeline::new(pipeline, params, CodecType::Png),
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
        let png = pipeline.encode_single(pixels).await?;
        let fragment = EncodedFrameFragment::new(0, 0, width, height, png, Bytes::new());
        EncodedFrame::new(
            serial,
            CodecType::Png,
            EncodingOptions::empty().with_full_frame(),
            width,
            height,
            vec![fragment],
        )
    }
}

#[async_trait]
impl FrameEncoder for PngEncoder {
    fn codec(&self) -> CodecType {
        CodecType::Png
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
        record_outcome(CodecType::Png, serial, started, &outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::graph::{PAD, SINK, SOURCE};
    use crate::backend::InMemoryBackend;
    use crate::error::EncodeError;
    use std::time::Duration;

    const ARGB: u32 = 0;
    const XRGB: u32 = 1;

    fn solid(width: u32, height: u32, bgra: [u8; 4]) -> Bytes {
        Bytes::from(bgra.repeat((width * height) as usize))
    }

    #[tokio::test]
    async fn emits_one_full_frame_fragment_without_alpha() {
        let backend = InMemoryBackend::new();
        let mut encoder =
            PngEncoder::create(&backend, &EncoderConfig::default(), 32, 20, ARGB).unwrap();
        let frame = encoder
            .encode_buffer(solid(32, 20, [1, 2, 3, 255]), ARGB, 32, 20, 42)
            .await
            .expect("encode");

        assert_eq!(frame.serial(), 42);
        assert_eq!(frame.codec(), CodecType::Png);
        assert!(frame.covers_full_frame());
        assert!(frame.options().is_full_frame());
        assert!(!frame.options().is_split_alpha());
        let fragment = &frame.fragments()[0];
        assert!(fragment.alpha().is_empty());
        assert_eq!(&fragment.opaque()[..4], b"\x89PNG");
    }

    #[tokio::test]
    async fn small_surfaces_are_padded_bottom_right() {
        let backend = InMemoryBackend::new();
        let mut encoder =
            PngEncoder::create(&backend, &EncoderConfig::default(), 8, 10, ARGB).unwrap();
        let frame = encoder
            .encode_buffer(solid(8, 10, [0, 0, 255, 255]), ARGB, 8, 10, 1)
            .await
            .expect("encode");

        assert_eq!((frame.width(), frame.height()), (8, 10));
        let launch = backend.stats().last_launch.unwrap();
        assert!(launch.contains("bottom=-6 right=-8"));

        let image = image::load_from_memory(frame.fragments()[0].opaque())
            .expect("decodable png")
            .to_rgba8();
        assert_eq!(image.dimensions(), (16, 16));
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(7, 9).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(8, 0).0[3], 0);
        assert_eq!(image.get_pixel(0, 10).0[3], 0);
    }

    #[tokio::test]
    async fn large_surfaces_are_not_padded() {
        let backend = InMemoryBackend::new();
        let mut encoder =
            PngEncoder::create(&backend, &EncoderConfig::default(), 16, 24, XRGB).unwrap();
        let frame = encoder
            .encode_buffer(solid(16, 24, [9, 9, 9, 0]), XRGB, 16, 24, 1)
            .await
            .expect("encode");
        assert!(backend.stats().last_launch.unwrap().contains("bottom=0 right=0"));
        let image = image::load_from_memory(frame.fragments()[0].opaque())
            .unwrap()
            .to_rgba8();
        assert_eq!(image.dimensions(), (16, 24));
        // Padding byte of xrgb is ignored.
        assert_eq!(image.get_pixel(15, 23).0[3], 255);
    }

    #[tokio::test]
    async fn resize_rewrites_caps_and_padding() {
        let backend = InMemoryBackend::new();
        let mut encoder =
            PngEncoder::create(&backend, &EncoderConfig::default(), 32, 32, ARGB).unwrap();
        encoder
            .encode_buffer(solid(32, 32, [0; 4]), ARGB, 32, 32, 1)
            .await
            .unwrap();
        encoder
            .encode_buffer(solid(32, 32, [0; 4]), ARGB, 32, 32, 2)
            .await
            .unwrap();
        assert_eq!(backend.stats().caps_writes(SOURCE), 0);

        let frame = encoder
            .encode_buffer(solid(4, 40, [0; 4]), ARGB, 4, 40, 3)
            .await
            .unwrap();
        let stats = backend.stats();
        assert_eq!(stats.caps_writes(SOURCE), 1);
        assert_eq!(stats.property_writes(PAD), 2);
        assert_eq!(
            stats.last_caps(SOURCE),
            Some("video/x-raw,format=BGRA,width=4,height=40,framerate=60/1")
        );
        let image = image::load_from_memory(frame.fragments()[0].opaque())
            .unwrap()
            .to_rgba8();
        assert_eq!(image.dimensions(), (16, 40));
        assert_eq!(encoder.negotiated().width, 4);
    }

    #[tokio::test]
    async fn empty_sink_buffer_is_a_pipeline_fault() {
        let backend = InMemoryBackend::new();
        let mut encoder =
            PngEncoder::create(&backend, &EncoderConfig::default(), 16, 16, ARGB).unwrap();
        backend.emit_empty(SINK);
        let err = encoder
            .encode_buffer(solid(16, 16, [0; 4]), ARGB, 16, 16, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, EncodeError::PipelineFault { .. }));

        // The instance survives and the next commit encodes normally.
        backend.heal();
        let frame = encoder
            .encode_buffer(solid(16, 16, [0; 4]), ARGB, 16, 16, 6)
            .await
            .expect("recovered");
        assert_eq!(frame.serial(), 6);
    }

    #[tokio::test]
    async fn encoder_recovers_after_a_stalled_pull() {
        let backend = InMemoryBackend::new();
        let config = EncoderConfig::default().with_pull_timeout(Duration::from_millis(20));
        let mut encoder = PngEncoder::create(&backend, &config, 16, 16, ARGB).unwrap();
        backend.stall(SINK);
        let err = encoder
            .encode_buffer(solid(16, 16, [0; 4]), ARGB, 16, 16, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EncodeError::PipelineStalled { .. }));

        backend.heal();
        for serial in 2..5 {
            let frame = encoder
                .encode_buffer(solid(16, 16, [0; 4]), ARGB, 16, 16, serial)
                .await
                .expect("later frames encode");
            assert_eq!(frame.serial(), serial);
        }
    }

    #[tokio::test]
    async fn late_output_of_a_timed_out_frame_is_discarded() {
        let backend = InMemoryBackend::new();
        let config = EncoderConfig::default().with_pull_timeout(Duration::from_millis(20));
        let mut encoder = PngEncoder::create(&backend, &config, 16, 16, ARGB).unwrap();
        backend.delay(SINK);
        encoder
            .encode_buffer(solid(16, 16, [0, 0, 255, 255]), ARGB, 16, 16, 1)
            .await
            .unwrap_err();

        backend.heal();
        let frame = encoder
            .encode_buffer(solid(16, 16, [255, 0, 0, 255]), ARGB, 16, 16, 2)
            .await
            .expect("encode");
        let image = image::load_from_memory(frame.fragments()[0].opaque())
            .unwrap()
            .to_rgba8();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }

    #[tokio::test]
    async fn unsupported_format_leaves_encoder_usable() {
        let backend = InMemoryBackend::new();
        let mut encoder =
            PngEncoder::create(&backend, &EncoderConfig::default(), 16, 16, ARGB).unwrap();
        let err = encoder
            .encode_buffer(solid(16, 16, [0; 4]), 0x3432_4258, 16, 16, 1)
            .await
            .unwrap_err();
        assert_eq!(err, EncodeError::UnsupportedFormat(0x3432_4258));
        assert_eq!(backend.stats().pushes, 0);

        encoder
            .encode_buffer(solid(16, 16, [0; 4]), ARGB, 16, 16, 2)
            .await
            .expect("valid call after failure");
    }

    #[tokio::test]
    async fn short_buffer_is_rejected_before_push() {
        let backend = InMemoryBackend::new();
        let mut encoder =
            PngEncoder::create(&backend, &EncoderConfig::default(), 16, 16, ARGB).unwrap();
        let err = encoder
            .encode_buffer(Bytes::from(vec![0u8; 10]), ARGB, 16, 16, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EncodeError::BufferSizeMismatch { expected: 1024, actual: 10 }));
        assert_eq!(backend.stats().pushes, 0);
    }
}
