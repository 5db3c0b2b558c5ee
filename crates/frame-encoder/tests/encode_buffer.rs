use std::time::Duration;

use bytes::Bytes;
use frame_encoder::backend::graph::{ALPHA_SINK, PAD, SCALE, SINK, SOURCE};
use frame_encoder::backend::SinkOrder;
use frame_encoder::{
    AnyEncoder, CodecType, EncodeError, EncodedFrame, EncoderConfig, EncoderKind, EncodingFlags,
    FrameEncoder, InMemoryBackend, ShmFormat,
};

const ARGB: u32 = ShmFormat::Argb8888 as u32;
const XRGB: u32 = ShmFormat::Xrgb8888 as u32;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Horizontal alpha ramp over a constant colour.
fn synthetic(width: u32, height: u32) -> Bytes {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..height {
        for x in 0..width {
            let alpha = (x * 255 / width.max(1)) as u8;
            pixels.extend_from_slice(&[200, 100, 50, alpha]);
        }
    }
    Bytes::from(pixels)
}

fn assert_full_frame(frame: &EncodedFrame, width: u32, height: u32) {
    assert_eq!((frame.width(), frame.height()), (width, height));
    assert_eq!(frame.fragments().len(), 1);
    let fragment = &frame.fragments()[0];
    assert_eq!(
        (fragment.x(), fragment.y(), fragment.width(), fragment.height()),
        (0, 0, width, height)
    );
    assert!(frame.covers_full_frame());
}

#[test_timeout::tokio_timeout_test(30)]
async fn h264_alpha_end_to_end() {
    init_tracing();
    let backend = InMemoryBackend::new();
    let mut encoder = AnyEncoder::create(
        EncoderKind::H264Alpha,
        &backend,
        &EncoderConfig::default(),
        320,
        240,
        ARGB,
    )
    .expect("create encoder");

    let frame = encoder
        .encode_buffer(synthetic(320, 240), ARGB, 320, 240, 7)
        .await
        .expect("encode");

    assert_eq!(frame.serial(), 7);
    assert_eq!(frame.codec(), CodecType::H264);
    assert_full_frame(&frame, 320, 240);
    let fragment = &frame.fragments()[0];
    assert!(!fragment.opaque().is_empty());
    assert!(!fragment.alpha().is_empty());
    assert_eq!(
        frame.options().decode(),
        EncodingFlags {
            full_frame: true,
            split_alpha: true
        }
    );
}

#[test_timeout::tokio_timeout_test(30)]
async fn serial_is_echoed_for_every_call() {
    init_tracing();
    let backend = InMemoryBackend::new();
    for kind in [EncoderKind::Png, EncoderKind::H264Alpha] {
        let mut encoder =
            AnyEncoder::create(kind, &backend, &EncoderConfig::default(), 24, 18, XRGB)
                .expect("create encoder");
        assert_eq!(encoder.kind(), kind);
        for (serial, (width, height)) in [(0u64, (24, 18)), (u64::MAX, (24, 18)), (3, (7, 5)), (2, (30, 31))]
        {
            let frame = encoder
                .encode_buffer(synthetic(width, height), XRGB, width, height, serial)
                .await
                .expect("encode");
            assert_eq!(frame.serial(), serial);
            assert_full_frame(&frame, width, height);
        }
    }
}

#[test_timeout::tokio_timeout_test(30)]
async fn identical_parameters_do_not_rewrite_caps() {
    let backend = InMemoryBackend::new();
    let mut encoder = AnyEncoder::create(
        EncoderKind::H264Alpha,
        &backend,
        &EncoderConfig::default(),
        64,
        48,
        ARGB,
    )
    .unwrap();

    for serial in 0..2 {
        encoder
            .encode_buffer(synthetic(64, 48), ARGB, 64, 48, serial)
            .await
            .unwrap();
    }
    let stats = backend.stats();
    assert_eq!(stats.caps_writes(SOURCE), 0);
    assert_eq!(stats.caps_writes(SCALE), 0);
    assert_eq!(stats.pushes, 2);

    // A format switch alone is a reconfiguration.
    encoder
        .encode_buffer(synthetic(64, 48), XRGB, 64, 48, 2)
        .await
        .unwrap();
    let stats = backend.stats();
    assert_eq!(stats.caps_writes(SOURCE), 1);
    assert_eq!(
        stats.last_caps(SOURCE),
        Some("video/x-raw,format=BGRx,width=64,height=48,framerate=60/1")
    );
}

#[test_timeout::tokio_timeout_test(30)]
async fn png_padding_follows_resizes() {
    let backend = InMemoryBackend::new();
    let mut encoder =
        AnyEncoder::create(EncoderKind::Png, &backend, &EncoderConfig::default(), 8, 10, ARGB)
            .unwrap();
    encoder
        .encode_buffer(synthetic(8, 10), ARGB, 8, 10, 1)
        .await
        .unwrap();
    // Growing past the minimum drops the padding; shrinking again restores it.
    encoder
        .encode_buffer(synthetic(20, 20), ARGB, 20, 20, 2)
        .await
        .unwrap();
    encoder
        .encode_buffer(synthetic(20, 20), ARGB, 20, 20, 3)
        .await
        .unwrap();
    assert_eq!(backend.stats().property_writes(PAD), 2);
    encoder
        .encode_buffer(synthetic(15, 30), ARGB, 15, 30, 4)
        .await
        .unwrap();
    assert_eq!(backend.stats().property_writes(PAD), 4);
    assert_eq!(backend.stats().caps_writes(SOURCE), 2);
}

#[test_timeout::tokio_timeout_test(30)]
async fn join_is_commutative_across_sinks() {
    let mut encoded = Vec::new();
    for order in [SinkOrder::Reversed, SinkOrder::Declared] {
        let backend = InMemoryBackend::new();
        backend.set_sink_order(order);
        let mut encoder = AnyEncoder::create(
            EncoderKind::H264Alpha,
            &backend,
            &EncoderConfig::default(),
            33,
            17,
            ARGB,
        )
        .unwrap();
        let frame = encoder
            .encode_buffer(synthetic(33, 17), ARGB, 33, 17, 99)
            .await
            .unwrap();
        encoded.push(frame.to_bytes().unwrap());
    }
    assert_eq!(encoded[0], encoded[1]);
}

#[test_timeout::tokio_timeout_test(30)]
async fn join_waits_for_a_branch_that_finishes_late() {
    init_tracing();
    let mut encoded = Vec::new();
    for late in [SINK, ALPHA_SINK] {
        let backend = InMemoryBackend::new();
        backend.defer(late);
        let mut encoder = AnyEncoder::create(
            EncoderKind::H264Alpha,
            &backend,
            &EncoderConfig::default(),
            40,
            30,
            ARGB,
        )
        .unwrap();
        let frame = encoder
            .encode_buffer(synthetic(40, 30), ARGB, 40, 30, 8)
            .await
            .expect("encode");
        encoded.push(frame.to_bytes().unwrap());
    }
    assert_eq!(encoded[0], encoded[1]);
}

#[test_timeout::tokio_timeout_test(30)]
async fn timed_out_frames_do_not_shift_later_output() {
    init_tracing();
    let backend = InMemoryBackend::new();
    let config = EncoderConfig::default().with_pull_timeout(Duration::from_millis(50));
    for kind in [EncoderKind::Png, EncoderKind::H264Alpha] {
        let mut encoder = AnyEncoder::create(kind, &backend, &config, 20, 20, ARGB).unwrap();
        backend.delay(SINK);
        let err = encoder
            .encode_buffer(synthetic(20, 20), ARGB, 20, 20, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EncodeError::PipelineStalled { .. }));

        backend.heal();
        for serial in 2..5 {
            let frame = encoder
                .encode_buffer(synthetic(20, 20), ARGB, 20, 20, serial)
                .await
                .expect("encoder recovers");
            assert_eq!(frame.serial(), serial);
        }
    }
}

#[test_timeout::tokio_timeout_test(30)]
async fn encoded_frames_survive_serialization() {
    let backend = InMemoryBackend::new();
    let mut encoder =
        AnyEncoder::create(EncoderKind::Png, &backend, &EncoderConfig::default(), 12, 40, ARGB)
            .unwrap();
    let frame = encoder
        .encode_buffer(synthetic(12, 40), ARGB, 12, 40, 1234)
        .await
        .unwrap();
    let parsed = EncodedFrame::parse(frame.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed, frame);
    assert!(parsed.options().is_full_frame());
    assert!(!parsed.options().is_split_alpha());
}

#[test_timeout::tokio_timeout_test(30)]
async fn construction_rejects_bad_parameters() {
    let backend = InMemoryBackend::new();
    let config = EncoderConfig::default();
    assert!(matches!(
        AnyEncoder::create(EncoderKind::Png, &backend, &config, 16, 16, 7),
        Err(EncodeError::UnsupportedFormat(7))
    ));
    assert!(matches!(
        AnyEncoder::create(EncoderKind::H264Alpha, &backend, &config, 0, 16, ARGB),
        Err(EncodeError::InvalidDimensions { .. })
    ));
    assert_eq!(backend.stats().launches, 0);
}
