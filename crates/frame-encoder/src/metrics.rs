use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static FRAMES_ENCODED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "frame_encoder_frames_total",
            "Frames encoded successfully",
        ),
        &["codec"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ENCODE_FAULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "frame_encoder_faults_total",
            "encode_buffer calls that failed",
        ),
        &["codec", "kind"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static RECONFIGURATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "frame_encoder_reconfigurations_total",
            "Pipeline caps rewrites caused by format or size changes",
        ),
        &["codec"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ENCODED_BYTES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "frame_encoder_encoded_bytes_total",
            "Encoded payload bytes handed to the transport",
        ),
        &["codec", "channel"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ENCODE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new(
            "frame_encoder_encode_seconds",
            "Time from push to completed frame",
        )
        .buckets(vec![0.001, 0.002, 0.005, 0.01, 0.016, 0.033, 0.05, 0.1, 0.25, 1.0]),
        &["codec"],
    )
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});
