//! Control surface over a graph-based media pipeline.
//!
//! A backend launches a [`GraphDescription`] and hands back a
//! [`PipelineHandle`]: named stages whose caps and properties are rewritten
//! as strings, one source to push raw buffers into, and named sinks to pull
//! encoded buffers from. Pulls complete through callbacks, possibly on the
//! backend's own threads.

use bytes::Bytes;

use crate::error::EncodeResult;

pub mod graph;
pub mod memory;
pub mod raster;

#[cfg(feature = "gstreamer")]
pub mod gst;

pub use graph::GraphDescription;
pub use memory::{BackendStats, InMemoryBackend, SinkOrder};

#[cfg(feature = "gstreamer")]
pub use gst::GstBackend;

/// Receives the next buffer from a sink, or `None` if the sink had nothing.
pub type PullCallback = Box<dyn FnOnce(Option<Bytes>) + Send + 'static>;

pub trait MediaBackend: Send + Sync {
    fn launch(&self, graph: &GraphDescription) -> EncodeResult<Box<dyn PipelineHandle>>;
}

/// A running pipeline. Not reentrant: one push/pull cycle at a time.
pub trait PipelineHandle: Send {
    fn set_caps(&mut self, stage: &str, caps: &str) -> EncodeResult<()>;

    fn set_property(&mut self, stage: &str, property: &str, value: &str) -> EncodeResult<()>;

    /// Fire-and-forget; backpressure stays inside the backend.
    fn push(&mut self, buffer: Bytes) -> EncodeResult<()>;

    /// Registers interest in the next buffer from `sink`. The callback runs
    /// exactly once unless the pipeline stalls or the pull is cancelled.
    fn pull(&mut self, sink: &str, deliver: PullCallback);

    /// Drops every pull still registered on `sink` without running it, and
    /// discards any output `sink` still owes for buffers pushed so far. The
    /// next pull is served from the next push only.
    fn cancel_pulls(&mut self, sink: &str);

    /// Releases native resources. Safe to call more than once.
    fn shutdown(&mut self);
}
