//! In-process software pipeline for tests and headless wiring.
//!
//! The PNG graph produces real PNG images. The split-alpha graph runs the same
//! stages on the CPU but emits raw I420 planes where the native pipeline would
//! emit H.264 access units. Every caps and property write goes through the
//! same string control plane as a native backend, and all activity is counted
//! so callers can assert on reconfiguration behaviour.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::graph::{GraphDescription, PAD, SCALE, SOURCE};
use super::raster;
use super::{MediaBackend, PipelineHandle, PullCallback};
use crate::caps::{parse_box_offset, ScaleCaps, VideoCaps};
use crate::error::{EncodeError, EncodeResult};
use crate::format::BYTES_PER_PIXEL;

/// Order in which sink outputs of one push are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkOrder {
    /// Sinks complete in the order the graph declares them.
    #[default]
    Declared,
    Reversed,
}

/// Activity observed by an [`InMemoryBackend`] across all its pipelines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub launches: usize,
    pub pushes: usize,
    pub shutdowns: usize,
    pub caps_writes: HashMap<String, usize>,
    pub property_writes: HashMap<String, usize>,
    pub last_caps: HashMap<String, String>,
    pub last_launch: Option<String>,
}

impl BackendStats {
    pub fn caps_writes(&self, stage: &str) -> usize {
        self.caps_writes.get(stage).copied().unwrap_or(0)
    }

    pub fn property_writes(&self, stage: &str) -> usize {
        self.property_writes.get(stage).copied().unwrap_or(0)
    }

    pub fn last_caps(&self, stage: &str) -> Option<&str> {
        self.last_caps.get(stage).map(String::as_str)
    }
}

#[derive(Debug, Default)]
struct Behavior {
    order: SinkOrder,
    empty_sinks: HashSet<String>,
    stalled_sinks: HashSet<String>,
    delayed_sinks: HashSet<String>,
    deferred_sinks: HashSet<String>,
}

#[derive(Debug, Default)]
struct Shared {
    stats: BackendStats,
    behavior: Behavior,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    shared: Arc<Mutex<Shared>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BackendStats {
        self.shared.lock().stats.clone()
    }

    pub fn set_sink_order(&self, order: SinkOrder) {
        self.shared.lock().behavior.order = order;
    }

    /// Makes `sink` yield zero-length buffers until [`Self::heal`].
    pub fn emit_empty(&self, sink: &str) {
        self.shared.lock().behavior.empty_sinks.insert(sink.to_string());
    }

    /// Makes `sink` lose its output until [`Self::heal`]. Registered pulls
    /// stay queued and are served by later pushes.
    pub fn stall(&self, sink: &str) {
        self.shared.lock().behavior.stalled_sinks.insert(sink.to_string());
    }

    /// Gives `sink` one push of latency until [`Self::heal`]: each output is
    /// released by the following push.
    pub fn delay(&self, sink: &str) {
        self.shared.lock().behavior.delayed_sinks.insert(sink.to_string());
    }

    /// Runs `sink`'s pull callbacks from a spawned task instead of inside
    /// `push`, so they land after the caller has suspended.
    pub fn defer(&self, sink: &str) {
        self.shared.lock().behavior.deferred_sinks.insert(sink.to_string());
    }

    pub fn heal(&self) {
        let mut shared = self.shared.lock();
        shared.behavior.empty_sinks.clear();
        shared.behavior.stalled_sinks.clear();
        shared.behavior.delayed_sinks.clear();
    }
}

impl MediaBackend for InMemoryBackend {
    fn launch(&self, graph: &GraphDescription) -> EncodeResult<Box<dyn PipelineHandle>> {
        {
            let mut shared = self.shared.lock();
            shared.stats.launches += 1;
            shared.stats.last_launch = Some(graph.to_launch());
        }
        debug!(graph = graph.label(), "launched in-memory pipeline");
        Ok(Box::new(InMemoryPipeline {
            shared: Arc::clone(&self.shared),
            graph: graph.clone(),
            pending: HashMap::new(),
            ready: HashMap::new(),
            held: HashMap::new(),
            discard_through: HashMap::new(),
            pushed: 0,
            running: true,
        }))
    }
}

struct InMemoryPipeline {
    shared: Arc<Mutex<Shared>>,
    graph: GraphDescription,
    pending: HashMap<String, VecDeque<PullCallback>>,
    ready: HashMap<String, VecDeque<Option<Bytes>>>,
    // Outputs not yet released by a delayed sink, tagged with their push.
    held: HashMap<String, VecDeque<(u64, Option<Bytes>)>>,
    // Outputs of pushes up to this sequence number are dropped on release.
    discard_through: HashMap<String, u64>,
    pushed: u64,
    running: bool,
}

impl InMemoryPipeline {
    fn render(&self, buffer: &[u8]) -> Vec<(&'static str, Option<Bytes>)> {
        let sinks = self.graph.sinks();
        let source = self.graph.source();
        let expected = source.width as usize * source.height as usize * BYTES_PER_PIXEL;
        if buffer.len() != expected {
            warn!(
                expected,
                actual = buffer.len(),
                "buffer does not match negotiated source caps"
            );
            return sinks.iter().map(|sink| (*sink, None)).collect();
        }

        let rgba = raster::to_rgba(buffer, source.format);
        match &self.graph {
            GraphDescription::Png { padding, .. } => {
                let (w, h) = padding.padded_size(source.width, source.height);
                let padded = raster::pad_transparent(&rgba, source.width, source.height, *padding);
                let png = raster::encode_png(&padded, w, h)
                    .map_err(|err| warn!(error = %err, "software png encode failed"))
                    .ok()
                    .map(Bytes::from);
                vec![(sinks[0], png)]
            }
            GraphDescription::H264Alpha { scaled, .. } => {
                let even = raster::scale_nearest(
                    &rgba,
                    source.width,
                    source.height,
                    scaled.width,
                    scaled.height,
                );
                let opaque = raster::to_i420(&even, scaled.width, scaled.height);
                let alpha =
                    raster::to_i420(&raster::alpha_as_grey(&even), scaled.width, scaled.height);
                vec![
                    (sinks[0], Some(Bytes::from(opaque))),
                    (sinks[1], Some(Bytes::from(alpha))),
                ]
            }
        }
    }

    fn ensure_running(&self) -> EncodeResult<()> {
        if self.running {
            Ok(())
        } else {
            Err(EncodeError::Backend("pipeline already shut down".into()))
        }
    }

    fn record_caps(&self, stage: &str, caps: &str) {
        let mut shared = self.shared.lock();
        *shared.stats.caps_writes.entry(stage.to_string()).or_default() += 1;
        shared
            .stats
            .last_caps
            .insert(stage.to_string(), caps.to_string());
    }
}

impl PipelineHandle for InMemoryPipeline {
    fn set_caps(&mut self, stage: &str, caps: &str) -> EncodeResult<()> {
        self.ensure_running()?;
        match (&mut self.graph, stage) {
            (GraphDescription::Png { source, .. }, SOURCE)
            | (GraphDescription::H264Alpha { source, .. }, SOURCE) => {
                *source = caps.parse::<VideoCaps>()?;
            }
            (GraphDescription::H264Alpha { scaled, .. }, SCALE) => {
                *scaled = caps.parse::<ScaleCaps>()?;
            }
            _ => {
                return Err(EncodeError::Backend(format!(
                    "no caps-bearing stage named {stage}"
                )))
            }
        }
        self.record_caps(stage, caps);
        Ok(())
    }

    fn set_property(&mut self, stage: &str, property: &str, value: &str) -> EncodeResult<()> {
        self.ensure_running()?;
        match (&mut self.graph, stage, property) {
            (GraphDescription::Png { padding, .. }, PAD, "right") => {
                padding.right = parse_box_offset(value)?;
            }
            (GraphDescription::Png { padding, .. }, PAD, "bottom") => {
                padding.bottom = parse_box_offset(value)?;
            }
            _ => {
                return Err(EncodeError::Backend(format!(
                    "stage {stage} has no writable property {property}"
                )))
            }
        }
        let mut shared = self.shared.lock();
        *shared
            .stats
            .property_writes
            .entry(stage.to_string())
            .or_default() += 1;
        Ok(())
    }

    fn push(&mut self, buffer: Bytes) -> EncodeResult<()> {
        self.ensure_running()?;
        self.pushed += 1;
        let seq = self.pushed;
        let mut outputs = self.render(&buffer);

        let mut deliveries: Vec<(PullCallback, Option<Bytes>, bool)> = Vec::new();
        {
            let mut shared = self.shared.lock();
            shared.stats.pushes += 1;
            if shared.behavior.order == SinkOrder::Reversed {
                outputs.reverse();
            }
            for (sink, output) in outputs {
                if shared.behavior.stalled_sinks.contains(sink) {
                    continue;
                }
                let output = if shared.behavior.empty_sinks.contains(sink) {
                    Some(Bytes::new())
                } else {
                    output
                };
                let keep = usize::from(shared.behavior.delayed_sinks.contains(sink));
                let deferred = shared.behavior.deferred_sinks.contains(sink);
                let stale = self.discard_through.get(sink).copied().unwrap_or(0);

                let held = self.held.entry(sink.to_string()).or_default();
                held.push_back((seq, output));
                while held.len() > keep {
                    let Some((produced_by, output)) = held.pop_front() else {
                        break;
                    };
                    if produced_by <= stale {
                        debug!(sink, produced_by, "dropping output of an abandoned push");
                        continue;
                    }
                    match self.pending.get_mut(sink).and_then(VecDeque::pop_front) {
                        Some(callback) => deliveries.push((callback, output, deferred)),
                        None => self.ready.entry(sink.to_string()).or_default().push_back(output),
                    }
                }
            }
        }

        for (callback, output, deferred) in deliveries {
            if deferred {
                deliver_later(callback, output);
            } else {
                callback(output);
            }
        }
        Ok(())
    }

    fn pull(&mut self, sink: &str, deliver: PullCallback) {
        if !self.running || !self.graph.sinks().iter().any(|known| *known == sink) {
            deliver(None);
            return;
        }
        match self.ready.get_mut(sink).and_then(VecDeque::pop_front) {
            Some(output) => deliver(output),
            None => self
                .pending
                .entry(sink.to_string())
                .or_default()
                .push_back(deliver),
        }
    }

    fn cancel_pulls(&mut self, sink: &str) {
        let abandoned = self.pending.remove(sink).map_or(0, |waiting| waiting.len());
        self.ready.remove(sink);
        self.discard_through.insert(sink.to_string(), self.pushed);
        debug!(sink, abandoned, through = self.pushed, "cancelled pulls");
    }

    fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.pending.clear();
        self.ready.clear();
        self.held.clear();
        self.shared.lock().stats.shutdowns += 1;
    }
}

fn deliver_later(callback: PullCallback, output: Option<Bytes>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                tokio::task::yield_now().await;
                callback(output);
            });
        }
        Err(_) => callback(output),
    }
}
