//! Native GStreamer backend.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::graph::{GraphDescription, SOURCE};
use super::{MediaBackend, PipelineHandle, PullCallback};
use crate::error::{EncodeError, EncodeResult};

#[derive(Debug, Clone, Copy)]
pub struct GstBackend {
    _initialized: (),
}

impl GstBackend {
    /// Initializes GStreamer once for the process.
    pub fn new() -> EncodeResult<Self> {
        gst::init().map_err(|e| EncodeError::Backend(format!("gstreamer init failed: {e}")))?;
        Ok(Self { _initialized: () })
    }
}

impl MediaBackend for GstBackend {
    fn launch(&self, graph: &GraphDescription) -> EncodeResult<Box<dyn PipelineHandle>> {
        let launch = graph.to_launch();
        let pipeline = gst::parse::launch(&launch)
            .map_err(|e| EncodeError::Backend(format!("failed to parse pipeline: {e}")))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| EncodeError::Backend("launch line did not yield a pipeline".into()))?;

        let source = pipeline
            .by_name(SOURCE)
            .and_then(|element| element.downcast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| EncodeError::Backend("pipeline has no appsrc named source".into()))?;

        let mut sinks = HashMap::new();
        for name in graph.sinks() {
            let appsink = pipeline
                .by_name(name)
                .and_then(|element| element.downcast::<gst_app::AppSink>().ok())
                .ok_or_else(|| EncodeError::Backend(format!("pipeline has no appsink named {name}")))?;
            sinks.insert(
                name.to_string(),
                SinkQueue {
                    appsink,
                    slot: Arc::default(),
                },
            );
        }

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncodeError::Backend(format!("pipeline refused to play: {e}")))?;
        info!(graph = graph.label(), "gstreamer pipeline playing");

        Ok(Box::new(GstPipeline {
            pipeline,
            source,
            sinks,
            frame_nanos: gst::ClockTime::SECOND.nseconds()
                / u64::from(graph.source().framerate.max(1)),
            pushed: 0,
            stopped: false,
        }))
    }
}

/// Pulls waiting on one appsink. A single blocking drainer serves them in
/// order and drops samples stamped at or before `stale_through`.
#[derive(Default)]
struct SinkSlot {
    waiting: VecDeque<PullCallback>,
    ready: VecDeque<Option<Bytes>>,
    stale_through: Option<u64>,
    draining: bool,
}

struct SinkQueue {
    appsink: gst_app::AppSink,
    slot: Arc<Mutex<SinkSlot>>,
}

struct GstPipeline {
    pipeline: gst::Pipeline,
    source: gst_app::AppSrc,
    sinks: HashMap<String, SinkQueue>,
    // Pushed buffers are stamped `pushed * frame_nanos` so sink output can be
    // traced back to its push.
    frame_nanos: u64,
    pushed: u64,
    stopped: bool,
}

impl GstPipeline {
    fn stage(&self, name: &str) -> EncodeResult<gst::Element> {
        self.pipeline
            .by_name(name)
            .ok_or_else(|| EncodeError::Backend(format!("pipeline has no stage named {name}")))
    }

    fn writable(element: &gst::Element, stage: &str, property: &str) -> EncodeResult<glib::ParamSpec> {
        element
            .find_property(property)
            .filter(|pspec| pspec.flags().contains(glib::ParamFlags::WRITABLE))
            .ok_or_else(|| {
                EncodeError::Backend(format!("stage {stage} has no writable property {property}"))
            })
    }
}

impl PipelineHandle for GstPipeline {
    fn set_caps(&mut self, stage: &str, caps: &str) -> EncodeResult<()> {
        let parsed = gst::Caps::from_str(caps)
            .map_err(|e| EncodeError::Backend(format!("invalid caps {caps}: {e}")))?;
        if stage == SOURCE {
            self.source.set_caps(Some(&parsed));
        } else {
            let element = self.stage(stage)?;
            Self::writable(&element, stage, "caps")?;
            element.set_property("caps", &parsed);
        }
        debug!(stage, caps, "caps rewritten");
        Ok(())
    }

    fn set_property(&mut self, stage: &str, property: &str, value: &str) -> EncodeResult<()> {
        let element = self.stage(stage)?;
        let pspec = Self::writable(&element, stage, property)?;
        let parsed = glib::Value::deserialize(value, pspec.value_type()).map_err(|e| {
            EncodeError::Backend(format!("invalid value {value} for {stage}.{property}: {e}"))
        })?;
        element.set_property_from_value(property, &parsed);
        Ok(())
    }

    fn push(&mut self, buffer: Bytes) -> EncodeResult<()> {
        self.pushed += 1;
        let mut frame = gst::Buffer::from_slice(buffer);
        if let Some(frame) = frame.get_mut() {
            frame.set_pts(gst::ClockTime::from_nseconds(self.pushed * self.frame_nanos));
        }
        self.source
            .push_buffer(frame)
            .map(|_| ())
            .map_err(|flow| EncodeError::Backend(format!("appsrc rejected buffer: {flow:?}")))
    }

    fn pull(&mut self, sink: &str, deliver: PullCallback) {
        let Some(queue) = self.sinks.get(sink) else {
            deliver(None);
            return;
        };
        let mut slot = queue.slot.lock();
        if let Some(ready) = slot.ready.pop_front() {
            drop(slot);
            deliver(ready);
            return;
        }
        slot.waiting.push_back(deliver);
        if slot.draining {
            return;
        }
        slot.draining = true;
        drop(slot);

        let appsink = queue.appsink.clone();
        let slot = Arc::clone(&queue.slot);
        let sink = sink.to_string();
        // pull_sample blocks until the branch produces a buffer or hits EOS.
        tokio::task::spawn_blocking(move || drain(&sink, &appsink, &slot));
    }

    fn cancel_pulls(&mut self, sink: &str) {
        let Some(queue) = self.sinks.get(sink) else {
            return;
        };
        let mut slot = queue.slot.lock();
        let abandoned = slot.waiting.len();
        slot.waiting.clear();
        slot.ready.clear();
        slot.stale_through = Some(self.pushed * self.frame_nanos);
        debug!(sink, abandoned, through = self.pushed, "cancelled pulls");
    }

    fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(err) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %err, "failed to stop gstreamer pipeline");
        }
        info!("gstreamer pipeline stopped");
    }
}

fn drain(sink: &str, appsink: &gst_app::AppSink, slot: &Mutex<SinkSlot>) {
    loop {
        {
            let mut state = slot.lock();
            if state.waiting.is_empty() {
                state.draining = false;
                return;
            }
        }

        let sample = match appsink.pull_sample() {
            Ok(sample) => sample,
            Err(err) => {
                warn!(sink, error = %err, "appsink pull failed");
                let waiting: Vec<_> = {
                    let mut state = slot.lock();
                    state.draining = false;
                    state.waiting.drain(..).collect()
                };
                for deliver in waiting {
                    deliver(None);
                }
                return;
            }
        };
        let pts = sample
            .buffer()
            .and_then(|buffer| buffer.pts())
            .map(gst::ClockTime::nseconds);
        let payload = sample.buffer().and_then(|buffer| {
            buffer
                .map_readable()
                .ok()
                .map(|map| Bytes::copy_from_slice(map.as_slice()))
        });

        let deliver = {
            let mut state = slot.lock();
            if let (Some(pts), Some(limit)) = (pts, state.stale_through) {
                if pts <= limit {
                    debug!(sink, pts, "dropping output of an abandoned push");
                    continue;
                }
            }
            match state.waiting.pop_front() {
                Some(deliver) => deliver,
                None => {
                    state.ready.push_back(payload);
                    continue;
                }
            }
        };
        deliver(payload);
    }
}
