//! Typed wrapper over a launched [`PipelineHandle`].
//!
//! Encoders talk to this type in terms of negotiated parameters and buffers.
//! Caps strings, stage names and launch lines stay on this side of the seam.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::backend::graph::{ALPHA_SINK, PAD, SCALE, SINK, SOURCE};
use crate::backend::{GraphDescription, MediaBackend, PipelineHandle};
use crate::config::EncoderConfig;
use crate::error::{EncodeError, EncodeResult};
use crate::join::{Channel, SplitJoin, SplitPayload};
use crate::reconfigure::Negotiated;

pub struct Pipeline {
    handle: Box<dyn PipelineHandle>,
    graph: GraphDescription,
    pull_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn png(
        backend: &dyn MediaBackend,
        config: &EncoderConfig,
        params: &Negotiated,
    ) -> EncodeResult<Self> {
        let graph = GraphDescription::Png {
            source: params.source_caps(config.framerate),
            padding: params.padding(),
        };
        Self::launch(backend, config, graph)
    }

    pub fn h264_alpha(
        backend: &dyn MediaBackend,
        config: &EncoderConfig,
        params: &Negotiated,
    ) -> EncodeResult<Self> {
        let graph = GraphDescription::H264Alpha {
            source: params.source_caps(config.framerate),
            scaled: params.scale_caps(),
            x264: config.x264.clone(),
        };
        Self::launch(backend, config, graph)
    }

    fn launch(
        backend: &dyn MediaBackend,
        config: &EncoderConfig,
        graph: GraphDescription,
    ) -> EncodeResult<Self> {
        let handle = backend.launch(&graph)?;
        info!(
            graph = graph.label(),
            caps = %graph.source(),
            "encoder pipeline launched"
        );
        Ok(Self {
            handle,
            graph,
            pull_timeout: config.pull_timeout,
        })
    }

    pub fn graph(&self) -> &GraphDescription {
        &self.graph
    }

    /// Rewrites source caps and the stage sized from them. Must complete
    /// before the next push.
    pub fn reconfigure(&mut self, params: &Negotiated) -> EncodeResult<()> {
        let framerate = self.graph.source().framerate;
        let source_caps = params.source_caps(framerate);
        self.handle.set_caps(SOURCE, &source_caps.to_string())?;

        match &mut self.graph {
            GraphDescription::Png { source, padding } => {
                *source = source_caps;
                let next = params.padding();
                if next != *padding {
                    self.handle.set_property(PAD, "right", &next.box_right())?;
                    self.handle.set_property(PAD, "bottom", &next.box_bottom())?;
                    *padding = next;
                }
            }
            GraphDescription::H264Alpha { source, scaled, .. } => {
                *source = source_caps;
                let next = params.scale_caps();
                self.handle.set_caps(SCALE, &next.to_string())?;
                *scaled = next;
            }
        }
        debug!(
            graph = self.graph.label(),
            width = params.width,
            height = params.height,
            format = %params.format.native(),
            "pipeline reconfigured"
        );
        Ok(())
    }

    /// Pushes one buffer and waits for the single sink's output.
    pub async fn encode_single(&mut self, buffer: Bytes) -> EncodeResult<Bytes> {
        let (tx, rx) = oneshot::channel();
        self.handle.pull(
            SINK,
            Box::new(move |payload| {
                let _ = tx.send(payload);
            }),
        );
        self.handle.push(buffer)?;

        let pulled = match with_timeout(self.pull_timeout, SINK, rx).await {
            Ok(pulled) => pulled,
            Err(err) => {
                self.abandon_pulls();
                return Err(err);
            }
        };
        match pulled {
            Ok(Some(bytes)) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(EncodeError::fault(
                SINK,
                "pulled empty buffer; encoder pipeline is probably in error",
            )),
            Err(_) => Err(EncodeError::fault(SINK, "pull callback dropped without a buffer")),
        }
    }

    /// Pushes one buffer into the shared source and waits for both branches.
    pub async fn encode_split(&mut self, buffer: Bytes) -> EncodeResult<SplitPayload> {
        let join = SplitJoin::new();
        self.handle.pull(SINK, join.callback(Channel::Opaque));
        self.handle.pull(ALPHA_SINK, join.callback(Channel::Alpha));
        self.handle.push(buffer)?;

        let joined = with_timeout(self.pull_timeout, "sink+alphasink", join.wait())
            .await
            .and_then(|joined| joined);
        if joined.is_err() {
            // One branch may still owe output for this push.
            self.abandon_pulls();
        }
        joined
    }

    /// Retires pulls left behind by a failed wait so their output never
    /// lands in a later call.
    fn abandon_pulls(&mut self) {
        for sink in self.graph.sinks() {
            self.handle.cancel_pulls(sink);
        }
        debug!(graph = self.graph.label(), "abandoned outstanding pulls");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.handle.shutdown();
        info!(graph = self.graph.label(), "encoder pipeline torn down");
    }
}

async fn with_timeout<F: Future>(
    limit: Option<Duration>,
    sink: &str,
    pending: F,
) -> EncodeResult<F::Output> {
    let Some(limit) = limit else {
        return Ok(pending.await);
    };
    tokio::time::timeout(limit, pending).await.map_err(|_| {
        warn!(sink, waited = ?limit, "sink pull timed out");
        EncodeError::PipelineStalled {
            sink: sink.to_string(),
            waited: limit,
        }
    })
}
