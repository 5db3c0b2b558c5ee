//! Completion barrier for the two sinks of the split-alpha pipeline.
//!
//! Each sink's pull callback feeds one tagged message into a channel. The
//! barrier resolves once both slots are filled, whichever arrives first.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::backend::PullCallback;
use crate::error::{EncodeError, EncodeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Opaque,
    Alpha,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opaque => "opaque",
            Self::Alpha => "alpha",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPayload {
    pub opaque: Bytes,
    pub alpha: Bytes,
}

pub struct SplitJoin {
    tx: mpsc::UnboundedSender<(Channel, Option<Bytes>)>,
    rx: mpsc::UnboundedReceiver<(Channel, Option<Bytes>)>,
}

impl SplitJoin {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Callback to hand to the backend pull for `channel`.
    pub fn callback(&self, channel: Channel) -> PullCallback {
        let tx = self.tx.clone();
        Box::new(move |payload| {
            let _ = tx.send((channel, payload));
        })
    }

    /// Waits for both channels. An empty or absent payload on either channel
    /// fails the join immediately.
    pub async fn wait(self) -> EncodeResult<SplitPayload> {
        let Self { tx, mut rx } = self;
        // Only the handed-out callbacks keep the channel open from here on.
        drop(tx);

        let mut opaque = None;
        let mut alpha = None;
        while opaque.is_none() || alpha.is_none() {
            let Some((channel, payload)) = rx.recv().await else {
                return Err(EncodeError::fault(
                    missing(opaque.is_none()),
                    "pull callback dropped without a buffer",
                ));
            };
            let payload = match payload {
                Some(bytes) if !bytes.is_empty() => bytes,
                _ => {
                    return Err(EncodeError::fault(
                        channel.as_str(),
                        "pulled empty buffer from sink",
                    ))
                }
            };
            match channel {
                Channel::Opaque => opaque = Some(payload),
                Channel::Alpha => alpha = Some(payload),
            }
        }

        match (opaque, alpha) {
            (Some(opaque), Some(alpha)) => Ok(SplitPayload { opaque, alpha }),
            _ => Err(EncodeError::fault("join", "barrier released early")),
        }
    }
}

impl Default for SplitJoin {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(opaque_missing: bool) -> &'static str {
    if opaque_missing {
        Channel::Opaque.as_str()
    } else {
        Channel::Alpha.as_str()
    }
}
