//! Remote frame encoding for streamed compositor surfaces.
//!
//! Raw 32-bit surface buffers go in, transport-ready [`EncodedFrame`]s come
//! out. Two strategies sit behind [`FrameEncoder`]: a lossless PNG pipeline
//! and an H.264 pipeline that ships alpha as a second greyscale stream. Both
//! drive an external media pipeline through [`backend::MediaBackend`].

pub mod backend;
pub mod caps;
pub mod config;
pub mod encoder;
pub mod error;
pub mod format;
pub mod frame;
pub mod join;
pub mod metrics;
pub mod options;
pub mod pipeline;
pub mod reconfigure;

pub use backend::{InMemoryBackend, MediaBackend};
pub use config::{EncoderConfig, X264Settings};
pub use encoder::{AnyEncoder, EncoderKind, FrameEncoder, H264AlphaEncoder, PngEncoder};
pub use error::{EncodeError, EncodeResult};
pub use format::{NativeFormat, ShmFormat};
pub use frame::{CodecType, EncodedFrame, EncodedFrameFragment};
pub use options::{EncodingFlags, EncodingOptions};

#[cfg(feature = "gstreamer")]
pub use backend::GstBackend;
