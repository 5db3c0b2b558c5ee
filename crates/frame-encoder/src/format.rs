//! Pixel formats handed over by the compositor and the colour formats the
//! media backend expects for them.

use std::fmt;
use std::str::FromStr;

use crate::error::{EncodeError, EncodeResult};

/// Both supported formats are 32 bits per pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// `wl_shm` format codes accepted from the render path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ShmFormat {
    /// Alpha-first 32-bit ARGB, premultiplied.
    Argb8888 = 0,
    /// 32-bit RGB with an unused padding byte.
    Xrgb8888 = 1,
}

impl ShmFormat {
    pub fn from_code(code: u32) -> EncodeResult<Self> {
        match code {
            0 => Ok(Self::Argb8888),
            1 => Ok(Self::Xrgb8888),
            other => Err(EncodeError::UnsupportedFormat(other)),
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn native(self) -> NativeFormat {
        match self {
            Self::Argb8888 => NativeFormat::Bgra,
            Self::Xrgb8888 => NativeFormat::Bgrx,
        }
    }
}

impl TryFrom<u32> for ShmFormat {
    type Error = EncodeError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

/// Colour format names as they appear in backend caps. wl_shm formats are
/// little-endian words, so ARGB lands in memory as B,G,R,A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeFormat {
    Bgra,
    Bgrx,
}

impl NativeFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bgra => "BGRA",
            Self::Bgrx => "BGRx",
        }
    }

    /// Whether the fourth byte of each pixel carries coverage.
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Bgra)
    }
}

impl fmt::Display for NativeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NativeFormat {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BGRA" => Ok(Self::Bgra),
            "BGRx" => Ok(Self::Bgrx),
            _ => Err(EncodeError::Malformed("unknown caps format")),
        }
    }
}

/// Looks up the backend colour format for a raw wl_shm code.
pub fn native_format(code: u32) -> EncodeResult<NativeFormat> {
    ShmFormat::from_code(code).map(ShmFormat::native)
}
