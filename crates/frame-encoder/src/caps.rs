//! Typed caps values and their string form on the backend control plane.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{EncodeError, EncodeResult};
use crate::format::NativeFormat;

const RAW_VIDEO: &str = "video/x-raw";

/// Smallest image the PNG encoder accepts without resampling it.
pub const MIN_PNG_DIMENSION: u32 = 16;

/// Caps accepted by the pipeline source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoCaps {
    pub format: NativeFormat,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl fmt::Display for VideoCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{RAW_VIDEO},format={},width={},height={},framerate={}/1",
            self.format, self.width, self.height, self.framerate
        )
    }
}

impl FromStr for VideoCaps {
    type Err = EncodeError;

    fn from_str(s: &str) -> EncodeResult<Self> {
        let fields = raw_video_fields(s)?;
        let framerate = field(&fields, "framerate")?;
        let framerate = framerate
            .strip_suffix("/1")
            .ok_or(EncodeError::Malformed("framerate must be n/1"))?;
        Ok(Self {
            format: field(&fields, "format")?.parse()?,
            width: parse_u32(field(&fields, "width")?)?,
            height: parse_u32(field(&fields, "height")?)?,
            framerate: parse_u32(framerate)?,
        })
    }
}

/// Output size of the even-rounding scale stage. 4:2:0 subsampling needs
/// both dimensions to be even.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleCaps {
    pub width: u32,
    pub height: u32,
}

impl ScaleCaps {
    pub fn even(width: u32, height: u32) -> Self {
        Self {
            width: round_up_even(width),
            height: round_up_even(height),
        }
    }
}

impl fmt::Display for ScaleCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{RAW_VIDEO},width={},height={}", self.width, self.height)
    }
}

impl FromStr for ScaleCaps {
    type Err = EncodeError;

    fn from_str(s: &str) -> EncodeResult<Self> {
        let fields = raw_video_fields(s)?;
        Ok(Self {
            width: parse_u32(field(&fields, "width")?)?,
            height: parse_u32(field(&fields, "height")?)?,
        })
    }
}

pub fn round_up_even(value: u32) -> u32 {
    value.saturating_add(value % 2)
}

/// Transparent border added on the right and bottom edges so small images
/// reach [`MIN_PNG_DIMENSION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub right: u32,
    pub bottom: u32,
}

impl Padding {
    pub fn for_size(width: u32, height: u32) -> Self {
        Self {
            right: MIN_PNG_DIMENSION.saturating_sub(width),
            bottom: MIN_PNG_DIMENSION.saturating_sub(height),
        }
    }

    pub fn is_none(&self) -> bool {
        self.right == 0 && self.bottom == 0
    }

    pub fn padded_size(&self, width: u32, height: u32) -> (u32, u32) {
        (width + self.right, height + self.bottom)
    }

    /// Box offsets grow the image when negative.
    pub fn box_right(&self) -> String {
        box_offset(self.right)
    }

    pub fn box_bottom(&self) -> String {
        box_offset(self.bottom)
    }
}

fn box_offset(border: u32) -> String {
    if border == 0 {
        "0".to_string()
    } else {
        format!("-{border}")
    }
}

/// Inverse of [`Padding::box_right`] and [`Padding::box_bottom`].
pub fn parse_box_offset(value: &str) -> EncodeResult<u32> {
    let offset: i64 = value
        .trim()
        .parse()
        .map_err(|_| EncodeError::Malformed("box offset is not an integer"))?;
    if offset > 0 {
        return Err(EncodeError::Malformed("box offset crops instead of padding"));
    }
    u32::try_from(-offset).map_err(|_| EncodeError::Malformed("box offset out of range"))
}

fn raw_video_fields(s: &str) -> EncodeResult<HashMap<&str, &str>> {
    let mut parts = s.split(',');
    if parts.next().map(str::trim) != Some(RAW_VIDEO) {
        return Err(EncodeError::Malformed("caps are not video/x-raw"));
    }
    parts
        .map(|part| {
            part.trim()
                .split_once('=')
                .ok_or(EncodeError::Malformed("caps field without value"))
        })
        .collect()
}

fn field<'a>(fields: &HashMap<&str, &'a str>, name: &'static str) -> EncodeResult<&'a str> {
    fields
        .get(name)
        .copied()
        .ok_or(EncodeError::Malformed("caps field missing"))
}

fn parse_u32(value: &str) -> EncodeResult<u32> {
    value
        .parse()
        .map_err(|_| EncodeError::Malformed("caps field is not an integer"))
}
