use std::fmt;

use crate::error::{Result, SensError};

/// Which of the two codec tag spaces a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Color,
    Depth,
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CodecKind::Color => "color",
            CodecKind::Depth => "depth",
        })
    }
}

/// Compression applied to each frame's color payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColorCodec {
    /// Packed 8-bit RGB, row-major.
    Raw,
    Png,
    Jpeg,
}

impl ColorCodec {
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0 => Ok(ColorCodec::Raw),
            1 => Ok(ColorCodec::Png),
            2 => Ok(ColorCodec::Jpeg),
            _ => Err(SensError::UnknownCodec {
                kind: CodecKind::Color,
                tag,
            }),
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            ColorCodec::Raw => 0,
            ColorCodec::Png => 1,
            ColorCodec::Jpeg => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorCodec::Raw => "raw",
            ColorCodec::Png => "png",
            ColorCodec::Jpeg => "jpeg",
        }
    }
}

/// Compression applied to each frame's depth payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepthCodec {
    /// Little-endian `u16` depth units, row-major.
    RawUshort,
    /// zlib-deflated `u16` depth units.
    ZlibUshort,
    /// Occlusion frames: no depth is stored, decodes to all zeros.
    OcclusionMask,
    /// zlib-deflated `f32` depth in meters.
    ZlibFloat,
}

impl DepthCodec {
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0 => Ok(DepthCodec::RawUshort),
            1 => Ok(DepthCodec::ZlibUshort),
            2 => Ok(DepthCodec::OcclusionMask),
            3 => Ok(DepthCodec::ZlibFloat),
            _ => Err(SensError::UnknownCodec {
                kind: CodecKind::Depth,
                tag,
            }),
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            DepthCodec::RawUshort => 0,
            DepthCodec::ZlibUshort => 1,
            DepthCodec::OcclusionMask => 2,
            DepthCodec::ZlibFloat => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DepthCodec::RawUshort => "raw_ushort",
            DepthCodec::ZlibUshort => "zlib_ushort",
            DepthCodec::OcclusionMask => "occlusion_mask",
            DepthCodec::ZlibFloat => "zlib_float",
        }
    }
}
