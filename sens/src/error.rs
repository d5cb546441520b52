use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecKind;

#[derive(Error, Debug)]
pub enum SensError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of data at offset 0x{offset:X}: wanted {wanted} more bytes")]
    UnexpectedEndOfData { offset: u64, wanted: u64 },

    #[error("text field at offset 0x{offset:X} is not valid UTF-8")]
    InvalidText { offset: u64 },

    #[error("unsupported container version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("unknown {kind} codec tag {tag}")]
    UnknownCodec { kind: CodecKind, tag: u32 },

    #[error("frame {frame}: corrupt color payload: {reason}")]
    CorruptColorPayload { frame: u64, reason: String },

    #[error("frame {frame}: corrupt depth payload: {reason}")]
    CorruptDepthPayload { frame: u64, reason: String },

    #[error("frame {frame}: payload of {size} bytes cannot be held in memory")]
    PayloadTooLarge { frame: u64, size: u64 },

    #[error("writing {}: {source}", .path.display())]
    IoFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("encoding image {}: {source}", .path.display())]
    ImageWrite {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("header declares {declared} frames but {written} were written")]
    FrameCountMismatch { declared: u64, written: u64 },

    #[error("invalid export configuration: {0}")]
    InvalidConfig(String),
}

impl SensError {
    /// Errors scoped to a single frame or output file; an export run records
    /// these and carries on with the next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SensError::CorruptColorPayload { .. }
                | SensError::CorruptDepthPayload { .. }
                | SensError::IoFailure { .. }
                | SensError::ImageWrite { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SensError>;
