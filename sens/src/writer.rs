use std::io::Write;

use crate::error::{Result, SensError};
use crate::frame::FrameRecord;
use crate::header::Header;

/// Writes a container: the header up front, then frames in capture order.
///
/// Payloads are written as given; compressing them to match the header's
/// codecs is the caller's job.
pub struct SensWriter<W: Write> {
    inner: W,
    declared: u64,
    written: u64,
}

impl<W: Write> SensWriter<W> {
    pub fn new(mut inner: W, header: &Header) -> Result<Self> {
        inner.write_all(&header.to_bytes())?;
        Ok(Self {
            inner,
            declared: header.frame_count,
            written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &FrameRecord) -> Result<()> {
        if self.written >= self.declared {
            return Err(SensError::FrameCountMismatch {
                declared: self.declared,
                written: self.written + 1,
            });
        }
        self.inner.write_all(&frame.to_bytes())?;
        self.written += 1;
        Ok(())
    }

    /// Flush and return the underlying writer. Fails if fewer frames were
    /// written than the header declared.
    pub fn finish(mut self) -> Result<W> {
        if self.written != self.declared {
            return Err(SensError::FrameCountMismatch {
                declared: self.declared,
                written: self.written,
            });
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}
