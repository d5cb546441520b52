use std::io::{ErrorKind, Read};

use crate::error::{Result, SensError};
use crate::header::Matrix4;

/// Upper bound on the up-front allocation for a length-prefixed payload.
/// Larger payloads grow as bytes actually arrive, so a corrupt size field
/// cannot force a huge allocation before the truncation is noticed.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Forward-only little-endian reader that tracks its absolute byte offset.
///
/// Every read either fills the requested width completely or fails with
/// [`SensError::UnexpectedEndOfData`]; short reads are never handed back.
#[derive(Debug)]
pub struct SensCursor<R> {
    inner: R,
    position: u64,
}

macro_rules! read_le {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Read a little-endian `", stringify!($ty), "`.")]
            pub fn $name(&mut self) -> Result<$ty> {
                Ok(<$ty>::from_le_bytes(self.read_array()?))
            }
        )*
    };
}

impl<R: Read> SensCursor<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Absolute offset of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fill `buf` completely from the source.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let offset = self.position;
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(SensError::UnexpectedEndOfData {
                offset,
                wanted: buf.len() as u64,
            }),
            Err(e) => Err(SensError::Io(e)),
        }
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Read exactly `len` bytes into a fresh buffer.
    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        let offset = self.position;
        let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC) as usize);
        let got = self.inner.by_ref().take(len).read_to_end(&mut buf)? as u64;
        self.position += got;
        if got < len {
            return Err(SensError::UnexpectedEndOfData {
                offset,
                wanted: len,
            });
        }
        Ok(buf)
    }

    /// Drain the rest of the source, returning how many bytes were left.
    pub fn skip_to_end(&mut self) -> Result<u64> {
        let skipped = std::io::copy(&mut self.inner, &mut std::io::sink())?;
        self.position += skipped;
        Ok(skipped)
    }

    read_le! {
        read_u8 => u8,
        read_u16 => u16,
        read_u32 => u32,
        read_u64 => u64,
        read_i8 => i8,
        read_i16 => i16,
        read_i32 => i32,
        read_i64 => i64,
        read_f32 => f32,
    }

    /// Read a text field: a `u32` byte length followed by that many bytes of UTF-8.
    pub fn read_text(&mut self) -> Result<String> {
        let len = self.read_u32()?;
        let offset = self.position;
        let bytes = self.read_bytes(len as u64)?;
        String::from_utf8(bytes).map_err(|_| SensError::InvalidText { offset })
    }

    pub fn read_f32_array<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0f32; N];
        for v in out.iter_mut() {
            *v = self.read_f32()?;
        }
        Ok(out)
    }

    /// Read sixteen `f32` values as a row-major 4x4 matrix.
    pub fn read_matrix4(&mut self) -> Result<Matrix4> {
        let flat: [f32; 16] = self.read_f32_array()?;
        let mut m = [[0f32; 4]; 4];
        for (row, chunk) in m.iter_mut().zip(flat.chunks_exact(4)) {
            row.copy_from_slice(chunk);
        }
        Ok(m)
    }
}
