use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::cursor::SensCursor;
use crate::error::Result;
use crate::frame::FrameRecord;
use crate::header::{Header, ReaderConfig};

/// Byte source for a container: a plain `.sens` file, or a gzip-compressed
/// `.sens.gz` that has been inflated into memory.
pub enum SensSource {
    File(BufReader<File>),
    Memory(Cursor<Vec<u8>>),
}

impl Read for SensSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            SensSource::File(r) => r.read(buf),
            SensSource::Memory(r) => r.read(buf),
        }
    }
}

/// Open a `.sens` or `.sens.gz` file and parse its header.
pub fn open_sens(path: &Path) -> Result<SensReader<SensSource>> {
    open_sens_with(path, &ReaderConfig::default())
}

pub fn open_sens_with(path: &Path, config: &ReaderConfig) -> Result<SensReader<SensSource>> {
    let is_gz = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    let file = File::open(path)?;
    let source = if is_gz {
        let mut buf = Vec::new();
        GzDecoder::new(file).read_to_end(&mut buf)?;
        SensSource::Memory(Cursor::new(buf))
    } else {
        SensSource::File(BufReader::new(file))
    };

    SensReader::with_config(source, config)
}

/// Lazy, forward-only reader over a container's frames.
///
/// Frame boundaries are only known by decoding the size fields of every
/// preceding frame, so reaching frame K means reading frames `0..K`. To start
/// over, open the source again.
///
/// Iteration yields at most `frame_count` frames and stops after the first
/// error.
pub struct SensReader<R> {
    header: Header,
    cursor: SensCursor<R>,
    next_index: u64,
    failed: bool,
}

impl<R: Read> SensReader<R> {
    /// Parse the header with strict version checking.
    pub fn new(source: R) -> Result<Self> {
        Self::with_config(source, &ReaderConfig::default())
    }

    pub fn with_config(source: R, config: &ReaderConfig) -> Result<Self> {
        let mut cursor = SensCursor::new(source);
        let header = Header::read(&mut cursor, config)?;
        log::debug!(
            "Parsed header: sensor '{}', {} frames, color {}x{} {}, depth {}x{} {}",
            header.sensor_name,
            header.frame_count,
            header.color_width,
            header.color_height,
            header.color_codec.name(),
            header.depth_width,
            header.depth_height,
            header.depth_codec.name(),
        );
        Ok(Self {
            header,
            cursor,
            next_index: 0,
            failed: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of frames read so far (also the index of the next frame).
    pub fn frames_read(&self) -> u64 {
        self.next_index
    }

    pub fn frames_remaining(&self) -> u64 {
        self.header.frame_count - self.next_index
    }

    /// Absolute byte offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Read the next frame, or `None` once `frame_count` frames have been read.
    pub fn next_frame(&mut self) -> Result<Option<FrameRecord>> {
        if self.failed || self.next_index >= self.header.frame_count {
            return Ok(None);
        }
        match FrameRecord::read(&mut self.cursor, self.next_index) {
            Ok(frame) => {
                self.next_index += 1;
                Ok(Some(frame))
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    /// Read and discard up to `count` frames; returns how many were skipped.
    pub fn skip_frames(&mut self, count: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < count && self.next_frame()?.is_some() {
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Drain anything after the last declared frame and return how many
    /// bytes were left over. A well-formed container returns zero.
    pub fn finish(mut self) -> Result<u64> {
        let remaining = self.frames_remaining();
        if remaining > 0 {
            self.skip_frames(remaining)?;
        }
        let trailing = self.cursor.skip_to_end()?;
        if trailing > 0 {
            log::warn!(
                "{} trailing bytes after the last of {} frames",
                trailing,
                self.header.frame_count
            );
        }
        Ok(trailing)
    }
}

impl<R: Read> Iterator for SensReader<R> {
    type Item = Result<FrameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let remaining = usize::try_from(self.frames_remaining()).unwrap_or(usize::MAX);
        (0, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ColorCodec, DepthCodec};
    use crate::error::SensError;
    use crate::header::{Calibration, IDENTITY, SUPPORTED_VERSION};

    fn header(frame_count: u64) -> Header {
        Header {
            version: SUPPORTED_VERSION,
            sensor_name: "test".to_string(),
            color_calibration: Calibration::default(),
            depth_calibration: Calibration::default(),
            color_codec: ColorCodec::Raw,
            depth_codec: DepthCodec::RawUshort,
            color_width: 1,
            color_height: 1,
            depth_width: 1,
            depth_height: 1,
            depth_shift: 1000.0,
            frame_count,
        }
    }

    fn frame(i: u64) -> FrameRecord {
        FrameRecord {
            index: i,
            file_offset: 0,
            camera_to_world: IDENTITY,
            timestamp_color: i * 10,
            timestamp_depth: i * 10 + 1,
            color_payload: vec![i as u8; 3],
            depth_payload: (i as u16).to_le_bytes().to_vec(),
        }
    }

    fn container(frames: u64) -> Vec<u8> {
        let mut bytes = header(frames).to_bytes();
        for i in 0..frames {
            bytes.extend_from_slice(&frame(i).to_bytes());
        }
        bytes
    }

    #[test]
    fn test_iterates_all_frames_in_order() {
        let bytes = container(3);
        let len = bytes.len() as u64;
        let mut reader = SensReader::new(Cursor::new(bytes)).unwrap();
        let frames: Vec<_> = reader.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(frames.len(), 3);
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(f.index, i as u64);
            assert_eq!(f.timestamp_color, i as u64 * 10);
        }
        assert_eq!(reader.position(), len);
        assert_eq!(reader.finish().unwrap(), 0);
    }

    #[test]
    fn test_frame_offsets_are_absolute() {
        let bytes = container(2);
        let header_len = header(2).to_bytes().len() as u64;
        let mut reader = SensReader::new(Cursor::new(bytes)).unwrap();
        let f0 = reader.next_frame().unwrap().unwrap();
        let f1 = reader.next_frame().unwrap().unwrap();
        assert_eq!(f0.file_offset, header_len);
        assert_eq!(f1.file_offset, header_len + frame(0).to_bytes().len() as u64);
    }

    #[test]
    fn test_skip_frames() {
        let mut reader = SensReader::new(Cursor::new(container(5))).unwrap();
        assert_eq!(reader.skip_frames(3).unwrap(), 3);
        let f = reader.next_frame().unwrap().unwrap();
        assert_eq!(f.index, 3);
        assert_eq!(reader.skip_frames(10).unwrap(), 1);
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_truncated_last_frame() {
        let mut bytes = container(2);
        bytes.pop();
        let mut reader = SensReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.next_frame().unwrap().is_some());
        assert!(matches!(
            reader.next_frame(),
            Err(SensError::UnexpectedEndOfData { .. })
        ));
        // Fused after the failure
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_missing_frames_fail_explicitly() {
        let mut bytes = header(3).to_bytes();
        bytes.extend_from_slice(&frame(0).to_bytes());
        let results: Vec<_> = SensReader::new(Cursor::new(bytes)).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SensError::UnexpectedEndOfData { .. })));
    }

    #[test]
    fn test_trailing_bytes_reported() {
        let mut bytes = container(1);
        bytes.extend_from_slice(&[0u8; 5]);
        let reader = SensReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.finish().unwrap(), 5);
    }

    #[test]
    fn test_unknown_codec_before_frames() {
        let mut bytes = container(1);
        let color_tag_at = header(1).to_bytes().len() - 8 - 4 - 16 - 4 - 4;
        bytes[color_tag_at..color_tag_at + 4].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            SensReader::new(Cursor::new(bytes)),
            Err(SensError::UnknownCodec { tag: 99, .. })
        ));
    }

    #[test]
    fn test_open_gzipped_file() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scene.sens.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(&container(2)).unwrap();
        enc.finish().unwrap();

        let reader = open_sens(&path).unwrap();
        assert_eq!(reader.header().frame_count, 2);
        assert_eq!(reader.count(), 2);
    }
}
