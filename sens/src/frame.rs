use std::io::Read;

use image::RgbImage;

use crate::cursor::SensCursor;
use crate::decode::{self, DepthImage};
use crate::error::{Result, SensError};
use crate::header::{Header, Matrix4, put_matrix4};

/// One captured instant: a pose, two timestamps and the still-compressed
/// color and depth payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    /// Zero-based position of this frame in the container.
    pub index: u64,
    /// Absolute byte offset of the frame record in the source.
    pub file_offset: u64,
    pub camera_to_world: Matrix4,
    pub timestamp_color: u64,
    pub timestamp_depth: u64,
    pub color_payload: Vec<u8>,
    pub depth_payload: Vec<u8>,
}

/// Frame metadata without the payloads, for listings and JSON output.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct FrameInfo {
    pub index: u64,
    pub file_offset: u64,
    pub camera_to_world: Matrix4,
    pub timestamp_color: u64,
    pub timestamp_depth: u64,
    pub color_size: u64,
    pub depth_size: u64,
}

impl FrameRecord {
    /// Read the frame starting at the cursor's current position.
    pub fn read<R: Read>(cursor: &mut SensCursor<R>, index: u64) -> Result<Self> {
        let file_offset = cursor.position();

        let camera_to_world = cursor.read_matrix4()?;
        let timestamp_color = cursor.read_u64()?;
        let timestamp_depth = cursor.read_u64()?;
        let color_size = cursor.read_u64()?;
        let depth_size = cursor.read_u64()?;

        for size in [color_size, depth_size] {
            if usize::try_from(size).is_err() {
                return Err(SensError::PayloadTooLarge { frame: index, size });
            }
        }

        let color_payload = cursor.read_bytes(color_size)?;
        let depth_payload = cursor.read_bytes(depth_size)?;

        Ok(FrameRecord {
            index,
            file_offset,
            camera_to_world,
            timestamp_color,
            timestamp_depth,
            color_payload,
            depth_payload,
        })
    }

    /// Serialise the frame in wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(96 + self.color_payload.len() + self.depth_payload.len());
        put_matrix4(&mut out, &self.camera_to_world);
        out.extend_from_slice(&self.timestamp_color.to_le_bytes());
        out.extend_from_slice(&self.timestamp_depth.to_le_bytes());
        out.extend_from_slice(&(self.color_payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.depth_payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.color_payload);
        out.extend_from_slice(&self.depth_payload);
        out
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            index: self.index,
            file_offset: self.file_offset,
            camera_to_world: self.camera_to_world,
            timestamp_color: self.timestamp_color,
            timestamp_depth: self.timestamp_depth,
            color_size: self.color_payload.len() as u64,
            depth_size: self.depth_payload.len() as u64,
        }
    }

    /// Decode the color payload using the header's codec and dimensions.
    pub fn decode_color(&self, header: &Header) -> Result<RgbImage> {
        decode::decode_color(
            header.color_codec,
            header.color_width,
            header.color_height,
            &self.color_payload,
        )
        .map_err(|reason| SensError::CorruptColorPayload {
            frame: self.index,
            reason,
        })
    }

    /// Decode the depth payload to a single-channel image of depth units.
    pub fn decode_depth(&self, header: &Header) -> Result<DepthImage> {
        decode::decode_depth(
            header.depth_codec,
            header.depth_width,
            header.depth_height,
            header.depth_shift,
            &self.depth_payload,
        )
        .map_err(|reason| SensError::CorruptDepthPayload {
            frame: self.index,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::IDENTITY;
    use std::io::Cursor;

    fn sample_frame() -> FrameRecord {
        let mut pose = IDENTITY;
        pose[0][3] = 1.5;
        pose[1][3] = -0.25;
        pose[2][3] = 3.0;
        FrameRecord {
            index: 0,
            file_offset: 0,
            camera_to_world: pose,
            timestamp_color: 33_366,
            timestamp_depth: 33_370,
            color_payload: vec![1, 2, 3, 4, 5],
            depth_payload: vec![9, 8, 7],
        }
    }

    #[test]
    fn test_parse_frame() {
        let f = sample_frame();
        let bytes = f.to_bytes();
        assert_eq!(bytes.len(), 64 + 32 + 5 + 3);
        let mut cursor = SensCursor::new(Cursor::new(bytes));
        let parsed = FrameRecord::read(&mut cursor, 0).unwrap();
        assert_eq!(parsed, f);
        assert_eq!(cursor.position(), 104);
    }

    #[test]
    fn test_sizes_precede_both_payloads() {
        let bytes = sample_frame().to_bytes();
        let color_size = u64::from_le_bytes(bytes[80..88].try_into().unwrap());
        let depth_size = u64::from_le_bytes(bytes[88..96].try_into().unwrap());
        assert_eq!((color_size, depth_size), (5, 3));
        assert_eq!(&bytes[96..101], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_truncated_depth_payload() {
        let bytes = sample_frame().to_bytes();
        let mut cursor = SensCursor::new(Cursor::new(bytes[..bytes.len() - 1].to_vec()));
        match FrameRecord::read(&mut cursor, 0) {
            Err(SensError::UnexpectedEndOfData { offset, wanted }) => {
                assert_eq!(offset, 101);
                assert_eq!(wanted, 3);
            }
            other => panic!("expected UnexpectedEndOfData, got {:?}", other),
        }
    }

    #[test]
    fn test_info_reports_sizes() {
        let info = sample_frame().info();
        assert_eq!(info.color_size, 5);
        assert_eq!(info.depth_size, 3);
        assert_eq!(info.timestamp_depth, 33_370);
    }
}
