use std::io::Read;

use crate::codec::{ColorCodec, DepthCodec};
use crate::cursor::SensCursor;
use crate::error::{Result, SensError};

/// Container format version this crate reads and writes.
pub const SUPPORTED_VERSION: u32 = 4;

/// Row-major 4x4 matrix.
pub type Matrix4 = [[f32; 4]; 4];

pub const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Intrinsic and extrinsic matrices for one of the two sensors.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct Calibration {
    pub intrinsic: Matrix4,
    pub extrinsic: Matrix4,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            intrinsic: IDENTITY,
            extrinsic: IDENTITY,
        }
    }
}

/// Options controlling how strictly the container header is validated.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Fail on a version other than [`SUPPORTED_VERSION`]. When false, the
    /// mismatch is logged and parsing carries on.
    pub strict_version: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            strict_version: true,
        }
    }
}

/// The container header, parsed once before any frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct Header {
    pub version: u32,
    pub sensor_name: String,
    pub color_calibration: Calibration,
    pub depth_calibration: Calibration,
    pub color_codec: ColorCodec,
    pub depth_codec: DepthCodec,
    pub color_width: u32,
    pub color_height: u32,
    pub depth_width: u32,
    pub depth_height: u32,
    /// Stored depth units per meter (1000.0 for millimeters).
    pub depth_shift: f32,
    /// Number of frame records following the header.
    pub frame_count: u64,
}

impl Header {
    /// Parse the header from a cursor positioned at the start of the container.
    ///
    /// Layout: version, sensor name, color intrinsic/extrinsic, depth
    /// intrinsic/extrinsic, color codec, depth codec, color width/height,
    /// depth width/height, depth shift, frame count.
    pub fn read<R: Read>(cursor: &mut SensCursor<R>, config: &ReaderConfig) -> Result<Self> {
        let version = cursor.read_u32()?;
        if version != SUPPORTED_VERSION {
            if config.strict_version {
                return Err(SensError::UnsupportedVersion {
                    found: version,
                    expected: SUPPORTED_VERSION,
                });
            }
            log::warn!(
                "Container version {} differs from supported version {}, continuing anyway",
                version,
                SUPPORTED_VERSION
            );
        }

        let sensor_name = cursor.read_text()?;

        let color_calibration = Calibration {
            intrinsic: cursor.read_matrix4()?,
            extrinsic: cursor.read_matrix4()?,
        };
        let depth_calibration = Calibration {
            intrinsic: cursor.read_matrix4()?,
            extrinsic: cursor.read_matrix4()?,
        };

        let color_codec = ColorCodec::from_tag(cursor.read_u32()?)?;
        let depth_codec = DepthCodec::from_tag(cursor.read_u32()?)?;

        let color_width = cursor.read_u32()?;
        let color_height = cursor.read_u32()?;
        let depth_width = cursor.read_u32()?;
        let depth_height = cursor.read_u32()?;
        let depth_shift = cursor.read_f32()?;
        let frame_count = cursor.read_u64()?;

        Ok(Header {
            version,
            sensor_name,
            color_calibration,
            depth_calibration,
            color_codec,
            depth_codec,
            color_width,
            color_height,
            depth_width,
            depth_height,
            depth_shift,
            frame_count,
        })
    }

    /// Serialise the header in wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.sensor_name.len() + 4 * 16 * 4);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.sensor_name.len() as u32).to_le_bytes());
        out.extend_from_slice(self.sensor_name.as_bytes());
        for m in [
            &self.color_calibration.intrinsic,
            &self.color_calibration.extrinsic,
            &self.depth_calibration.intrinsic,
            &self.depth_calibration.extrinsic,
        ] {
            put_matrix4(&mut out, m);
        }
        out.extend_from_slice(&self.color_codec.tag().to_le_bytes());
        out.extend_from_slice(&self.depth_codec.tag().to_le_bytes());
        for v in [
            self.color_width,
            self.color_height,
            self.depth_width,
            self.depth_height,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.depth_shift.to_le_bytes());
        out.extend_from_slice(&self.frame_count.to_le_bytes());
        out
    }

    /// Convert stored depth units to meters.
    pub fn depth_to_meters(&self, units: u16) -> f32 {
        units as f32 / self.depth_shift
    }
}

pub(crate) fn put_matrix4(out: &mut Vec<u8>, m: &Matrix4) {
    for v in m.iter().flatten() {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> Header {
        let mut intrinsic = IDENTITY;
        intrinsic[0][0] = 1170.19;
        intrinsic[1][1] = 1170.19;
        intrinsic[0][2] = 647.75;
        intrinsic[1][2] = 483.75;
        Header {
            version: SUPPORTED_VERSION,
            sensor_name: "StructureSensor".to_string(),
            color_calibration: Calibration {
                intrinsic,
                extrinsic: IDENTITY,
            },
            depth_calibration: Calibration::default(),
            color_codec: ColorCodec::Jpeg,
            depth_codec: DepthCodec::ZlibUshort,
            color_width: 1296,
            color_height: 968,
            depth_width: 640,
            depth_height: 480,
            depth_shift: 1000.0,
            frame_count: 5578,
        }
    }

    #[test]
    fn test_parse_header() {
        let h = sample_header();
        let bytes = h.to_bytes();
        let mut cursor = SensCursor::new(Cursor::new(bytes.clone()));
        let parsed = Header::read(&mut cursor, &ReaderConfig::default()).unwrap();
        assert_eq!(parsed, h);
        assert_eq!(cursor.position(), bytes.len() as u64);
    }

    #[test]
    fn test_calibration_order_on_wire() {
        let h = sample_header();
        let bytes = h.to_bytes();
        // version (4) + name length (4) + name
        let first_matrix = 8 + h.sensor_name.len();
        let fx = f32::from_le_bytes(bytes[first_matrix..first_matrix + 4].try_into().unwrap());
        assert_eq!(fx, 1170.19);
        // color extrinsic follows directly, starting with the identity's 1.0
        let second = first_matrix + 64;
        let v = f32::from_le_bytes(bytes[second..second + 4].try_into().unwrap());
        assert_eq!(v, 1.0);
    }

    #[test]
    fn test_version_mismatch_strict() {
        let mut h = sample_header();
        h.version = 3;
        let mut cursor = SensCursor::new(Cursor::new(h.to_bytes()));
        assert!(matches!(
            Header::read(&mut cursor, &ReaderConfig::default()),
            Err(SensError::UnsupportedVersion { found: 3, expected: 4 })
        ));
        // Nothing past the version field is consumed
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_version_mismatch_lenient() {
        let mut h = sample_header();
        h.version = 5;
        let mut cursor = SensCursor::new(Cursor::new(h.to_bytes()));
        let config = ReaderConfig {
            strict_version: false,
        };
        let parsed = Header::read(&mut cursor, &config).unwrap();
        assert_eq!(parsed.version, 5);
        assert_eq!(parsed.frame_count, 5578);
    }

    #[test]
    fn test_unknown_depth_codec() {
        let h = sample_header();
        let mut bytes = h.to_bytes();
        // trailing fields after the depth tag: dims (16) + shift (4) + count (8)
        let depth_tag_at = bytes.len() - 8 - 4 - 16 - 4;
        bytes[depth_tag_at..depth_tag_at + 4].copy_from_slice(&99u32.to_le_bytes());
        let mut cursor = SensCursor::new(Cursor::new(bytes));
        assert!(matches!(
            Header::read(&mut cursor, &ReaderConfig::default()),
            Err(SensError::UnknownCodec { tag: 99, .. })
        ));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = sample_header().to_bytes();
        let mut cursor = SensCursor::new(Cursor::new(bytes[..bytes.len() - 1].to_vec()));
        assert!(matches!(
            Header::read(&mut cursor, &ReaderConfig::default()),
            Err(SensError::UnexpectedEndOfData { .. })
        ));
    }

    #[test]
    fn test_depth_to_meters() {
        let h = sample_header();
        assert_eq!(h.depth_to_meters(2500), 2.5);
    }
}
