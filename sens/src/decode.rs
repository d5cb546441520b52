//! Payload decoding for the color and depth codecs.
//!
//! Failures are returned as a human-readable reason; [`crate::frame::FrameRecord`]
//! attaches the frame index and channel.

use std::io::Read;

use flate2::read::ZlibDecoder;
use image::{ImageBuffer, ImageFormat, Luma, RgbImage};

use crate::codec::{ColorCodec, DepthCodec};

/// Single-channel image of raw depth units (divide by depth shift for meters).
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

type DecodeResult<T> = std::result::Result<T, String>;

/// Largest decoded buffer a single frame may ask for. Dimensions come from
/// the header, so anything past this is treated as a corrupt frame rather
/// than allocated.
pub const MAX_DECODED_BYTES: usize = 1 << 30;

/// Byte length of a `width` x `height` buffer with `bytes_per_pixel`, or an
/// error if it overflows or exceeds [`MAX_DECODED_BYTES`].
fn buffer_len(width: u32, height: u32, bytes_per_pixel: usize) -> DecodeResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|p| p.checked_mul(bytes_per_pixel))
        .filter(|&len| len <= MAX_DECODED_BYTES)
        .ok_or_else(|| {
            format!(
                "{}x{} image at {} bytes per pixel exceeds the {} byte decode limit",
                width, height, bytes_per_pixel, MAX_DECODED_BYTES
            )
        })
}

pub fn decode_color(
    codec: ColorCodec,
    width: u32,
    height: u32,
    payload: &[u8],
) -> DecodeResult<RgbImage> {
    let image = match codec {
        ColorCodec::Raw => {
            let expected = buffer_len(width, height, 3)?;
            if payload.len() != expected {
                return Err(format!(
                    "raw RGB payload is {} bytes, expected {} for {}x{}",
                    payload.len(),
                    expected,
                    width,
                    height
                ));
            }
            RgbImage::from_raw(width, height, payload.to_vec())
                .ok_or_else(|| format!("cannot build {}x{} RGB image", width, height))?
        }
        ColorCodec::Png => load_compressed(payload, ImageFormat::Png)?,
        ColorCodec::Jpeg => load_compressed(payload, ImageFormat::Jpeg)?,
    };

    if image.dimensions() != (width, height) {
        return Err(format!(
            "decoded {}x{} image, header declares {}x{}",
            image.width(),
            image.height(),
            width,
            height
        ));
    }
    Ok(image)
}

fn load_compressed(payload: &[u8], format: ImageFormat) -> DecodeResult<RgbImage> {
    image::load_from_memory_with_format(payload, format)
        .map(|img| img.to_rgb8())
        .map_err(|e| format!("{:?} decode failed: {}", format, e))
}

pub fn decode_depth(
    codec: DepthCodec,
    width: u32,
    height: u32,
    depth_shift: f32,
    payload: &[u8],
) -> DecodeResult<DepthImage> {
    let units = match codec {
        DepthCodec::RawUshort => ushorts(payload, buffer_len(width, height, 2)?)?,
        DepthCodec::ZlibUshort => {
            let expected = buffer_len(width, height, 2)?;
            ushorts(&inflate(payload, expected)?, expected)?
        }
        DepthCodec::ZlibFloat => {
            let expected = buffer_len(width, height, 4)?;
            let raw = inflate(payload, expected)?;
            if raw.len() != expected {
                return Err(format!(
                    "inflated float depth is {} bytes, expected {}",
                    raw.len(),
                    expected
                ));
            }
            raw.chunks_exact(4)
                .map(|c| meters_to_units(f32::from_le_bytes([c[0], c[1], c[2], c[3]]), depth_shift))
                .collect()
        }
        DepthCodec::OcclusionMask => {
            let pixels = buffer_len(width, height, 2)? / 2;
            let mut units = Vec::new();
            units
                .try_reserve_exact(pixels)
                .map_err(|e| format!("cannot allocate {}x{} depth image: {}", width, height, e))?;
            units.resize(pixels, 0u16);
            units
        }
    };

    DepthImage::from_raw(width, height, units)
        .ok_or_else(|| format!("cannot build {}x{} depth image", width, height))
}

/// Convert a metric depth to stored units, rounding to nearest and clamping
/// to the `u16` range. NaN maps to 0 (no depth).
pub fn meters_to_units(meters: f32, depth_shift: f32) -> u16 {
    let v = (meters * depth_shift).round();
    if v.is_nan() {
        0
    } else {
        v.clamp(0.0, u16::MAX as f32) as u16
    }
}

/// Up-front capacity for inflated output; larger streams grow as they decode.
const MAX_INFLATE_PREALLOC: usize = 16 * 1024 * 1024;

/// Inflate a zlib stream, reading at most one byte past `expected` so an
/// oversized stream is detected without inflating all of it.
fn inflate(payload: &[u8], expected: usize) -> DecodeResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected.min(MAX_INFLATE_PREALLOC));
    ZlibDecoder::new(payload)
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| format!("inflate failed: {}", e))?;
    Ok(out)
}

fn ushorts(bytes: &[u8], expected: usize) -> DecodeResult<Vec<u16>> {
    if bytes.len() != expected {
        return Err(format!(
            "depth buffer is {} bytes, expected {}",
            bytes.len(),
            expected
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::{Cursor, Write};

    fn zlib(bytes: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8 * 10, y as u8 * 20, 128]))
    }

    #[test]
    fn test_raw_color() {
        let img = gradient(4, 3);
        let decoded = decode_color(ColorCodec::Raw, 4, 3, img.as_raw()).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_raw_color_wrong_length() {
        let err = decode_color(ColorCodec::Raw, 4, 3, &[0u8; 35]).unwrap_err();
        assert!(err.contains("expected 36"), "{}", err);
    }

    #[test]
    fn test_png_color() {
        let img = gradient(5, 2);
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();
        assert_eq!(decode_color(ColorCodec::Png, 5, 2, &png).unwrap(), img);
    }

    #[test]
    fn test_png_dimension_mismatch() {
        let mut png = Vec::new();
        gradient(5, 2)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        assert!(decode_color(ColorCodec::Png, 4, 2, &png).is_err());
    }

    #[test]
    fn test_corrupt_jpeg() {
        let garbage: Vec<u8> = (0..200u32).map(|i| (i * 37 % 251) as u8).collect();
        assert!(decode_color(ColorCodec::Jpeg, 8, 8, &garbage).is_err());
    }

    #[test]
    fn test_raw_ushort_depth() {
        let values: Vec<u16> = vec![0, 1, 1000, 65535, 2500, 42];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let img = decode_depth(DepthCodec::RawUshort, 3, 2, 1000.0, &bytes).unwrap();
        assert_eq!(img.as_raw(), &values);
        assert_eq!(img.get_pixel(2, 0).0[0], 1000);
    }

    #[test]
    fn test_zlib_ushort_depth() {
        let values: Vec<u16> = (0..12).map(|i| i * 100).collect();
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let img = decode_depth(DepthCodec::ZlibUshort, 4, 3, 1000.0, &zlib(&bytes)).unwrap();
        assert_eq!(img.as_raw(), &values);
    }

    #[test]
    fn test_zlib_float_depth() {
        let bytes: Vec<u8> = std::iter::repeat(2.5f32)
            .take(6)
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let img = decode_depth(DepthCodec::ZlibFloat, 3, 2, 1000.0, &zlib(&bytes)).unwrap();
        assert!(img.pixels().all(|p| p.0[0] == 2500));
    }

    #[test]
    fn test_meters_to_units_clamps() {
        assert_eq!(meters_to_units(-1.0, 1000.0), 0);
        assert_eq!(meters_to_units(100.0, 1000.0), 65535);
        assert_eq!(meters_to_units(f32::NAN, 1000.0), 0);
        assert_eq!(meters_to_units(1.2346, 1000.0), 1235);
    }

    #[test]
    fn test_occlusion_mask_is_zero() {
        let img = decode_depth(DepthCodec::OcclusionMask, 6, 4, 1000.0, &[1, 2, 3]).unwrap();
        assert_eq!(img.dimensions(), (6, 4));
        assert!(img.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_bad_zlib_stream() {
        let err = decode_depth(DepthCodec::ZlibUshort, 2, 2, 1000.0, &[0xde, 0xad, 0xbe, 0xef])
            .unwrap_err();
        assert!(err.starts_with("inflate failed"), "{}", err);
    }

    #[test]
    fn test_depth_dimensions_overflow() {
        let err = decode_depth(DepthCodec::ZlibUshort, u32::MAX, u32::MAX, 1000.0, &zlib(&[0; 8]))
            .unwrap_err();
        assert!(err.contains("decode limit"), "{}", err);
        assert!(decode_depth(DepthCodec::ZlibFloat, u32::MAX, u32::MAX, 1000.0, &[]).is_err());
        assert!(decode_depth(DepthCodec::RawUshort, u32::MAX, 2, 1000.0, &[]).is_err());
    }

    #[test]
    fn test_occlusion_mask_too_large() {
        let err = decode_depth(DepthCodec::OcclusionMask, 200_000, 200_000, 1000.0, &[])
            .unwrap_err();
        assert!(err.contains("decode limit"), "{}", err);
    }

    #[test]
    fn test_raw_color_too_large() {
        let err = decode_color(ColorCodec::Raw, u32::MAX, u32::MAX, &[0; 3]).unwrap_err();
        assert!(err.contains("decode limit"), "{}", err);
    }

    #[test]
    fn test_zlib_ushort_oversized() {
        let bytes = vec![0u8; 100];
        assert!(decode_depth(DepthCodec::ZlibUshort, 2, 2, 1000.0, &zlib(&bytes)).is_err());
    }
}
