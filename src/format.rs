//! Pixel formats and the caller-side conversion to and from the canonical
//! RGBA float layout used by the compositor.

use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};

/// Storage type of a single channel sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    U8,
    U16,
    F32,
}

impl SampleType {
    pub fn bytes(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
            SampleType::F32 => 4,
        }
    }
}

/// Packed pixel layouts a tile manager can store.  Samples are native-endian
/// and channels are interleaved, alpha last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    Y8,
    YA8,
    Rgb8,
    #[default]
    Rgba8,
    Y16,
    YA16,
    Rgba16,
    YF32,
    RgbaF32,
}

impl PixelFormat {
    pub fn all() -> &'static [PixelFormat] {
        &[
            PixelFormat::Y8,
            PixelFormat::YA8,
            PixelFormat::Rgb8,
            PixelFormat::Rgba8,
            PixelFormat::Y16,
            PixelFormat::YA16,
            PixelFormat::Rgba16,
            PixelFormat::YF32,
            PixelFormat::RgbaF32,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Y8 => "Y u8",
            PixelFormat::YA8 => "YA u8",
            PixelFormat::Rgb8 => "RGB u8",
            PixelFormat::Rgba8 => "RGBA u8",
            PixelFormat::Y16 => "Y u16",
            PixelFormat::YA16 => "YA u16",
            PixelFormat::Rgba16 => "RGBA u16",
            PixelFormat::YF32 => "Y float",
            PixelFormat::RgbaF32 => "RGBA float",
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Y8 | PixelFormat::Y16 | PixelFormat::YF32 => 1,
            PixelFormat::YA8 | PixelFormat::YA16 => 2,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Rgba16 | PixelFormat::RgbaF32 => 4,
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            PixelFormat::Y8 | PixelFormat::YA8 | PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
                SampleType::U8
            }
            PixelFormat::Y16 | PixelFormat::YA16 | PixelFormat::Rgba16 => SampleType::U16,
            PixelFormat::YF32 | PixelFormat::RgbaF32 => SampleType::F32,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(
            self,
            PixelFormat::YA8
                | PixelFormat::Rgba8
                | PixelFormat::YA16
                | PixelFormat::Rgba16
                | PixelFormat::RgbaF32
        )
    }

    fn is_gray(&self) -> bool {
        self.channels() <= 2
    }

    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        self.channels() * self.sample_type().bytes()
    }

    /// Read the `i`-th sample of `row` as a float, integers normalised to [0, 1].
    #[inline]
    fn read_sample(&self, row: &[u8], i: usize) -> f32 {
        match self.sample_type() {
            SampleType::U8 => row[i] as f32 / 255.0,
            SampleType::U16 => {
                bytemuck::pod_read_unaligned::<u16>(&row[i * 2..i * 2 + 2]) as f32 / 65535.0
            }
            SampleType::F32 => bytemuck::pod_read_unaligned::<f32>(&row[i * 4..i * 4 + 4]),
        }
    }

    /// Store `v` as the `i`-th sample of `row`.  Integer formats clamp to
    /// [0, 1] and round to nearest.
    #[inline]
    fn write_sample(&self, row: &mut [u8], i: usize, v: f32) {
        match self.sample_type() {
            SampleType::U8 => row[i] = (v.clamp(0.0, 1.0) * 255.0).round() as u8,
            SampleType::U16 => {
                let s = (v.clamp(0.0, 1.0) * 65535.0).round() as u16;
                row[i * 2..i * 2 + 2].copy_from_slice(bytemuck::bytes_of(&s));
            }
            SampleType::F32 => row[i * 4..i * 4 + 4].copy_from_slice(bytemuck::bytes_of(&v)),
        }
    }

    /// Convert a packed row to RGBA float, 4 samples per pixel.  Gray is
    /// replicated into R, G and B; formats without alpha decode as opaque.
    pub fn decode_rgba_f32(&self, row: &[u8], out: &mut [f32]) {
        let bpp = self.bytes_per_pixel();
        let ch = self.channels();
        assert_eq!(row.len() / bpp * 4, out.len(), "decode length mismatch");
        let gray = self.is_gray();
        let alpha = self.has_alpha();
        for (px, dst) in out.chunks_exact_mut(4).enumerate() {
            let base = px * ch;
            if gray {
                let y = self.read_sample(row, base);
                dst[0] = y;
                dst[1] = y;
                dst[2] = y;
            } else {
                dst[0] = self.read_sample(row, base);
                dst[1] = self.read_sample(row, base + 1);
                dst[2] = self.read_sample(row, base + 2);
            }
            dst[3] = if alpha {
                self.read_sample(row, base + ch - 1)
            } else {
                1.0
            };
        }
    }

    /// Inverse of [`decode_rgba_f32`](Self::decode_rgba_f32).  Gray formats
    /// store the mean of R, G and B; alpha is dropped for formats without it.
    pub fn encode_rgba_f32(&self, samples: &[f32], row: &mut [u8]) {
        let bpp = self.bytes_per_pixel();
        let ch = self.channels();
        assert_eq!(row.len() / bpp * 4, samples.len(), "encode length mismatch");
        let gray = self.is_gray();
        let alpha = self.has_alpha();
        for (px, src) in samples.chunks_exact(4).enumerate() {
            let base = px * ch;
            if gray {
                self.write_sample(row, base, (src[0] + src[1] + src[2]) / 3.0);
            } else {
                self.write_sample(row, base, src[0]);
                self.write_sample(row, base + 1, src[1]);
                self.write_sample(row, base + 2, src[2]);
            }
            if alpha {
                self.write_sample(row, base + ch - 1, src[3]);
            }
        }
    }

    /// Whether this format can be used as a layer mask.
    pub fn is_mask_format(&self) -> bool {
        self.channels() == 1
    }

    /// Convert a single-channel row to one float weight per pixel.
    pub fn decode_mask(&self, row: &[u8], out: &mut [f32]) {
        debug_assert!(self.is_mask_format());
        assert_eq!(row.len() / self.bytes_per_pixel(), out.len(), "mask length mismatch");
        for (i, dst) in out.iter_mut().enumerate() {
            *dst = self.read_sample(row, i);
        }
    }

    /// Refuse anything that cannot act as a mask.
    pub fn require_mask(&self) -> Result<()> {
        if self.is_mask_format() {
            Ok(())
        } else {
            Err(RasterError::InvalidArgument(format!(
                "{} cannot be used as a mask, expected a single-channel format",
                self.name()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel_matches_layout() {
        assert_eq!(PixelFormat::Y8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Rgb8.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::YA16.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgba16.bytes_per_pixel(), 8);
        assert_eq!(PixelFormat::RgbaF32.bytes_per_pixel(), 16);
    }

    #[test]
    fn every_format_carries_white_and_black() {
        let samples = [1.0f32, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut names = std::collections::HashSet::new();
        for &format in PixelFormat::all() {
            assert!(names.insert(format.name()), "duplicate name {}", format.name());
            assert_eq!(
                format.bytes_per_pixel(),
                format.channels() * format.sample_type().bytes()
            );

            let mut row = vec![0u8; 2 * format.bytes_per_pixel()];
            format.encode_rgba_f32(&samples, &mut row);
            let mut back = [0.5f32; 8];
            format.decode_rgba_f32(&row, &mut back);
            assert_eq!(back, samples, "{}", format.name());
        }
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn rgba8_decodes_normalised() {
        let row = [255u8, 0, 51, 255, 0, 0, 0, 0];
        let mut out = [0.0f32; 8];
        PixelFormat::Rgba8.decode_rgba_f32(&row, &mut out);
        assert_eq!(&out[..4], &[1.0, 0.0, 0.2, 1.0]);
        assert_eq!(&out[4..], &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn gray_replicates_and_is_opaque() {
        let row = [0u8, 255];
        let mut out = [0.0f32; 8];
        PixelFormat::Y8.decode_rgba_f32(&row, &mut out);
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn encode_rounds_and_clamps() {
        let samples = [0.5f32, -1.0, 2.0, 1.0];
        let mut row = [0u8; 4];
        PixelFormat::Rgba8.encode_rgba_f32(&samples, &mut row);
        assert_eq!(row, [128, 0, 255, 255]);
    }

    #[test]
    fn float_rows_keep_exact_values() {
        let samples = [0.25f32, 0.5, 0.75, 0.125];
        let mut row = vec![0u8; 16];
        PixelFormat::RgbaF32.encode_rgba_f32(&samples, &mut row);
        let mut back = [0.0f32; 4];
        PixelFormat::RgbaF32.decode_rgba_f32(&row, &mut back);
        assert_eq!(back, samples);
    }

    #[test]
    fn u16_full_scale() {
        let samples = [1.0f32, 0.0, 1.0, 1.0];
        let mut row = vec![0u8; 8];
        PixelFormat::Rgba16.encode_rgba_f32(&samples, &mut row);
        assert_eq!(&row[..2], &u16::MAX.to_ne_bytes());
        assert_eq!(&row[2..4], &[0, 0]);
    }

    #[test]
    fn mask_formats() {
        assert!(PixelFormat::Y8.require_mask().is_ok());
        assert!(PixelFormat::YF32.require_mask().is_ok());
        assert!(matches!(
            PixelFormat::Rgba8.require_mask(),
            Err(RasterError::InvalidArgument(_))
        ));

        let mut out = [0.0f32; 2];
        PixelFormat::Y8.decode_mask(&[0, 255], &mut out);
        assert_eq!(out, [0.0, 1.0]);
    }
}
