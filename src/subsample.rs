//! Box-filter downsampling from a source region into a destination region.

use crate::error::Result;
use crate::format::{PixelFormat, SampleType};
use crate::region::{PixelRegion, PixelRegionMut};

/// Pick the integer block edge `s` used to average source pixels.
///
/// Starts at 1 and grows while both axes still have more than
/// `2 * (s + 1)` source pixels per destination pixel.
pub fn subsample_factor(src_width: u32, src_height: u32, dest_width: u32, dest_height: u32) -> u32 {
    let (sw, sh) = (src_width as u64, src_height as u64);
    let (dw, dh) = (dest_width as u64, dest_height as u64);
    let mut s = 1u64;
    while dw * (s + 1) * 2 < sw && dh * (s + 1) * 2 < sh {
        s += 1;
    }
    s as u32
}

/// First source coordinate of destination pixel `d` along one axis.
#[inline]
fn block_origin(d: u32, src: u32, dest: u32) -> u32 {
    (d as u64 * src as u64 / dest as u64) as u32
}

/// Fill every row of `dest` from `src`.
pub fn subsample_region(
    src: &mut PixelRegion<'_>,
    dest: &mut PixelRegionMut<'_>,
    factor: u32,
) -> Result<()> {
    let dest_height = dest.height();
    subsample_rows(src, dest, 0, dest_height, factor)
}

/// Fill `dest` with destination rows `first_dest_row..first_dest_row + dest.height()`
/// of a `dest.width() × dest_height` downsample of `src`.
///
/// Each destination pixel averages the `factor × factor` block starting at
/// its mapped source position, clipped to the source rectangle.  Integer
/// samples round half up; float samples average in `f64`.  The destination
/// must use the same bytes-per-pixel as the source; samples are interpreted
/// with the source's format.
pub fn subsample_rows(
    src: &mut PixelRegion<'_>,
    dest: &mut PixelRegionMut<'_>,
    first_dest_row: u32,
    dest_height: u32,
    factor: u32,
) -> Result<()> {
    let format = src.format();
    assert_eq!(
        format.bytes_per_pixel(),
        dest.format().bytes_per_pixel(),
        "subsample source and destination pixel sizes differ"
    );
    let factor = factor.max(1);
    let (src_w, src_h) = (src.width(), src.height());
    let dest_w = dest.width();
    let channels = format.channels();

    // Horizontal block per destination column, shared by all rows
    let columns: Vec<(u32, u32)> = (0..dest_w)
        .map(|dx| {
            let sx = block_origin(dx, src_w, dest_w);
            (sx, factor.min(src_w - sx))
        })
        .collect();

    let mut acc = BlockAccumulator::new(format, dest_w as usize * channels);
    let mut dy = first_dest_row;
    while let Some(out) = dest.next_row_mut()? {
        let sy = block_origin(dy, src_h, dest_height);
        let rows = factor.min(src_h - sy);
        acc.clear();
        for ky in 0..rows {
            let row = src.row_at(sy + ky);
            acc.add_row(row, &columns, channels);
        }
        acc.store(out, &columns, rows, channels);
        dy += 1;
    }
    Ok(())
}

/// Per-channel running sums for one destination row.
enum BlockAccumulator {
    Int { format: PixelFormat, sums: Vec<u64> },
    Float { sums: Vec<f64> },
}

impl BlockAccumulator {
    fn new(format: PixelFormat, len: usize) -> Self {
        match format.sample_type() {
            SampleType::F32 => BlockAccumulator::Float { sums: vec![0.0; len] },
            _ => BlockAccumulator::Int { format, sums: vec![0; len] },
        }
    }

    fn clear(&mut self) {
        match self {
            BlockAccumulator::Int { sums, .. } => sums.fill(0),
            BlockAccumulator::Float { sums } => sums.fill(0.0),
        }
    }

    fn add_row(&mut self, row: &[u8], columns: &[(u32, u32)], channels: usize) {
        match self {
            BlockAccumulator::Int { format, sums } => {
                let wide = format.sample_type() == SampleType::U16;
                for (dx, &(sx, bw)) in columns.iter().enumerate() {
                    let acc = &mut sums[dx * channels..(dx + 1) * channels];
                    for px in sx..sx + bw {
                        let base = px as usize * channels;
                        for (c, a) in acc.iter_mut().enumerate() {
                            let i = base + c;
                            *a += if wide {
                                bytemuck::pod_read_unaligned::<u16>(&row[i * 2..i * 2 + 2]) as u64
                            } else {
                                row[i] as u64
                            };
                        }
                    }
                }
            }
            BlockAccumulator::Float { sums } => {
                for (dx, &(sx, bw)) in columns.iter().enumerate() {
                    let acc = &mut sums[dx * channels..(dx + 1) * channels];
                    for px in sx..sx + bw {
                        let base = px as usize * channels;
                        for (c, a) in acc.iter_mut().enumerate() {
                            let i = base + c;
                            *a += bytemuck::pod_read_unaligned::<f32>(&row[i * 4..i * 4 + 4]) as f64;
                        }
                    }
                }
            }
        }
    }

    fn store(&self, out: &mut [u8], columns: &[(u32, u32)], rows: u32, channels: usize) {
        match self {
            BlockAccumulator::Int { format, sums } => {
                let wide = format.sample_type() == SampleType::U16;
                for (dx, &(_, bw)) in columns.iter().enumerate() {
                    let n = bw as u64 * rows as u64;
                    for c in 0..channels {
                        let i = dx * channels + c;
                        let avg = (sums[i] + n / 2) / n;
                        if wide {
                            out[i * 2..i * 2 + 2].copy_from_slice(&(avg as u16).to_ne_bytes());
                        } else {
                            out[i] = avg as u8;
                        }
                    }
                }
            }
            BlockAccumulator::Float { sums } => {
                for (dx, &(_, bw)) in columns.iter().enumerate() {
                    let n = (bw as u64 * rows as u64) as f64;
                    for c in 0..channels {
                        let i = dx * channels + c;
                        let avg = (sums[i] / n) as f32;
                        out[i * 4..i * 4 + 4].copy_from_slice(bytemuck::bytes_of(&avg));
                    }
                }
            }
        }
    }
}
