//! Point compositing of RGBA float streams.
//!
//! Every mode shares one skeleton: the output alpha is a linear blend of base
//! and layer alpha weighted by mask and opacity, and each colour channel moves
//! from the base value toward a per-mode combination of base and layer by
//! `ratio = weight * layer.a / new_alpha`.  Modes differ only in that
//! combination, a plain `fn(base, layer) -> f32`.

use serde::{Deserialize, Serialize};

const RED: usize = 0;
const ALPHA: usize = 3;

/// Per-channel combination of a base sample and a layer sample.
pub type ChannelFn = fn(f32, f32) -> f32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerMode {
    #[default]
    Replace,
    Multiply,
    Screen,
    Overlay,
    Difference,
    Addition,
    Subtract,
    Darken,
    Lighten,
    Dodge,
    Burn,
    HardLight,
    SoftLight,
    Divide,
}

impl LayerMode {
    pub fn all() -> &'static [LayerMode] {
        &[
            LayerMode::Replace,
            LayerMode::Multiply,
            LayerMode::Screen,
            LayerMode::Overlay,
            LayerMode::Difference,
            LayerMode::Addition,
            LayerMode::Subtract,
            LayerMode::Darken,
            LayerMode::Lighten,
            LayerMode::Dodge,
            LayerMode::Burn,
            LayerMode::HardLight,
            LayerMode::SoftLight,
            LayerMode::Divide,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            LayerMode::Replace => "Replace",
            LayerMode::Multiply => "Multiply",
            LayerMode::Screen => "Screen",
            LayerMode::Overlay => "Overlay",
            LayerMode::Difference => "Difference",
            LayerMode::Addition => "Addition",
            LayerMode::Subtract => "Subtract",
            LayerMode::Darken => "Darken",
            LayerMode::Lighten => "Lighten",
            LayerMode::Dodge => "Dodge",
            LayerMode::Burn => "Burn",
            LayerMode::HardLight => "Hard Light",
            LayerMode::SoftLight => "Soft Light",
            LayerMode::Divide => "Divide",
        }
    }

    /// Stable u8 for collaborators that persist layer stacks.
    pub fn to_u8(&self) -> u8 {
        match self {
            LayerMode::Replace => 0,
            LayerMode::Multiply => 1,
            LayerMode::Screen => 2,
            LayerMode::Overlay => 3,
            LayerMode::Difference => 4,
            LayerMode::Addition => 5,
            LayerMode::Subtract => 6,
            LayerMode::Darken => 7,
            LayerMode::Lighten => 8,
            LayerMode::Dodge => 9,
            LayerMode::Burn => 10,
            LayerMode::HardLight => 11,
            LayerMode::SoftLight => 12,
            LayerMode::Divide => 13,
        }
    }

    /// Reconstruct from a u8 (defaults to Replace for unknown values)
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => LayerMode::Multiply,
            2 => LayerMode::Screen,
            3 => LayerMode::Overlay,
            4 => LayerMode::Difference,
            5 => LayerMode::Addition,
            6 => LayerMode::Subtract,
            7 => LayerMode::Darken,
            8 => LayerMode::Lighten,
            9 => LayerMode::Dodge,
            10 => LayerMode::Burn,
            11 => LayerMode::HardLight,
            12 => LayerMode::SoftLight,
            13 => LayerMode::Divide,
            _ => LayerMode::Replace,
        }
    }

    pub fn channel_fn(&self) -> ChannelFn {
        match self {
            LayerMode::Replace => replace_channel,
            LayerMode::Multiply => |b, l| b * l,
            LayerMode::Screen => |b, l| 1.0 - (1.0 - b) * (1.0 - l),
            LayerMode::Overlay => |b, l| overlay_channel(b, l),
            LayerMode::Difference => |b, l| (b - l).abs(),
            LayerMode::Addition => |b, l| (b + l).min(1.0),
            LayerMode::Subtract => |b, l| (b - l).max(0.0),
            LayerMode::Darken => f32::min,
            LayerMode::Lighten => f32::max,
            LayerMode::Dodge => color_dodge_channel,
            LayerMode::Burn => color_burn_channel,
            LayerMode::HardLight => |b, l| overlay_channel(l, b),
            LayerMode::SoftLight => soft_light_channel,
            LayerMode::Divide => divide_channel,
        }
    }
}

// Channel combinations

fn replace_channel(_base: f32, layer: f32) -> f32 {
    layer
}

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if top == 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

/// W3C Soft Light formula.
fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

fn divide_channel(base: f32, top: f32) -> f32 {
    if top <= 0.0 { 1.0 } else { (base / top).min(1.0) }
}

// ============================================================================
// SKELETON
// ============================================================================

/// Composite one pixel.  `base`, `layer` and `out` are 4-sample RGBA slices.
#[inline]
pub fn compose_pixel(
    base: &[f32],
    layer: &[f32],
    mask: Option<f32>,
    opacity: f32,
    combine: ChannelFn,
    out: &mut [f32],
) {
    // Left-to-right products: (la - ba) * m * opacity, not (la - ba) * (m * opacity)
    let (new_alpha, weight) = match mask {
        Some(m) => ((layer[ALPHA] - base[ALPHA]) * m * opacity + base[ALPHA], m * opacity),
        None => ((layer[ALPHA] - base[ALPHA]) * opacity + base[ALPHA], opacity),
    };

    if new_alpha != 0.0 {
        let ratio = weight * layer[ALPHA] / new_alpha;
        for b in RED..ALPHA {
            let target = combine(base[b], layer[b]);
            if target > base[b] {
                out[b] = base[b] + (target - base[b]) * ratio;
            } else {
                out[b] = base[b] - (base[b] - target) * ratio;
            }
        }
    } else {
        out[RED..ALPHA].copy_from_slice(&base[RED..ALPHA]);
    }

    out[ALPHA] = new_alpha;
}

/// Composite `samples` pixels: `base`, `layer` and `out` hold 4 floats per
/// pixel, `mask` (when present) one float per pixel.
///
/// Stream lengths are a caller guarantee; a mismatch panics.
pub fn composite(
    mode: LayerMode,
    base: &[f32],
    layer: &[f32],
    mask: Option<&[f32]>,
    out: &mut [f32],
    opacity: f32,
) {
    assert_eq!(base.len(), layer.len(), "base and layer streams differ in length");
    assert_eq!(base.len(), out.len(), "output stream length differs from input");
    assert_eq!(base.len() % 4, 0, "RGBA streams must hold whole pixels");
    let combine = mode.channel_fn();

    match mask {
        Some(mask) => {
            assert_eq!(mask.len() * 4, base.len(), "mask stream length differs from input");
            for (((b, l), o), &m) in base
                .chunks_exact(4)
                .zip(layer.chunks_exact(4))
                .zip(out.chunks_exact_mut(4))
                .zip(mask)
            {
                compose_pixel(b, l, Some(m), opacity, combine, o);
            }
        }
        None => {
            for ((b, l), o) in base
                .chunks_exact(4)
                .zip(layer.chunks_exact(4))
                .zip(out.chunks_exact_mut(4))
            {
                compose_pixel(b, l, None, opacity, combine, o);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(mode: LayerMode, base: [f32; 4], layer: [f32; 4], mask: Option<f32>, opacity: f32) -> [f32; 4] {
        let mut out = [0.0f32; 4];
        let m = mask.map(|m| [m]);
        composite(mode, &base, &layer, m.as_ref().map(|m| &m[..]), &mut out, opacity);
        out
    }

    #[test]
    fn full_opacity_over_transparent_takes_layer() {
        let out = one(LayerMode::Replace, [0.1, 0.9, 0.3, 0.0], [0.25, 0.5, 1.0, 1.0], None, 1.0);
        assert_eq!(out, [0.25, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn replace_full_opacity_over_opaque_takes_layer() {
        let out = one(LayerMode::Replace, [0.0, 1.0, 0.5, 1.0], [1.0, 0.0, 0.5, 1.0], None, 1.0);
        assert_eq!(out, [1.0, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn zero_opacity_is_noop() {
        let base = [0.2, 0.4, 0.6, 0.5];
        for &mode in LayerMode::all() {
            assert_eq!(one(mode, base, [1.0, 1.0, 1.0, 1.0], None, 0.0), base, "{:?}", mode);
        }
    }

    #[test]
    fn zero_alpha_guard_keeps_base_colour() {
        // base.a = 0 and opacity = 0
        let out = one(LayerMode::Replace, [0.3, 0.6, 0.9, 0.0], [1.0, 1.0, 1.0, 1.0], None, 0.0);
        assert_eq!(out, [0.3, 0.6, 0.9, 0.0]);

        // layer.a = base.a = 0 at full opacity
        let out = one(LayerMode::Divide, [0.3, 0.6, 0.9, 0.0], [0.0, 0.0, 0.0, 0.0], None, 1.0);
        assert_eq!(out, [0.3, 0.6, 0.9, 0.0]);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn replace_can_erase_alpha() {
        let out = one(LayerMode::Replace, [0.5, 0.5, 0.5, 1.0], [0.0, 0.0, 0.0, 0.0], None, 1.0);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.0]);
    }

    #[test]
    fn mask_scales_weight() {
        // weight 0.5: alpha 0 -> 0.5, ratio = 0.5 * 1 / 0.5 = 1
        let out = one(LayerMode::Replace, [0.0, 0.0, 0.0, 0.0], [1.0, 0.5, 0.25, 1.0], Some(0.5), 1.0);
        assert_eq!(out, [1.0, 0.5, 0.25, 0.5]);

        // weight 0.5 over opaque base: alpha stays 1, colour halfway
        let out = one(LayerMode::Replace, [0.0, 1.0, 0.5, 1.0], [1.0, 0.0, 0.5, 1.0], Some(1.0), 0.5);
        assert_eq!(out, [0.5, 0.5, 0.5, 1.0]);

        // zero mask is a no-op
        let base = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(one(LayerMode::Replace, base, [1.0; 4], Some(0.0), 1.0), base);
    }

    #[test]
    fn masked_alpha_multiplies_left_to_right() {
        let layer_rgb = [0.9f32, 0.1, 0.5];
        let mut out = [0.0f32; 4];
        for &opacity in &[0.3f32, 0.7, 1.0] {
            for &ba in &[0.0f32, 0.35, 1.0] {
                for i in 0..=60 {
                    let la = i as f32 / 60.0;
                    for j in 0..=48 {
                        let m = j as f32 / 48.0;
                        let base = [0.2, 0.4, 0.6, ba];
                        let layer = [layer_rgb[0], layer_rgb[1], layer_rgb[2], la];
                        compose_pixel(&base, &layer, Some(m), opacity, replace_channel, &mut out);
                        let expected = (la - ba) * m * opacity + ba;
                        assert_eq!(
                            out[3].to_bits(),
                            expected.to_bits(),
                            "la={} ba={} m={} opacity={}",
                            la, ba, m, opacity
                        );
                    }
                }
            }
        }
    }

    fn opaque(mode: LayerMode, base: [f32; 3], layer: [f32; 3]) -> [f32; 4] {
        one(
            mode,
            [base[0], base[1], base[2], 1.0],
            [layer[0], layer[1], layer[2], 1.0],
            None,
            1.0,
        )
    }

    #[test]
    fn overlay_switches_at_half() {
        // base below half, above half, exactly half
        let out = opaque(LayerMode::Overlay, [0.25, 0.75, 0.5], [0.75, 0.75, 0.75]);
        assert_eq!(out, [0.375, 0.875, 0.75, 1.0]);
    }

    #[test]
    fn hard_light_switches_on_layer() {
        let out = opaque(LayerMode::HardLight, [0.75, 0.75, 0.5], [0.25, 0.75, 0.5]);
        assert_eq!(out, [0.375, 0.875, 0.5, 1.0]);
    }

    #[test]
    fn dodge_saturates_at_white_layer() {
        let out = opaque(LayerMode::Dodge, [0.5, 0.25, 0.5], [1.0, 0.5, 0.0]);
        assert_eq!(out, [1.0, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn burn_of_black_layer_is_black() {
        let out = opaque(LayerMode::Burn, [0.5, 0.75, 0.25], [0.0, 0.5, 0.5]);
        assert_eq!(out, [0.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn soft_light_branches() {
        // dark base with bright layer, dark layer, bright base with bright layer
        let out = opaque(LayerMode::SoftLight, [0.25, 0.5, 0.5625], [0.75, 0.25, 0.75]);
        assert_eq!(out, [0.375, 0.375, 0.65625, 1.0]);
    }

    #[test]
    fn divide_by_black_is_white() {
        let out = opaque(LayerMode::Divide, [0.25, 0.25, 0.75], [0.0, 0.5, 0.25]);
        assert_eq!(out, [1.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn addition_and_subtract_clamp() {
        let out = opaque(LayerMode::Addition, [0.5, 0.75, 0.25], [0.25, 0.5, 0.0]);
        assert_eq!(out, [0.75, 1.0, 0.25, 1.0]);

        let out = opaque(LayerMode::Subtract, [0.5, 0.25, 0.75], [0.25, 0.5, 0.0]);
        assert_eq!(out, [0.25, 0.0, 0.75, 1.0]);
    }

    #[test]
    fn alpha_is_linear_blend() {
        let out = one(LayerMode::Multiply, [0.5, 0.5, 0.5, 0.25], [0.5, 0.5, 0.5, 0.75], None, 0.5);
        assert_eq!(out[3], 0.5);
    }

    #[test]
    fn multiply_and_screen_over_opaque() {
        let base = [0.5, 1.0, 0.0, 1.0];
        let layer = [0.5, 0.5, 0.5, 1.0];
        assert_eq!(one(LayerMode::Multiply, base, layer, None, 1.0), [0.25, 0.5, 0.0, 1.0]);
        assert_eq!(one(LayerMode::Screen, base, layer, None, 1.0), [0.75, 1.0, 0.5, 1.0]);
        assert_eq!(one(LayerMode::Difference, base, layer, None, 1.0), [0.0, 0.5, 0.5, 1.0]);
        assert_eq!(one(LayerMode::Darken, base, layer, None, 1.0), [0.5, 0.5, 0.0, 1.0]);
        assert_eq!(one(LayerMode::Lighten, base, layer, None, 1.0), [0.5, 1.0, 0.5, 1.0]);
    }

    #[test]
    fn streams_process_every_pixel() {
        let base = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let layer = [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut out = [9.0f32; 8];
        composite(LayerMode::Replace, &base, &layer, None, &mut out, 1.0);
        assert_eq!(out, [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    #[should_panic(expected = "mask stream length")]
    fn mask_length_mismatch_panics() {
        let base = [0.0f32; 8];
        let mut out = [0.0f32; 8];
        composite(LayerMode::Replace, &base, &base, Some(&[1.0f32][..]), &mut out, 1.0);
    }

    #[test]
    fn mode_ids_are_stable() {
        for &mode in LayerMode::all() {
            assert_eq!(LayerMode::from_u8(mode.to_u8()), mode);
        }
        assert_eq!(LayerMode::from_u8(200), LayerMode::Replace);
    }
}
