//! Contrast-limited adaptive histogram equalization (CLAHE).
//!
//! The image is split into a `grid x grid` array of tiles. Each tile gets
//! its own equalization lookup table built from a clipped histogram, and
//! every output pixel is the bilinear blend of the four nearest tile
//! mappings. Clipping bounds how much any single tile can stretch
//! contrast, which keeps flat roofs and bare soil from turning into noise.
//!
//! Satellite tiles are frequently lit unevenly across a plot; equalizing
//! locally lets the median-derived edge thresholds downstream behave the
//! same in shadowed and sunlit parts of the crop.

use image::{GrayImage, Luma};

/// Default number of tiles along each axis.
pub const DEFAULT_GRID: u32 = 8;

/// Default clip limit, as a multiple of the mean histogram bin height.
pub const DEFAULT_CLIP_LIMIT: f32 = 3.0;

const BINS: usize = 256;

/// Equalize `image` with CLAHE.
///
/// `grid` is clamped to `1..=min(width, height)`. A `clip_limit` of zero
/// or less disables clipping (plain adaptive equalization).
#[must_use = "returns the equalized image"]
pub fn clahe(image: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }

    let grid_x = grid.clamp(1, w);
    let grid_y = grid.clamp(1, h);
    let tile_w = w.div_ceil(grid_x);
    let tile_h = h.div_ceil(grid_y);

    let mut luts = Vec::with_capacity((grid_x * grid_y) as usize);
    for ty in 0..grid_y {
        for tx in 0..grid_x {
            let x0 = (tx * tile_w).min(w);
            let y0 = (ty * tile_h).min(h);
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(image, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * grid_x + tx) as usize];

    GrayImage::from_fn(w, h, |x, y| {
        let v = image.get_pixel(x, y).0[0] as usize;

        // Position relative to tile centers.
        let (tx0, tx1, fx) = neighbours(x, tile_w, grid_x);
        let (ty0, ty1, fy) = neighbours(y, tile_h, grid_y);

        let top = lerp(
            f32::from(lut_at(tx0, ty0)[v]),
            f32::from(lut_at(tx1, ty0)[v]),
            fx,
        );
        let bottom = lerp(
            f32::from(lut_at(tx0, ty1)[v]),
            f32::from(lut_at(tx1, ty1)[v]),
            fx,
        );
        Luma([to_u8(lerp(top, bottom, fy))])
    })
}

/// Indices of the two tiles whose centers bracket `pos`, and the blend
/// weight toward the second one.
#[allow(clippy::cast_precision_loss)]
fn neighbours(pos: u32, tile: u32, count: u32) -> (u32, u32, f32) {
    let centered = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if centered <= 0.0 {
        return (0, 0, 0.0);
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lo = centered.floor() as u32;
    if lo >= count - 1 {
        return (count - 1, count - 1, 0.0);
    }
    (lo, lo + 1, centered - centered.floor())
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (b - a).mul_add(t, a)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Build the clipped-histogram equalization table for one tile.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn tile_lut(image: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; BINS] {
    let mut hist = [0u32; BINS];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[image.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let total: u32 = hist.iter().sum();
    let mut lut = [0u8; BINS];
    if total == 0 {
        for (i, slot) in lut.iter_mut().enumerate() {
            *slot = i as u8;
        }
        return lut;
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * total as f32 / BINS as f32) as u32).max(1);
        let mut excess = 0u32;
        for bin in &mut hist {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let share = excess / BINS as u32;
        let residual = (excess % BINS as u32) as usize;
        for bin in &mut hist {
            *bin += share;
        }
        // Residual goes out at an even stride over the whole range so
        // small tiles do not pile it into the dark bins.
        if residual > 0 {
            let step = (BINS / residual).max(1);
            for bin in hist.iter_mut().step_by(step).take(residual) {
                *bin += 1;
            }
        }
    }

    let scale = 255.0 / total as f32;
    let mut cumulative = 0u32;
    for (slot, &count) in lut.iter_mut().zip(hist.iter()) {
        cumulative += count;
        *slot = to_u8(cumulative as f32 * scale);
    }
    lut
}
