//! Gaussian smoothing and self-calibrating Canny edge detection.
//!
//! [`canny`] takes an already-blurred image: smoothing is a separate,
//! configurable step ([`gaussian_blur`]) rather than a fixed sigma baked
//! into the detector. Thresholds come from the image itself through
//! [`auto_thresholds`], which brackets the median intensity, so one
//! setting works across bright desert tiles and dark monsoon imagery.
//!
//! Hysteresis tracks all eight neighbours with explicit bounds checks.
//! Crops taken from a region of interest routinely have strong edges on
//! their first and last rows, and the tracker must step onto those
//! pixels without wrapping coordinates.

use std::f32::consts::PI;

use image::{GrayImage, Luma};

/// Minimum allowed Canny threshold.
///
/// A low threshold of zero makes every pixel with any gradient a
/// candidate edge, which floods the closing step with noise.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Apply Gaussian blur. Non-positive `sigma` returns the image unchanged,
/// since `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Median intensity of `image`, or 0 for an empty image.
#[must_use]
pub fn median(image: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in image.pixels() {
        hist[usize::from(p.0[0])] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }
    // Lower median, matching a sorted-array pick at index (n - 1) / 2.
    let target = (total - 1) / 2;
    let mut seen = 0u64;
    for (value, &count) in hist.iter().enumerate() {
        seen += count;
        if seen > target {
            return u8::try_from(value).unwrap_or(u8::MAX);
        }
    }
    u8::MAX
}

/// Canny thresholds bracketing the median: `(1 - sigma) * v` and
/// `(1 + sigma) * v`, clamped to `[MIN_THRESHOLD, 255]`.
#[must_use]
pub fn auto_thresholds(image: &GrayImage, sigma: f32) -> (f32, f32) {
    let v = f32::from(median(image));
    let sigma = if sigma.is_finite() { sigma.max(0.0) } else { 0.0 };
    let low = ((1.0 - sigma) * v).max(MIN_THRESHOLD);
    let high = ((1.0 + sigma) * v).clamp(MIN_THRESHOLD, 255.0);
    (low.min(high), high)
}

/// Canny edge detection on a pre-blurred image.
///
/// Returns a binary image: 255 for edge pixels, 0 otherwise. Thresholds
/// are clamped to at least [`MIN_THRESHOLD`] and `low` to at most `high`.
/// Images narrower or shorter than 3 pixels have no interior and yield
/// no edges.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut out = GrayImage::new(w, h);
    if w < 3 || h < 3 {
        return out;
    }
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);

    let gx = imageproc::gradients::horizontal_sobel(image);
    let gy = imageproc::gradients::vertical_sobel(image);
    let magnitude: Vec<f32> = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(a, b)| f32::from(a.0[0]).hypot(f32::from(b.0[0])))
        .collect();

    let thinned = suppress_non_maxima(&magnitude, &gx, &gy, w, h);
    hysteresis(&thinned, &mut out, low, high);
    out
}

/// Keep only gradient magnitudes that are local maxima across the edge.
fn suppress_non_maxima(
    magnitude: &[f32],
    gx: &image::ImageBuffer<Luma<i16>, Vec<i16>>,
    gy: &image::ImageBuffer<Luma<i16>, Vec<i16>>,
    w: u32,
    h: u32,
) -> Vec<f32> {
    let idx = |x: u32, y: u32| (y * w + x) as usize;
    let mut out = vec![0.0f32; magnitude.len()];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let dx = f32::from(gx.get_pixel(x, y).0[0]);
            let dy = f32::from(gy.get_pixel(x, y).0[0]);
            let mut angle = dy.atan2(dx) * 180.0 / PI;
            if angle < 0.0 {
                angle += 180.0;
            }
            let (a, b) = if !(22.5..157.5).contains(&angle) {
                (idx(x - 1, y), idx(x + 1, y))
            } else if angle < 67.5 {
                (idx(x + 1, y + 1), idx(x - 1, y - 1))
            } else if angle < 112.5 {
                (idx(x, y - 1), idx(x, y + 1))
            } else {
                (idx(x - 1, y + 1), idx(x + 1, y - 1))
            };
            let here = magnitude[idx(x, y)];
            if here >= magnitude[a] && here >= magnitude[b] {
                out[idx(x, y)] = here;
            }
        }
    }
    out
}

/// Mark strong edges, then grow them through connected weak pixels.
fn hysteresis(thinned: &[f32], out: &mut GrayImage, low: f32, high: f32) {
    let (w, h) = out.dimensions();
    let idx = |x: u32, y: u32| (y * w + x) as usize;
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if thinned[idx(x, y)] < high || out.get_pixel(x, y).0[0] != 0 {
                continue;
            }
            out.put_pixel(x, y, Luma([255]));
            stack.push((x, y));
            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in NEIGHBOURS {
                    let (Some(nx), Some(ny)) =
                        (cx.checked_add_signed(dx), cy.checked_add_signed(dy))
                    else {
                        continue;
                    };
                    if nx >= w || ny >= h {
                        continue;
                    }
                    if thinned[idx(nx, ny)] >= low && out.get_pixel(nx, ny).0[0] == 0 {
                        out.put_pixel(nx, ny, Luma([255]));
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }
}

const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];
