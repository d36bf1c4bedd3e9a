//! Auditor overlays.
//!
//! Encroached pixels are alpha-blended with a warning color; the approved
//! boundary is stroked on top with `tiny-skia` so outlines are
//! anti-aliased and a consistent width regardless of how jagged the mask
//! edge is. Rendering only reads the masks: metrics are computed before
//! this stage and never touched by it.

use image::Rgb;
use serde::{Deserialize, Serialize};
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::contour;
use crate::types::{BinaryMask, RgbImage};

/// Default boundary stroke color.
pub const DEFAULT_BOUNDARY_COLOR: [u8; 3] = [0, 255, 0];

/// Default boundary stroke width in pixels.
pub const DEFAULT_BOUNDARY_WIDTH: f32 = 3.0;

/// Default encroachment fill color.
pub const DEFAULT_ENCROACHMENT_COLOR: [u8; 3] = [255, 0, 0];

/// Default encroachment fill opacity.
pub const DEFAULT_ENCROACHMENT_ALPHA: f32 = 0.4;

/// Colors and widths for [`render_overlay`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// Approved boundary stroke color.
    pub boundary_color: [u8; 3],
    /// Approved boundary stroke width; zero disables the outline.
    pub boundary_width: f32,
    /// Encroachment fill color.
    pub encroachment_color: [u8; 3],
    /// Encroachment fill opacity in `[0, 1]`.
    pub encroachment_alpha: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            boundary_color: DEFAULT_BOUNDARY_COLOR,
            boundary_width: DEFAULT_BOUNDARY_WIDTH,
            encroachment_color: DEFAULT_ENCROACHMENT_COLOR,
            encroachment_alpha: DEFAULT_ENCROACHMENT_ALPHA,
        }
    }
}

/// Draw encroachment and the approved outline over `satellite`.
///
/// Masks must share the satellite frame; pixels outside a mask are
/// treated as background.
#[must_use = "returns the rendered overlay"]
pub fn render_overlay(
    satellite: &RgbImage,
    approved: &BinaryMask,
    encroached: &BinaryMask,
    style: &OverlayStyle,
) -> RgbImage {
    let mut out = satellite.clone();
    let alpha = if style.encroachment_alpha.is_finite() {
        style.encroachment_alpha.clamp(0.0, 1.0)
    } else {
        0.0
    };
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if encroached.get(x, y) {
            *pixel = blend(*pixel, style.encroachment_color, alpha);
        }
    }

    if style.boundary_width > 0.0 {
        if let Some(outline) = stroke_outline(approved, out.width(), out.height(), style) {
            composite(&mut out, &outline);
        }
    }
    out
}

/// Place `reference` and `satellite` side by side on a black canvas.
#[must_use = "returns the comparison image"]
pub fn render_comparison(reference: &RgbImage, satellite: &RgbImage) -> RgbImage {
    let width = reference.width().saturating_add(satellite.width());
    let height = reference.height().max(satellite.height());
    let mut out = RgbImage::new(width, height);
    image::imageops::replace(&mut out, reference, 0, 0);
    image::imageops::replace(&mut out, satellite, i64::from(reference.width()), 0);
    out
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend(base: Rgb<u8>, color: [u8; 3], alpha: f32) -> Rgb<u8> {
    let mix = |b: u8, c: u8| {
        (f32::from(c) - f32::from(b))
            .mul_add(alpha, f32::from(b))
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgb([
        mix(base.0[0], color[0]),
        mix(base.0[1], color[1]),
        mix(base.0[2], color[2]),
    ])
}

/// Stroke the external contours of `approved` into a transparent pixmap.
#[allow(clippy::cast_precision_loss)]
fn stroke_outline(
    approved: &BinaryMask,
    width: u32,
    height: u32,
    style: &OverlayStyle,
) -> Option<Pixmap> {
    let mut pb = PathBuilder::new();
    for c in contour::external_contours(approved) {
        let mut points = c.points().iter();
        let Some(&(x0, y0)) = points.next() else {
            continue;
        };
        pb.move_to(x0 as f32 + 0.5, y0 as f32 + 0.5);
        for &(x, y) in points {
            pb.line_to(x as f32 + 0.5, y as f32 + 0.5);
        }
        pb.close();
    }
    let path = pb.finish()?;

    let stroke = Stroke {
        width: style.boundary_width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    let mut paint = Paint::default();
    let [r, g, b] = style.boundary_color;
    paint.set_color_rgba8(r, g, b, 255);
    paint.anti_alias = true;

    let mut pixmap = Pixmap::new(width, height)?;
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    Some(pixmap)
}

/// Source-over composite of a premultiplied pixmap onto an opaque image.
#[allow(clippy::cast_possible_truncation)]
fn composite(dst: &mut RgbImage, src: &Pixmap) {
    let data = src.data();
    for (i, pixel) in dst.pixels_mut().enumerate() {
        let off = i * 4;
        let a = u16::from(data[off + 3]);
        if a == 0 {
            continue;
        }
        for c in 0..3 {
            let over = u16::from(data[off + c]) + u16::from(pixel.0[c]) * (255 - a) / 255;
            pixel.0[c] = over.min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dimensions, Rect};

    const GRAY: Rgb<u8> = Rgb([100, 100, 100]);

    fn satellite() -> RgbImage {
        RgbImage::from_pixel(60, 60, GRAY)
    }

    fn frame() -> Dimensions {
        Dimensions::new(60, 60)
    }

    #[test]
    fn empty_masks_leave_image_unchanged() {
        let sat = satellite();
        let empty = BinaryMask::new(frame());
        let out = render_overlay(&sat, &empty, &empty, &OverlayStyle::default());
        assert_eq!(out, sat);
    }

    #[test]
    fn encroached_pixels_are_tinted_red() {
        let sat = satellite();
        let approved = BinaryMask::new(frame());
        let encroached = BinaryMask::filled_rect(frame(), Rect::new(40, 40, 10, 10));
        let out = render_overlay(&sat, &approved, &encroached, &OverlayStyle::default());
        let p = out.get_pixel(45, 45).0;
        assert!(p[0] > 100 && p[1] < 100 && p[2] < 100, "got {p:?}");
        assert_eq!(*out.get_pixel(5, 5), GRAY);
    }

    #[test]
    fn approved_outline_is_green() {
        let sat = satellite();
        let approved = BinaryMask::filled_rect(frame(), Rect::new(10, 10, 30, 30));
        let empty = BinaryMask::new(frame());
        let out = render_overlay(&sat, &approved, &empty, &OverlayStyle::default());
        let edge = out.get_pixel(10, 25).0;
        assert!(edge[1] > edge[0] && edge[1] > edge[2], "got {edge:?}");
        // Interior well away from the stroke is untouched.
        assert_eq!(*out.get_pixel(25, 25), GRAY);
    }

    #[test]
    fn zero_width_disables_outline() {
        let sat = satellite();
        let approved = BinaryMask::filled_rect(frame(), Rect::new(10, 10, 30, 30));
        let style = OverlayStyle {
            boundary_width: 0.0,
            ..OverlayStyle::default()
        };
        let out = render_overlay(&sat, &approved, &BinaryMask::new(frame()), &style);
        assert_eq!(out, sat);
    }

    #[test]
    fn comparison_places_images_side_by_side() {
        let left = RgbImage::from_pixel(20, 10, Rgb([255, 0, 0]));
        let right = RgbImage::from_pixel(30, 15, Rgb([0, 0, 255]));
        let out = render_comparison(&left, &right);
        assert_eq!(out.dimensions(), (50, 15));
        assert_eq!(out.get_pixel(5, 5).0, [255, 0, 0]);
        assert_eq!(out.get_pixel(25, 5).0, [0, 0, 255]);
        assert_eq!(out.get_pixel(5, 12).0, [0, 0, 0]);
    }
}
