//! Contour extraction and filling on binary masks.
//!
//! Border following comes from `imageproc::contours::find_contours`
//! (Suzuki-Abe). Only external borders are kept: outer borders with no
//! parent, the equivalent of retrieving the outermost contour of each
//! connected blob. Shape measures (area, convex hull, solidity) go
//! through `geo` so the raster and vector halves of the pipeline share
//! one geometry implementation.

use geo::{Area, ConvexHull, Coord, LineString, Polygon};
use image::{GrayImage, Luma};
use imageproc::contours::BorderType;

use crate::types::{BinaryMask, Dimensions, FOREGROUND, Rect};

/// A closed pixel contour (implicit closing edge).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    points: Vec<(u32, u32)>,
}

impl Contour {
    /// Create a contour from pixel coordinates.
    ///
    /// A trailing copy of the first point is dropped so the closing edge
    /// stays implicit.
    #[must_use]
    pub fn new(mut points: Vec<(u32, u32)>) -> Self {
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        Self { points }
    }

    /// Pixel coordinates along the border.
    #[must_use]
    pub fn points(&self) -> &[(u32, u32)] {
        &self.points
    }

    /// Number of border points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The contour as a `geo` polygon in pixel-center coordinates.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .points
            .iter()
            .map(|&(x, y)| Coord {
                x: f64::from(x),
                y: f64::from(y),
            })
            .collect();
        Polygon::new(LineString::from(coords), vec![])
    }

    /// Enclosed area by the shoelace formula over pixel centers.
    ///
    /// Underestimates the filled pixel count by roughly half the
    /// perimeter; thresholds are calibrated against this measure.
    #[must_use]
    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        self.to_polygon().unsigned_area()
    }

    /// Area of the convex hull of the border points.
    #[must_use]
    pub fn convex_hull_area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        self.to_polygon().convex_hull().unsigned_area()
    }

    /// `area / convex_hull_area`, or 0 for degenerate contours.
    ///
    /// Close to 1 for compact shapes, low for sparse branching ones.
    #[must_use]
    pub fn solidity(&self) -> f64 {
        let hull = self.convex_hull_area();
        if hull > 0.0 { self.area() / hull } else { 0.0 }
    }

    /// Tight bounding box of the border points.
    #[must_use]
    pub fn bounding_box(&self) -> Rect {
        let Some(&(x0, y0)) = self.points.first() else {
            return Rect::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for &(x, y) in &self.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
    }

    /// Fill the contour and its interior into `image`.
    pub fn fill_into(&self, image: &mut GrayImage) {
        match self.points.len() {
            0 => {}
            1 | 2 => {
                for &(x, y) in &self.points {
                    if x < image.width() && y < image.height() {
                        image.put_pixel(x, y, Luma([FOREGROUND]));
                    }
                }
            }
            _ => {
                let poly: Vec<imageproc::point::Point<i32>> = self
                    .points
                    .iter()
                    .map(|&(x, y)| imageproc::point::Point::new(to_i32(x), to_i32(y)))
                    .collect();
                imageproc::drawing::draw_polygon_mut(image, &poly, Luma([FOREGROUND]));
            }
        }
    }

    /// Shift every point by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: u32, dy: u32) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|&(x, y)| (x.saturating_add(dx), y.saturating_add(dy)))
                .collect(),
        }
    }
}

fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// External contours of the foreground of `mask`.
#[must_use]
pub fn external_contours(mask: &BinaryMask) -> Vec<Contour> {
    imageproc::contours::find_contours::<u32>(mask.as_gray())
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour::new(c.points.into_iter().map(|p| (p.x, p.y)).collect()))
        .collect()
}

/// Fill a set of contours solid into a fresh mask.
#[must_use]
pub fn fill_contours<'a>(
    dimensions: Dimensions,
    contours: impl IntoIterator<Item = &'a Contour>,
) -> BinaryMask {
    let mut image = GrayImage::new(dimensions.width, dimensions.height);
    for contour in contours {
        contour.fill_into(&mut image);
    }
    BinaryMask::from_gray(image)
}

/// Fill every enclosed hole in `mask`.
///
/// Filling the external contours of each blob yields the blob with all
/// interior holes set.
#[must_use]
pub fn fill_holes(mask: &BinaryMask) -> BinaryMask {
    let contours = external_contours(mask);
    fill_contours(mask.dimensions(), &contours).or(mask)
}
