//! Binary morphology on [`BinaryMask`]s.
//!
//! Thin wrappers over `imageproc::morphology` that add the structuring
//! element shape and an iteration count. A radius `r` gives a
//! `(2r + 1) x (2r + 1)` element: [`Element::Square`] is the full box,
//! [`Element::Disc`] the inscribed ellipse.
//!
//! Iterated closing/opening applies all dilations first, then all
//! erosions (or the reverse), so `close(m, s, r, 3)` closes gaps up to
//! roughly `3 * (2r + 1)` pixels wide.

use imageproc::distance_transform::Norm;
use serde::{Deserialize, Serialize};

use crate::types::BinaryMask;

/// Structuring element shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Element {
    /// Square box (chessboard distance).
    #[default]
    Square,
    /// Disc (Euclidean distance). Rounds corners when closing.
    Disc,
}

impl Element {
    const fn norm(self) -> Norm {
        match self {
            Self::Square => Norm::LInf,
            Self::Disc => Norm::L2,
        }
    }
}

/// Dilate `iterations` times.
#[must_use = "returns the dilated mask"]
pub fn dilate(mask: &BinaryMask, element: Element, radius: u8, iterations: u32) -> BinaryMask {
    repeat(mask, iterations, |img| {
        imageproc::morphology::dilate(img, element.norm(), radius)
    })
}

/// Erode `iterations` times.
#[must_use = "returns the eroded mask"]
pub fn erode(mask: &BinaryMask, element: Element, radius: u8, iterations: u32) -> BinaryMask {
    repeat(mask, iterations, |img| {
        imageproc::morphology::erode(img, element.norm(), radius)
    })
}

/// Morphological closing: dilate then erode. Fills small gaps.
#[must_use = "returns the closed mask"]
pub fn close(mask: &BinaryMask, element: Element, radius: u8, iterations: u32) -> BinaryMask {
    erode(
        &dilate(mask, element, radius, iterations),
        element,
        radius,
        iterations,
    )
}

/// Morphological opening: erode then dilate. Removes small specks.
#[must_use = "returns the opened mask"]
pub fn open(mask: &BinaryMask, element: Element, radius: u8, iterations: u32) -> BinaryMask {
    dilate(
        &erode(mask, element, radius, iterations),
        element,
        radius,
        iterations,
    )
}

fn repeat(
    mask: &BinaryMask,
    iterations: u32,
    op: impl Fn(&image::GrayImage) -> image::GrayImage,
) -> BinaryMask {
    if iterations == 0 {
        return mask.clone();
    }
    let mut current = op(mask.as_gray());
    for _ in 1..iterations {
        current = op(&current);
    }
    BinaryMask::from_gray(current)
}
