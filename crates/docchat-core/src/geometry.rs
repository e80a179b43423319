//! Rectangles and affine matrices in PDF points

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Convert between a top-left origin and PDF user space (bottom-left
    /// origin) for a page whose MediaBox is `media_box`.
    pub fn flip_y(&self, media_box: &Rect) -> Rect {
        Rect {
            x0: media_box.x0 + self.x0,
            y0: media_box.y1 - self.y1,
            x1: media_box.x0 + self.x1,
            y1: media_box.y1 - self.y0,
        }
    }

    pub fn bounding(rects: &[Rect]) -> Option<Rect> {
        let (first, rest) = rects.split_first()?;
        Some(rest.iter().fold(*first, |acc, r| acc.union(r)))
    }
}

/// PDF affine matrix `[a b c d e f]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self × other`: apply `self` first, then `other`
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn y_scale(&self) -> f64 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_y_against_letter_page() {
        let page = Rect::new(0.0, 0.0, 612.0, 792.0);
        let top_left = Rect::new(72.0, 72.0, 144.0, 90.0);
        assert_eq!(top_left.flip_y(&page), Rect::new(72.0, 702.0, 144.0, 720.0));
    }

    #[test]
    fn test_translate_then_scale() {
        let m = Matrix::translate(10.0, 20.0).multiply(&Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0));
        assert_eq!(m.apply(1.0, 1.0), (22.0, 42.0));
    }

    #[test]
    fn test_bounding_of_empty_is_none() {
        assert!(Rect::bounding(&[]).is_none());
        let r = Rect::bounding(&[Rect::new(0.0, 0.0, 1.0, 1.0), Rect::new(5.0, -1.0, 6.0, 0.5)]);
        assert_eq!(r, Some(Rect::new(0.0, -1.0, 6.0, 1.0)));
    }
}
