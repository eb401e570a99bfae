//! Planar geometry for detector footprint queries.
//!
//! Provides the axis-aligned bounding box used as the cheap pre-filter for
//! particle selection and the parallel boundary-line representation used for
//! the exact point-in-quadrilateral test.

/// Axis-aligned bounding box in ground-plane coordinates (meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds2d {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds2d {
    /// Create a bounding box from explicit coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a square box of half-width `half` centered on `(x, y)`.
    pub fn centered(x: f64, y: f64, half: f64) -> Self {
        Self {
            min_x: x - half,
            min_y: y - half,
            max_x: x + half,
            max_y: y + half,
        }
    }

    /// Smallest box containing all `points`. Returns `None` for an empty slice.
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self {
            min_x: first.0,
            min_y: first.1,
            max_x: first.0,
            max_y: first.1,
        };
        for &(x, y) in rest {
            bounds.min_x = bounds.min_x.min(x);
            bounds.min_y = bounds.min_y.min(y);
            bounds.max_x = bounds.max_x.max(x);
            bounds.max_y = bounds.max_y.max(y);
        }
        Some(bounds)
    }

    /// A new box grown by `pad` in all directions.
    pub fn with_padding(&self, pad: f64) -> Self {
        Self {
            min_x: self.min_x - pad,
            min_y: self.min_y - pad,
            max_x: self.max_x + pad,
            max_y: self.max_y + pad,
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// A pair of parallel boundary lines delimiting a strip of the plane.
///
/// Two such strips intersected give an exact (possibly rotated, possibly
/// non-rectangular) quadrilateral test. Points strictly between the two
/// lines satisfy `lower < eq(x, y) < upper`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineBoundary {
    /// Degenerate case: the defining points share one x, the strip is
    /// bounded by two vertical lines and only `x` is tested.
    Vertical { lower: f64, upper: f64 },
    /// General case: the test expression is `y - slope * x`.
    Sloped {
        slope: f64,
        lower: f64,
        upper: f64,
    },
}

impl LineBoundary {
    /// True when `(x, y)` lies strictly between the two parallel lines.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        match *self {
            LineBoundary::Vertical { lower, upper } => lower < x && x < upper,
            LineBoundary::Sloped {
                slope,
                lower,
                upper,
            } => {
                let value = y - slope * x;
                lower < value && value < upper
            }
        }
    }

    /// The ordered boundary values `(lower, upper)`.
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            LineBoundary::Vertical { lower, upper } => (lower, upper),
            LineBoundary::Sloped { lower, upper, .. } => (lower, upper),
        }
    }
}

/// Derive the parallel boundary lines through three corner points.
///
/// `p0` and `p1` lie on the first line; `p2` lies on a parallel line. The
/// boundary values are returned ordered, lower first, so that points
/// between the lines satisfy `lower < eq < upper` regardless of corner
/// ordering.
pub fn line_boundary_eqs(p0: (f64, f64), p1: (f64, f64), p2: (f64, f64)) -> LineBoundary {
    let ((x0, y0), (x1, y1), (x2, y2)) = (p0, p1, p2);

    if x0 == x1 {
        // line is exactly vertical
        let (lower, upper) = if x0 < x2 { (x0, x2) } else { (x2, x0) };
        LineBoundary::Vertical { lower, upper }
    } else {
        let slope = (y1 - y0) / (x1 - x0);
        let b1 = y0 - slope * x0;
        let b2 = y2 - slope * x2;
        let (lower, upper) = if b1 < b2 { (b1, b2) } else { (b2, b1) };
        LineBoundary::Sloped {
            slope,
            lower,
            upper,
        }
    }
}
