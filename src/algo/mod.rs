//! Geometric and numeric helper algorithms.

pub mod geometry;
pub mod misc;

pub use geometry::{line_boundary_eqs, Bounds2d, LineBoundary};
pub use misc::{ceil_in_base, norm_angle, vector_length, SPEED_OF_LIGHT};
