//! Geometric invariants computed from small sets of star directions.
//!
//! - [`trio`]: planar and spherical triangle area and polar moment, and the dot-angle.
//! - [`asterism`]: the 4-star similarity-invariant hash code.
//! - [`mercator`]: projection of the sphere onto a bounded square, used by the spatial trees.

pub mod asterism;
pub mod mercator;
pub mod trio;
