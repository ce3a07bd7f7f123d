//! Spatial indices over catalog stars on the Mercator square.
//!
//! Both trees answer the same question as [`StarCatalog::nearby`](crate::starcatalog::StarCatalog::nearby):
//! every star within a radius of a focus direction, with the inclusive `<=` boundary. A
//! query first collects the stars whose projected point falls inside the conservative
//! boxes from [`search_boxes`], then applies the exact angular test, so the result is
//! the same set a linear scan returns.

pub mod kd;
pub mod quad;

pub use kd::KdTree;
pub use quad::QuadTree;

use thiserror::Error;

use crate::geometry::mercator::{search_boxes, BoundingBox, MercatorPoint};
use crate::star::Star;

/// Index of a node inside a tree's arena.
pub type NodeId = usize;

/// Maximum number of points kept in a leaf.
pub const LEAF_CAPACITY: usize = 4;

/// Default side of the projected square.
pub const DEFAULT_WIDTH: f64 = 1000.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Searches must start at the root; a subtree does not know about stars outside it.
    #[error("node {node} is not the root of this tree")]
    NotRoot { node: NodeId },
}

/// Anything that can list the stars near a direction.
pub trait NearbyStars {
    /// All stars within `radius_deg` (inclusive) of `focus`. `expected` pre-sizes the
    /// output and never limits it.
    fn nearby_stars(&self, focus: &Star, radius_deg: f64, expected: usize) -> Vec<Star>;
}

/// Walk state shared by both trees: the search cover and the exact acceptance test.
pub(crate) struct RadiusQuery<'a> {
    focus: &'a Star,
    radius_deg: f64,
    boxes: Vec<BoundingBox>,
}

impl<'a> RadiusQuery<'a> {
    pub(crate) fn new(focus: &'a Star, radius_deg: f64, width: f64) -> Self {
        Self {
            focus,
            radius_deg,
            boxes: search_boxes(focus, radius_deg, width),
        }
    }

    pub(crate) fn visits(&self, region: &BoundingBox) -> bool {
        self.boxes.iter().any(|b| b.intersects(region))
    }

    pub(crate) fn accepts(&self, point: &MercatorPoint, star: &Star) -> bool {
        self.boxes.iter().any(|b| b.contains(point))
            && Star::angle_between(star, self.focus) <= self.radius_deg
    }
}
