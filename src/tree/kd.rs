//! K-d tree over Mercator-projected stars.
//!
//! Points are split at the median along alternating axes (`x` at even depth, `y` at odd
//! depth). Every node stores the region it covers, which is what the radius search prunes
//! against. Insertion order is shuffled with the caller's generator; since each node
//! sorts its points by coordinate with a stable sort, the shuffle only decides the order
//! of points with equal coordinates, and with it which side of a split they land on.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use super::{NearbyStars, NodeId, RadiusQuery, TreeError, LEAF_CAPACITY};
use crate::geometry::mercator::{project, BoundingBox, MercatorPoint};
use crate::star::Star;

#[derive(Debug, Clone)]
struct KdNode {
    bounds: BoundingBox,
    children: [Option<NodeId>; 2],
    points: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct KdTree {
    width: f64,
    stars: Vec<Star>,
    projected: Vec<MercatorPoint>,
    nodes: Vec<KdNode>,
    root: NodeId,
}

fn coordinate(p: &MercatorPoint, axis: usize) -> f64 {
    if axis == 0 {
        p.x
    } else {
        p.y
    }
}

impl KdTree {
    /// Build over `stars` on a square of side `width`. `rng` shuffles the insertion order,
    /// which only breaks ties between equal coordinates; query results never depend on it.
    pub fn build<R: Rng + ?Sized>(stars: &[Star], width: f64, rng: &mut R) -> Self {
        let projected = stars.iter().map(|s| project(s, width)).collect::<Vec<_>>();
        let mut order = (0..stars.len()).collect::<Vec<_>>();
        order.shuffle(rng);

        let mut tree = Self {
            width,
            stars: stars.to_vec(),
            projected,
            nodes: Vec::new(),
            root: 0,
        };
        tree.root = tree.build_node(order, BoundingBox::square(width), 0);
        info!(
            "Built k-d tree: {} stars, {} nodes",
            tree.stars.len(),
            tree.nodes.len()
        );
        tree
    }

    fn build_node(&mut self, mut points: Vec<usize>, bounds: BoundingBox, depth: usize) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(KdNode {
            bounds,
            children: [None; 2],
            points: Vec::new(),
        });
        if points.len() <= LEAF_CAPACITY {
            self.nodes[id].points = points;
            return id;
        }

        let axis = depth % 2;
        points.sort_by(|&a, &b| {
            coordinate(&self.projected[a], axis).total_cmp(&coordinate(&self.projected[b], axis))
        });
        let right = points.split_off(points.len() / 2);
        let split = coordinate(&self.projected[right[0]], axis);

        let (mut lower, mut upper) = (bounds, bounds);
        if axis == 0 {
            lower.x_max = split;
            upper.x_min = split;
        } else {
            lower.y_max = split;
            upper.y_min = split;
        }
        let l = self.build_node(points, lower, depth + 1);
        let r = self.build_node(right, upper, depth + 1);
        self.nodes[id].children = [Some(l), Some(r)];
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Lower and upper child of `node`, if it is internal.
    pub fn children(&self, node: NodeId) -> [Option<NodeId>; 2] {
        self.nodes.get(node).map(|n| n.children).unwrap_or([None; 2])
    }

    /// Stars within `radius_deg` of `focus`, inclusive.
    pub fn query(&self, focus: &Star, radius_deg: f64, expected: usize) -> Vec<Star> {
        let mut out = Vec::with_capacity(expected);
        if self.stars.is_empty() {
            return out;
        }
        let query = RadiusQuery::new(focus, radius_deg, self.width);
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !query.visits(&node.bounds) {
                continue;
            }
            out.extend(
                node.points
                    .iter()
                    .filter(|&&p| query.accepts(&self.projected[p], &self.stars[p]))
                    .map(|&p| self.stars[p]),
            );
            stack.extend(node.children.iter().rev().flatten());
        }
        out
    }

    /// Like [`KdTree::query`], but rejects any starting node other than the root.
    pub fn query_from(
        &self,
        node: NodeId,
        focus: &Star,
        radius_deg: f64,
        expected: usize,
    ) -> Result<Vec<Star>, TreeError> {
        if node != self.root {
            return Err(TreeError::NotRoot { node });
        }
        Ok(self.query(focus, radius_deg, expected))
    }
}

impl NearbyStars for KdTree {
    fn nearby_stars(&self, focus: &Star, radius_deg: f64, expected: usize) -> Vec<Star> {
        self.query(focus, radius_deg, expected)
    }
}
