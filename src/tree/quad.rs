//! Point quad-tree over Mercator-projected stars.
//!
//! Nodes live in a flat arena and refer to their children by [`NodeId`]. Each internal
//! node splits its square into four quadrants (top-left, top-right, bottom-left,
//! bottom-right); leaves hold at most [`LEAF_CAPACITY`] stars, except at the depth cap
//! where coincident points are allowed to pile up.

use tracing::info;

use super::{NearbyStars, NodeId, RadiusQuery, TreeError, LEAF_CAPACITY};
use crate::geometry::mercator::{project, BoundingBox, MercatorPoint};
use crate::star::Star;

/// Depth beyond which nodes are no longer split.
const MAX_DEPTH: usize = 48;

/// Quadrant order of the `children` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    TopLeft = 0,
    TopRight = 1,
    BottomLeft = 2,
    BottomRight = 3,
}

#[derive(Debug, Clone)]
struct QuadNode {
    center: [f64; 2],
    width: f64,
    children: [Option<NodeId>; 4],
    points: Vec<usize>,
}

impl QuadNode {
    fn region(&self) -> BoundingBox {
        BoundingBox::centered(self.center[0], self.center[1], self.width)
    }

    fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }
}

#[derive(Debug, Clone)]
pub struct QuadTree {
    width: f64,
    stars: Vec<Star>,
    projected: Vec<MercatorPoint>,
    nodes: Vec<QuadNode>,
    root: NodeId,
}

fn quadrant_of(p: &MercatorPoint, center: [f64; 2]) -> Quadrant {
    match (p.x >= center[0], p.y >= center[1]) {
        (false, true) => Quadrant::TopLeft,
        (true, true) => Quadrant::TopRight,
        (false, false) => Quadrant::BottomLeft,
        (true, false) => Quadrant::BottomRight,
    }
}

fn child_center(center: [f64; 2], width: f64, q: Quadrant) -> [f64; 2] {
    let d = 0.25 * width;
    match q {
        Quadrant::TopLeft => [center[0] - d, center[1] + d],
        Quadrant::TopRight => [center[0] + d, center[1] + d],
        Quadrant::BottomLeft => [center[0] - d, center[1] - d],
        Quadrant::BottomRight => [center[0] + d, center[1] - d],
    }
}

impl QuadTree {
    /// Build over `stars` on a square of side `width`.
    pub fn build(stars: &[Star], width: f64) -> Self {
        let projected = stars.iter().map(|s| project(s, width)).collect::<Vec<_>>();
        let mut tree = Self {
            width,
            stars: stars.to_vec(),
            projected,
            nodes: Vec::new(),
            root: 0,
        };
        let all = (0..stars.len()).collect();
        tree.root = tree.build_node(all, [0.0, 0.0], width, 0);
        info!(
            "Built quad-tree: {} stars, {} nodes, depth {}",
            tree.stars.len(),
            tree.nodes.len(),
            tree.depth()
        );
        tree
    }

    fn build_node(&mut self, points: Vec<usize>, center: [f64; 2], width: f64, depth: usize) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(QuadNode {
            center,
            width,
            children: [None; 4],
            points: Vec::new(),
        });
        if points.len() <= LEAF_CAPACITY || depth >= MAX_DEPTH {
            self.nodes[id].points = points;
            return id;
        }

        let mut buckets: [Vec<usize>; 4] = Default::default();
        for p in points {
            buckets[quadrant_of(&self.projected[p], center) as usize].push(p);
        }
        let quadrants = [
            Quadrant::TopLeft,
            Quadrant::TopRight,
            Quadrant::BottomLeft,
            Quadrant::BottomRight,
        ];
        for (q, bucket) in quadrants.into_iter().zip(buckets) {
            if bucket.is_empty() {
                continue;
            }
            let child = self.build_node(bucket, child_center(center, width, q), 0.5 * width, depth + 1);
            self.nodes[id].children[q as usize] = Some(child);
        }
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

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Children of `node`, in [`Quadrant`] order. Out-of-range nodes have none.
    pub fn children(&self, node: NodeId) -> [Option<NodeId>; 4] {
        self.nodes.get(node).map(|n| n.children).unwrap_or([None; 4])
    }

    /// Length of the longest root-to-leaf path, counting the root as depth 0.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 0)];
        while let Some((id, d)) = stack.pop() {
            deepest = deepest.max(d);
            stack.extend(self.nodes[id].children.iter().flatten().map(|&c| (c, d + 1)));
        }
        deepest
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
            if !query.visits(&node.region()) {
                continue;
            }
            if node.is_leaf() {
                out.extend(
                    node.points
                        .iter()
                        .filter(|&&p| query.accepts(&self.projected[p], &self.stars[p]))
                        .map(|&p| self.stars[p]),
                );
            } else {
                // reversed so quadrants pop in TL, TR, BL, BR order
                stack.extend(node.children.iter().rev().flatten());
            }
        }
        out
    }

    /// Like [`QuadTree::query`], but rejects any starting node other than the root.
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

impl NearbyStars for QuadTree {
    fn nearby_stars(&self, focus: &Star, radius_deg: f64, expected: usize) -> Vec<Star> {
        self.query(focus, radius_deg, expected)
    }
}
