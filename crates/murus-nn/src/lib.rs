//! murus-nn — neighbor indices for 3D (balanced kd-tree, exact kNN).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use murus_core::{CloudView, Error, Result};
use smallvec::SmallVec;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Neighbor { pub idx: usize, pub dist2: f32 }

impl Neighbor {
    /// Nearest first; equal distances resolved by input order.
    fn rank(&self, other: &Self) -> Ordering {
        self.dist2.total_cmp(&other.dist2).then(self.idx.cmp(&other.idx))
    }
}

impl Eq for Neighbor {}
impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering { self.rank(other) }
}

/// Trait for geometry-first neighborhood queries.
pub trait NeighborIndex3 {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
    fn point(&self, i: usize) -> [f32; 3];

    /// `k` nearest points to `q`, nearest first. `k` is clamped to `len()`.
    fn knn_point(&self, q: [f32; 3], k: usize) -> SmallVec<[Neighbor; 64]>;

    /// kNN around stored point `i`; the point itself is part of the result.
    fn knn(&self, i: usize, k: usize) -> SmallVec<[Neighbor; 64]> { self.knn_point(self.point(i), k) }
}

#[inline]
pub fn dist2(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Points per leaf bucket.
const LEAF_SIZE: usize = 16;

enum Node {
    Leaf { start: usize, end: usize },
    Split { axis: usize, value: f32, left: usize, right: usize },
}

/// Balanced kd-tree over a borrowed cloud. Immutable after build.
///
/// Each split puts coordinates `<= value` left and `>= value` right, so a
/// point equal to the split value may sit on either side; queries descend
/// into the far side whenever it can still hold a tie.
pub struct KdTree<'a> {
    pts: CloudView<'a>,
    perm: Vec<usize>,
    nodes: Vec<Node>,
}

impl<'a> KdTree<'a> {
    pub fn build(pts: CloudView<'a>) -> Result<Self> {
        if pts.is_empty() {
            return Err(Error::invalid("cannot build a neighbor index over an empty cloud"));
        }
        let mut tree = Self { pts, perm: (0..pts.len()).collect(), nodes: Vec::new() };
        tree.build_node(0, pts.len());
        Ok(tree)
    }

    fn coord(&self, i: usize, axis: usize) -> f32 {
        match axis {
            0 => self.pts.x[i],
            1 => self.pts.y[i],
            _ => self.pts.z[i],
        }
    }

    fn build_node(&mut self, start: usize, end: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { start, end });
        if end - start <= LEAF_SIZE {
            return id;
        }

        // split on the widest axis of this node's bounding box
        let mut lo = [f32::INFINITY; 3];
        let mut hi = [f32::NEG_INFINITY; 3];
        for &i in &self.perm[start..end] {
            let p = self.pts.point(i);
            for a in 0..3 {
                lo[a] = lo[a].min(p[a]);
                hi[a] = hi[a].max(p[a]);
            }
        }
        let axis = (0..3)
            .max_by(|&a, &b| (hi[a] - lo[a]).total_cmp(&(hi[b] - lo[b])))
            .unwrap_or(0);
        if !(hi[axis] - lo[axis] > 0.0) {
            // all coincident (or non-finite): one oversized leaf
            return id;
        }

        let mid = start + (end - start) / 2;
        let pts = self.pts;
        let key = |i: &usize| match axis {
            0 => pts.x[*i],
            1 => pts.y[*i],
            _ => pts.z[*i],
        };
        self.perm[start..end].select_nth_unstable_by(mid - start, |a, b| key(a).total_cmp(&key(b)));
        let value = self.coord(self.perm[mid], axis);

        let left = self.build_node(start, mid);
        let right = self.build_node(mid, end);
        self.nodes[id] = Node::Split { axis, value, left, right };
        id
    }

    fn knn_recurse(&self, node: usize, q: [f32; 3], k: usize, heap: &mut BinaryHeap<Neighbor>) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for &i in &self.perm[start..end] {
                    let cand = Neighbor { idx: i, dist2: dist2(q, self.pts.point(i)) };
                    if heap.len() < k {
                        heap.push(cand);
                    } else if heap.peek().is_some_and(|worst| cand < *worst) {
                        heap.pop();
                        heap.push(cand);
                    }
                }
            }
            Node::Split { axis, value, left, right } => {
                let diff = q[axis] - value;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                self.knn_recurse(near, q, k, heap);
                let reach = heap.len() < k || heap.peek().is_some_and(|w| diff * diff <= w.dist2);
                if reach {
                    self.knn_recurse(far, q, k, heap);
                }
            }
        }
    }
}

impl<'a> NeighborIndex3 for KdTree<'a> {
    fn len(&self) -> usize { self.pts.len() }
    fn point(&self, i: usize) -> [f32; 3] { self.pts.point(i) }

    fn knn_point(&self, q: [f32; 3], k: usize) -> SmallVec<[Neighbor; 64]> {
        let k = k.min(self.len());
        if k == 0 {
            return SmallVec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.knn_recurse(0, q, k, &mut heap);
        let mut out: SmallVec<[Neighbor; 64]> = heap.into_vec().into_iter().collect();
        out.sort_unstable();
        out
    }
}
