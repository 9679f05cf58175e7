//! Dynamic AABB Tree (Incremental BVH)
//!
//! A self-balancing binary tree of fat AABBs used as the broad phase. Leaves
//! are proxies; internal nodes bound their two children.
//!
//! # Features
//!
//! - **Incremental updates**: insert/remove/move proxies without full rebuild
//! - **Fat AABBs**: enlarged by `AABB_EXTENSION` plus a predictive
//!   `AABB_MULTIPLIER * displacement` so small motions need no re-insertion
//! - **Tree rotations**: AVL-style balancing keeps queries O(log n)
//! - **Ray casts**: segment/box separating-axis culling with a clipping
//!   fraction supplied by the callback
//! - **Diagnostics**: height, max balance, area ratio, structural validation

use crate::collision::{Aabb, RayCastInput};
use crate::math::{abs, Vec2};
use crate::settings::{AABB_EXTENSION, AABB_MULTIPLIER};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Null node sentinel
pub const NULL_NODE: u32 = u32::MAX;

/// A node in the dynamic AABB tree
#[derive(Clone, Debug)]
pub struct DynamicNode<T> {
    /// Fat AABB
    pub aabb: Aabb,
    /// Parent node index (NULL_NODE if root or free)
    pub parent: u32,
    /// Left child (NULL_NODE if leaf)
    pub left: u32,
    /// Right child (NULL_NODE if leaf)
    pub right: u32,
    /// Height (0 for leaf, -1 for a free node)
    pub height: i32,
    /// Payload of a leaf
    pub user_data: T,
}

impl<T: Copy + Default> DynamicNode<T> {
    fn new_free() -> Self {
        Self {
            aabb: Aabb::default(),
            parent: NULL_NODE,
            left: NULL_NODE,
            right: NULL_NODE,
            height: -1,
            user_data: T::default(),
        }
    }

    /// True for proxy nodes
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }
}

/// Dynamic AABB tree keyed by proxy id
#[derive(Clone, Debug)]
pub struct DynamicTree<T> {
    /// Node pool
    nodes: Vec<DynamicNode<T>>,
    /// Free list (indices of unused nodes)
    free_list: Vec<u32>,
    /// Root node index
    root: u32,
    /// Number of live proxies
    proxy_count: usize,
}

impl<T: Copy + Default> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> DynamicTree<T> {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            proxy_count: 0,
        }
    }

    /// Insert a proxy for a tight AABB; the tree stores it fattened
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> u32 {
        let proxy_id = self.alloc_node();
        let r = Vec2::new(AABB_EXTENSION, AABB_EXTENSION);
        let node = &mut self.nodes[proxy_id as usize];
        node.aabb = Aabb::new(aabb.lower_bound - r, aabb.upper_bound + r);
        node.user_data = user_data;
        node.height = 0;

        self.insert_leaf(proxy_id);
        self.proxy_count += 1;
        proxy_id
    }

    /// Remove a proxy
    pub fn destroy_proxy(&mut self, proxy_id: u32) {
        if !self.is_live_leaf(proxy_id) {
            return;
        }
        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
        self.proxy_count -= 1;
    }

    /// Move a proxy to a new tight AABB with the given swept displacement.
    ///
    /// Returns true if the proxy was re-inserted (its fat AABB changed).
    /// Nothing happens while the old fat AABB still contains `aabb` and is
    /// not grossly oversized.
    pub fn move_proxy(&mut self, proxy_id: u32, aabb: &Aabb, displacement: Vec2) -> bool {
        if !self.is_live_leaf(proxy_id) {
            return false;
        }

        // Extend AABB
        let r = Vec2::new(AABB_EXTENSION, AABB_EXTENSION);
        let mut fat = Aabb::new(aabb.lower_bound - r, aabb.upper_bound + r);

        // Predict AABB movement
        let d = displacement * AABB_MULTIPLIER;
        if d.x < 0.0 {
            fat.lower_bound.x += d.x;
        } else {
            fat.upper_bound.x += d.x;
        }
        if d.y < 0.0 {
            fat.lower_bound.y += d.y;
        } else {
            fat.upper_bound.y += d.y;
        }

        let tree_aabb = self.nodes[proxy_id as usize].aabb;
        if tree_aabb.contains(aabb) {
            // Still contained, but it might be too large after a fast move
            let huge_r = r * 4.0;
            let huge = Aabb::new(fat.lower_bound - huge_r, fat.upper_bound + huge_r);
            if huge.contains(&tree_aabb) {
                return false;
            }
        }

        self.remove_leaf(proxy_id);
        self.nodes[proxy_id as usize].aabb = fat;
        self.insert_leaf(proxy_id);
        true
    }

    /// Payload of a proxy
    #[inline]
    pub fn user_data(&self, proxy_id: u32) -> T {
        self.nodes[proxy_id as usize].user_data
    }

    /// Fat AABB of a proxy
    #[inline]
    pub fn fat_aabb(&self, proxy_id: u32) -> Aabb {
        self.nodes[proxy_id as usize].aabb
    }

    /// Visit every proxy whose fat AABB overlaps `aabb`.
    ///
    /// The callback returns `false` to stop the query.
    pub fn query<F: FnMut(u32) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        if self.root == NULL_NODE {
            return;
        }

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }

            let node = &self.nodes[node_id as usize];
            if !node.aabb.overlaps(aabb) {
                continue;
            }

            if node.is_leaf() {
                if !callback(node_id) {
                    return;
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Cast a ray against the proxies.
    ///
    /// The callback receives the (clipped) input and a proxy id and returns
    /// the new max fraction: `0` terminates, a negative value ignores the
    /// proxy, `input.max_fraction` continues unclipped.
    pub fn raycast<F: FnMut(&RayCastInput, u32) -> f32>(
        &self,
        input: &RayCastInput,
        mut callback: F,
    ) {
        if self.root == NULL_NODE {
            return;
        }

        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalized();

        // v is perpendicular to the segment
        let v = Vec2::scalar_cross(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;

        // Bounding box of the segment
        let segment_aabb = |max_fraction: f32| {
            let t = p1 + (p2 - p1) * max_fraction;
            Aabb::new(p1.min(t), p1.max(t))
        };
        let mut seg = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }

            let node = &self.nodes[node_id as usize];
            if !node.aabb.overlaps(&seg) {
                continue;
            }

            // Separating axis for segment: |dot(v, p1 - c)| > dot(|v|, h)
            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = abs(v.dot(p1 - c)) - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };

                let value = callback(&sub_input, node_id);
                if value == 0.0 {
                    // Client terminated the ray cast
                    return;
                }
                if value > 0.0 {
                    max_fraction = value;
                    seg = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Every live proxy id
    pub fn proxies(&self) -> Vec<u32> {
        (0..self.nodes.len() as u32)
            .filter(|&i| self.is_live_leaf(i))
            .collect()
    }

    /// Box and height of every allocated node, internal nodes included
    pub fn node_aabbs(&self) -> impl Iterator<Item = (&Aabb, i32)> {
        self.nodes
            .iter()
            .filter(|node| node.height >= 0)
            .map(|node| (&node.aabb, node.height))
    }

    /// Number of live proxies
    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Total allocated node count (including internal)
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    /// Height of the root (0 when empty)
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    /// Largest height difference between sibling subtrees
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| {
                let l = self.nodes[n.left as usize].height;
                let r = self.nodes[n.right as usize].height;
                (r - l).abs()
            })
            .max()
            .unwrap_or(0)
    }

    /// Sum of node perimeters divided by the root perimeter
    pub fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root as usize].aabb.perimeter();
        if root_area <= 0.0 {
            return 0.0;
        }
        let total: f32 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();
        total / root_area
    }

    /// Translate every node by `-new_origin`
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        for node in &mut self.nodes {
            node.aabb.lower_bound -= new_origin;
            node.aabb.upper_bound -= new_origin;
        }
    }

    /// Check parent links, heights and bounds of the whole tree
    pub fn validate(&self) -> bool {
        if self.root == NULL_NODE {
            return self.proxy_count == 0;
        }
        if self.nodes[self.root as usize].parent != NULL_NODE {
            return false;
        }
        let free_ok = self
            .free_list
            .iter()
            .all(|&i| self.nodes[i as usize].height == -1);
        free_ok
            && self.validate_node(self.root)
            && self.compute_height(self.root) == self.height()
            && self.node_count() == 2 * self.proxy_count - 1
    }

    // =========== Internal methods ===========

    fn is_live_leaf(&self, proxy_id: u32) -> bool {
        self.nodes
            .get(proxy_id as usize)
            .is_some_and(|n| n.height == 0 && n.is_leaf())
    }

    fn validate_node(&self, index: u32) -> bool {
        let node = &self.nodes[index as usize];
        if node.is_leaf() {
            return node.right == NULL_NODE && node.height == 0;
        }
        let (l, r) = (node.left, node.right);
        let (left, right) = (&self.nodes[l as usize], &self.nodes[r as usize]);
        let height_ok = node.height == 1 + left.height.max(right.height);
        let bounds = left.aabb.combine(&right.aabb);
        let bounds_ok = bounds.lower_bound == node.aabb.lower_bound
            && bounds.upper_bound == node.aabb.upper_bound;
        left.parent == index
            && right.parent == index
            && height_ok
            && bounds_ok
            && self.validate_node(l)
            && self.validate_node(r)
    }

    fn compute_height(&self, index: u32) -> i32 {
        let node = &self.nodes[index as usize];
        if node.is_leaf() {
            0
        } else {
            1 + self
                .compute_height(node.left)
                .max(self.compute_height(node.right))
        }
    }

    fn alloc_node(&mut self) -> u32 {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id as usize] = DynamicNode::new_free();
            id
        } else {
            let id = self.nodes.len() as u32;
            self.nodes.push(DynamicNode::new_free());
            id
        }
    }

    fn free_node(&mut self, node_id: u32) {
        self.nodes[node_id as usize] = DynamicNode::new_free();
        self.free_list.push(node_id);
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Find best sibling using the surface area heuristic
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut sibling = self.root;

        while !self.nodes[sibling as usize].is_leaf() {
            let left = self.nodes[sibling as usize].left;
            let right = self.nodes[sibling as usize].right;

            let area = self.nodes[sibling as usize].aabb.perimeter();
            let combined = leaf_aabb.combine(&self.nodes[sibling as usize].aabb);
            let combined_area = combined.perimeter();

            // Cost of creating a new parent for this node and the new leaf
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down the tree
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost_left = self.child_insertion_cost(left, &leaf_aabb, inheritance_cost);
            let cost_right = self.child_insertion_cost(right, &leaf_aabb, inheritance_cost);

            if cost < cost_left && cost < cost_right {
                break;
            }

            sibling = if cost_left < cost_right { left } else { right };
        }

        // Create new parent
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.alloc_node();
        {
            let sibling_node = &self.nodes[sibling as usize];
            let aabb = leaf_aabb.combine(&sibling_node.aabb);
            let height = sibling_node.height + 1;
            let parent = &mut self.nodes[new_parent as usize];
            parent.parent = old_parent;
            parent.aabb = aabb;
            parent.height = height;
        }

        if old_parent != NULL_NODE {
            if self.nodes[old_parent as usize].left == sibling {
                self.nodes[old_parent as usize].left = new_parent;
            } else {
                self.nodes[old_parent as usize].right = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        self.nodes[new_parent as usize].left = sibling;
        self.nodes[new_parent as usize].right = leaf;
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        // Walk up and fix heights + AABBs + balance
        self.fix_upwards(new_parent);
    }

    fn child_insertion_cost(&self, child: u32, leaf_aabb: &Aabb, inheritance: f32) -> f32 {
        let node = &self.nodes[child as usize];
        let combined = leaf_aabb.combine(&node.aabb);
        if node.is_leaf() {
            combined.perimeter() + inheritance
        } else {
            (combined.perimeter() - node.aabb.perimeter()) + inheritance
        }
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grand_parent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };

        if grand_parent != NULL_NODE {
            // Reconnect sibling to grandparent
            if self.nodes[grand_parent as usize].left == parent {
                self.nodes[grand_parent as usize].left = sibling;
            } else {
                self.nodes[grand_parent as usize].right = sibling;
            }
            self.nodes[sibling as usize].parent = grand_parent;
            self.free_node(parent);

            self.fix_upwards(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
        }
        self.nodes[leaf as usize].parent = NULL_NODE;
    }

    fn fix_upwards(&mut self, start: u32) {
        let mut node_id = start;
        while node_id != NULL_NODE {
            node_id = self.balance(node_id);

            let left = self.nodes[node_id as usize].left;
            let right = self.nodes[node_id as usize].right;

            let lh = self.nodes[left as usize].height;
            let rh = self.nodes[right as usize].height;
            let aabb = self.nodes[left as usize]
                .aabb
                .combine(&self.nodes[right as usize].aabb);
            let node = &mut self.nodes[node_id as usize];
            node.height = 1 + lh.max(rh);
            node.aabb = aabb;

            node_id = node.parent;
        }
    }

    /// Replace `old` by `new` in the child slots of `parent` (or the root)
    fn replace_child(&mut self, parent: u32, old: u32, new: u32) {
        if parent == NULL_NODE {
            self.root = new;
        } else if self.nodes[parent as usize].left == old {
            self.nodes[parent as usize].left = new;
        } else {
            self.nodes[parent as usize].right = new;
        }
    }

    /// AVL-style rotation when the subtrees of `ia` differ in height by
    /// more than one. Returns the new subtree root.
    fn balance(&mut self, ia: u32) -> u32 {
        let a = &self.nodes[ia as usize];
        if a.is_leaf() || a.height < 2 {
            return ia;
        }

        let ib = a.left;
        let ic = a.right;
        let balance = self.nodes[ic as usize].height - self.nodes[ib as usize].height;

        // Rotate C up
        if balance > 1 {
            let i_f = self.nodes[ic as usize].left;
            let ig = self.nodes[ic as usize].right;

            // Swap A and C
            let a_parent = self.nodes[ia as usize].parent;
            self.nodes[ic as usize].left = ia;
            self.nodes[ic as usize].parent = a_parent;
            self.nodes[ia as usize].parent = ic;
            self.replace_child(a_parent, ia, ic);

            let (keep, moved) = if self.nodes[i_f as usize].height > self.nodes[ig as usize].height {
                (i_f, ig)
            } else {
                (ig, i_f)
            };
            self.nodes[ic as usize].right = keep;
            self.nodes[ia as usize].right = moved;
            self.nodes[moved as usize].parent = ia;
            self.refresh(ia, ib, moved);
            self.refresh(ic, ia, keep);
            return ic;
        }

        // Rotate B up
        if balance < -1 {
            let id = self.nodes[ib as usize].left;
            let ie = self.nodes[ib as usize].right;

            // Swap A and B
            let a_parent = self.nodes[ia as usize].parent;
            self.nodes[ib as usize].left = ia;
            self.nodes[ib as usize].parent = a_parent;
            self.nodes[ia as usize].parent = ib;
            self.replace_child(a_parent, ia, ib);

            let (keep, moved) = if self.nodes[id as usize].height > self.nodes[ie as usize].height {
                (id, ie)
            } else {
                (ie, id)
            };
            self.nodes[ib as usize].right = keep;
            self.nodes[ia as usize].left = moved;
            self.nodes[moved as usize].parent = ia;
            self.refresh(ia, ic, moved);
            self.refresh(ib, ia, keep);
            return ib;
        }

        ia
    }

    /// Recompute bounds and height of `node` from two children
    fn refresh(&mut self, node: u32, c1: u32, c2: u32) {
        let aabb = self.nodes[c1 as usize]
            .aabb
            .combine(&self.nodes[c2 as usize].aabb);
        let height = 1 + self.nodes[c1 as usize]
            .height
            .max(self.nodes[c2 as usize].height);
        let n = &mut self.nodes[node as usize];
        n.aabb = aabb;
        n.height = height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_aabb(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0))
    }

    fn query_all(tree: &DynamicTree<u32>, aabb: &Aabb) -> Vec<u32> {
        let mut out = Vec::new();
        tree.query(aabb, |id| {
            out.push(tree.user_data(id));
            true
        });
        out
    }

    #[test]
    fn test_insert_and_query() {
        let mut tree = DynamicTree::new();

        tree.create_proxy(&make_aabb(0.0, 0.0), 0u32);
        tree.create_proxy(&make_aabb(10.0, 10.0), 1);
        tree.create_proxy(&make_aabb(20.0, 20.0), 2);

        assert_eq!(tree.proxy_count(), 3);

        // Query near first proxy
        let results = query_all(&tree, &make_aabb(-1.0, -1.0));
        assert!(results.contains(&0));
        assert!(!results.contains(&2));

        // Query large area
        let all = query_all(
            &tree,
            &Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0)),
        );
        assert_eq!(all.len(), 3);
        assert!(tree.validate());
    }

    #[test]
    fn test_destroy() {
        let mut tree = DynamicTree::new();

        tree.create_proxy(&make_aabb(0.0, 0.0), 0u32);
        let p1 = tree.create_proxy(&make_aabb(5.0, 5.0), 1);
        tree.create_proxy(&make_aabb(10.0, 10.0), 2);

        tree.destroy_proxy(p1);
        assert_eq!(tree.proxy_count(), 2);
        // Double destroy is ignored
        tree.destroy_proxy(p1);
        assert_eq!(tree.proxy_count(), 2);

        let all = query_all(
            &tree,
            &Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0)),
        );
        assert!(!all.contains(&1));
        assert!(tree.validate());
    }

    #[test]
    fn test_move_within_fat_aabb() {
        let mut tree = DynamicTree::new();
        let p0 = tree.create_proxy(&make_aabb(0.0, 0.0), 0u32);

        // Small movement within the fat margin
        let tiny = Aabb::new(Vec2::new(0.05, 0.0), Vec2::new(1.05, 1.0));
        assert!(!tree.move_proxy(p0, &tiny, Vec2::new(0.05, 0.0)));
    }

    #[test]
    fn test_move_reinserts_and_predicts() {
        let mut tree = DynamicTree::new();
        let p0 = tree.create_proxy(&make_aabb(0.0, 0.0), 0u32);

        let far = make_aabb(100.0, 100.0);
        assert!(tree.move_proxy(p0, &far, Vec2::new(1.0, 0.0)));

        let fat = tree.fat_aabb(p0);
        assert!((fat.upper_bound.x - (101.0 + AABB_EXTENSION + 2.0)).abs() < 1e-4);
        assert!((fat.lower_bound.x - (100.0 - AABB_EXTENSION)).abs() < 1e-4);

        let results = query_all(&tree, &make_aabb(99.0, 99.0));
        assert!(results.contains(&0));
    }

    #[test]
    fn test_raycast_clips() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(&make_aabb(2.0, 0.0), 0u32);
        tree.create_proxy(&make_aabb(5.0, 0.0), 1);
        tree.create_proxy(&make_aabb(5.0, 10.0), 2);

        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.5),
            p2: Vec2::new(10.0, 0.5),
            max_fraction: 1.0,
        };
        let mut hits = Vec::new();
        tree.raycast(&input, |sub, id| {
            hits.push(tree.user_data(id));
            // Report a hit at the near face of the box
            let aabb = tree.fat_aabb(id);
            let t = (aabb.lower_bound.x - sub.p1.x) / (sub.p2.x - sub.p1.x);
            t.max(0.0001)
        });
        assert!(hits.contains(&0));
        assert!(!hits.contains(&2));
    }

    #[test]
    fn test_tree_balance() {
        let mut tree = DynamicTree::new();

        // Insert many proxies along a line; rotations keep the tree shallow
        for i in 0..100 {
            tree.create_proxy(&make_aabb(i as f32 * 3.0, 0.0), i as u32);
        }

        assert_eq!(tree.proxy_count(), 100);
        assert!(
            tree.height() < 20,
            "Tree should be balanced, height={}",
            tree.height()
        );
        assert!(tree.max_balance() <= 2);
        assert!(tree.area_ratio() >= 1.0);
        assert!(tree.validate());
    }

    #[test]
    fn test_shift_origin() {
        let mut tree = DynamicTree::new();
        let p = tree.create_proxy(&make_aabb(10.0, 10.0), 7u32);
        tree.shift_origin(Vec2::new(10.0, 10.0));
        let results = query_all(&tree, &make_aabb(0.0, 0.0));
        assert_eq!(results, vec![7]);
        assert!((tree.fat_aabb(p).lower_bound.x + AABB_EXTENSION).abs() < 1e-5);
    }

    #[test]
    fn test_empty_tree() {
        let tree: DynamicTree<u32> = DynamicTree::new();
        assert_eq!(tree.proxy_count(), 0);
        assert_eq!(tree.height(), 0);
        assert!(query_all(&tree, &make_aabb(0.0, 0.0)).is_empty());
        assert!(tree.validate());
    }
}
