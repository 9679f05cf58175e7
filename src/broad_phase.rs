//! Broad Phase
//!
//! Wraps the [`DynamicTree`] with a move buffer so that only proxies which
//! were created, moved out of their fat AABB or touched are re-paired each
//! step. Pairs are reported once, deduplicated, in ascending proxy order.

use crate::collision::{Aabb, RayCastInput};
use crate::dynamic_bvh::{DynamicTree, NULL_NODE};
use crate::math::Vec2;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Broad-phase pair manager
#[derive(Clone, Debug)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    move_buffer: Vec<u32>,
    pair_buffer: Vec<(u32, u32)>,
}

impl<T: Copy + Default> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> BroadPhase<T> {
    /// Create an empty broad phase
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            move_buffer: Vec::with_capacity(16),
            pair_buffer: Vec::with_capacity(16),
        }
    }

    /// Create a proxy; it is paired on the next [`update_pairs`](Self::update_pairs)
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> u32 {
        let proxy_id = self.tree.create_proxy(aabb, user_data);
        self.buffer_move(proxy_id);
        proxy_id
    }

    /// Destroy a proxy. Its pairs are removed by the contact manager.
    pub fn destroy_proxy(&mut self, proxy_id: u32) {
        self.unbuffer_move(proxy_id);
        self.tree.destroy_proxy(proxy_id);
    }

    /// Move a proxy. It is only re-paired if it left its fat AABB.
    pub fn move_proxy(&mut self, proxy_id: u32, aabb: &Aabb, displacement: Vec2) {
        if self.tree.move_proxy(proxy_id, aabb, displacement) {
            self.buffer_move(proxy_id);
        }
    }

    /// Force the proxy to be re-paired on the next update
    pub fn touch_proxy(&mut self, proxy_id: u32) {
        self.buffer_move(proxy_id);
    }

    /// Fat AABB of a proxy
    #[inline]
    pub fn fat_aabb(&self, proxy_id: u32) -> Aabb {
        self.tree.fat_aabb(proxy_id)
    }

    /// Payload of a proxy
    #[inline]
    pub fn user_data(&self, proxy_id: u32) -> T {
        self.tree.user_data(proxy_id)
    }

    /// True if the fat AABBs of two proxies overlap
    #[inline]
    pub fn test_overlap(&self, proxy_a: u32, proxy_b: u32) -> bool {
        self.tree
            .fat_aabb(proxy_a)
            .overlaps(&self.tree.fat_aabb(proxy_b))
    }

    /// Number of live proxies
    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    /// Number of proxies waiting to be re-paired
    #[inline]
    pub fn move_count(&self) -> usize {
        self.move_buffer.iter().filter(|&&id| id != NULL_NODE).count()
    }

    /// Report every new overlapping pair to `callback` and clear the move
    /// buffer. Each pair is reported once.
    pub fn update_pairs<F: FnMut(T, T)>(&mut self, mut callback: F) {
        self.pair_buffer.clear();

        // Query the tree with each moved proxy
        let tree = &self.tree;
        let pairs = &mut self.pair_buffer;
        for &query_id in &self.move_buffer {
            if query_id == NULL_NODE {
                continue;
            }
            let fat = tree.fat_aabb(query_id);
            tree.query(&fat, |proxy_id| {
                // A proxy cannot form a pair with itself
                if proxy_id != query_id {
                    pairs.push((proxy_id.min(query_id), proxy_id.max(query_id)));
                }
                true
            });
        }
        self.move_buffer.clear();

        // Both proxies may have moved, so a pair can appear twice
        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            callback(self.tree.user_data(a), self.tree.user_data(b));
        }
    }

    /// Visit every proxy whose fat AABB overlaps `aabb`
    #[inline]
    pub fn query<F: FnMut(u32) -> bool>(&self, aabb: &Aabb, callback: F) {
        self.tree.query(aabb, callback);
    }

    /// Ray cast against the proxies (see [`DynamicTree::raycast`])
    #[inline]
    pub fn raycast<F: FnMut(&RayCastInput, u32) -> f32>(&self, input: &RayCastInput, callback: F) {
        self.tree.raycast(input, callback);
    }

    /// Height of the tree
    #[inline]
    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    /// Largest sibling height difference in the tree
    #[inline]
    pub fn tree_balance(&self) -> i32 {
        self.tree.max_balance()
    }

    /// Tree quality metric (total perimeter / root perimeter)
    #[inline]
    pub fn tree_quality(&self) -> f32 {
        self.tree.area_ratio()
    }

    /// Underlying tree
    #[inline]
    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    /// Translate every proxy by `-new_origin`
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        self.tree.shift_origin(new_origin);
    }

    fn buffer_move(&mut self, proxy_id: u32) {
        self.move_buffer.push(proxy_id);
    }

    fn unbuffer_move(&mut self, proxy_id: u32) {
        for id in &mut self.move_buffer {
            if *id == proxy_id {
                *id = NULL_NODE;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0))
    }

    fn collect(bp: &mut BroadPhase<u32>) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        bp.update_pairs(|a, b| out.push((a.min(b), a.max(b))));
        out.sort_unstable();
        out
    }

    #[test]
    fn test_new_pairs_reported_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(&unit(0.0, 0.0), 10u32);
        bp.create_proxy(&unit(0.5, 0.0), 11);
        bp.create_proxy(&unit(5.0, 0.0), 12);

        assert_eq!(collect(&mut bp), vec![(10, 11)]);
        // Nothing moved: no pairs
        assert!(collect(&mut bp).is_empty());
    }

    #[test]
    fn test_touch_proxy_repairs() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&unit(0.0, 0.0), 1u32);
        bp.create_proxy(&unit(0.5, 0.5), 2);
        collect(&mut bp);

        bp.touch_proxy(a);
        assert_eq!(bp.move_count(), 1);
        assert_eq!(collect(&mut bp), vec![(1, 2)]);
    }

    #[test]
    fn test_destroyed_proxy_not_paired() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&unit(0.0, 0.0), 1u32);
        bp.create_proxy(&unit(0.5, 0.5), 2);
        bp.destroy_proxy(a);
        assert!(collect(&mut bp).is_empty());
        assert_eq!(bp.proxy_count(), 1);
    }

    #[test]
    fn test_move_proxy_into_overlap() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&unit(0.0, 0.0), 1u32);
        bp.create_proxy(&unit(10.0, 0.0), 2);
        assert!(collect(&mut bp).is_empty());

        bp.move_proxy(a, &unit(9.5, 0.0), Vec2::new(9.5, 0.0));
        assert_eq!(collect(&mut bp), vec![(1, 2)]);
        assert!(bp.test_overlap(a, 1));
    }
}
