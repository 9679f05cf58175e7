//! Discrete Voronoi Diagram
//!
//! Rasterizes generator points onto a grid, floods every cell with its
//! nearest generator and reports the triangles of the dual (Delaunay-like)
//! graph: every 2x2 cell block touching three distinct generators yields
//! one triad. Used to build elastic particle triads.

use crate::math::{floor, Vec2};

#[cfg(not(feature = "std"))]
use alloc::{collections::VecDeque, vec::Vec};
#[cfg(feature = "std")]
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug)]
struct Generator {
    center: Vec2,
    tag: usize,
}

#[derive(Clone, Copy, Debug)]
struct Task {
    x: usize,
    y: usize,
    cell: usize,
    generator: usize,
}

/// Grid-based Voronoi diagram over tagged points
#[derive(Debug, Default)]
pub(crate) struct VoronoiDiagram {
    generators: Vec<Generator>,
    count_x: usize,
    count_y: usize,
    /// Generator index per cell
    diagram: Vec<Option<usize>>,
}

impl VoronoiDiagram {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generators: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn add_generator(&mut self, center: Vec2, tag: usize) {
        self.generators.push(Generator { center, tag });
    }

    /// Fill the grid with cells of size `radius`
    pub fn generate(&mut self, radius: f32) {
        if self.generators.is_empty() || radius <= 0.0 {
            return;
        }
        let inverse_radius = 1.0 / radius;
        let mut lower = Vec2::new(f32::MAX, f32::MAX);
        let mut upper = Vec2::new(-f32::MAX, -f32::MAX);
        for g in &self.generators {
            lower = lower.min(g.center);
            upper = upper.max(g.center);
        }
        self.count_x = 1 + floor(inverse_radius * (upper.x - lower.x)) as usize;
        self.count_y = 1 + floor(inverse_radius * (upper.y - lower.y)) as usize;
        let (count_x, count_y) = (self.count_x, self.count_y);
        self.diagram = vec![None; count_x * count_y];

        // Flood-fill the diagram from every generator cell
        let mut queue = VecDeque::with_capacity(count_x * count_y);
        for (k, g) in self.generators.iter_mut().enumerate() {
            g.center = (g.center - lower) * inverse_radius;
            let x = (g.center.x.max(0.0) as usize).min(count_x - 1);
            let y = (g.center.y.max(0.0) as usize).min(count_y - 1);
            queue.push_back(Task {
                x,
                y,
                cell: x + y * count_x,
                generator: k,
            });
        }
        while let Some(task) = queue.pop_front() {
            if self.diagram[task.cell].is_none() {
                self.diagram[task.cell] = Some(task.generator);
                self.push_neighbors(&mut queue, task, task.generator);
            }
        }

        // Seed the boundaries between cells of different generators
        for y in 0..count_y {
            for x in 0..count_x.saturating_sub(1) {
                let i = x + y * count_x;
                let (a, b) = (self.diagram[i], self.diagram[i + 1]);
                if let (Some(a), Some(b)) = (a, b) {
                    if a != b {
                        queue.push_back(Task { x, y, cell: i, generator: b });
                        queue.push_back(Task {
                            x: x + 1,
                            y,
                            cell: i + 1,
                            generator: a,
                        });
                    }
                }
            }
        }
        for y in 0..count_y.saturating_sub(1) {
            for x in 0..count_x {
                let i = x + y * count_x;
                let (a, b) = (self.diagram[i], self.diagram[i + count_x]);
                if let (Some(a), Some(b)) = (a, b) {
                    if a != b {
                        queue.push_back(Task { x, y, cell: i, generator: b });
                        queue.push_back(Task {
                            x,
                            y: y + 1,
                            cell: i + count_x,
                            generator: a,
                        });
                    }
                }
            }
        }

        // Let closer generators take over cells near the boundaries
        while let Some(task) = queue.pop_front() {
            let Some(a) = self.diagram[task.cell] else {
                continue;
            };
            let b = task.generator;
            if a != b {
                let p = Vec2::new(task.x as f32, task.y as f32);
                let da = p.distance_squared(self.generators[a].center);
                let db = p.distance_squared(self.generators[b].center);
                if da > db {
                    self.diagram[task.cell] = Some(b);
                    self.push_neighbors(&mut queue, task, b);
                }
            }
        }
    }

    fn push_neighbors(&self, queue: &mut VecDeque<Task>, task: Task, generator: usize) {
        let count_x = self.count_x;
        if task.x > 0 {
            queue.push_back(Task {
                x: task.x - 1,
                y: task.y,
                cell: task.cell - 1,
                generator,
            });
        }
        if task.y > 0 {
            queue.push_back(Task {
                x: task.x,
                y: task.y - 1,
                cell: task.cell - count_x,
                generator,
            });
        }
        if task.x + 1 < count_x {
            queue.push_back(Task {
                x: task.x + 1,
                y: task.y,
                cell: task.cell + 1,
                generator,
            });
        }
        if task.y + 1 < self.count_y {
            queue.push_back(Task {
                x: task.x,
                y: task.y + 1,
                cell: task.cell + count_x,
                generator,
            });
        }
    }

    /// Report the tags of every triangle of neighboring cells
    pub fn for_each_triangle<F: FnMut(usize, usize, usize)>(&self, mut callback: F) {
        let count_x = self.count_x;
        for y in 0..self.count_y.saturating_sub(1) {
            for x in 0..count_x.saturating_sub(1) {
                let i = x + y * count_x;
                let cells = (
                    self.diagram[i],
                    self.diagram[i + 1],
                    self.diagram[i + count_x],
                    self.diagram[i + 1 + count_x],
                );
                let (Some(a), Some(b), Some(c), Some(d)) = cells else {
                    continue;
                };
                if b != c {
                    let tag = |g: usize| self.generators[g].tag;
                    if a != b && a != c {
                        callback(tag(a), tag(b), tag(c));
                    }
                    if d != b && d != c {
                        callback(tag(b), tag(d), tag(c));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_points_make_one_triangle() {
        let mut diagram = VoronoiDiagram::with_capacity(3);
        diagram.add_generator(Vec2::new(0.0, 0.0), 10);
        diagram.add_generator(Vec2::new(1.0, 0.0), 11);
        diagram.add_generator(Vec2::new(0.5, 1.0), 12);
        diagram.generate(0.1);
        let mut triangles = Vec::new();
        diagram.for_each_triangle(|a, b, c| {
            let mut t = [a, b, c];
            t.sort_unstable();
            triangles.push(t);
        });
        assert!(!triangles.is_empty());
        assert!(triangles.iter().all(|t| *t == [10, 11, 12]));
    }

    #[test]
    fn test_square_lattice_triangulated() {
        let mut diagram = VoronoiDiagram::with_capacity(9);
        for j in 0..3 {
            for i in 0..3 {
                diagram.add_generator(Vec2::new(i as f32, j as f32), i + 3 * j);
            }
        }
        diagram.generate(0.5);
        let mut count = 0;
        diagram.for_each_triangle(|a, b, c| {
            assert!(a != b && b != c && a != c);
            count += 1;
        });
        // Four lattice squares, two triangles each
        assert!(count >= 8);
    }

    #[test]
    fn test_empty_diagram_reports_nothing() {
        let mut diagram = VoronoiDiagram::default();
        diagram.generate(1.0);
        let mut called = false;
        diagram.for_each_triangle(|_, _, _| called = true);
        assert!(!called);
    }
}
