use glam::Vec2;
use std::collections::VecDeque;

/// Bounded history of comet positions, oldest first.
///
/// Position in the buffer encodes age: the trail renderer tapers width and
/// opacity by index, so insertion order must be preserved.
#[derive(Debug, Clone)]
pub struct TrailBuffer {
    points: VecDeque<Vec2>,
    capacity: usize,
}

impl TrailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a point, dropping the oldest once over capacity
    pub fn push(&mut self, point: Vec2) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Vec2> {
        self.points.iter()
    }

    /// Consecutive (older, newer) pairs with their 1-based index of the newer point
    pub fn segments(&self) -> impl Iterator<Item = (usize, Vec2, Vec2)> + '_ {
        self.points
            .iter()
            .zip(self.points.iter().skip(1))
            .enumerate()
            .map(|(i, (a, b))| (i + 1, *a, *b))
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
