//! Bidirectional contour cursor
//!
//! Walks the vertices of one extruded thread in either direction from a
//! starting vertex. On closed loops the walk wraps across the seam; on
//! open paths it stops at the thread boundary. The cursor never revisits
//! its starting vertex, so a full wrap terminates after yielding every
//! other vertex once.

use crate::arc::Point;

/// Walk direction along the thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// Cursor over the vertices of a single thread
pub struct ContourCursor<'a> {
    points: &'a [Point],
    position: usize,
    remaining: usize,
    direction: ScanDirection,
    wrap: bool,
}

impl<'a> ContourCursor<'a> {
    /// Start a walk at vertex `start`; the first yielded point is its
    /// neighbor in `direction`
    pub fn new(points: &'a [Point], start: usize, direction: ScanDirection, wrap: bool) -> Self {
        Self {
            points,
            position: start,
            remaining: points.len().saturating_sub(1),
            direction,
            wrap,
        }
    }

    /// Next vertex along the walk, `None` once the thread is exhausted
    pub fn next_point(&mut self) -> Option<Point> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.points.len();
        let next = match self.direction {
            ScanDirection::Forward => {
                if self.position + 1 < len {
                    self.position + 1
                } else if self.wrap {
                    0
                } else {
                    return None;
                }
            }
            ScanDirection::Backward => {
                if self.position > 0 {
                    self.position - 1
                } else if self.wrap {
                    len - 1
                } else {
                    return None;
                }
            }
        };
        self.position = next;
        self.remaining -= 1;
        Some(self.points[next])
    }
}
