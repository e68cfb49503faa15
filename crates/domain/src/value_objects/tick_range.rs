use serde::{Deserialize, Serialize};
use std::fmt;

/// A position range expressed in the pool's discrete price steps (bins or ticks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

impl TickRange {
    pub fn new(lower: i32, upper: i32) -> Self {
        Self { lower, upper }
    }

    /// Builds `[center - half_width, center + half_width]`, saturating at the `i32` bounds.
    pub fn centered(center: i32, half_width: i32) -> Self {
        Self {
            lower: center.saturating_sub(half_width),
            upper: center.saturating_add(half_width),
        }
    }

    pub fn contains(&self, index: i32) -> bool {
        index >= self.lower && index <= self.upper
    }

    /// Strict containment, the invariant a freshly placed range must satisfy.
    pub fn strictly_contains(&self, index: i32) -> bool {
        index > self.lower && index < self.upper
    }

    pub fn center(&self) -> i32 {
        self.lower + (self.upper - self.lower) / 2
    }

    pub fn width(&self) -> i32 {
        self.upper - self.lower
    }
}

impl fmt::Display for TickRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_range() {
        let range = TickRange::centered(100, 10);
        assert_eq!(range, TickRange::new(90, 110));
        assert_eq!(range.center(), 100);
        assert_eq!(range.width(), 20);
        assert!(range.strictly_contains(100));
        assert!(range.contains(110));
        assert!(!range.strictly_contains(110));
    }

    #[test]
    fn test_negative_center() {
        let range = TickRange::centered(-7, 3);
        assert_eq!(range, TickRange::new(-10, -4));
        assert_eq!(range.center(), -7);
        assert_eq!(range.to_string(), "[-10, -4]");
    }
}
