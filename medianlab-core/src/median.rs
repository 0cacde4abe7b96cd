//! Incremental median over a stream of prices.
//!
//! Two heaps split the values at the median: `lower` is max-ordered and holds
//! the smaller half, `upper` is min-ordered and holds the larger half, with
//! `len(lower) - len(upper)` always 0 or 1. Each `add` is O(log n).
//!
//! `is_changed()` is edge-triggered: it describes only the most recent `add`.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Totally ordered f64 for heap storage.
#[derive(Debug, Clone, Copy)]
struct Price(f64);

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Price {}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// How a new median is compared with the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ChangePolicy {
    /// Bit-for-bit inequality.
    #[default]
    Exact,
    /// Changed only when the absolute difference exceeds the tolerance.
    Tolerance(f64),
}

impl ChangePolicy {
    /// `Exact` for a zero (or negative) tolerance.
    pub fn from_tolerance(tolerance: f64) -> Self {
        if tolerance > 0.0 {
            ChangePolicy::Tolerance(tolerance)
        } else {
            ChangePolicy::Exact
        }
    }

    fn differs(self, previous: f64, current: f64) -> bool {
        match self {
            ChangePolicy::Exact => previous != current,
            ChangePolicy::Tolerance(eps) => (current - previous).abs() > eps,
        }
    }
}

/// Running median with a "changed on last insert" flag.
#[derive(Debug, Clone, Default)]
pub struct MedianAggregate {
    lower: BinaryHeap<Price>,
    upper: BinaryHeap<Reverse<Price>>,
    median: Option<f64>,
    changed: bool,
    policy: ChangePolicy,
}

impl MedianAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate that ignores median moves of at most `tolerance`.
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            policy: ChangePolicy::from_tolerance(tolerance),
            ..Self::default()
        }
    }

    pub fn policy(&self) -> ChangePolicy {
        self.policy
    }

    /// Insert a value and recompute the median.
    pub fn add(&mut self, value: f64) {
        match self.lower.peek() {
            Some(top) if value > top.0 => self.upper.push(Reverse(Price(value))),
            _ => self.lower.push(Price(value)),
        }
        self.rebalance();

        let current = self.compute();
        self.changed = match self.median {
            None => true,
            Some(previous) => self.policy.differs(previous, current),
        };
        self.median = Some(current);
    }

    fn rebalance(&mut self) {
        if self.lower.len() > self.upper.len() + 1 {
            if let Some(top) = self.lower.pop() {
                self.upper.push(Reverse(top));
            }
        } else if self.upper.len() > self.lower.len() {
            if let Some(Reverse(top)) = self.upper.pop() {
                self.lower.push(top);
            }
        }
    }

    fn compute(&self) -> f64 {
        match (self.lower.peek(), self.upper.peek()) {
            (Some(lo), Some(Reverse(hi))) if self.lower.len() == self.upper.len() => {
                (lo.0 + hi.0) / 2.0
            }
            (Some(lo), _) => lo.0,
            // add() always leaves lower non-empty.
            (None, _) => f64::NAN,
        }
    }

    /// Median after the most recent `add`; `None` before the first one.
    pub fn median(&self) -> Option<f64> {
        self.median
    }

    /// Whether the most recent `add` moved the median.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn count(&self) -> usize {
        self.lower.len() + self.upper.len()
    }

    pub fn has_values(&self) -> bool {
        !self.lower.is_empty()
    }
}
