use std::collections::VecDeque;

/// Fixed-capacity FIFO of per-epoch validation-loss means, oldest first.
///
/// Pushing into a full window drops the oldest entry. Nothing else ever
/// removes an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl ValidationWindow {
    /// Creates an empty window holding at most `capacity` epochs.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    /// Builds a window from oldest-first values, keeping only the newest
    /// `capacity` of them.
    pub fn from_values(capacity: usize, values: impl IntoIterator<Item = f64>) -> Self {
        let mut window = Self::new(capacity);
        for value in values {
            window.push(value);
        }
        window
    }

    /// Appends a validation-epoch mean, sliding out the oldest when full.
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Current contents, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    /// Iterates the contents, oldest first, without allocating.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Newest epoch mean.
    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the next push will evict the oldest entry.
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// Maximum number of epochs retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Full-capacity contents with absent slots zero-filled at the end.
    pub fn padded(&self) -> Vec<f64> {
        let mut out = self.values();
        out.resize(self.capacity, 0.0);
        out
    }
}
