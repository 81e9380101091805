//! A fixed-capacity circular buffer, used to fold a higher-order Markov chain into a first-order
//! one.
//!
//! A chain of order $k$ conditions every state on the $k$ states before it. Combining each run of
//! $k$ consecutive states into one label turns it into an ordinary first-order chain over those
//! combined labels.

/// Holds the last `capacity` labels pushed into it.
#[derive(Clone, Debug)]
pub struct SlidingWindow<L> {
    capacity: usize,
    buffer: Vec<L>,
    // Position of the oldest label once the buffer is full
    oldest: usize,
}

impl<L: Clone> SlidingWindow<L> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity),
            oldest: 0,
        }
    }

    /// Append `label`, overwriting the oldest label if the window is full. A window with capacity
    /// zero stays empty.
    pub fn push(&mut self, label: L) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() < self.capacity {
            self.buffer.push(label);
        } else {
            self.buffer[self.oldest] = label;
            self.oldest = (self.oldest + 1) % self.capacity;
        }
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &L> + '_ {
        self.buffer[self.oldest..]
            .iter()
            .chain(self.buffer[..self.oldest].iter())
    }

    /// The current contents, oldest first.
    pub fn snapshot(&self) -> Vec<L> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Fold `labels` into its `order`-long runs: a sequence of length $n$ yields $n - order + 1$
/// combined labels, each one shifted by one position. Sequences shorter than `order`, or an
/// `order` of zero, yield nothing.
pub fn combined_states<L: Clone>(labels: &[L], order: usize) -> Vec<Vec<L>> {
    if order == 0 {
        return Vec::new();
    }
    let mut window = SlidingWindow::new(order);
    let mut combined = Vec::with_capacity((labels.len() + 1).saturating_sub(order));
    for label in labels {
        window.push(label.clone());
        if window.is_full() {
            combined.push(window.snapshot());
        }
    }
    combined
}
