/// Tracks the best validation score across epochs.
///
/// A new observation counts as best only on strict improvement, so ties keep
/// the earlier checkpoint.
#[derive(Debug, Clone)]
pub struct BestTracker {
    best: f32,
}

impl BestTracker {
    pub fn new() -> Self {
        Self { best: 0.0 }
    }

    /// Records a validation score and reports whether it is a new best.
    pub fn observe(&mut self, score: f32) -> bool {
        if score > self.best {
            self.best = score;
            true
        } else {
            false
        }
    }

    pub fn best(&self) -> f32 {
        self.best
    }
}

impl Default for BestTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counters for one training epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochStats {
    correct: f32,
    seen: usize,
    batches: usize,
}

impl EpochStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&mut self, correct: f32, batch_size: usize) {
        self.correct += correct;
        self.seen += batch_size;
        self.batches += 1;
    }

    pub fn accuracy(&self) -> f32 {
        if self.seen == 0 {
            0.0
        } else {
            self.correct / self.seen as f32
        }
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn samples(&self) -> usize {
        self.seen
    }
}
