//! Progress thresholds.

/// Completion counter that yields each percentage threshold exactly once
#[derive(Debug)]
pub(crate) struct JobProgress {
    total_items: usize,
    completed_items: usize,
    step: u16,
    /// Next threshold to announce; above 100 once 100 has been announced
    next_threshold: u16,
}

impl JobProgress {
    pub(crate) fn new(total_items: usize, step: u8) -> Self {
        let step = u16::from(step.clamp(1, 100));
        Self {
            total_items,
            completed_items: 0,
            step,
            next_threshold: step,
        }
    }

    pub(crate) fn completed_items(&self) -> usize {
        self.completed_items
    }

    /// Whole percentage of items completed, rounded down
    pub(crate) fn percent(&self) -> u16 {
        if self.total_items == 0 {
            return 100;
        }
        // usize -> u128 cannot overflow the multiplication
        let pct = (self.completed_items as u128 * 100) / self.total_items as u128;
        pct.min(100) as u16
    }

    /// Count one more completed item and return every threshold it crossed, ascending
    ///
    /// A single completion can cross several thresholds when there are fewer than
    /// `100 / step` items. The last threshold is always 100, even when `step` does not
    /// divide 100.
    pub(crate) fn record_completion(&mut self) -> Vec<u8> {
        self.completed_items = (self.completed_items + 1).min(self.total_items);
        let percent = self.percent();

        let mut crossed = Vec::new();
        while self.next_threshold <= 100 && percent >= self.next_threshold {
            crossed.push(self.next_threshold as u8);
            self.next_threshold = if self.next_threshold == 100 {
                101
            } else {
                (self.next_threshold + self.step).min(100)
            };
        }
        crossed
    }
}
