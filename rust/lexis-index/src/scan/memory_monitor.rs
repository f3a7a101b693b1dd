use std::sync::Arc;

use lexis_budget_tracker::Budget;

use crate::scan::ScanConfig;

/// Source of the available-memory fraction sampled by a [`MemoryMonitor`].
pub trait MemoryProbe: Send + Sync {
    /// Fraction of the memory ceiling that is still available, in `[0, 1]`.
    fn available_fraction(&self) -> f64;
}

impl MemoryProbe for Budget {
    fn available_fraction(&self) -> f64 {
        Budget::available_fraction(self)
    }
}

/// Outcome of a memory check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryVerdict {
    /// Enough memory is available.
    Healthy,
    /// Memory was low, but compaction freed enough of it.
    Recovered,
    /// Memory is still low after compaction; the accumulator must be flushed.
    Flush,
}

/// Samples available memory every `memory_check_interval` documents.
pub struct MemoryMonitor {
    probe: Arc<dyn MemoryProbe>,
    interval: usize,
    compaction_threshold: f64,
    flush_threshold: f64,
    since_check: usize,
}

impl MemoryMonitor {
    pub fn new(probe: Arc<dyn MemoryProbe>, config: &ScanConfig) -> MemoryMonitor {
        MemoryMonitor {
            probe,
            interval: config.memory_check_interval,
            compaction_threshold: config.compaction_threshold,
            flush_threshold: config.flush_threshold,
            since_check: 0,
        }
    }

    pub fn set_probe(&mut self, probe: Arc<dyn MemoryProbe>) {
        self.probe = probe;
    }

    /// Counts a completed document. Returns `true` when a check is due.
    pub fn document_done(&mut self) -> bool {
        self.since_check += 1;
        if self.since_check >= self.interval {
            self.since_check = 0;
            true
        } else {
            false
        }
    }

    /// Samples available memory. Below the compaction threshold, `compact` is run
    /// and memory is sampled again; if it is then below the flush threshold the
    /// verdict is [`MemoryVerdict::Flush`].
    pub fn check(&mut self, compact: impl FnOnce()) -> MemoryVerdict {
        let available = self.probe.available_fraction();
        if available >= self.compaction_threshold {
            return MemoryVerdict::Healthy;
        }
        log::debug!(
            "available memory {:.1}% is below {:.1}%, compacting",
            available * 100.0,
            self.compaction_threshold * 100.0
        );
        compact();
        let available = self.probe.available_fraction();
        if available < self.flush_threshold {
            log::debug!(
                "available memory {:.1}% after compaction, flushing",
                available * 100.0
            );
            MemoryVerdict::Flush
        } else {
            MemoryVerdict::Recovered
        }
    }
}
