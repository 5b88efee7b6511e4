//! Download progress bookkeeping. Rendering belongs to the caller.

use std::time::Instant;

/// Receives cumulative byte counts, one update per written chunk. Only
/// invoked when the server declared a content length.
pub trait ProgressSink: Send + Sync {
    fn advance(&self, current: u64, total: u64);
}

/// Byte-count state for one download.
#[derive(Debug)]
pub struct Progress {
    total: Option<u64>,
    current: u64,
    started: Instant,
}

impl Progress {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total,
            current: 0,
            started: Instant::now(),
        }
    }

    pub fn set(&mut self, current: u64) {
        self.current = current;
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.current as f64 * 100.0 / total as f64),
            _ => None,
        }
    }

    pub fn rate_bytes_per_sec(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current as f64 / elapsed
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_with_known_total() {
        let mut progress = Progress::new(Some(200));
        progress.set(50);
        assert_eq!(progress.percent(), Some(25.0));
        progress.set(200);
        assert_eq!(progress.percent(), Some(100.0));
    }

    #[test]
    fn test_percent_unknown_total() {
        let mut progress = Progress::new(None);
        progress.set(1024);
        assert_eq!(progress.percent(), None);

        let zero_total = Progress::new(Some(0));
        assert_eq!(zero_total.percent(), None);
    }

    #[test]
    fn test_rate_is_finite() {
        let mut progress = Progress::new(Some(100));
        progress.set(100);
        assert!(progress.rate_bytes_per_sec().is_finite());
    }
}
