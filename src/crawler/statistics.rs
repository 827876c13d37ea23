use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Statistics {
    pub num_rounds: Arc<AtomicUsize>,
    pub num_round_errors: Arc<AtomicUsize>,
    pub num_detail_fetches: Arc<AtomicUsize>,
    pub num_detail_errors: Arc<AtomicUsize>,
    pub num_tagged: Arc<AtomicUsize>,
}

/// Point-in-time copy of [`Statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatisticsSnapshot {
    pub rounds: usize,
    pub round_errors: usize,
    pub detail_fetches: usize,
    pub detail_errors: usize,
    pub tagged: usize,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            num_rounds: Arc::new(AtomicUsize::new(0)),
            num_round_errors: Arc::new(AtomicUsize::new(0)),
            num_detail_fetches: Arc::new(AtomicUsize::new(0)),
            num_detail_errors: Arc::new(AtomicUsize::new(0)),
            num_tagged: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Statistics {
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            rounds: self.num_rounds.load(Ordering::Relaxed),
            round_errors: self.num_round_errors.load(Ordering::Relaxed),
            detail_fetches: self.num_detail_fetches.load(Ordering::Relaxed),
            detail_errors: self.num_detail_errors.load(Ordering::Relaxed),
            tagged: self.num_tagged.load(Ordering::Relaxed),
        }
    }

    pub fn write_to_log(&self, running_time: Duration) {
        let stats = self.snapshot();
        tracing::info!(
            num_rounds = stats.rounds,
            num_round_errors = stats.round_errors,
            num_detail_fetches = stats.detail_fetches,
            num_detail_errors = stats.detail_errors,
            num_tagged = stats.tagged,
            running_time = ?running_time,
            "statistics"
        );
    }
}
