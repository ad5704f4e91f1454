//! Run progress and long-task notices.

use crate::quality::QualityPreset;
use crate::status::StatusSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Delays after run start at which the long-task notices fire.
pub const LONG_TASK_DELAYS: [Duration; 2] = [Duration::from_secs(15), Duration::from_secs(45)];

/// Counts finished work units against a fixed total.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    processed: usize,
}

impl ProgressTracker {
    /// A zero total is treated as one unit.
    pub fn new(total: usize) -> Self {
        Self {
            total: total.max(1),
            processed: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Rounded percentage, never above 100.
    pub fn percent(&self) -> u8 {
        let pct = (self.processed as f64 / self.total as f64 * 100.0).round();
        pct.min(100.0) as u8
    }

    /// Mark one unit done and report the new percentage.
    pub fn advance(&mut self, sink: &dyn StatusSink) -> u8 {
        self.processed += 1;
        let pct = self.percent();
        sink.progress(pct);
        pct
    }
}

/// Posts the preset's waiting messages while a run is active.
///
/// Dropping the guard cancels any notice that has not fired yet.
#[derive(Debug)]
pub struct LongTaskMonitor {
    timers: Vec<JoinHandle<()>>,
}

impl LongTaskMonitor {
    /// Arm both timers. Must be called from within a tokio runtime.
    pub fn start(preset: &'static QualityPreset, sink: Arc<dyn StatusSink>) -> Self {
        let tone = preset.run_tone();
        let timers = LONG_TASK_DELAYS
            .into_iter()
            .zip([preset.after_15s, preset.after_45s])
            .filter(|(_, message)| !message.is_empty())
            .map(|(delay, message)| {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    debug!("Run still active after {:?}", delay);
                    sink.status(message, tone);
                })
            })
            .collect();
        Self { timers }
    }

    pub fn cancel(self) {}
}

impl Drop for LongTaskMonitor {
    fn drop(&mut self) {
        for timer in &self.timers {
            timer.abort();
        }
    }
}
