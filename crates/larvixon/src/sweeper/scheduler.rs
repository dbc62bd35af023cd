//! Periodic retention sweeps on a background thread, with manual trigger
//! via broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use super::RetentionSweeper;

pub struct SweepScheduler {
    sweeper: Arc<RetentionSweeper>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl SweepScheduler {
    pub fn new(sweeper: Arc<RetentionSweeper>, interval: Duration) -> Self {
        Self {
            sweeper,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the sweep loop in a background thread.
    /// Accepts a trigger receiver for manual sweep requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let sweeper = Arc::clone(&self.sweeper);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to start sweep scheduler runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut interval_timer = tokio::time::interval(interval);
                interval_timer.tick().await; // skip immediate first tick

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual retention sweep triggered");
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    match sweeper.sweep(Utc::now()) {
                        Ok(report) if !report.failures.is_empty() => {
                            log::warn!(
                                "Retention sweep: {} pruned, {} asset deletions failed",
                                report.pruned,
                                report.failures.len()
                            );
                        }
                        Err(e) => log::error!("Retention sweep failed: {}", e),
                        _ => {}
                    }
                }
            });
        })
    }

    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
