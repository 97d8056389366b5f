//! Resource Monitor Thread - periodic host sampling.
//!
//! Samples on a crossbeam ticker, evaluates the sample against the
//! [`ResourceMonitor`] and forwards every report to the session worker.
//! Frame rate is derived from a frame counter shared with the runner.
//!
//! After `stop()` the liveness flag is checked before each evaluation, so no
//! report or event fires once teardown has begun.

use crossbeam_channel::{Sender, bounded, select, tick};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::core::clock::SessionClock;
use crate::error::{Result, ScanError};
use crate::resources::{ResourceMonitor, ResourceReport, ResourceSampler};

/// Resource Monitor Thread handle.
pub struct ResourceMonitorThread {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
    shutdown: Sender<()>,
}

impl ResourceMonitorThread {
    /// Spawn the monitor thread.
    ///
    /// Subscribe to `monitor.publisher()` before handing the monitor over.
    pub fn spawn(
        sampler: Box<dyn ResourceSampler>,
        monitor: ResourceMonitor,
        clock: SessionClock,
        frames: Arc<AtomicU64>,
        reports: Sender<ResourceReport>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown, shutdown_rx) = bounded::<()>(1);

        let period = Duration::from_millis(monitor.config().sample_period_ms.max(1));
        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("resource-monitor".into())
            .spawn(move || {
                let ticker = tick(period);
                let mut state = MonitorLoop {
                    sampler,
                    monitor,
                    clock,
                    frames,
                    last_count: 0,
                    last_tick: Instant::now(),
                };
                log::info!("Resource monitor started ({}ms period)", period.as_millis());
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if !thread_running.load(Ordering::Acquire) {
                                break;
                            }
                            let Some(report) = state.tick(&thread_running) else {
                                continue;
                            };
                            if reports.send(report).is_err() {
                                log::debug!("Resource monitor: report receiver gone");
                                break;
                            }
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                log::info!("Resource monitor stopped");
            })
            .map_err(|e| ScanError::Unrecoverable(format!("spawn resource monitor: {e}")))?;

        Ok(Self {
            handle,
            running,
            shutdown,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clear the liveness flag, wake the loop and wait for it to exit.
    pub fn stop(self) -> thread::Result<()> {
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown.try_send(());
        self.handle.join()
    }
}

struct MonitorLoop {
    sampler: Box<dyn ResourceSampler>,
    monitor: ResourceMonitor,
    clock: SessionClock,
    frames: Arc<AtomicU64>,
    last_count: u64,
    last_tick: Instant,
}

impl MonitorLoop {
    fn tick(&mut self, running: &AtomicBool) -> Option<ResourceReport> {
        let mut metrics = match self.sampler.sample() {
            Ok(metrics) => metrics,
            Err(e) => {
                log::warn!("Resource monitor: sample failed: {}", e);
                return None;
            }
        };

        let now = Instant::now();
        let count = self.frames.load(Ordering::Relaxed);
        let elapsed = now.duration_since(self.last_tick).as_secs_f32();
        if elapsed > 0.0 {
            metrics.frame_rate = count.saturating_sub(self.last_count) as f32 / elapsed;
        }
        self.last_count = count;
        self.last_tick = now;
        metrics.timestamp_us = self.clock.now_us();

        // Sampling can take a while; teardown may have started meanwhile
        if !running.load(Ordering::Acquire) {
            return None;
        }
        let report = self.monitor.evaluate(metrics);
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "Resource sample: cpu {:.2}, mem {:.0}MB, thermal {}, {:.1} fps",
                metrics.cpu_usage,
                metrics.memory_usage_mb,
                metrics.thermal_state,
                metrics.frame_rate
            );
        }
        Some(report)
    }
}
