//! Session Runner - owns a [`ScanSession`] on its own worker thread.
//!
//! ```text
//!   submit(frame) ──▶ FrameGate ──▶ frame channel (1) ──┐
//!                       │ busy: drop                   ├─▶ worker: select!
//!   ResourceMonitorThread ──▶ report channel ───────────┤     ScanSession
//!   pause/resume/stop ──▶ command channel ─────────────┘
//! ```
//!
//! At most one frame is in flight. A frame submitted while the previous one
//! is still being processed is dropped, never queued.

use crossbeam_channel::{Receiver, Sender, after, bounded, never, select, unbounded};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::adaptive::QualitySettings;
use crate::core::clock::SessionClock;
use crate::core::types::{Frame, ScanningMode, ScanningState};
use crate::error::{Result, ScanError};
use crate::resources::ResourceReport;
use crate::session::{FrameOutcome, ScanSession, SessionStats, SessionSummary};

/// Single-slot admission control for frames.
#[derive(Debug, Default)]
pub struct FrameGate {
    busy: AtomicBool,
    dropped: AtomicU64,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. Counts a drop and returns false when it is taken.
    pub fn try_acquire(&self) -> bool {
        let acquired = self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !acquired {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        acquired
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Drops since the last call.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

/// Snapshot of the session, refreshed after every frame and command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerStatus {
    pub state: ScanningState,
    pub mode: Option<ScanningMode>,
    pub settings: QualitySettings,
    pub stats: SessionStats,
    pub last_outcome: Option<FrameOutcome>,
}

enum Command {
    Pause(Sender<Result<()>>),
    Resume(Sender<Result<()>>),
    Stop(Sender<Result<SessionSummary>>),
}

/// Session Runner handle.
pub struct SessionRunner {
    handle: JoinHandle<()>,
    gate: Arc<FrameGate>,
    frames: Sender<Frame>,
    commands: Sender<Command>,
    processed: Arc<AtomicU64>,
    status: Arc<RwLock<RunnerStatus>>,
}

impl SessionRunner {
    /// Spawn the worker. The session must already be started.
    ///
    /// `reports` is usually the output of a `ResourceMonitorThread`.
    pub fn spawn(
        session: ScanSession,
        clock: SessionClock,
        reports: Option<Receiver<ResourceReport>>,
    ) -> Result<Self> {
        let gate = Arc::new(FrameGate::new());
        let (frames, frame_rx) = bounded::<Frame>(1);
        let (commands, command_rx) = unbounded::<Command>();
        let processed = Arc::new(AtomicU64::new(0));
        let status = Arc::new(RwLock::new(RunnerStatus::default()));

        let worker = Worker {
            session,
            clock,
            gate: Arc::clone(&gate),
            processed: Arc::clone(&processed),
            status: Arc::clone(&status),
        };
        worker.refresh(None);

        let handle = thread::Builder::new()
            .name("scan-session".into())
            .spawn(move || worker.run(frame_rx, reports.unwrap_or_else(never), command_rx))
            .map_err(|e| ScanError::Unrecoverable(format!("spawn session worker: {e}")))?;

        Ok(Self {
            handle,
            gate,
            frames,
            commands,
            processed,
            status,
        })
    }

    /// Hand a frame to the worker.
    ///
    /// Fails with `ProcessingInProgress` when the previous frame is still in
    /// flight; the frame is dropped and the caller moves on to the next tick.
    pub fn submit(&self, frame: Frame) -> Result<()> {
        if !self.gate.try_acquire() {
            return Err(ScanError::ProcessingInProgress);
        }
        if self.frames.try_send(frame).is_err() {
            self.gate.release();
            return Err(ScanError::Unrecoverable("session worker stopped".to_string()));
        }
        Ok(())
    }

    /// Frames fully processed, shared with the resource monitor for frame rate.
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.processed)
    }

    pub fn status(&self) -> RunnerStatus {
        self.status.read().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn pause(&self) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.send(Command::Pause(tx))?;
        rx.recv().map_err(|_| worker_gone())?
    }

    pub fn resume(&self) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.send(Command::Resume(tx))?;
        rx.recv().map_err(|_| worker_gone())?
    }

    /// Flush the in-flight frame, finish the session and join the worker.
    ///
    /// Gives up after `timeout`; the worker is then left to finish on its own.
    pub fn stop(self, timeout: Duration) -> Result<SessionSummary> {
        let (tx, rx) = bounded(1);
        self.send(Command::Stop(tx))?;

        let summary = select! {
            recv(rx) -> reply => reply.map_err(|_| worker_gone())?,
            recv(after(timeout)) -> _ => {
                log::error!("Session runner: stop timed out after {:?}", timeout);
                return Err(ScanError::Unrecoverable(format!(
                    "session did not stop within {timeout:?}"
                )));
            }
        };
        if self.handle.join().is_err() {
            log::error!("Session runner: worker panicked during shutdown");
        }
        summary
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| worker_gone())
    }
}

fn worker_gone() -> ScanError {
    ScanError::Unrecoverable("session worker stopped".to_string())
}

struct Worker {
    session: ScanSession,
    clock: SessionClock,
    gate: Arc<FrameGate>,
    processed: Arc<AtomicU64>,
    status: Arc<RwLock<RunnerStatus>>,
}

impl Worker {
    fn run(
        mut self,
        frames: Receiver<Frame>,
        reports: Receiver<ResourceReport>,
        commands: Receiver<Command>,
    ) {
        log::info!("Session worker started ({})", self.session.id());
        loop {
            select! {
                recv(frames) -> frame => {
                    let Ok(frame) = frame else { break };
                    self.process(frame);
                }
                recv(reports) -> report => match report {
                    Ok(report) => {
                        if let Err(e) = self
                            .session
                            .apply_resource_report(&report, self.clock.now_us())
                        {
                            log::warn!("Session worker: resource report rejected: {}", e);
                        }
                        self.refresh(None);
                    }
                    Err(_) => {
                        log::debug!("Session worker: resource reports closed");
                        // Keep serving frames without the monitor
                        self.run_without_reports(&frames, &commands);
                        break;
                    }
                },
                recv(commands) -> command => {
                    let Ok(command) = command else { break };
                    if self.handle(command, &frames) {
                        break;
                    }
                }
            }
        }
        log::info!("Session worker stopped ({})", self.session.id());
    }

    fn run_without_reports(&mut self, frames: &Receiver<Frame>, commands: &Receiver<Command>) {
        loop {
            select! {
                recv(frames) -> frame => {
                    let Ok(frame) = frame else { return };
                    self.process(frame);
                }
                recv(commands) -> command => {
                    let Ok(command) = command else { return };
                    if self.handle(command, frames) {
                        return;
                    }
                }
            }
        }
    }

    /// Returns true when the worker should exit.
    fn handle(&mut self, command: Command, frames: &Receiver<Frame>) -> bool {
        let now = self.clock.now_us();
        match command {
            Command::Pause(reply) => {
                let _ = reply.send(self.session.pause(now));
                self.refresh(None);
                false
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.session.resume(now));
                self.refresh(None);
                false
            }
            Command::Stop(reply) => {
                while let Ok(frame) = frames.try_recv() {
                    self.process(frame);
                }
                self.session.record_dropped(self.gate.take_dropped());
                let summary = self.session.stop(self.clock.now_us());
                self.refresh(None);
                let _ = reply.send(summary);
                true
            }
        }
    }

    fn process(&mut self, frame: Frame) {
        let outcome = match self.session.process_frame(&frame, self.clock.now_us()) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::warn!("Session worker: frame {}us failed: {}", frame.timestamp_us, e);
                None
            }
        };
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.session.record_dropped(self.gate.take_dropped());
        self.refresh(outcome);
        self.gate.release();
    }

    fn refresh(&self, outcome: Option<FrameOutcome>) {
        let mut status = self.status.write();
        status.state = self.session.state();
        status.mode = self.session.mode();
        status.settings = self.session.settings();
        status.stats = self.session.stats();
        if outcome.is_some() {
            status.last_outcome = outcome;
        }
    }
}
