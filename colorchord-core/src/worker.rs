//! # Analyzer Worker
//!
//! Runs an [`Engine`] on its own thread. The thread owns the engine outright,
//! so the per-sample path never takes a lock; the host talks to it through
//! channels only.
//!
//! ## Features
//! - Bounded sample queue: a block that does not fit is dropped, never waited on
//! - One [`FrameReport`] per processed frame, on a bounded queue that drops
//!   reports while the host is not reading
//! - Settings, calibration and reset commands, applied before the next block
//! - Graceful shutdown returning the engine's final diagnostics

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{info, warn};

use crate::config::Settings;
use crate::engine::{Diagnostics, Engine};
use crate::magnitude::MagnitudePolicy;
use crate::notes::NoteSlot;

/// Frame reports that may wait for the host before new ones are dropped.
pub const REPORT_QUEUE_DEPTH: usize = 64;

/// What the engine looked like right after one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Zero-based frame number.
    pub frame: u64,
    /// Occupied slots with their indices.
    pub notes: Vec<(usize, NoteSlot)>,
    pub folded_bins: Vec<u16>,
    pub octave_bins: Vec<u16>,
    pub equalizer_active: bool,
}

impl FrameReport {
    fn capture<const BPO: usize, const OCT: usize, const NOTES: usize, M: MagnitudePolicy>(
        engine: &Engine<BPO, OCT, NOTES, M>,
    ) -> Self {
        Self {
            frame: engine.diagnostics().frames - 1,
            notes: engine.active_notes().map(|(i, slot)| (i, *slot)).collect(),
            folded_bins: engine.folded_bins().to_vec(),
            octave_bins: engine.octave_bins().to_vec(),
            equalizer_active: engine.equalizer_active(),
        }
    }
}

#[derive(Debug)]
enum Control {
    Settings(Box<Settings>),
    Calibrate(u32),
    Reset,
}

fn apply_control<const BPO: usize, const OCT: usize, const NOTES: usize, M: MagnitudePolicy>(
    engine: &mut Engine<BPO, OCT, NOTES, M>,
    command: Control,
) {
    match command {
        Control::Settings(settings) => {
            if let Err(e) = engine.update_settings(*settings) {
                warn!(error = %e, "rejected settings update");
            }
        }
        Control::Calibrate(frames) => engine.start_equalizer_calibration(frames),
        Control::Reset => engine.reset(),
    }
}

/// Sending side of the report queue.
struct ReportSink {
    tx: Sender<FrameReport>,
    dropped: Arc<AtomicU64>,
    lagging: bool,
}

impl ReportSink {
    /// Queues a report for the frame the engine just ran, or counts it as
    /// dropped when the queue is full. Returns `false` once the host has
    /// dropped its receiver.
    fn deliver<const BPO: usize, const OCT: usize, const NOTES: usize, M: MagnitudePolicy>(
        &mut self,
        engine: &Engine<BPO, OCT, NOTES, M>,
    ) -> bool {
        // Only this thread fills the queue, so a non-full queue stays non-full
        // until the send below.
        if self.tx.is_full() {
            self.drop_report();
            return true;
        }
        match self.tx.try_send(FrameReport::capture(engine)) {
            Ok(()) => {
                self.lagging = false;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.drop_report();
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn drop_report(&mut self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        if !self.lagging {
            warn!("report queue is full, dropping frame reports");
            self.lagging = true;
        }
    }
}

/// Handle to a running analyzer thread.
#[derive(Debug)]
pub struct AnalyzerWorker {
    samples_tx: Sender<Vec<i16>>,
    control_tx: Sender<Control>,
    reports_rx: Receiver<FrameReport>,
    dropped_reports: Arc<AtomicU64>,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<Diagnostics>>,
}

impl AnalyzerWorker {
    /// Moves `engine` onto a new thread.
    ///
    /// # Arguments
    /// * `engine` - A configured engine
    /// * `queue_depth` - Sample blocks that may wait before new ones are dropped
    ///
    /// # Returns
    /// * `Err(e)` - the thread could not be spawned
    pub fn spawn<const BPO: usize, const OCT: usize, const NOTES: usize, M>(
        mut engine: Engine<BPO, OCT, NOTES, M>,
        queue_depth: usize,
    ) -> Result<Self>
    where
        M: MagnitudePolicy + Send + 'static,
    {
        let (samples_tx, samples_rx) = crossbeam_channel::bounded::<Vec<i16>>(queue_depth.max(1));
        let (control_tx, control_rx) = crossbeam_channel::unbounded::<Control>();
        let (reports_tx, reports_rx) = crossbeam_channel::bounded::<FrameReport>(REPORT_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let dropped_reports = Arc::new(AtomicU64::new(0));
        let mut sink = ReportSink { tx: reports_tx, dropped: Arc::clone(&dropped_reports), lagging: false };

        let thread_handle = thread::Builder::new()
            .name("colorchord-analyzer".into())
            .spawn(move || {
                info!("analyzer thread started");
                loop {
                    crossbeam_channel::select! {
                        recv(samples_rx) -> msg => match msg {
                            Ok(block) => {
                                // Commands sent before this block take effect first.
                                while let Ok(command) = control_rx.try_recv() {
                                    apply_control(&mut engine, command);
                                }
                                if !process_block(&mut engine, &block, &mut sink) {
                                    warn!("report receiver dropped");
                                    break;
                                }
                            }
                            Err(_) => {
                                info!("sample channel closed");
                                break;
                            }
                        },
                        recv(control_rx) -> msg => match msg {
                            Ok(command) => apply_control(&mut engine, command),
                            Err(_) => break,
                        },
                        recv(shutdown_rx) -> _ => {
                            info!("analyzer received shutdown signal");
                            break;
                        },
                    }
                }
                let diagnostics = engine.diagnostics();
                info!(frames = diagnostics.frames, "analyzer thread finished");
                diagnostics
            })
            .context("spawning analyzer thread")?;

        Ok(Self {
            samples_tx,
            control_tx,
            reports_rx,
            dropped_reports,
            shutdown_tx,
            thread_handle: Some(thread_handle),
        })
    }

    /// Queues a block of samples without blocking.
    ///
    /// # Returns
    /// * `false` - the queue was full (the block was dropped) or the thread is gone
    pub fn send_samples(&self, block: Vec<i16>) -> bool {
        match self.samples_tx.try_send(block) {
            Ok(()) => true,
            Err(TrySendError::Full(block)) => {
                warn!(samples = block.len(), "analyzer is behind, dropping sample block");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Applies new settings before the next sample block. Invalid settings
    /// are logged and ignored on the worker thread.
    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        self.control(Control::Settings(Box::new(settings)))
    }

    pub fn start_equalizer_calibration(&self, frames: u32) -> Result<()> {
        self.control(Control::Calibrate(frames))
    }

    pub fn reset(&self) -> Result<()> {
        self.control(Control::Reset)
    }

    fn control(&self, command: Control) -> Result<()> {
        self.control_tx.send(command).map_err(|_| anyhow!("analyzer thread has stopped"))
    }

    /// Frame reports, in order. At most [`REPORT_QUEUE_DEPTH`] wait here.
    pub fn reports(&self) -> &Receiver<FrameReport> {
        &self.reports_rx
    }

    /// Reports discarded so far because the queue was full.
    pub fn dropped_reports(&self) -> u64 {
        self.dropped_reports.load(Ordering::Relaxed)
    }

    /// Stops the thread and returns the engine's final counters.
    pub fn shutdown(mut self) -> Result<Diagnostics> {
        let handle = self.thread_handle.take().ok_or_else(|| anyhow!("analyzer already stopped"))?;
        let _ = self.shutdown_tx.send(());
        handle.join().map_err(|_| anyhow!("analyzer thread panicked"))
    }
}

impl Drop for AnalyzerWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.shutdown_tx.send(());
            let _ = handle.join();
        }
    }
}

/// Pushes a block through the engine, reporting each finished frame.
/// Returns `false` once nobody is listening for reports.
fn process_block<const BPO: usize, const OCT: usize, const NOTES: usize, M: MagnitudePolicy>(
    engine: &mut Engine<BPO, OCT, NOTES, M>,
    block: &[i16],
    sink: &mut ReportSink,
) -> bool {
    for &sample in block {
        if engine.push_sample(sample) && !sink.deliver(engine) {
            return false;
        }
    }
    true
}
