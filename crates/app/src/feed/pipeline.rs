//! Capture/encode pipeline feeding the frame slot, plus top-level wiring.
//!
//! The pipeline runs on one dedicated thread that exclusively owns the
//! capture source: acquire → transform → encode → publish. Transient failures
//! skip the cycle; an explicit retry budget promotes repeated transient
//! failures to a terminal stop instead of spinning forever against a dead
//! source. `run` wires the pipeline, the HTTP server, and Ctrl+C handling
//! together for the binary.

use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use frame_ingest::{CaptureSource, SyntheticSource};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::feed::{
    config::FeedConfig,
    data::{EncodedFrame, FrameSlot},
    encoding::{FrameEncoder, JPEG_CONTENT_TYPE},
    server::spawn_frame_server,
    telemetry,
    transform::{FrameTransform, Identity},
};

/// Lifecycle of the capture thread. Transitions are command-driven (`start`,
/// `stop`) or forced by a terminal capture failure, never data-driven.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PipelineState {
    Stopped,
    Running,
    Stopping,
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(PipelineState::Stopped as u8))
    }

    fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> PipelineState {
        match self.0.load(Ordering::SeqCst) {
            x if x == PipelineState::Running as u8 => PipelineState::Running,
            x if x == PipelineState::Stopping as u8 => PipelineState::Stopping,
            _ => PipelineState::Stopped,
        }
    }

    /// Running → Stopping; the capture thread observes the request at the top
    /// of its next cycle.
    fn request_stop(&self) {
        let _ = self.0.compare_exchange(
            PipelineState::Running as u8,
            PipelineState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Budget of consecutive failed cycles tolerated before the source is
/// declared dead and the pipeline stops.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetryPolicy {
    pub(crate) max_consecutive_failures: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 30,
        }
    }
}

/// Terminal failure surfaced to the owner when the pipeline stops itself.
#[derive(Debug, Error)]
pub(crate) enum PipelineError {
    #[error("capture source failed terminally")]
    SourceTerminal(#[source] frame_ingest::CaptureError),
    #[error("{failures} consecutive capture cycles failed; last error: {last}")]
    RetriesExhausted { failures: u32, last: anyhow::Error },
}

/// Owner-side handle for a running pipeline.
pub(crate) struct PipelineHandle {
    state: Arc<StateCell>,
    outcome_rx: Receiver<Result<(), PipelineError>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PipelineHandle {
    pub(crate) fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Channel carrying the pipeline's exit outcome. Receives exactly one
    /// message, when the capture thread ends.
    pub(crate) fn outcome(&self) -> &Receiver<Result<(), PipelineError>> {
        &self.outcome_rx
    }

    /// Request a stop, join the capture thread, and report how it ended.
    pub(crate) fn stop(mut self) -> Result<(), PipelineError> {
        self.state.request_stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        match self.outcome_rx.try_recv() {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }
}

/// Spawn the capture thread. The source moves into the thread and is dropped
/// when the loop exits (on stop or terminal failure alike), which releases
/// the underlying device deterministically.
pub(crate) fn start_pipeline(
    source: Box<dyn CaptureSource>,
    transform: Box<dyn FrameTransform>,
    encoder: FrameEncoder,
    slot: Arc<FrameSlot>,
    policy: RetryPolicy,
) -> Result<PipelineHandle> {
    let state = Arc::new(StateCell::new());
    let (outcome_tx, outcome_rx) = bounded::<Result<(), PipelineError>>(1);

    state.set(PipelineState::Running);
    let thread_state = state.clone();
    let thread = telemetry::spawn_thread("feed-capture", move || {
        let result = run_loop(source, transform, encoder, slot, policy, &thread_state);
        thread_state.set(PipelineState::Stopped);
        if let Err(err) = &result {
            error!("capture pipeline stopped: {err}");
        }
        let _ = outcome_tx.send(result);
    })
    .context("failed to spawn capture thread")?;

    Ok(PipelineHandle {
        state,
        outcome_rx,
        thread: Some(thread),
    })
}

fn run_loop(
    mut source: Box<dyn CaptureSource>,
    transform: Box<dyn FrameTransform>,
    encoder: FrameEncoder,
    slot: Arc<FrameSlot>,
    policy: RetryPolicy,
    state: &StateCell,
) -> Result<(), PipelineError> {
    let mut sequence: u64 = 0;
    let mut consecutive_failures: u32 = 0;
    let mut smoothed_fps: f32 = 0.0;
    let mut last_instant = Instant::now();

    while state.get() == PipelineState::Running {
        let raw = match source.next_frame() {
            Ok(raw) => raw,
            Err(err) if err.is_terminal() => {
                return Err(PipelineError::SourceTerminal(err));
            }
            Err(err) => {
                consecutive_failures += 1;
                metrics::counter!("feed_cycle_failures_total", "stage" => "capture").increment(1);
                warn!("capture failed ({consecutive_failures} consecutive): {err}");
                if consecutive_failures >= policy.max_consecutive_failures {
                    return Err(PipelineError::RetriesExhausted {
                        failures: consecutive_failures,
                        last: err.into(),
                    });
                }
                continue;
            }
        };

        let now = Instant::now();
        let elapsed = now.duration_since(last_instant).as_secs_f32();
        last_instant = now;
        if elapsed > 0.0 {
            let instant = 1.0 / elapsed;
            smoothed_fps = if smoothed_fps == 0.0 {
                instant
            } else {
                0.9 * smoothed_fps + 0.1 * instant
            };
            metrics::histogram!("feed_capture_frame_interval_seconds").record(f64::from(elapsed));
        }
        metrics::gauge!("feed_pipeline_fps").set(f64::from(smoothed_fps));

        let processed = match transform.apply(raw) {
            Ok(frame) => frame,
            Err(err) => {
                consecutive_failures += 1;
                metrics::counter!("feed_cycle_failures_total", "stage" => "transform").increment(1);
                warn!("transform failed ({consecutive_failures} consecutive): {err}");
                if consecutive_failures >= policy.max_consecutive_failures {
                    return Err(PipelineError::RetriesExhausted {
                        failures: consecutive_failures,
                        last: err,
                    });
                }
                continue;
            }
        };

        let encode_start = Instant::now();
        let payload = match encoder.encode(&processed) {
            Ok(payload) => payload,
            Err(err) => {
                consecutive_failures += 1;
                metrics::counter!("feed_cycle_failures_total", "stage" => "encode").increment(1);
                warn!("encode failed ({consecutive_failures} consecutive): {err}");
                if consecutive_failures >= policy.max_consecutive_failures {
                    return Err(PipelineError::RetriesExhausted {
                        failures: consecutive_failures,
                        last: err,
                    });
                }
                continue;
            }
        };
        metrics::histogram!("feed_encode_seconds").record(encode_start.elapsed().as_secs_f64());

        consecutive_failures = 0;
        sequence = sequence.wrapping_add(1);
        slot.publish(EncodedFrame {
            payload,
            content_type: JPEG_CONTENT_TYPE,
            timestamp_ms: processed.timestamp_ms,
            sequence,
        });
        metrics::counter!("feed_frames_published_total").increment(1);

        if sequence % 30 == 0 {
            debug!("capture heartbeat: frame #{sequence}, {smoothed_fps:.1} fps");
        }
    }

    Ok(())
}

/// Run the feed until Ctrl+C: capture pipeline plus HTTP server.
///
/// A terminal capture failure stops the pipeline but keeps the server up so
/// viewers degrade gracefully on the last good frame; the error is reported
/// once the process is asked to shut down.
pub fn run(config: FeedConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    telemetry::init_tracing(config.verbose);
    let _ = telemetry::init_metrics_recorder();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler({
            let handler_shutdown = handler_shutdown.clone();
            move || {
                handler_shutdown.store(true, Ordering::SeqCst);
            }
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let slot = Arc::new(FrameSlot::new());
    let source = Box::new(SyntheticSource::new(config.width, config.height, config.fps));
    let transform: Box<dyn FrameTransform> = Box::new(Identity);
    let encoder = FrameEncoder::new(config.jpeg_quality, config.grayscale);
    let pipeline = start_pipeline(
        source,
        transform,
        encoder,
        slot.clone(),
        RetryPolicy {
            max_consecutive_failures: config.max_failures,
        },
    )?;
    let server =
        spawn_frame_server(slot, config.bind.clone()).context("failed to start frame server")?;

    info!("frame feed available at http://{}/frame.jpg", config.bind);

    let mut terminal: Option<PipelineError> = None;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("shutdown requested, stopping feed");
            break;
        }
        if terminal.is_some() {
            thread::sleep(Duration::from_millis(200));
            continue;
        }
        match pipeline.outcome().recv_timeout(Duration::from_millis(200)) {
            Ok(Ok(())) => break,
            Ok(Err(err)) => {
                error!("capture pipeline stopped; serving last good frame until shutdown: {err}");
                terminal = Some(err);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("stopping feed components (pipeline {:?})", pipeline.state());
    let stop_result = pipeline.stop();
    server.stop();

    if let Some(err) = terminal {
        return Err(err).context("capture pipeline failed terminally");
    }
    stop_result.context("capture pipeline failed during shutdown")?;
    Ok(())
}
