use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::detect::{DetectionAdapter, FrameSummary, ObjectClass};
use crate::ingest::{CameraConfig, CameraSource};
use crate::preview::{annotate, encode_jpeg, PreviewSlot, PREVIEW_JPEG_QUALITY};
use crate::session::{AdvanceOutcome, SharedSession};

const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(20);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Handle bookkeeping shared by the controller and the running worker.
///
/// The worker decides to exit while holding this lock, and the controller
/// decides whether to spawn while holding it, so a restart never finds a
/// worker that is about to leave.
#[derive(Default)]
pub(crate) struct WorkerSlot {
    pub(crate) handle: Option<JoinHandle<()>>,
    pub(crate) active: bool,
}

/// Everything one worker needs. Cloned from the controller at spawn.
#[derive(Clone)]
pub(crate) struct CaptureContext {
    pub(crate) session: SharedSession,
    pub(crate) adapter: DetectionAdapter,
    pub(crate) preview: PreviewSlot,
    pub(crate) classes: Vec<ObjectClass>,
    pub(crate) camera: CameraConfig,
    pub(crate) encode_preview: bool,
    /// Zero point of the session clock. Shared by every worker the
    /// controller spawns so timestamps stay comparable across restarts.
    pub(crate) origin: Instant,
}

pub(crate) fn spawn_worker(
    ctx: CaptureContext,
    slot: Arc<Mutex<WorkerSlot>>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || {
            let result = run_capture(&ctx, &slot);
            if let Err(err) = result {
                log::error!("capture loop stopped: {:#}", err);
                if let Ok(mut guard) = slot.lock() {
                    let _ = ctx.session.set_running(false);
                    guard.active = false;
                }
            }
        })
        .context("spawn capture thread")
}

/// True when the loop should exit. Marks the slot inactive before returning true.
fn should_exit(session: &SharedSession, slot: &Mutex<WorkerSlot>) -> Result<bool> {
    if session.is_running()? {
        return Ok(false);
    }
    let mut guard = slot
        .lock()
        .map_err(|_| anyhow::anyhow!("worker slot lock poisoned"))?;
    if session.is_running()? {
        return Ok(false);
    }
    guard.active = false;
    Ok(true)
}

fn run_capture(ctx: &CaptureContext, slot: &Mutex<WorkerSlot>) -> Result<()> {
    let mut source = CameraSource::new(ctx.camera.clone())?;
    source.connect()?;

    let mut last_tick: Option<f64> = None;
    let mut epoch = ctx.session.epoch()?;
    let mut capture_failures = 0u64;
    let mut last_health_log = Instant::now();

    log::info!(
        "capture loop started on {} (epoch {}, classes {:?})",
        ctx.camera.device,
        epoch,
        ctx.classes.iter().map(|c| c.label()).collect::<Vec<_>>()
    );

    loop {
        if should_exit(&ctx.session, slot)? {
            break;
        }
        let confidence_floor = ctx.session.confidence_floor()?;

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                capture_failures += 1;
                if capture_failures == 1 || capture_failures % 50 == 0 {
                    log::warn!("frame capture failed ({} so far): {:#}", capture_failures, err);
                }
                std::thread::sleep(CAPTURE_RETRY_DELAY);
                continue;
            }
        };

        let now = frame
            .captured_at()
            .saturating_duration_since(ctx.origin)
            .as_secs_f64();

        let current_epoch = ctx.session.epoch()?;
        if current_epoch != epoch {
            log::debug!("capture loop rebased from epoch {} to {}", epoch, current_epoch);
            epoch = current_epoch;
            last_tick = None;
        }
        // Measured from the last frame that reached the accumulator, so
        // skipped frames carry their time forward.
        let elapsed = last_tick.map_or(0.0, |last| (now - last).max(0.0));

        let detections = match ctx.adapter.detect(&frame, confidence_floor, &ctx.classes) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("skipping frame {}: {:#}", frame.sequence, err);
                continue;
            }
        };
        let summary = FrameSummary::from_detections(frame.sequence, detections, &ctx.classes);

        if ctx.encode_preview {
            let boxes: Vec<_> = summary
                .detections
                .iter()
                .map(|d| d.detection.clone())
                .collect();
            let annotated = annotate(&frame, &boxes, summary.candidate);
            match encode_jpeg(&annotated, frame.width, frame.height, PREVIEW_JPEG_QUALITY) {
                Ok(jpeg) => ctx.preview.publish(jpeg),
                Err(err) => log::debug!("preview encode failed: {:#}", err),
            }
        }
        drop(frame);

        let outcome = ctx
            .session
            .record_and_advance(epoch, summary, elapsed, now)?;
        last_tick = Some(now);
        match outcome {
            Some(AdvanceOutcome::Completed) => {
                log::info!("capture loop: session epoch {} completed", epoch);
            }
            Some(_) => {}
            None => log::debug!("frame measured against stale epoch {}", epoch),
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = source.stats();
            log::info!(
                "camera health={} frames={} device={}",
                source.is_healthy(),
                stats.frames_captured,
                stats.device
            );
            last_health_log = Instant::now();
        }

        std::thread::yield_now();
    }

    log::info!("capture loop stopped (epoch {})", epoch);
    Ok(())
}
