use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::worker::{spawn_worker, CaptureContext, WorkerSlot};
use crate::detect::{DetectionAdapter, ObjectClass};
use crate::ingest::CameraConfig;
use crate::preview::{preview_supported, PreviewSlot};
use crate::session::{Provenance, SessionConfig, SharedSession};

/// Producer wiring fixed for the lifetime of the controller.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub camera: CameraConfig,
    /// Classes that must all be present for a candidate frame.
    pub classes: Vec<ObjectClass>,
    /// Encode JPEG previews when the build supports it.
    pub preview: bool,
}

/// Owns the session and at most one capture worker.
///
/// `start` resets and (re)launches capture, `stop` only lowers the running
/// flag; the worker notices on its next iteration and exits, leaving the
/// accumulated progress and any proof in place.
pub struct SessionController {
    ctx: CaptureContext,
    slot: Arc<Mutex<WorkerSlot>>,
}

impl SessionController {
    pub fn new(
        adapter: DetectionAdapter,
        settings: CaptureSettings,
        defaults: SessionConfig,
    ) -> Result<Self> {
        if settings.classes.is_empty() {
            return Err(anyhow!("at least one required class must be configured"));
        }
        let provenance = Provenance {
            model: adapter.name().to_string(),
            classes: settings.classes.clone(),
        };
        let session = SharedSession::new(defaults, provenance)?;
        let encode_preview = settings.preview && preview_supported();
        if settings.preview && !encode_preview {
            log::warn!("preview requested but this build lacks the preview-jpeg feature");
        }
        Ok(Self {
            ctx: CaptureContext {
                session,
                adapter,
                preview: PreviewSlot::new(),
                classes: settings.classes,
                camera: settings.camera,
                encode_preview,
                origin: Instant::now(),
            },
            slot: Arc::new(Mutex::new(WorkerSlot::default())),
        })
    }

    pub fn session(&self) -> &SharedSession {
        &self.ctx.session
    }

    pub fn preview(&self) -> &PreviewSlot {
        &self.ctx.preview
    }

    pub fn preview_enabled(&self) -> bool {
        self.ctx.encode_preview
    }

    fn slot(&self) -> Result<MutexGuard<'_, WorkerSlot>> {
        self.slot
            .lock()
            .map_err(|_| anyhow!("worker slot lock poisoned"))
    }

    /// Reset the session with `config` and make sure a worker is capturing.
    ///
    /// Invalid configuration is rejected before anything changes. Returns the
    /// new session epoch.
    pub fn start(&self, config: SessionConfig) -> Result<u64> {
        let epoch = self.ctx.session.start(config)?;
        self.ctx.preview.clear();
        self.ensure_worker()?;
        log::info!(
            "session started (epoch {}): required={:.2}s grace={:.2}s floor={:.2}",
            epoch,
            config.required_duration,
            config.grace_duration,
            config.confidence_floor
        );
        Ok(epoch)
    }

    /// Resume capture without resetting progress.
    pub fn resume(&self) -> Result<()> {
        if !self.ctx.session.set_running(true)? {
            log::info!("session resumed without reset");
        }
        self.ensure_worker()
    }

    /// Lower the running flag. Returns whether the session was running.
    pub fn stop(&self) -> Result<bool> {
        let was_running = self.ctx.session.set_running(false)?;
        if was_running {
            log::info!("session stop requested");
        }
        Ok(was_running)
    }

    /// Stop and wait for the worker thread to exit.
    pub fn shutdown(&self) -> Result<()> {
        self.stop()?;
        let handle = self.slot()?.handle.take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| anyhow!("capture thread panicked"))?;
        }
        Ok(())
    }

    pub fn worker_active(&self) -> bool {
        self.slot().map(|slot| slot.active).unwrap_or(false)
    }

    fn ensure_worker(&self) -> Result<()> {
        let mut slot = self.slot()?;
        if slot.active {
            return Ok(());
        }
        if let Some(previous) = slot.handle.take() {
            // The previous worker already marked itself inactive; it is only
            // unwinding its loop.
            previous
                .join()
                .map_err(|_| anyhow!("capture thread panicked"))?;
        }
        slot.handle = Some(spawn_worker(self.ctx.clone(), self.slot.clone())?);
        slot.active = true;
        Ok(())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("capture shutdown failed: {:#}", err);
        }
    }
}
