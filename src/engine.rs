use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::download::{
    DownloadEvent, DownloadService, ModelDownloadState, ModelDownloadTracker,
};
use crate::settings::{
    CleanupSettings, SettingsSnapshot, SettingsStore, SettingsSyncEngine, TranscriptionMode,
};
use crate::shortcut::{
    BindingError, BindingName, CaptureError, KeyCaptureSession, KeyDownOutcome, KeyEvent,
    ShortcutBindingSet,
};

/// The settings surface core: capture, bindings, download tracking, and
/// settings synchronization behind one facade.
///
/// Single-threaded by design; the async event loop in [`run_event_loop`]
/// feeds it download events, external settings notifications, and the
/// cancel auto-clear timer. The capture session slot is the single owner of
/// the process-wide keyboard hook: it is cleared on resolution, Escape,
/// explicit cancel, and (structurally) when the engine is dropped, so the
/// hook can never leak past the surface's lifetime.
pub struct SettingsEngine<S: SettingsStore> {
    sync: SettingsSyncEngine<S>,
    bindings: ShortcutBindingSet,
    capture: Option<KeyCaptureSession>,
    downloads: ModelDownloadTracker,
    service: Arc<dyn DownloadService>,
}

impl<S: SettingsStore> SettingsEngine<S> {
    /// Load settings from `store` and wire up the download backend
    pub fn new(store: S, service: Arc<dyn DownloadService>) -> Self {
        Self::with_auto_clear(store, service, ModelDownloadTracker::DEFAULT_AUTO_CLEAR)
    }

    /// Like [`Self::new`] with an explicit cancel auto-clear delay
    /// (`downloads.cancel_clear_ms` in the config file)
    pub fn with_auto_clear(
        store: S,
        service: Arc<dyn DownloadService>,
        auto_clear: Duration,
    ) -> Self {
        let sync = SettingsSyncEngine::new(store);
        let bindings = sync.snapshot().binding_set();
        Self {
            sync,
            bindings,
            capture: None,
            downloads: ModelDownloadTracker::with_auto_clear(auto_clear),
            service,
        }
    }

    // ---- read access for the UI ----

    /// Current bindings for rendering and toggling
    #[must_use]
    pub const fn bindings(&self) -> &ShortcutBindingSet {
        &self.bindings
    }

    /// The full current snapshot
    #[must_use]
    pub const fn snapshot(&self) -> &SettingsSnapshot {
        self.sync.snapshot()
    }

    /// Last settings-save error text, if any
    #[must_use]
    pub fn save_error(&self) -> Option<&str> {
        self.sync.save_error()
    }

    /// Live preview of the armed capture, `None` when nothing is armed
    #[must_use]
    pub fn capture_preview(&self) -> Option<String> {
        self.capture.as_ref().map(KeyCaptureSession::preview)
    }

    /// Download state snapshot for one model key
    #[must_use]
    pub fn download_state(&self, model: &str) -> ModelDownloadState {
        self.downloads.state(model)
    }

    // ---- shortcut capture ----

    /// Arm a capture session for `name`.
    ///
    /// # Errors
    /// Rejected when the binding is disabled or another session is active.
    pub fn arm_capture(&mut self, name: BindingName) -> Result<(), BindingError> {
        if let Some(active) = &self.capture {
            return Err(BindingError::CaptureInProgress(active.armed_for()));
        }
        self.bindings.check_armable(name)?;
        self.capture = Some(KeyCaptureSession::new(name));
        Ok(())
    }

    /// Feed a key-down event to the armed session (no-op when disarmed).
    /// Escape tears the session down without emitting a result.
    pub fn capture_key_down(&mut self, event: &KeyEvent) {
        if let Some(session) = &mut self.capture {
            if session.key_down(event) == KeyDownOutcome::Cancelled {
                self.capture = None;
            }
        }
    }

    /// Resolve the armed session on key-up.
    ///
    /// On success the captured combination replaces the binding's string and
    /// the snapshot is persisted; `Ok(None)` means nothing was armed.
    ///
    /// # Errors
    /// [`CaptureError::IncompleteCombination`] when no primary key was
    /// recorded; the session is destroyed and no binding is mutated.
    pub fn capture_key_up(&mut self) -> Result<Option<String>, CaptureError> {
        let Some(session) = self.capture.take() else {
            return Ok(None);
        };
        let name = session.armed_for();
        let combo = session.resolve()?;

        self.bindings.set_combination(name, combo.clone());
        self.persist_bindings();
        info!(binding = %name, combo = %combo, "shortcut updated");
        Ok(Some(combo))
    }

    /// Tear down the armed session (focus loss, surface closed)
    pub fn cancel_capture(&mut self) {
        if self.capture.take().is_some() {
            debug!("capture session cancelled");
        }
    }

    // ---- binding toggles ----

    /// Enable or disable a binding; returns whether the change was applied.
    /// Disabling the last enabled binding is a silent no-op.
    pub fn set_binding_enabled(&mut self, name: BindingName, enabled: bool) -> bool {
        if !self.bindings.set_enabled(name, enabled) {
            return false;
        }
        self.persist_bindings();
        true
    }

    fn persist_bindings(&mut self) {
        let bindings = &self.bindings;
        self.sync.mutate(|s| s.set_bindings(bindings));
    }

    // ---- preference setters ----

    /// Switch between local and cloud transcription
    pub fn set_mode(&mut self, mode: TranscriptionMode) {
        self.sync.mutate(|s| s.mode = mode);
    }

    /// Select the active transcription model
    pub fn set_selected_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        self.sync.mutate(|s| s.selected_model = model);
    }

    /// Pick an input device (`None` = system default)
    pub fn set_input_device(&mut self, device: Option<String>) {
        self.sync.mutate(|s| s.input_device = device);
    }

    /// Set the spoken language code
    pub fn set_language(&mut self, language: impl Into<String>) {
        let language = language.into();
        self.sync.mutate(|s| s.language = language);
    }

    /// Replace the LLM cleanup configuration
    pub fn set_cleanup(&mut self, cleanup: CleanupSettings) {
        self.sync.mutate(|s| s.cleanup = cleanup);
    }

    /// Toggle edit-mode insertion
    pub fn set_edit_mode(&mut self, edit_mode: bool) {
        self.sync.mutate(|s| s.edit_mode = edit_mode);
    }

    // ---- external reconciliation ----

    /// Fold an externally changed snapshot into local state.
    ///
    /// Never re-persists (see [`SettingsSyncEngine::apply_external`]); the
    /// binding set is rebuilt when the snapshot actually changed.
    pub fn apply_external_settings(&mut self, incoming: SettingsSnapshot) {
        if self.sync.apply_external(incoming) {
            self.bindings = self.sync.snapshot().binding_set();
        }
    }

    // ---- downloads ----

    /// Request a model download and move its tracker to `Downloading`
    ///
    /// # Errors
    /// Returns error when the request cannot be issued; no transition
    /// happens in that case.
    pub fn request_download(&mut self, model: &str) -> Result<()> {
        self.service.download_model(model)?;
        self.downloads.begin(model);
        Ok(())
    }

    /// Request cancellation; the local state flips to `Cancelled` right away
    /// while the service request is fire-and-forget.
    ///
    /// # Errors
    /// Returns error when the request cannot be issued.
    pub fn request_cancel(&mut self, model: &str) -> Result<()> {
        self.service.cancel_download(model)?;
        self.downloads.cancel(model, Instant::now());
        Ok(())
    }

    /// Delete a model's files and reset its tracker to `Idle`
    ///
    /// # Errors
    /// Returns error when deletion fails; the tracker is reset regardless so
    /// the UI does not keep showing a stale terminal state.
    pub fn request_delete(&mut self, model: &str) -> Result<()> {
        let result = self.service.delete_model(model);
        self.downloads.delete(model);
        result
    }

    /// Fold an inbound download event into the tracker
    pub fn handle_download_event(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Progress {
                model,
                file,
                downloaded,
                total,
                percent,
            } => {
                self.downloads
                    .progress(model, file, *downloaded, *total, *percent);
            }
            DownloadEvent::Complete { model } => self.downloads.complete(model),
            DownloadEvent::Error {
                model,
                reason,
                message,
            } => self.downloads.error(model, *reason, message),
        }
    }

    /// Auto-clear expired `Cancelled` downloads; driven by the event loop
    pub fn sweep_cancelled(&mut self, now: Instant) -> usize {
        self.downloads.sweep_cancelled(now)
    }
}

/// How often the event loop sweeps cancelled downloads
const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

fn lock_engine<S: SettingsStore>(
    engine: &Mutex<SettingsEngine<S>>,
) -> std::sync::MutexGuard<'_, SettingsEngine<S>> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-threaded event loop for the settings surface.
///
/// Consumes download events and external settings notifications, and drives
/// the cancelled-download auto-clear timer, until the shutdown signal fires
/// or both channels close.
pub async fn run_event_loop<S: SettingsStore>(
    engine: Arc<Mutex<SettingsEngine<S>>>,
    mut download_events: mpsc::UnboundedReceiver<DownloadEvent>,
    mut external_settings: mpsc::UnboundedReceiver<SettingsSnapshot>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    info!("settings event loop starting");

    loop {
        tokio::select! {
            event = download_events.recv() => {
                match event {
                    Some(event) => lock_engine(&engine).handle_download_event(&event),
                    None => {
                        warn!("download event channel closed");
                        break;
                    }
                }
            }
            snapshot = external_settings.recv() => {
                match snapshot {
                    Some(snapshot) => lock_engine(&engine).apply_external_settings(snapshot),
                    None => {
                        warn!("external settings channel closed");
                        break;
                    }
                }
            }
            _ = sweep.tick() => {
                lock_engine(&engine).sweep_cancelled(Instant::now());
            }
            _ = &mut shutdown => {
                info!("settings event loop shutting down");
                break;
            }
        }
    }
}
