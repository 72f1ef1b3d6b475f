//! Integration tests for the settings surface
//!
//! Wires the engine facade to hand-rolled store/service fakes and drives the
//! async event loop end to end: shortcut capture feeding the persist path,
//! the binding invariant, the download lifecycle, and external settings
//! reconciliation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use dictation_settings::download::{
    DownloadErrorReason, DownloadEvent, DownloadService, DownloadStatus, ModelStatus,
};
use dictation_settings::engine::{run_event_loop, SettingsEngine};
use dictation_settings::settings::{SettingsSnapshot, SettingsStore, StoreError};
use dictation_settings::shortcut::{BindingName, KeyEvent};

/// In-memory store recording every persisted snapshot
#[derive(Default)]
struct RecordingStore {
    writes: Mutex<Vec<SettingsSnapshot>>,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    fn last_write(&self) -> Option<SettingsSnapshot> {
        self.writes.lock().unwrap().last().cloned()
    }
}

/// Newtype handle so the foreign `SettingsStore` trait can be implemented
/// for a shared `RecordingStore` without violating the orphan rule
struct StoreHandle(Arc<RecordingStore>);

impl SettingsStore for StoreHandle {
    fn get_settings(&self) -> Result<SettingsSnapshot, StoreError> {
        Ok(SettingsSnapshot::default())
    }

    fn update_settings(&self, snapshot: &SettingsSnapshot) -> Result<(), StoreError> {
        if self.0.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("store offline")));
        }
        self.0.writes.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

/// Download service that feeds a scripted event sequence into the channel
struct ScriptedService {
    events: mpsc::UnboundedSender<DownloadEvent>,
    script: Mutex<Vec<DownloadEvent>>,
}

impl DownloadService for ScriptedService {
    fn download_model(&self, _model: &str) -> anyhow::Result<()> {
        for event in self.script.lock().unwrap().drain(..) {
            self.events.send(event)?;
        }
        Ok(())
    }

    fn cancel_download(&self, _model: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn delete_model(&self, _model: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn check_model_status(&self, model: &str) -> anyhow::Result<ModelStatus> {
        Ok(ModelStatus {
            installed: false,
            bytes_on_disk: 0,
            missing_files: vec![format!("{model}.bin")],
            directory: std::env::temp_dir(),
        })
    }
}

fn progress(model: &str, percent: f32) -> DownloadEvent {
    DownloadEvent::Progress {
        model: model.to_owned(),
        file: format!("{model}.bin"),
        downloaded: 0,
        total: 0,
        percent,
    }
}

#[test]
fn capture_to_persist_round_trip() {
    let store = Arc::new(RecordingStore::default());
    let (tx, _rx) = mpsc::unbounded_channel();
    let service = Arc::new(ScriptedService {
        events: tx,
        script: Mutex::new(Vec::new()),
    });
    let mut engine = SettingsEngine::new(StoreHandle(Arc::clone(&store)), service);

    engine.arm_capture(BindingName::Hold).unwrap();
    engine.capture_key_down(&KeyEvent::new("ControlLeft", "Control"));
    engine.capture_key_down(&KeyEvent::new("AltLeft", "Alt"));
    engine.capture_key_down(&KeyEvent::new("KeyD", "d"));
    let combo = engine.capture_key_up().unwrap();

    assert_eq!(combo.as_deref(), Some("Control+Alt+D"));
    assert_eq!(store.write_count(), 1);

    let persisted = store.last_write().unwrap();
    assert_eq!(persisted.hold.combo, "Control+Alt+D");
    assert_eq!(persisted.revision, 1);
}

#[test]
fn persist_failure_keeps_local_state_and_surfaces_error() {
    let store = Arc::new(RecordingStore::default());
    store.fail_writes.store(true, Ordering::SeqCst);
    let (tx, _rx) = mpsc::unbounded_channel();
    let service = Arc::new(ScriptedService {
        events: tx,
        script: Mutex::new(Vec::new()),
    });
    let mut engine = SettingsEngine::new(StoreHandle(Arc::clone(&store)), service);

    engine.set_language("pt");

    assert_eq!(engine.snapshot().language, "pt");
    let error = engine.save_error().unwrap();
    assert!(error.contains("store offline"));

    // the rest of the surface keeps working
    assert!(engine.set_binding_enabled(BindingName::Toggle, true));
}

#[test]
fn binding_invariant_survives_ui_session() {
    let store = Arc::new(RecordingStore::default());
    let (tx, _rx) = mpsc::unbounded_channel();
    let service = Arc::new(ScriptedService {
        events: tx,
        script: Mutex::new(Vec::new()),
    });
    let mut engine = SettingsEngine::new(StoreHandle(store), service);

    engine.set_binding_enabled(BindingName::Toggle, true);
    engine.set_binding_enabled(BindingName::Smart, false);
    engine.set_binding_enabled(BindingName::Hold, false);
    assert!(!engine.set_binding_enabled(BindingName::Toggle, false));

    let enabled = BindingName::ALL
        .into_iter()
        .filter(|n| engine.bindings().get(*n).enabled)
        .count();
    assert_eq!(enabled, 1);
}

#[tokio::test]
async fn download_lifecycle_through_event_loop() {
    let store = Arc::new(RecordingStore::default());
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let service = Arc::new(ScriptedService {
        events: event_tx,
        script: Mutex::new(vec![
            progress("m1", 10.0),
            progress("m1", 50.0),
            progress("m1", 30.0), // stale, must be dropped
            progress("m1", 90.0),
            DownloadEvent::Complete {
                model: "m1".to_owned(),
            },
        ]),
    });

    let engine = Arc::new(Mutex::new(SettingsEngine::new(StoreHandle(store), service)));
    let (settings_tx, settings_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    engine.lock().unwrap().request_download("m1").unwrap();

    let loop_handle = tokio::spawn(run_event_loop(
        Arc::clone(&engine),
        event_rx,
        settings_rx,
        shutdown_rx,
    ));

    // let the loop drain the scripted events
    tokio::time::sleep(Duration::from_millis(50)).await;

    {
        let engine = engine.lock().unwrap();
        let state = engine.download_state("m1");
        assert_eq!(state.status, DownloadStatus::Complete);
        assert_eq!(state.percent, 100.0);
    }

    // external settings change while the loop runs
    let mut incoming = SettingsSnapshot::default();
    incoming.revision = 11;
    incoming.selected_model = "whisper-large".to_owned();
    settings_tx.send(incoming).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        engine.lock().unwrap().snapshot().selected_model,
        "whisper-large"
    );

    shutdown_tx.send(()).unwrap();
    loop_handle.await.unwrap();
}

#[tokio::test]
async fn cancelled_download_auto_clears() {
    let store = Arc::new(RecordingStore::default());
    let (event_tx, _event_rx) = mpsc::unbounded_channel();
    let service = Arc::new(ScriptedService {
        events: event_tx,
        script: Mutex::new(Vec::new()),
    });

    let mut engine =
        SettingsEngine::with_auto_clear(StoreHandle(store), service, Duration::from_millis(100));
    engine.request_download("m1").unwrap();
    engine.request_cancel("m1").unwrap();
    assert_eq!(engine.download_state("m1").status, DownloadStatus::Cancelled);

    // the service's trailing error for the aborted task is suppressed
    engine.handle_download_event(&DownloadEvent::Error {
        model: "m1".to_owned(),
        reason: DownloadErrorReason::Cancelled,
        message: "download cancelled".to_owned(),
    });
    assert_eq!(engine.download_state("m1").status, DownloadStatus::Cancelled);

    // before the deadline the state sticks, after it the entry clears
    assert_eq!(engine.sweep_cancelled(Instant::now()), 0);
    assert_eq!(
        engine.sweep_cancelled(Instant::now() + Duration::from_millis(150)),
        1
    );
    assert_eq!(engine.download_state("m1").status, DownloadStatus::Idle);
}

#[test]
fn external_echo_does_not_loop() {
    let store = Arc::new(RecordingStore::default());
    let (tx, _rx) = mpsc::unbounded_channel();
    let service = Arc::new(ScriptedService {
        events: tx,
        script: Mutex::new(Vec::new()),
    });
    let mut engine = SettingsEngine::new(StoreHandle(Arc::clone(&store)), service);

    engine.set_edit_mode(true);
    assert_eq!(store.write_count(), 1);

    // the store notifies all listeners of the write we just made
    let echo = engine.snapshot().clone();
    engine.apply_external_settings(echo);
    assert_eq!(store.write_count(), 1);

    // a genuinely foreign change overwrites local state, still no persist
    let mut foreign = engine.snapshot().clone();
    foreign.revision += 1;
    foreign.language = "ja".to_owned();
    engine.apply_external_settings(foreign);
    assert_eq!(engine.snapshot().language, "ja");
    assert_eq!(store.write_count(), 1);
}
