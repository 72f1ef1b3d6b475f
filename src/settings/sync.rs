use tracing::{debug, info, warn};

use super::snapshot::SettingsSnapshot;
use super::store::SettingsStore;

/// Holds the authoritative local snapshot and keeps it aligned with the
/// external store.
///
/// Two paths mutate the snapshot and they must not feed each other:
/// local mutations bump the revision and persist immediately (optimistic
/// write), while externally received snapshots overwrite local state without
/// ever persisting. An external payload that matches the local snapshot is
/// our own write echoed back and is dropped outright.
pub struct SettingsSyncEngine<S: SettingsStore> {
    store: S,
    snapshot: SettingsSnapshot,
    save_error: Option<String>,
}

impl<S: SettingsStore> SettingsSyncEngine<S> {
    /// Load the initial snapshot from the store.
    ///
    /// A store read failure is not fatal to the settings surface: defaults
    /// are used and the error is surfaced like a persist failure.
    pub fn new(store: S) -> Self {
        let (snapshot, save_error) = match store.get_settings() {
            Ok(snapshot) => (snapshot, None),
            Err(err) => {
                warn!(error = %err, "failed to load settings, starting from defaults");
                (SettingsSnapshot::default(), Some(err.to_string()))
            }
        };
        Self {
            store,
            snapshot,
            save_error,
        }
    }

    /// The current local snapshot
    #[must_use]
    pub const fn snapshot(&self) -> &SettingsSnapshot {
        &self.snapshot
    }

    /// The last persist error, if the most recent write failed.
    ///
    /// Shown to the user as a copyable string; cleared by the next
    /// successful persist.
    #[must_use]
    pub fn save_error(&self) -> Option<&str> {
        self.save_error.as_deref()
    }

    /// Apply a local mutation: bump the revision and persist the full
    /// snapshot immediately.
    ///
    /// Persist failures do not roll the local state back; they are recorded
    /// for display instead.
    pub fn mutate<F>(&mut self, apply: F)
    where
        F: FnOnce(&mut SettingsSnapshot),
    {
        apply(&mut self.snapshot);
        self.snapshot.revision += 1;
        self.persist();
    }

    fn persist(&mut self) {
        match self.store.update_settings(&self.snapshot) {
            Ok(()) => {
                self.save_error = None;
                debug!(revision = self.snapshot.revision, "snapshot persisted");
            }
            Err(err) => {
                warn!(error = %err, "failed to persist settings");
                self.save_error = Some(err.to_string());
            }
        }
    }

    /// Fold an externally received snapshot into local state.
    ///
    /// Never triggers a persist: the external writer already owns this
    /// version. Returns `true` when local state actually changed so the
    /// caller can refresh derived state (e.g. the binding set).
    pub fn apply_external(&mut self, incoming: SettingsSnapshot) -> bool {
        if incoming == self.snapshot {
            debug!(
                revision = incoming.revision,
                "external snapshot matches local state, ignoring echo"
            );
            return false;
        }
        info!(
            local = self.snapshot.revision,
            incoming = incoming.revision,
            "applying externally changed settings"
        );
        self.snapshot = incoming;
        true
    }
}
