//! Process-wide application state.
//!
//! Every mutation updates local state first under one write lock, then
//! persists through the [`Gateway`]. What happens when the remote write
//! fails is decided by [`SyncPolicy`]. Fetches replace local collections
//! wholesale.

mod brokers;
mod chat;
mod listings;
mod session;
mod site;
mod snapshot;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::models::{
    default_banner_slides, Amenity, BannerSlide, BrokerProfile, ChatMessage, PropertyLead,
    PropertyListing, Session, SiteConfig,
};

pub use brokers::ReferralReward;
pub use chat::MessageOrigin;
pub use snapshot::SnapshotFile;
use snapshot::SnapshotWriter;

/// What to do with an optimistic local change whose remote write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Leave the local value in place until the next fetch
    #[default]
    KeepOptimistic,
    /// Apply the compensating action and restore the prior local value
    Rollback,
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub sync_policy: SyncPolicy,
    /// Where snapshots are written; `None` disables persistence
    pub snapshot_path: Option<PathBuf>,
    pub bot_reply_delay: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            sync_policy: SyncPolicy::KeepOptimistic,
            snapshot_path: None,
            bot_reply_delay: Duration::from_millis(1000),
        }
    }
}

/// Everything the store holds in memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    pub session: Option<Session>,
    pub brokers: Vec<BrokerProfile>,
    pub properties: Vec<PropertyListing>,
    pub leads: Vec<PropertyLead>,
    pub chat_messages: Vec<ChatMessage>,
    pub site_config: SiteConfig,
    pub banner_slides: Vec<BannerSlide>,
    pub amenities: Vec<Amenity>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            session: None,
            brokers: Vec::new(),
            properties: Vec::new(),
            leads: Vec::new(),
            chat_messages: Vec::new(),
            site_config: SiteConfig::default(),
            banner_slides: default_banner_slides(),
            amenities: Vec::new(),
        }
    }
}

impl StoreState {
    pub fn is_admin_session(&self) -> bool {
        self.session.as_ref().map_or(false, Session::is_admin)
    }

    pub fn current_user_id(&self) -> Option<&str> {
        self.session.as_ref().map(Session::user_id)
    }

    pub fn broker(&self, id: &str) -> Option<&BrokerProfile> {
        self.brokers.iter().find(|b| b.id == id)
    }

    pub fn property(&self, id: &str) -> Option<&PropertyListing> {
        self.properties.iter().find(|p| p.id == id)
    }

    fn broker_mut(&mut self, id: &str) -> Option<&mut BrokerProfile> {
        self.brokers.iter_mut().find(|b| b.id == id)
    }

    fn property_mut(&mut self, id: &str) -> Option<&mut PropertyListing> {
        self.properties.iter_mut().find(|p| p.id == id)
    }

    /// Mirror a broker edit into the session if that broker is signed in
    fn sync_session_broker(&mut self, broker_id: &str) {
        let updated = self.brokers.iter().find(|b| b.id == broker_id).cloned();
        if let (Some(Session::Broker(current)), Some(updated)) = (self.session.as_mut(), updated) {
            if current.id == broker_id {
                *current = updated;
            }
        }
    }
}

/// The application's single state container. Construct one per client and
/// share it behind an `Arc`.
pub struct Store {
    gateway: Arc<dyn Gateway>,
    options: StoreOptions,
    state: RwLock<StoreState>,
    snapshot: Option<Arc<SnapshotWriter>>,
    hydrated: AtomicBool,
    hydration: Mutex<()>,
    version: watch::Sender<u64>,
}

impl Store {
    pub fn new(gateway: Arc<dyn Gateway>, options: StoreOptions) -> Self {
        let snapshot = options
            .snapshot_path
            .clone()
            .map(|path| Arc::new(SnapshotWriter::new(SnapshotFile::new(path))));
        let (version, _) = watch::channel(0);
        Self {
            gateway,
            options,
            state: RwLock::new(StoreState::default()),
            snapshot,
            hydrated: AtomicBool::new(false),
            hydration: Mutex::new(()),
            version,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Run `f` against the current state
    pub fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Owned copy of the current state
    pub fn state(&self) -> StoreState {
        self.read(StoreState::clone)
    }

    /// Receiver that ticks on every state change
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn has_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::SeqCst)
    }

    /// Restore the last snapshot. Reads before this completes are unreliable.
    /// Only the first call does anything.
    pub fn hydrate(&self) -> Result<()> {
        let _guard = self.hydration.lock().unwrap_or_else(PoisonError::into_inner);
        if self.has_hydrated() {
            return Ok(());
        }

        if let Some(writer) = &self.snapshot {
            match writer.file().load() {
                Ok(Some(restored)) => {
                    info!(
                        "Restored snapshot: {} brokers, {} properties, {} messages",
                        restored.brokers.len(),
                        restored.properties.len(),
                        restored.chat_messages.len()
                    );
                    *self.state.write().unwrap_or_else(PoisonError::into_inner) = restored;
                }
                Ok(None) => info!("No snapshot at {}, starting fresh", writer.file().path().display()),
                Err(e) => warn!("Ignoring unreadable snapshot: {}", e),
            }
        }

        self.hydrated.store(true, Ordering::SeqCst);
        self.version.send_modify(|v| *v += 1);
        Ok(())
    }

    /// Apply a synchronous state transition and publish it
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let result = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut state);
            self.publish(&state);
            result
        };
        self.persist();
        result
    }

    /// Like [`Store::mutate`], but publishes only when `f` reports a change
    fn mutate_if<R>(&self, f: impl FnOnce(&mut StoreState) -> Option<R>) -> Option<R> {
        let result = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut state);
            if result.is_some() {
                self.publish(&state);
            }
            result
        };
        if result.is_some() {
            self.persist();
        }
        result
    }

    /// Bump the version and stage a snapshot copy. Runs under the state
    /// write lock so versions and copies line up.
    fn publish(&self, state: &StoreState) {
        let mut version = 0;
        self.version.send_modify(|v| {
            *v += 1;
            version = *v;
        });
        if !self.has_hydrated() {
            return;
        }
        if let Some(writer) = &self.snapshot {
            writer.stage(version, state.clone());
        }
    }

    /// Write the newest staged snapshot, off the async workers when inside
    /// a runtime
    fn persist(&self) {
        let Some(writer) = &self.snapshot else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let writer = Arc::clone(writer);
                handle.spawn_blocking(move || {
                    if let Err(e) = writer.flush() {
                        error!("Failed to write snapshot: {}", e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = writer.flush() {
                    error!("Failed to write snapshot: {}", e);
                }
            }
        }
    }

    /// Block until the newest state is on disk
    pub fn flush_snapshot(&self) -> Result<()> {
        match &self.snapshot {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Settle an optimistic mutation once its remote write has finished
    fn reconcile<T>(
        &self,
        operation: &'static str,
        outcome: Result<T>,
        undo: impl FnOnce(&mut StoreState),
    ) -> Result<T> {
        match outcome {
            Ok(value) => Ok(value),
            Err(e) => {
                match self.options.sync_policy {
                    SyncPolicy::KeepOptimistic => {
                        warn!("{} failed remotely, keeping local change: {}", operation, e);
                    }
                    SyncPolicy::Rollback => {
                        warn!("{} failed remotely, rolling back: {}", operation, e);
                        self.mutate(undo);
                    }
                }
                Err(e)
            }
        }
    }

    fn require_admin(&self) -> Result<()> {
        if self.read(StoreState::is_admin_session) {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    fn require_user(&self) -> Result<String> {
        self.read(|s| s.current_user_id().map(str::to_string))
            .ok_or(Error::NotAuthenticated)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn hydrate_flips_flag_once_and_restores_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let gateway = Arc::new(crate::gateway::MemoryGateway::new());
        let options = StoreOptions {
            snapshot_path: Some(path.clone()),
            ..Default::default()
        };

        let first = Store::new(gateway.clone(), options.clone());
        assert!(!first.has_hydrated());
        first.hydrate().unwrap();
        assert!(first.has_hydrated());
        first.set_brokers(vec![broker("b1", "AAA111")]);

        let second = Store::new(gateway, options);
        assert!(second.read(|s| s.brokers.is_empty()));
        second.hydrate().unwrap();
        assert_eq!(second.read(|s| s.brokers.len()), 1);

        let version = second.version();
        second.hydrate().unwrap();
        assert_eq!(second.version(), version);
    }

    #[test]
    fn concurrent_writers_leave_the_latest_state_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Arc::new(Store::new(
            Arc::new(crate::gateway::MemoryGateway::new()),
            StoreOptions {
                snapshot_path: Some(path.clone()),
                ..Default::default()
            },
        ));
        store.hydrate().unwrap();

        for round in 0..5 {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let store = Arc::clone(&store);
                    std::thread::spawn(move || {
                        for i in 0..20 {
                            let id = format!("b{}-{}-{}", round, t, i);
                            store.set_brokers(vec![broker(&id, "AAA111")]);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let on_disk = SnapshotFile::new(path.clone()).load().unwrap().unwrap();
            assert_eq!(on_disk.brokers, store.state().brokers);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flush_snapshot_settles_writes_made_inside_a_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Store::new(
            Arc::new(crate::gateway::MemoryGateway::new()),
            StoreOptions {
                snapshot_path: Some(path.clone()),
                ..Default::default()
            },
        );
        store.hydrate().unwrap();

        for i in 0..10 {
            store.set_brokers(vec![broker(&format!("b{}", i), "AAA111")]);
        }
        store.flush_snapshot().unwrap();

        let on_disk = SnapshotFile::new(path).load().unwrap().unwrap();
        assert_eq!(on_disk.brokers[0].id, "b9");
    }

    #[test]
    fn changes_are_not_persisted_before_hydration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Store::new(
            Arc::new(crate::gateway::MemoryGateway::new()),
            StoreOptions {
                snapshot_path: Some(path.clone()),
                ..Default::default()
            },
        );

        store.set_brokers(vec![broker("b1", "AAA111")]);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn every_mutation_ticks_the_change_feed() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        let mut changes = store.changes();
        let p1 = listing("p1", "b1", "Udupi");
        gateway.seed(crate::gateway::Table::Properties, vec![crate::gateway::to_row(&p1).unwrap()]);

        store.set_properties(vec![p1]);
        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();

        store.like_property("p1").await.unwrap();
        assert!(changes.has_changed().unwrap());
    }
}
