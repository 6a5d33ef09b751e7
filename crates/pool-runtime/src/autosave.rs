//! Periodic flush of the store to its backend.

use crate::store::StateStore;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Persist `store` every `period` on the current `LocalSet`.
///
/// A tick that finds the store mutably borrowed is skipped. Abort the
/// returned handle to stop.
pub fn spawn_autosave(store: Rc<RefCell<StateStore>>, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::task::spawn_local(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.try_borrow() {
                Ok(s) => {
                    s.persist();
                }
                Err(_) => debug!("store busy, skipping auto-save"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{AppConfig, StoreConfig};
    use persistence::{MemoryStorage, StorageBackend};
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    fn shared(backend: &MemoryStorage) -> Rc<RefCell<StateStore>> {
        Rc::new(RefCell::new(StateStore::init(
            StoreConfig::default(),
            Box::new(backend.clone()),
            Box::new(ManualClock::default()),
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn saves_on_every_period() {
        let backend = MemoryStorage::new();
        let store = shared(&backend);
        LocalSet::new()
            .run_until(async {
                let handle = spawn_autosave(store.clone(), Duration::from_secs(30));
                sleep(Duration::from_secs(29)).await;
                assert!(backend.get("app_state").is_none());
                sleep(Duration::from_secs(2)).await;
                assert!(backend.get("app_state").is_some());
                handle.abort();
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn configured_period_drives_the_timer() {
        let backend = MemoryStorage::new();
        let config = AppConfig::from_yaml("store:\n  autosave_secs: 5\n").unwrap();
        let store = Rc::new(RefCell::new(StateStore::init(
            config.store,
            Box::new(backend.clone()),
            Box::new(ManualClock::default()),
        )));
        let period = store.borrow().config().autosave_period().unwrap();
        LocalSet::new()
            .run_until(async {
                let handle = spawn_autosave(store.clone(), period);
                sleep(Duration::from_secs(6)).await;
                assert!(backend.get("app_state").is_some());
                handle.abort();
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn skips_tick_while_store_is_borrowed() {
        let backend = MemoryStorage::new();
        let store = shared(&backend);
        LocalSet::new()
            .run_until(async {
                let handle = spawn_autosave(store.clone(), Duration::from_secs(30));
                let guard = store.borrow_mut();
                sleep(Duration::from_secs(31)).await;
                drop(guard);
                assert!(backend.get("app_state").is_none());
                sleep(Duration::from_secs(30)).await;
                assert!(backend.get("app_state").is_some());
                handle.abort();
            })
            .await;
    }
}
