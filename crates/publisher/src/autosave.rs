//! Periodic draft auto-save
//!
//! Writes the live compose fields to the draft store on an interval while
//! title, abstract and content are all filled in. `stop` waits for an
//! in-flight save, so once it returns no further write can happen.

use crate::compose::ComposeInput;
use scholarmint_common::db::DraftStore;
use scholarmint_common::metrics::record_autosave;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct AutoSave {
    stopped: Arc<AtomicBool>,
    save_lock: Arc<Mutex<()>>,
    handle: JoinHandle<()>,
}

impl AutoSave {
    /// Start saving `compose` every `interval`; the first save happens after one interval
    pub fn spawn(
        drafts: Arc<dyn DraftStore>,
        draft_id: Uuid,
        author_id: Uuid,
        compose: watch::Receiver<ComposeInput>,
        interval: Duration,
    ) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let save_lock = Arc::new(Mutex::new(()));

        let handle = tokio::spawn(run(
            drafts,
            draft_id,
            author_id,
            compose,
            interval,
            stopped.clone(),
            save_lock.clone(),
        ));

        debug!(draft_id = %draft_id, interval_secs = interval.as_secs(), "Auto-save started");

        Self {
            stopped,
            save_lock,
            handle,
        }
    }

    /// Stop saving, waiting for a save already in progress
    pub async fn stop(self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _guard = self.save_lock.lock().await;
        self.handle.abort();
    }
}

impl Drop for AutoSave {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.handle.abort();
    }
}

async fn run(
    drafts: Arc<dyn DraftStore>,
    draft_id: Uuid,
    author_id: Uuid,
    compose: watch::Receiver<ComposeInput>,
    interval: Duration,
    stopped: Arc<AtomicBool>,
    save_lock: Arc<Mutex<()>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval fires immediately once
    ticker.tick().await;

    let mut last_saved: Option<ComposeInput> = None;

    loop {
        ticker.tick().await;
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        let _guard = save_lock.lock().await;
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        let current = compose.borrow().clone();
        if !current.is_saveable() || last_saved.as_ref() == Some(&current) {
            continue;
        }

        match drafts.save_draft(current.to_draft(draft_id, author_id)).await {
            Ok(_) => {
                debug!(draft_id = %draft_id, "Draft auto-saved");
                record_autosave(true);
                last_saved = Some(current);
            }
            Err(e) => {
                warn!(draft_id = %draft_id, error = %e, "Auto-save failed");
                record_autosave(false);
            }
        }
    }

    debug!(draft_id = %draft_id, "Auto-save stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholarmint_common::db::MemoryStore;

    fn compose(title: &str) -> ComposeInput {
        ComposeInput {
            title: title.to_string(),
            abstract_text: "Abstract".to_string(),
            content_html: "<p>Body</p>".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_saves_on_interval() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = watch::channel(compose("First"));
        let draft_id = Uuid::new_v4();
        let author_id = Uuid::new_v4();

        let autosave = AutoSave::spawn(store.clone(), draft_id, author_id, rx, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;

        let saved = store.find_draft(draft_id).await.unwrap().unwrap();
        assert_eq!(saved.title, "First");

        tx.send_replace(compose("Second"));
        tokio::time::sleep(Duration::from_millis(80)).await;
        let saved = store.find_draft(draft_id).await.unwrap().unwrap();
        assert_eq!(saved.title, "Second");

        autosave.stop().await;
    }

    #[tokio::test]
    async fn test_incomplete_compose_not_saved() {
        let store = Arc::new(MemoryStore::new());
        let (_tx, rx) = watch::channel(ComposeInput {
            title: "Only a title".to_string(),
            ..Default::default()
        });
        let draft_id = Uuid::new_v4();

        let autosave = AutoSave::spawn(store.clone(), draft_id, Uuid::new_v4(), rx, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        autosave.stop().await;

        assert!(store.find_draft(draft_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stopped_autosave_never_writes_again() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = watch::channel(compose("Krump"));
        let draft_id = Uuid::new_v4();

        let autosave = AutoSave::spawn(store.clone(), draft_id, Uuid::new_v4(), rx, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        autosave.stop().await;

        assert!(store.delete_draft(draft_id).await.unwrap());
        tx.send_replace(compose("Changed after stop"));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(store.find_draft(draft_id).await.unwrap().is_none());
    }
}
