//! Background assignment of durable album ids.
//!
//! Album construction stays synchronous; the registry hands each new pending
//! album a oneshot receiver and this worker answers it off-thread from the
//! SQLite store.

use std::thread;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use crate::db_manager::DbManager;

pub(crate) struct IdRequest {
    pub artist: String,
    pub album: String,
    pub auto_create: bool,
    pub reply: oneshot::Sender<u32>,
}

/// Cloneable handle submitting id requests to the worker thread.
///
/// The worker exits once every handle is dropped.
#[derive(Clone)]
pub struct IdWorkerHandle {
    tx: mpsc::UnboundedSender<IdRequest>,
}

impl IdWorkerHandle {
    pub(crate) fn request_album_id(
        &self,
        artist: &str,
        album: &str,
        auto_create: bool,
    ) -> oneshot::Receiver<u32> {
        let (reply, reply_rx) = oneshot::channel();
        let request = IdRequest {
            artist: artist.to_string(),
            album: album.to_string(),
            auto_create,
            reply,
        };
        if self.tx.send(request).is_err() {
            // Dropped reply sender makes the waiting album resolve to 0.
            warn!(
                "IdWorker: request channel closed, id for '{}' / '{}' will resolve to 0",
                artist, album
            );
        }
        reply_rx
    }
}

pub struct IdWorker;

impl IdWorker {
    /// Spawns the worker thread owning the store and returns its handle.
    pub fn spawn(db_manager: DbManager) -> IdWorkerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<IdRequest>();
        thread::spawn(move || {
            while let Some(request) = rx.blocking_recv() {
                let IdRequest {
                    artist,
                    album,
                    auto_create,
                    reply,
                } = request;
                let id = match db_manager.album_id(&artist, &album, auto_create) {
                    Ok(Some(id)) => id,
                    Ok(None) => 0,
                    Err(error) => {
                        warn!(
                            "IdWorker: id lookup failed for '{}' / '{}': {}",
                            artist, album, error
                        );
                        0
                    }
                };
                debug!("IdWorker: '{}' / '{}' -> {}", artist, album, id);
                let _ = reply.send(id);
            }
            debug!("IdWorker: request channel closed, exiting");
        });
        IdWorkerHandle { tx }
    }
}

#[cfg(test)]
mod tests {
    use super::IdWorker;
    use crate::db_manager::DbManager;

    #[test]
    fn test_worker_assigns_stable_ids() {
        let db = DbManager::open_in_memory().expect("in-memory database");
        let ids = IdWorker::spawn(db);

        let first = ids
            .request_album_id("Broadcast", "Tender Buttons", true)
            .blocking_recv()
            .expect("worker reply");
        let second = ids
            .request_album_id("Broadcast", "Tender Buttons", true)
            .blocking_recv()
            .expect("worker reply");
        assert!(first > 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_worker_replies_zero_without_auto_create() {
        let db = DbManager::open_in_memory().expect("in-memory database");
        let ids = IdWorker::spawn(db);

        let id = ids
            .request_album_id("Unknown", "Unreleased", false)
            .blocking_recv()
            .expect("worker reply");
        assert_eq!(id, 0);
    }
}
