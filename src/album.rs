//! Album domain entity: pending-id state machine and cover state.
//!
//! Instances are only ever constructed by [`crate::registry::AlbumRegistry`],
//! which guarantees one live instance per logical album. The durable id may
//! still be in flight when a handle is returned; [`Album::id`] blocks on the
//! worker reply and performs the pending-to-resolved transition exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use image::DynamicImage;
use log::{debug, warn};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::art::ArtClient;
use crate::artist::Artist;
use crate::db_manager::sort_name;
use crate::image_pipeline;
use crate::protocol::{Notice, NoticeSender};
use crate::registry::{name_key, RegistryMaps};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdState {
    Pending,
    Resolved(u32),
}

struct CoverState {
    cover_id: String,
    buffer: Vec<u8>,
    decoded: Option<Arc<DynamicImage>>,
    scaled: HashMap<u32, Arc<DynamicImage>>,
    loaded: bool,
    loading: bool,
}

impl CoverState {
    fn new() -> Self {
        Self {
            cover_id: Uuid::new_v4().to_string(),
            buffer: Vec::new(),
            decoded: None,
            scaled: HashMap::new(),
            loaded: false,
            loading: false,
        }
    }
}

pub struct Album {
    name: String,
    sort_name: String,
    artist: Arc<Artist>,
    /// Correlation token matching art results back to this instance.
    request_token: String,
    id_state: RwLock<IdState>,
    /// Serializes id waiters; the first holder consumes the worker reply.
    id_reply: Mutex<Option<oneshot::Receiver<u32>>>,
    cover: Mutex<CoverState>,
    maps: Weak<Mutex<RegistryMaps>>,
    notices: NoticeSender,
    art: Option<ArtClient>,
}

impl Album {
    pub(crate) fn pending(
        name: &str,
        artist: Arc<Artist>,
        id_reply: oneshot::Receiver<u32>,
        maps: Weak<Mutex<RegistryMaps>>,
        notices: NoticeSender,
        art: Option<ArtClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sort_name: sort_name(name),
            artist,
            request_token: Uuid::new_v4().to_string(),
            id_state: RwLock::new(IdState::Pending),
            id_reply: Mutex::new(Some(id_reply)),
            cover: Mutex::new(CoverState::new()),
            maps,
            notices,
            art,
        })
    }

    pub(crate) fn with_id(
        id: u32,
        name: &str,
        artist: Arc<Artist>,
        maps: Weak<Mutex<RegistryMaps>>,
        notices: NoticeSender,
        art: Option<ArtClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sort_name: sort_name(name),
            artist,
            request_token: Uuid::new_v4().to_string(),
            id_state: RwLock::new(IdState::Resolved(id)),
            id_reply: Mutex::new(None),
            cover: Mutex::new(CoverState::new()),
            maps,
            notices,
            art,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sort_name(&self) -> &str {
        &self.sort_name
    }

    pub fn artist(&self) -> &Arc<Artist> {
        &self.artist
    }

    pub fn request_token(&self) -> &str {
        &self.request_token
    }

    /// Current cover-art key; rotates when new art arrives.
    pub fn cover_id(&self) -> String {
        self.cover
            .lock()
            .expect("cover state lock poisoned")
            .cover_id
            .clone()
    }

    /// Durable id without blocking; `None` while assignment is in flight.
    pub fn resolved_id(&self) -> Option<u32> {
        match *self.id_state.read().expect("id state lock poisoned") {
            IdState::Resolved(id) => Some(id),
            IdState::Pending => None,
        }
    }

    /// Durable id of this album, blocking while assignment is in flight.
    ///
    /// The first caller consumes the worker reply and registers the instance
    /// in the registry id map; concurrent callers block on the reply slot and
    /// observe the final value. A dropped reply resolves to 0, permanently.
    pub fn id(&self) -> u32 {
        if let Some(id) = self.resolved_id() {
            return id;
        }

        let mut reply_slot = self.id_reply.lock().expect("id reply lock poisoned");
        if let Some(id) = self.resolved_id() {
            return id;
        }

        let final_id = match reply_slot.take() {
            Some(reply) => reply.blocking_recv().unwrap_or_else(|_| {
                warn!(
                    "Album: id assignment dropped for '{}' / '{}', resolving to 0",
                    self.artist.name(),
                    self.name
                );
                0
            }),
            None => 0,
        };

        *self.id_state.write().expect("id state lock poisoned") = IdState::Resolved(final_id);
        if final_id > 0 {
            self.register_id(final_id);
        }
        let _ = self.notices.send(Notice::AlbumIdResolved {
            id: final_id,
            artist: self.artist.name().to_string(),
            name: self.name.clone(),
        });
        final_id
    }

    /// Inserts the canonical handle for this album into the registry id map.
    ///
    /// The canonical `Arc` is looked up by name key rather than kept as a
    /// self-reference; a concurrently evicted instance is simply skipped.
    fn register_id(&self, id: u32) {
        let Some(maps) = self.maps.upgrade() else {
            return;
        };
        let mut maps = maps.lock().expect("registry maps lock poisoned");
        let key = name_key(self.artist.name(), &self.name);
        if let Some(canonical) = maps.by_name.get(&key).cloned() {
            maps.by_id.insert(id, canonical);
        }
    }

    /// Cover art scaled to fit `size`, or the full decode when `size` is
    /// `None`.
    ///
    /// Returns `None` while no art has been loaded. With `force_load` the
    /// first miss submits one fetch for the lifetime of the instance; an
    /// empty outcome marks the cover terminally empty.
    pub fn cover(&self, size: Option<(u32, u32)>, force_load: bool) -> Option<Arc<DynamicImage>> {
        let mut cover = self.cover.lock().expect("cover state lock poisoned");

        if !cover.loaded && !cover.loading {
            if !force_load {
                return None;
            }
            match &self.art {
                Some(art) => {
                    debug!(
                        "Album: requesting cover art for '{}' / '{}'",
                        self.artist.name(),
                        self.name
                    );
                    art.submit(
                        &self.request_token,
                        self.artist.name(),
                        &self.name,
                        &cover.cover_id,
                    );
                    cover.loading = true;
                }
                // No art source attached: terminally empty.
                None => cover.loaded = true,
            }
        }

        if cover.decoded.is_none() && !cover.buffer.is_empty() {
            match image_pipeline::decode_image(&cover.buffer) {
                Some(decoded) => cover.decoded = Some(Arc::new(decoded)),
                None => {
                    warn!(
                        "Album: undecodable cover bytes for '{}' / '{}', discarding",
                        self.artist.name(),
                        self.name
                    );
                    cover.buffer.clear();
                }
            }
        }

        let decoded = cover.decoded.clone()?;
        let Some((width, height)) = size else {
            return Some(decoded);
        };
        if width == 0 || height == 0 {
            return Some(decoded);
        }
        if let Some(scaled) = cover.scaled.get(&width) {
            return Some(scaled.clone());
        }
        let scaled = Arc::new(image_pipeline::scale_to_fit(&decoded, width, height));
        cover.scaled.insert(width, scaled.clone());
        Some(scaled)
    }

    /// Applies a fetched art outcome.
    ///
    /// Returns the `(previous, current)` cover-id pair when art arrived so
    /// the caller can rebind the registry cover key. An empty outcome marks
    /// the cover loaded with no bytes, ending the single fetch attempt.
    pub(crate) fn apply_art(&self, bytes: Option<Vec<u8>>) -> Option<(String, String)> {
        let mut cover = self.cover.lock().expect("cover state lock poisoned");
        cover.loading = false;
        cover.loaded = true;
        match bytes {
            Some(bytes) if !bytes.is_empty() => {
                cover.buffer = bytes;
                cover.decoded = None;
                cover.scaled.clear();
                let previous =
                    std::mem::replace(&mut cover.cover_id, Uuid::new_v4().to_string());
                Some((previous, cover.cover_id.clone()))
            }
            _ => None,
        }
    }
}
