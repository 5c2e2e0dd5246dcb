//! Canonical album identity cache.
//!
//! One registry instance is created at application start and injected into
//! consumers. Three key maps (composite name, durable id, cover id) live
//! behind a single mutex; check-else-construct-and-insert is one critical
//! section, so concurrent lookups for the same key never build two
//! instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::broadcast;

use crate::album::Album;
use crate::art::{ArtClient, ArtFetcher, ArtSource, TheAudioDbArtSource};
use crate::artist::Artist;
use crate::config::Config;
use crate::db_manager::{sort_name, DbManager};
use crate::id_worker::{IdWorker, IdWorkerHandle};
use crate::protocol::{NoticeReceiver, NoticeSender, NOTICE_BUS_CAPACITY};

/// Composite name key: case-folded artist and album names, unit-separated.
pub(crate) fn name_key(artist: &str, album: &str) -> String {
    format!("{}\u{001f}{}", sort_name(artist), sort_name(album))
}

#[derive(Default)]
pub(crate) struct RegistryMaps {
    pub by_name: HashMap<String, Arc<Album>>,
    pub by_id: HashMap<u32, Arc<Album>>,
    pub by_cover: HashMap<String, Arc<Album>>,
}

pub struct AlbumRegistry {
    maps: Arc<Mutex<RegistryMaps>>,
    ids: Option<IdWorkerHandle>,
    art: Option<ArtClient>,
    notices: NoticeSender,
}

impl AlbumRegistry {
    /// Creates a registry over an optional id backend and art source.
    ///
    /// Without an id backend, name-keyed lookups soft-fail to `None`.
    pub fn new(ids: Option<IdWorkerHandle>, art_source: Option<Box<dyn ArtSource>>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_BUS_CAPACITY);
        let maps = Arc::new(Mutex::new(RegistryMaps::default()));
        let art = art_source
            .map(|source| ArtFetcher::spawn(source, Arc::downgrade(&maps), notices.clone()));
        Self {
            maps,
            ids,
            art,
            notices,
        }
    }

    /// Convenience bootstrap: SQLite store, id worker, and, when enabled,
    /// the online art source.
    pub fn with_config(config: &Config) -> Result<Self, rusqlite::Error> {
        let db_manager = DbManager::new(config.database.path.as_deref())?;
        let ids = IdWorker::spawn(db_manager);
        let art_source: Option<Box<dyn ArtSource>> = config
            .art
            .online_art_enabled
            .then(|| Box::new(TheAudioDbArtSource::new(&config.art)) as Box<dyn ArtSource>);
        Ok(Self::new(Some(ids), art_source))
    }

    /// Subscribes to registry change notices.
    pub fn subscribe(&self) -> NoticeReceiver {
        self.notices.subscribe()
    }

    /// Canonical handle for `(artist, name)`, constructing a pending instance
    /// on miss. `auto_create` controls whether a not-yet-persisted album may
    /// be created by the id backend.
    ///
    /// Returns `None` when no id backend is attached.
    pub fn get(&self, artist: &Arc<Artist>, name: &str, auto_create: bool) -> Option<Arc<Album>> {
        let ids = self.ids.as_ref()?;

        let mut maps = self.maps.lock().expect("registry maps lock poisoned");
        let key = name_key(artist.name(), name);
        if let Some(existing) = maps.by_name.get(&key) {
            return Some(existing.clone());
        }

        debug!("AlbumRegistry: constructing '{}' / '{}'", artist.name(), name);
        let reply = ids.request_album_id(artist.name(), name, auto_create);
        let album = Album::pending(
            name,
            artist.clone(),
            reply,
            Arc::downgrade(&self.maps),
            self.notices.clone(),
            self.art.clone(),
        );
        maps.by_cover.insert(album.cover_id(), album.clone());
        maps.by_name.insert(key, album.clone());
        Some(album)
    }

    /// Canonical handle for a known durable id, constructing and registering
    /// under all keys on miss (the id key only when `id` is non-zero).
    pub fn get_by_id(&self, id: u32, name: &str, artist: &Arc<Artist>) -> Arc<Album> {
        let mut maps = self.maps.lock().expect("registry maps lock poisoned");
        if let Some(existing) = maps.by_id.get(&id) {
            return existing.clone();
        }

        let album = Album::with_id(
            id,
            name,
            artist.clone(),
            Arc::downgrade(&self.maps),
            self.notices.clone(),
            self.art.clone(),
        );
        maps.by_cover.insert(album.cover_id(), album.clone());
        maps.by_name.insert(name_key(artist.name(), name), album.clone());
        if id > 0 {
            maps.by_id.insert(id, album.clone());
        }
        album
    }

    pub fn get_by_cover_id(&self, cover_id: &str) -> Option<Arc<Album>> {
        self.maps
            .lock()
            .expect("registry maps lock poisoned")
            .by_cover
            .get(cover_id)
            .cloned()
    }

    /// Drops an instance from the name and cover maps; the next name-keyed
    /// lookup constructs a fresh one.
    ///
    /// The durable-id entry is deliberately kept: ids outlive in-memory
    /// instances and id-keyed consumers may still resolve through it.
    pub fn evict(&self, album: &Arc<Album>) {
        let key = name_key(album.artist().name(), album.name());
        let mut maps = self.maps.lock().expect("registry maps lock poisoned");
        if maps
            .by_name
            .get(&key)
            .is_some_and(|held| Arc::ptr_eq(held, album))
        {
            maps.by_name.remove(&key);
        }
        maps.by_cover.retain(|_, held| !Arc::ptr_eq(held, album));
    }
}

#[cfg(test)]
mod tests {
    use super::AlbumRegistry;
    use crate::art::ArtSource;
    use crate::artist::Artist;
    use crate::db_manager::DbManager;
    use crate::id_worker::IdWorker;
    use crate::protocol::Notice;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Mutex};

    fn registry_with_store() -> AlbumRegistry {
        let db = DbManager::open_in_memory().expect("in-memory database");
        AlbumRegistry::new(Some(IdWorker::spawn(db)), None)
    }

    fn png_bytes() -> Vec<u8> {
        let source =
            DynamicImage::ImageRgba8(ImageBuffer::from_pixel(8, 8, Rgba([5, 10, 15, 255])));
        let mut cursor = Cursor::new(Vec::new());
        source
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("png encoding should succeed");
        cursor.into_inner()
    }

    /// Counts fetches and blocks each one until the gate is released.
    struct GatedSource {
        calls: Arc<AtomicUsize>,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl ArtSource for GatedSource {
        fn fetch_album_art(&self, _artist: &str, _album: &str) -> Result<Option<Vec<u8>>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.lock().expect("gate lock").recv();
            Ok(Some(png_bytes()))
        }
    }

    #[test]
    fn test_concurrent_lookups_return_one_instance() {
        let registry = registry_with_store();
        let artist = Artist::named("Boards of Canada");

        let handles = std::thread::scope(|scope| {
            let mut joins = Vec::new();
            for _ in 0..8 {
                let registry = &registry;
                let artist = artist.clone();
                joins.push(scope.spawn(move || {
                    registry
                        .get(&artist, "Music Has the Right to Children", true)
                        .expect("backend attached")
                }));
            }
            joins
                .into_iter()
                .map(|join| join.join().expect("lookup thread"))
                .collect::<Vec<_>>()
        });

        for handle in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], handle));
        }
    }

    #[test]
    fn test_lookup_without_backend_returns_none() {
        let registry = AlbumRegistry::new(None, None);
        let artist = Artist::named("Autechre");
        assert!(registry.get(&artist, "Amber", true).is_none());
    }

    #[test]
    fn test_resolved_id_registers_in_id_map() {
        let registry = registry_with_store();
        let artist = Artist::named("Aphex Twin");
        let album = registry
            .get(&artist, "Selected Ambient Works 85-92", true)
            .expect("backend attached");

        let id = album.id();
        assert!(id > 0);
        let by_id = registry.get_by_id(id, "Selected Ambient Works 85-92", &artist);
        assert!(Arc::ptr_eq(&album, &by_id));
    }

    #[test]
    fn test_get_by_id_registers_name_and_cover_keys() {
        let registry = registry_with_store();
        let artist = Artist::named("Plaid");
        let album = registry.get_by_id(77, "Not for Threes", &artist);

        assert_eq!(album.resolved_id(), Some(77));
        let by_name = registry
            .get(&artist, "Not for Threes", false)
            .expect("backend attached");
        assert!(Arc::ptr_eq(&album, &by_name));
        let by_cover = registry
            .get_by_cover_id(&album.cover_id())
            .expect("cover key registered");
        assert!(Arc::ptr_eq(&album, &by_cover));
    }

    #[test]
    fn test_get_by_id_zero_skips_id_key() {
        let registry = registry_with_store();
        let artist = Artist::named("Seefeel");
        let album = registry.get_by_id(0, "Quique", &artist);
        let other = registry.get_by_id(0, "Succour", &artist);
        assert!(!Arc::ptr_eq(&album, &other));
    }

    #[test]
    fn test_evict_removes_name_and_cover_keys() {
        let registry = registry_with_store();
        let artist = Artist::named("Broadcast");
        let album = registry
            .get(&artist, "The Noise Made by People", true)
            .expect("backend attached");
        let cover_id = album.cover_id();

        registry.evict(&album);

        assert!(registry.get_by_cover_id(&cover_id).is_none());
        let fresh = registry
            .get(&artist, "The Noise Made by People", true)
            .expect("backend attached");
        assert!(!Arc::ptr_eq(&album, &fresh));
    }

    #[test]
    fn test_evict_keeps_durable_id_entry() {
        let registry = registry_with_store();
        let artist = Artist::named("Pram");
        let album = registry
            .get(&artist, "The Stars Are So Big", true)
            .expect("backend attached");
        let id = album.id();

        registry.evict(&album);

        let by_id = registry.get_by_id(id, "The Stars Are So Big", &artist);
        assert!(Arc::ptr_eq(&album, &by_id));
    }

    #[test]
    fn test_cover_fetch_happens_once_and_rotates_cover_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = mpsc::channel();
        let source = GatedSource {
            calls: calls.clone(),
            gate: Mutex::new(gate),
        };
        let db = DbManager::open_in_memory().expect("in-memory database");
        let registry = AlbumRegistry::new(Some(IdWorker::spawn(db)), Some(Box::new(source)));
        let mut bus_rx = registry.subscribe();

        let artist = Artist::named("Laika");
        let album = registry
            .get(&artist, "Silver Apples of the Moon", true)
            .expect("backend attached");
        let old_cover = album.cover_id();

        assert!(album.cover(None, false).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(album.cover(Some((32, 32)), true).is_none());
        // Repeated force loads before completion submit nothing new.
        assert!(album.cover(Some((32, 32)), true).is_none());

        release.send(()).expect("fetch worker waiting on gate");
        let new_cover = loop {
            match bus_rx.blocking_recv().expect("notice bus open") {
                Notice::CoverChanged { cover_id } => break cover_id,
                Notice::AlbumIdResolved { .. } => continue,
            }
        };

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(album.cover(None, false).is_some());
        assert!(registry.get_by_cover_id(&old_cover).is_none());
        let by_cover = registry
            .get_by_cover_id(&new_cover)
            .expect("new cover key registered");
        assert!(Arc::ptr_eq(&album, &by_cover));

        // Loaded covers never refetch.
        assert!(album.cover(None, true).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
