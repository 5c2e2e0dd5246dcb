//! Cover-art acquisition: request/response worker with token routing.
//!
//! Albums submit keyed requests and receive results through an explicit
//! completion map (correlation token to instance), so responses reach exactly
//! the waiting caller. Stale or foreign tokens are dropped silently.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::album::Album;
use crate::config::ArtConfig;
use crate::protocol::{Notice, NoticeSender};
use crate::registry::RegistryMaps;

const THEAUDIODB_BASE_URL: &str = "https://www.theaudiodb.com/api/v1/json/2";
const ART_USER_AGENT: &str = "discograph/0.1.0 (album art lookup)";

/// Source of raw album-art bytes. `Ok(None)` means the source has no art for
/// the pair; errors are logged by the worker and treated the same way.
pub trait ArtSource: Send + 'static {
    fn fetch_album_art(&self, artist: &str, album: &str) -> Result<Option<Vec<u8>>, String>;
}

struct ArtRequest {
    token: String,
    artist: String,
    album: String,
}

/// Result routing shared by the worker thread and submitting handles.
#[derive(Clone)]
struct ArtRouter {
    pending: Arc<Mutex<HashMap<String, Weak<Album>>>>,
    maps: Weak<Mutex<RegistryMaps>>,
    notices: NoticeSender,
}

impl ArtRouter {
    /// Routes one fetch outcome to the instance waiting on `token`.
    fn deliver(&self, token: &str, outcome: Option<Vec<u8>>) {
        let target = self
            .pending
            .lock()
            .expect("pending art map lock poisoned")
            .remove(token);
        let Some(target) = target else {
            debug!("ArtRouter: stale or foreign art result for token {token}, ignoring");
            return;
        };
        let Some(album) = target.upgrade() else {
            return;
        };

        let Some((previous_cover, new_cover)) = album.apply_art(outcome) else {
            return;
        };
        if let Some(maps) = self.maps.upgrade() {
            let mut maps = maps.lock().expect("registry maps lock poisoned");
            if maps
                .by_cover
                .get(&previous_cover)
                .is_some_and(|held| Arc::ptr_eq(held, &album))
            {
                maps.by_cover.remove(&previous_cover);
            }
            maps.by_cover.insert(new_cover.clone(), album.clone());
        }
        let _ = self.notices.send(Notice::CoverChanged {
            cover_id: new_cover,
        });
    }
}

/// Cloneable handle submitting art requests to the fetch worker.
#[derive(Clone)]
pub(crate) struct ArtClient {
    tx: mpsc::UnboundedSender<ArtRequest>,
    router: ArtRouter,
}

impl ArtClient {
    /// Queues one fetch for the album currently registered under `cover_id`.
    ///
    /// The waiting instance is resolved through the registry cover map rather
    /// than passed in, so only registered albums can receive results.
    pub(crate) fn submit(&self, token: &str, artist: &str, album: &str, cover_id: &str) {
        let Some(maps) = self.router.maps.upgrade() else {
            return;
        };
        let target = maps
            .lock()
            .expect("registry maps lock poisoned")
            .by_cover
            .get(cover_id)
            .map(Arc::downgrade);
        let Some(target) = target else {
            debug!("ArtClient: no registered instance for cover id {cover_id}, dropping request");
            return;
        };

        self.router
            .pending
            .lock()
            .expect("pending art map lock poisoned")
            .insert(token.to_string(), target);
        let request = ArtRequest {
            token: token.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
        };
        if self.tx.send(request).is_err() {
            warn!("ArtClient: art worker gone, dropping request for '{artist}' / '{album}'");
            self.router
                .pending
                .lock()
                .expect("pending art map lock poisoned")
                .remove(token);
        }
    }
}

pub(crate) struct ArtFetcher;

impl ArtFetcher {
    /// Spawns the fetch worker thread and returns the submitting handle.
    ///
    /// The worker exits once every handle is dropped.
    pub(crate) fn spawn(
        source: Box<dyn ArtSource>,
        maps: Weak<Mutex<RegistryMaps>>,
        notices: NoticeSender,
    ) -> ArtClient {
        let (tx, mut rx) = mpsc::unbounded_channel::<ArtRequest>();
        let router = ArtRouter {
            pending: Arc::new(Mutex::new(HashMap::new())),
            maps,
            notices,
        };

        let worker_router = router.clone();
        thread::spawn(move || {
            while let Some(request) = rx.blocking_recv() {
                let ArtRequest {
                    token,
                    artist,
                    album,
                } = request;
                let outcome = match source.fetch_album_art(&artist, &album) {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        warn!("ArtFetcher: fetch failed for '{artist}' / '{album}': {error}");
                        None
                    }
                };
                worker_router.deliver(&token, outcome);
            }
            debug!("ArtFetcher: request channel closed, exiting");
        });

        ArtClient { tx, router }
    }
}

fn audiodb_search_url(artist: &str, album: &str) -> String {
    format!(
        "{THEAUDIODB_BASE_URL}/searchalbum.php?s={}&a={}",
        urlencoding::encode(artist),
        urlencoding::encode(album)
    )
}

/// Album-art source backed by TheAudioDB's public search endpoint.
pub struct TheAudioDbArtSource {
    http_client: ureq::Agent,
}

impl TheAudioDbArtSource {
    pub fn new(config: &ArtConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(Duration::from_secs(config.request_timeout_secs))
            .timeout_write(Duration::from_secs(config.request_timeout_secs))
            .build();
        Self { http_client }
    }

    fn http_get_json(&self, url: &str) -> Result<Value, String> {
        let response = self
            .http_client
            .get(url)
            .set("User-Agent", ART_USER_AGENT)
            .set("Accept", "application/json")
            .call()
            .map_err(|error| format!("Request failed: {error}"))?;
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| format!("Failed to read response: {error}"))?;
        serde_json::from_str(&body).map_err(|error| format!("Invalid JSON response: {error}"))
    }

    fn http_get_bytes(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .http_client
            .get(url)
            .set("User-Agent", ART_USER_AGENT)
            .call()
            .map_err(|error| format!("Request failed: {error}"))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|error| format!("Failed to read response: {error}"))?;
        Ok(bytes)
    }
}

impl ArtSource for TheAudioDbArtSource {
    fn fetch_album_art(&self, artist: &str, album: &str) -> Result<Option<Vec<u8>>, String> {
        let parsed = self.http_get_json(&audiodb_search_url(artist, album))?;
        let thumb_url = parsed
            .get("album")
            .and_then(|albums| albums.as_array())
            .and_then(|albums| albums.first())
            .and_then(|entry| entry.get("strAlbumThumb"))
            .and_then(|value| value.as_str())
            .filter(|value| !value.is_empty());
        let Some(thumb_url) = thumb_url else {
            debug!("TheAudioDbArtSource: no art listed for '{artist}' / '{album}'");
            return Ok(None);
        };
        self.http_get_bytes(thumb_url).map(Some)
    }
}
