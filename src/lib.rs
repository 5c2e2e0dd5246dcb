//! Album identity core of a desktop music player.
//!
//! This crate provides the canonical in-memory album model shared by UI and
//! playback components: an [`AlbumRegistry`] that guarantees at most one live
//! [`Album`] instance per logical album, a background worker assigning durable
//! numeric ids from a SQLite store, and cover-art acquisition with per-size
//! scaled variants routed back to the exact requesting instance.

pub mod album;
pub mod art;
pub mod artist;
pub mod config;
pub mod db_manager;
pub mod id_worker;
mod image_pipeline;
pub mod protocol;
pub mod registry;

pub use album::Album;
pub use art::{ArtSource, TheAudioDbArtSource};
pub use artist::Artist;
pub use config::Config;
pub use db_manager::DbManager;
pub use id_worker::{IdWorker, IdWorkerHandle};
pub use protocol::Notice;
pub use registry::AlbumRegistry;
