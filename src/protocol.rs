//! Change notices published by the album registry.
//!
//! Consumers (UI lists, now-playing views) subscribe to one broadcast bus and
//! re-read album state through their shared handles when a notice arrives.

use tokio::sync::broadcast;

/// Bounded capacity of the notice bus; slow subscribers lag rather than block.
pub const NOTICE_BUS_CAPACITY: usize = 256;

/// Registry-wide change notification payloads.
#[derive(Debug, Clone)]
pub enum Notice {
    /// A pending album acquired its durable id (0 when assignment failed).
    AlbumIdResolved {
        id: u32,
        artist: String,
        name: String,
    },
    /// New cover art arrived; the album is now registered under `cover_id`.
    CoverChanged { cover_id: String },
}

pub type NoticeSender = broadcast::Sender<Notice>;
pub type NoticeReceiver = broadcast::Receiver<Notice>;
