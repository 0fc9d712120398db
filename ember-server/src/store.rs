//! The interface the core consumes from the persistence layer.
//!
//! The relational store itself (players, saved artifacts, statistics) is
//! an external collaborator and serializes its own access; the core only
//! calls through this trait from handler code and from the periodic
//! maintenance sweep.

use ember_proto::records::BloodMessage;

/// Persistence as the core sees it.
pub trait PlayerStore: Send + Sync {
    /// A player completed authentication.
    fn player_seen(&self, _steam_id: &str) {}

    /// A blood message was created and should survive restarts.
    fn save_blood_message(&self, _message: &BloodMessage) {}

    /// A blood message was removed by its author.
    fn delete_blood_message(&self, _message_id: u32) {}

    /// Stored messages for warming the pools at startup, at most
    /// `count_per_area` from any one area.
    fn stored_blood_messages(&self, _count_per_area: usize) -> Vec<BloodMessage> {
        Vec::new()
    }

    /// Periodic maintenance hook (trimming, vacuuming); invoked from the
    /// game service on its own schedule.
    fn maintain(&self) {}
}

/// The no-op store: a server with no persistence behind it.
pub struct NullStore;

impl PlayerStore for NullStore {}
