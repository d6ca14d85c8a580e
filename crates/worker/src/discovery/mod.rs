pub mod dedup;
pub mod notify;
pub mod polling;
pub mod realtime;

use meetscribe_common::types::{DiscoveryMethod, Room};

/// A room successfully claimed by one of the three notifiers, tagged with
/// the channel that triggered it (spec §4.8, for metrics).
#[derive(Clone, Debug)]
pub struct ClaimedRoom {
    pub room: Room,
    pub method: DiscoveryMethod,
}

pub use dedup::DedupCache;
pub use notify::NotifyListener;
pub use polling::PollingNotifier;
pub use realtime::RealtimeNotifier;
