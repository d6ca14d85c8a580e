use chrono::{DateTime, Utc};

use meetscribe_common::ids::RoomId;
use meetscribe_common::WorkerError;

use crate::store::StoreClient;

/// A room's monotonic origin `t0` (spec §4.2). Set once, cluster-wide, by
/// whichever worker first claims the room; every successor loads the same
/// value rather than minting its own, so transcript timestamps stay on
/// one timeline across crashes and reclaims.
#[derive(Clone, Copy, Debug)]
pub struct Timebase {
    origin: DateTime<Utc>,
}

impl Timebase {
    /// Load this room's origin if already set, otherwise race to set it
    /// and adopt whichever value the store ends up holding. A losing
    /// contender transparently adopts the winner's origin.
    pub async fn initialize(store: &StoreClient, room_id: RoomId) -> Result<Self, WorkerError> {
        let room = store.get_room(room_id).await?;

        let origin = match room.timebase_origin {
            Some(origin) => origin,
            None => store
                .set_timebase_origin_if_null(room_id, Utc::now())
                .await?,
        };

        Ok(Self { origin })
    }

    /// Seconds elapsed from `t0` to `at` (spec's
    /// `relative_timestamp_seconds = (wall_clock_timestamp - timebase_origin) / 1s`).
    pub fn relative(&self, at: DateTime<Utc>) -> f64 {
        (at - self.origin).num_nanoseconds().unwrap_or(0) as f64 / 1_000_000_000.0
    }

    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }

    #[cfg(test)]
    pub(crate) fn for_test(origin: DateTime<Utc>) -> Self {
        Self { origin }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn relative_computes_elapsed_seconds() {
        let origin = Utc::now();
        let tb = Timebase { origin };

        assert!((tb.relative(origin) - 0.0).abs() < 1e-9);
        assert!((tb.relative(origin + Duration::milliseconds(1500)) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn relative_handles_instants_before_origin() {
        let origin = Utc::now();
        let tb = Timebase { origin };

        let before = origin - Duration::seconds(2);
        assert!((tb.relative(before) - (-2.0)).abs() < 1e-6);
    }
}
