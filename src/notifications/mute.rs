//! Global and per-user alarm mute evaluation.

use chrono::{DateTime, Utc};

use crate::storage::model::AlarmMute;

/// True if any global mute (no `user_id`) is currently active.
#[must_use]
pub fn is_globally_muted(mutes: &[AlarmMute], now: DateTime<Utc>) -> bool {
    mutes.iter().any(|m| m.user_id.is_none() && m.is_active_at(now))
}

/// True if `user_id` has an active per-user mute.
#[must_use]
pub fn is_user_muted(mutes: &[AlarmMute], user_id: &str, now: DateTime<Utc>) -> bool {
    mutes.iter().any(|m| m.user_id.as_deref() == Some(user_id) && m.is_active_at(now))
}
