use chrono::{DateTime, Utc};

/// Current wall-clock time, UTC. All persisted `created_at` metadata goes
/// through here.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
