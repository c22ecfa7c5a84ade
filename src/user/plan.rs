//! Plan expiry arithmetic.
//!
//! A plan is a single expiry timestamp on the user row. Expiry is always
//! computed at read time, never stored as a flag.

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// A user with no expiry set has never been granted a plan and counts as
/// expired.
pub fn is_expired(plan_expiry: Option<i64>, now: i64) -> bool {
    match plan_expiry {
        None => true,
        Some(expiry) => now > expiry,
    }
}

/// Extension is additive while the plan is still active; once lapsed (or
/// never granted) the new expiry counts from now, so stale time is not
/// credited.
pub fn extend(plan_expiry: Option<i64>, days: i64, now: i64) -> i64 {
    let base = match plan_expiry {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    base + days * SECONDS_PER_DAY
}
