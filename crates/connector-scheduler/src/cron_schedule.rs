use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use connector_types::{Error, Result};
use cron::Schedule;

/// `scheduling.interval` is a **quartz** cron string with seconds
/// precision (SPEC_FULL §3), e.g. `"1 * * * * *"` — six fields, not the
/// common five-field unix cron. The `cron` crate's parser accepts this
/// directly; neither the teacher nor any other example repo in the pack
/// parses cron expressions, so this dependency was picked up from
/// `other_examples/manifests/Lay3rLabs-WAVS/Cargo.toml` (see DESIGN.md).
pub fn parse(expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr).map_err(|err| Error::InvalidSchedule(expr.to_string(), err.to_string()))
}

/// Whether `expr` has a fire time in `(since, now]` (§4.7 step 3:
/// "scheduler fires (quartz cron evaluated against `last_synced`)").
/// `since = None` (never synced) is always due.
pub fn is_due(expr: &str, since: Option<time::OffsetDateTime>, now: time::OffsetDateTime) -> Result<bool> {
    let Some(since) = since else { return Ok(true) };
    let schedule = parse(expr)?;
    let since = to_chrono(since);
    let now = to_chrono(now);
    Ok(schedule.after(&since).next().map(|next_fire| next_fire <= now).unwrap_or(false))
}

fn to_chrono(t: time::OffsetDateTime) -> DateTime<Utc> {
    Utc.timestamp_opt(t.unix_timestamp(), t.nanosecond()).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}
