//! Next-occurrence arithmetic: the target weekday at a wall-clock time in a
//! tenant's zone, relative to a reference instant.

use chrono::offset::LocalResult;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Zone used when a configured name does not resolve.
pub const FALLBACK_ZONE: Tz = chrono_tz::America::New_York;

/// Resolve an IANA zone name, substituting [`FALLBACK_ZONE`] for unknown names.
pub fn resolve_zone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!("Unresolved timezone '{name}', using {FALLBACK_ZONE}");
        FALLBACK_ZONE
    })
}

/// Next instant at which `target` weekday falls on `time_of_day` in `timezone`,
/// at or after `reference`.
///
/// The candidate is taken in the same Monday-based local week as `reference`;
/// if it lands strictly before `reference` it is pushed exactly one local
/// week. A candidate equal to `reference` is returned unchanged, so the
/// result is never before `reference` and never more than one calendar week
/// past it. The bound is a local-calendar one: measured in UTC, a week that
/// crosses a DST transition can stretch the gap past seven days by the
/// zone's shift.
pub fn next_occurrence(
    timezone: &str,
    time_of_day: NaiveTime,
    target: Weekday,
    reference: DateTime<Utc>,
) -> DateTime<Utc> {
    let tz = resolve_zone(timezone);
    let local = reference.with_timezone(&tz);

    let offset = i64::from(target.num_days_from_monday())
        - i64::from(local.weekday().num_days_from_monday());
    let mut date = local.date_naive() + Duration::days(offset);
    let mut candidate = resolve_local(tz, date.and_time(time_of_day));
    if candidate.with_timezone(&Utc) < reference {
        date += Duration::days(7);
        candidate = resolve_local(tz, date.and_time(time_of_day));
    }
    candidate.with_timezone(&Utc)
}

/// Map a naive wall-clock time into a zone. Ambiguous times (fall-back) take
/// the earlier offset; nonexistent times (spring-forward gap) shift forward
/// one hour into the time that does exist.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        }
    }
}
