//! Local wall-clock to UTC conversion.
//!
//! A wall time is resolved against the IANA database at the local instant.
//! When the wall time occurs twice (clocks fall back) the earlier instant is
//! used. When it does not occur at all (clocks spring forward) it is moved
//! forward by one hour, which lands on the same clock reading after the jump.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone,
    Utc,
};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WALL_TIME: Regex =
        Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?$").expect("wall time pattern is valid");
}

/// Four-digit years only; `%Y` alone also accepts signed years far outside
/// anything a form can mean.
pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .ok()
        .filter(|date| (1..=9999).contains(&date.year()))
}

pub fn parse_time(time: &str) -> Option<NaiveTime> {
    let captures = WALL_TIME.captures(time.trim())?;
    let hour = captures.get(1)?.as_str().parse().ok()?;
    let minute = captures.get(2)?.as_str().parse().ok()?;
    let second = match captures.get(3) {
        Some(second) => second.as_str().parse().ok()?,
        None => 0,
    };
    NaiveTime::from_hms_opt(hour, minute, second)
}

pub fn parse_zone(zone: &str) -> Option<Tz> {
    zone.trim().parse::<Tz>().ok()
}

pub fn local_datetime(date: &str, time: &str) -> Option<NaiveDateTime> {
    Some(parse_date(date)?.and_time(parse_time(time)?))
}

pub fn zoned_to_utc(date: &str, time: &str, zone: &str) -> Option<DateTime<Utc>> {
    let local = local_datetime(date, time)?;
    let zone = parse_zone(zone)?;
    resolve(&zone, local).map(|instant| instant.with_timezone(&Utc))
}

#[cfg(test)]
pub fn zoned_to_utc_iso(date: &str, time: &str, zone: &str) -> Option<String> {
    zoned_to_utc(date, time, zone).map(|instant| to_iso(&instant))
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn to_iso(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn resolve(zone: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => zone
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest(),
    }
}
