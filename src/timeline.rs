//! Time handling for messages: canonical epoch seconds, the display
//! ordering rule, and calendar-day grouping in local time.

use crate::types::{CreatedAt, Message, MessageId};
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

const NAIVE_DATETIME: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const NAIVE_DATETIME_FRACTION: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
const DATE_ONLY: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

const DIVIDER_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");
const MESSAGE_TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

// Keeps day arithmetic inside the representable calendar range.
const MIN_TIMESTAMP: i64 = -62_135_596_800 + 2 * 86_400;
const MAX_TIMESTAMP: i64 = 253_402_300_799 - 2 * 86_400;

#[derive(Clone, Debug, PartialEq)]
pub struct DateGroup {
    /// Canonical timestamp of the first message in the group.
    pub date: i64,
    pub messages: Vec<Message>,
}

/// Local offset of the host, UTC when it cannot be determined.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

pub fn canonical_timestamp(message: &Message) -> i64 {
    canonical_timestamp_at(message, OffsetDateTime::now_utc())
}

/// Like [`canonical_timestamp`], with `now` as the fallback for missing or
/// unparseable creation times.
pub fn canonical_timestamp_at(message: &Message, now: OffsetDateTime) -> i64 {
    if let Some(ts) = message.timestamp {
        return ts;
    }
    message
        .created_at
        .as_ref()
        .and_then(created_at_seconds)
        .unwrap_or_else(|| now.unix_timestamp())
}

fn created_at_seconds(created_at: &CreatedAt) -> Option<i64> {
    match created_at {
        CreatedAt::DateTime(dt) => Some(dt.unix_timestamp()),
        CreatedAt::EpochMillis(ms) => Some(ms.div_euclid(1000)),
        CreatedAt::Text(raw) => parse_timestamp_text(raw).map(OffsetDateTime::unix_timestamp),
    }
}

pub fn parse_timestamp_text(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt);
    }

    let mut normalized = raw.replacen(' ', "T", 1);
    // Postgres prints offsets as "+00" with no minutes.
    if let Some(pos) = normalized.rfind(|c| c == '+' || c == '-')
        && pos > 10
        && normalized.len() - pos == 3
    {
        normalized.push_str(":00");
    }
    if let Ok(dt) = OffsetDateTime::parse(&normalized, &Rfc3339) {
        return Some(dt);
    }

    // Offset-less datetimes are wall-clock times in the local zone.
    for format in [NAIVE_DATETIME, NAIVE_DATETIME_FRACTION] {
        if let Ok(naive) = PrimitiveDateTime::parse(&normalized, format) {
            return Some(naive.assume_offset(local_offset()));
        }
    }

    Date::parse(raw, DATE_ONLY)
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// Display position of a message. Confirmed before optimistic, then
/// canonical seconds, then sub-second creation time, then server id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    is_temp: bool,
    seconds: i64,
    nanos: i128,
    id: IdKey,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum IdKey {
    Int(i64),
    Text(String),
}

pub fn order_key_at(message: &Message, now: OffsetDateTime) -> OrderKey {
    let seconds = canonical_timestamp_at(message, now);
    let nanos = message
        .created_at
        .as_ref()
        .and_then(created_at_nanos)
        .unwrap_or_else(|| i128::from(seconds) * 1_000_000_000);
    OrderKey {
        is_temp: message.is_temp,
        seconds,
        nanos,
        id: match &message.id {
            MessageId::Int(id) => IdKey::Int(*id),
            MessageId::Text(id) => IdKey::Text(id.clone()),
        },
    }
}

/// Order key that does not depend on the clock; rows without a usable time
/// rank by id alone.
pub fn latest_key(message: &Message) -> OrderKey {
    order_key_at(message, OffsetDateTime::UNIX_EPOCH)
}

fn created_at_nanos(created_at: &CreatedAt) -> Option<i128> {
    match created_at {
        CreatedAt::DateTime(dt) => Some(dt.unix_timestamp_nanos()),
        CreatedAt::EpochMillis(ms) => Some(i128::from(*ms) * 1_000_000),
        CreatedAt::Text(raw) => parse_timestamp_text(raw).map(OffsetDateTime::unix_timestamp_nanos),
    }
}

/// Orders messages for display by [`OrderKey`]. Input order does not matter;
/// the store hands rows over newest first.
pub fn sort_messages(messages: Vec<Message>) -> Vec<Message> {
    let now = OffsetDateTime::now_utc();
    let mut keyed: Vec<(OrderKey, Message)> = messages
        .into_iter()
        .map(|msg| (order_key_at(&msg, now), msg))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
    keyed.into_iter().map(|(_, msg)| msg).collect()
}

pub fn group_by_date(messages: &[Message]) -> Vec<DateGroup> {
    group_by_date_in(messages, local_offset())
}

/// Splits an already ordered list into runs sharing a calendar day at
/// `offset`. Does not sort.
pub fn group_by_date_in(messages: &[Message], offset: UtcOffset) -> Vec<DateGroup> {
    let now = OffsetDateTime::now_utc();
    let mut groups: Vec<DateGroup> = Vec::new();
    let mut current_day: Option<Date> = None;

    for message in messages {
        let ts = canonical_timestamp_at(message, now);
        let day = day_of(ts, offset);
        match groups.last_mut() {
            Some(group) if current_day == Some(day) => group.messages.push(message.clone()),
            _ => {
                groups.push(DateGroup {
                    date: ts,
                    messages: vec![message.clone()],
                });
                current_day = Some(day);
            }
        }
    }

    groups
}

pub fn day_of(timestamp: i64, offset: UtcOffset) -> Date {
    to_local(timestamp, offset).date()
}

fn to_local(timestamp: i64, offset: UtcOffset) -> OffsetDateTime {
    let clamped = timestamp.clamp(MIN_TIMESTAMP, MAX_TIMESTAMP);
    OffsetDateTime::from_unix_timestamp(clamped)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(offset)
}

/// "Today", "Yesterday", or a long date such as "March 5, 2024".
pub fn format_date_divider(timestamp: i64, now: OffsetDateTime, offset: UtcOffset) -> String {
    let day = day_of(timestamp, offset);
    let today = now.to_offset(offset).date();
    if day == today {
        return "Today".to_string();
    }
    if today.previous_day() == Some(day) {
        return "Yesterday".to_string();
    }
    day.format(DIVIDER_FORMAT)
        .unwrap_or_else(|_| day.to_string())
}

pub fn format_message_time(timestamp: i64, offset: UtcOffset) -> String {
    to_local(timestamp, offset)
        .format(MESSAGE_TIME_FORMAT)
        .unwrap_or_default()
}
