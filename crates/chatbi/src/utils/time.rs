use time::{OffsetDateTime, UtcOffset};

/// Current UTC time as fixed-width `YYYY-MM-DDTHH:MM:SS.mmmZ`, so stored
/// timestamps order correctly as plain text.
#[must_use]
pub fn now_utc_millis() -> String {
    format_utc_millis(OffsetDateTime::now_utc())
}

#[must_use]
pub fn format_utc_millis(dt: OffsetDateTime) -> String {
    let dt = dt.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.millisecond()
    )
}
