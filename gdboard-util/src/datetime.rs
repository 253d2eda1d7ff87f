use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

pub const NAIVE_DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

pub const SNAPSHOT_DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

/// The date portion of an ISO-8601 datetime string, i.e. everything in
/// front of the `T`. Dates in this form sort chronologically when
/// compared as strings.
pub fn date_only(datetime: &str) -> &str {
    match datetime.split_once('T') {
        Some((date, _)) => date,
        None => datetime,
    }
}

pub fn snapshot_timestamp() -> Box<str> {
    OffsetDateTime::now_utc()
        .format(SNAPSHOT_DATETIME_FORMAT)
        .unwrap_or_default()
        .into_boxed_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_only_strips_time() {
        assert_eq!(date_only("2023-04-05T06:07:08+00:00"), "2023-04-05");
        assert_eq!(date_only("2023-04-05"), "2023-04-05");
        assert_eq!(date_only(""), "");
    }
}
