//! HTTP Date Handling
//!
//! RFC 7231 date formats used by `Expires`, `Last-Modified` and `Date`.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse an HTTP date in IMF-fixdate, RFC 850 or asctime form
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    // IMF-fixdate: "Sun, 06 Nov 1994 08:49:37 GMT"
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // RFC 850: "Sunday, 06-Nov-94 08:49:37 GMT"
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(dt.and_utc());
    }

    // asctime: "Sun Nov  6 08:49:37 1994"
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y") {
        return Some(dt.and_utc());
    }

    None
}

/// Format as IMF-fixdate
pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
