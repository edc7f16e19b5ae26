use chrono::{DateTime, NaiveDateTime, Utc};

/// Fixed-width UTC timestamp format. Lexicographic order matches temporal
/// order, so TEXT columns compare correctly in SQL.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

pub fn now_ts() -> String {
    format_ts(Utc::now())
}

/// Lenient parse: our own format first, then RFC 3339, then SQLite's bare
/// "YYYY-MM-DD HH:MM:SS" treated as UTC.
pub fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, TS_FORMAT) {
        return Ok(dt.and_utc());
    }
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    let dt = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?;
    Ok(dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_and_sorts() {
        let a = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 1).unwrap();
        let (sa, sb) = (format_ts(a), format_ts(b));
        assert!(sa < sb);
        assert_eq!(parse_ts(&sa).unwrap(), a);
    }
}
