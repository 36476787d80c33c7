use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp as RFC3339 for use in filenames (quarantine suffixes,
/// backup markers) where a `DateTime` can't be embedded directly.
pub fn to_iso8601(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn from_iso8601(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    s.parse::<DateTime<Utc>>()
}

/// Coarse human-readable age, used in CLI listings ("3h ago", "2d ago").
pub fn humanize_age(dt: &DateTime<Utc>) -> String {
    let secs = (Utc::now() - *dt).num_seconds().max(0);
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dt = now();
        let s = to_iso8601(&dt);
        let parsed = from_iso8601(&s).unwrap();
        assert_eq!(dt.timestamp(), parsed.timestamp());
    }

    #[test]
    fn test_humanize_age_just_now() {
        assert_eq!(humanize_age(&Utc::now()), "just now");
    }
}
