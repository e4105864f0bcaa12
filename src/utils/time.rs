use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Clients submit local time with an offset; we store UTC.
pub fn from_rfc3339(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_converted_to_utc() {
        let t = from_rfc3339("2099-01-01T12:00:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2099-01-01T10:00:00+00:00");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(from_rfc3339("next tuesday").is_err());
    }
}
