use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

const DISPLAY_FORMAT: &str = "%d/%m/%Y at %H:%M";

pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Wall-clock time in the server's zone for an absolute instant.
pub fn local_naive(at: &DateTime<Utc>) -> NaiveDateTime {
    at.with_timezone(&Local).naive_local()
}

/// Best-effort instant for a local wall-clock time. Ambiguous times (DST
/// fall-back) resolve to the earlier instant.
pub fn local_to_utc(at: &NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(at)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| at.and_utc())
}

/// Human readable form stored next to each review.
pub fn display_timestamp(at: &NaiveDateTime) -> String {
    at.format(DISPLAY_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_display_format() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(9, 5, 0))
            .unwrap();
        assert_eq!(display_timestamp(&at), "07/03/2024 at 09:05");
    }

    #[test]
    fn local_round_trip_keeps_instant() {
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(local_to_utc(&local_naive(&at)), at);
    }
}
