use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn minutes_before(value: PrimitiveDateTime, minutes: u64) -> PrimitiveDateTime {
    value - Duration::minutes(minutes.min(i64::MAX as u64) as i64)
}

pub(crate) fn elapsed_seconds(since: PrimitiveDateTime, now: PrimitiveDateTime) -> i64 {
    (now - since).whole_seconds().max(0)
}

pub(crate) fn unix_millis_now() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Time};

    fn at(hour: u8, minute: u8, second: u8) -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::January, 2).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(hour, minute, second).unwrap())
    }

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(at(10, 20, 30)), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn minutes_before_subtracts() {
        assert_eq!(minutes_before(at(10, 20, 30), 5), at(10, 15, 30));
    }

    #[test]
    fn elapsed_seconds_never_negative() {
        assert_eq!(elapsed_seconds(at(10, 0, 0), at(10, 1, 5)), 65);
        assert_eq!(elapsed_seconds(at(10, 1, 5), at(10, 0, 0)), 0);
    }
}
