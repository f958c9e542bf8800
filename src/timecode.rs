use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Time of day with an optional day count, as carried by MSU-MR packets and the NOAA
/// TIP time code.
///
/// How `day` is interpreted depends on the source: MSU-MR leaves it 0, the TIP time
/// code carries the 1-based day of year.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DayTime {
    pub day: u16,
    pub millis: u32,
    pub micros: u16,
}

impl DayTime {
    /// Encoded size: 2 byte day, 4 byte milliseconds and 2 byte microseconds.
    pub const LEN: usize = 8;

    /// Decode the big-endian encoding, or `None` if there are not enough bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        Some(DayTime {
            day: u16::from_be_bytes([dat[0], dat[1]]),
            millis: u32::from_be_bytes([dat[2], dat[3], dat[4], dat[5]]),
            micros: u16::from_be_bytes([dat[6], dat[7]]),
        })
    }

    #[must_use]
    pub fn seconds_of_day(&self) -> f64 {
        f64::from(self.millis) / 1e3 + f64::from(self.micros) / 1e6
    }

    /// Timestamp on `date` for a clock running `utc_offset_hours` ahead of UTC,
    /// ignoring `day`.
    #[must_use]
    pub fn on_date(&self, date: NaiveDate, utc_offset_hours: i32) -> Option<DateTime<Utc>> {
        let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
        Some(
            midnight + Duration::milliseconds(i64::from(self.millis))
                + Duration::microseconds(i64::from(self.micros))
                - Duration::hours(i64::from(utc_offset_hours)),
        )
    }

    /// Timestamp treating `day` as the 1-based day of `year`, UTC.
    #[must_use]
    pub fn in_year(&self, year: i32) -> Option<DateTime<Utc>> {
        let date = NaiveDate::from_yo_opt(year, u32::from(self.day))?;
        self.on_date(date, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_daytime() {
        let dat = [0x00, 0x20, 0x00, 0x36, 0xee, 0x80, 0x00, 0xfa];
        let t = DayTime::decode(&dat).unwrap();

        assert_eq!(t.day, 32);
        assert_eq!(t.millis, 3_600_000);
        assert_eq!(t.micros, 250);
        assert!((t.seconds_of_day() - 3600.000_25).abs() < 1e-9);
        assert!(DayTime::decode(&dat[..7]).is_none());
    }

    #[test]
    fn on_date_applies_offset() {
        let t = DayTime {
            day: 0,
            millis: 3_600_500,
            micros: 250,
        };
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let ts = t.on_date(date, 3).unwrap();

        assert_eq!(ts.to_rfc3339(), "2024-01-01T22:00:00.500250+00:00");
    }

    #[test]
    fn in_year_uses_day_of_year() {
        let t = DayTime {
            day: 32,
            millis: 1_000,
            micros: 0,
        };
        let ts = t.in_year(2020).unwrap();
        assert_eq!(ts.to_rfc3339(), "2020-02-01T00:00:01+00:00");

        let bad = DayTime { day: 0, ..t };
        assert!(bad.in_year(2020).is_none());
    }
}
