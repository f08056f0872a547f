//! Timestamp conversions.
//!
//! Containers disagree about time: tar and cpio store Unix seconds, zip
//! stores MS-DOS date/time pairs. The engine carries Unix seconds in entry
//! metadata and converts at the codec boundary.

use std::time::{SystemTime, UNIX_EPOCH};

/// Converts a [`SystemTime`] to Unix seconds, saturating at the epoch for
/// pre-1970 times.
pub fn unix_from_system(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs().min(i64::MAX as u64) as i64,
        Err(e) => -(e.duration().as_secs().min(i64::MAX as u64) as i64),
    }
}

/// Converts a day count since 1970-01-01 to a civil (year, month, day).
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Converts Unix seconds to a zip [`DateTime`](zip::DateTime).
///
/// Returns `None` outside the representable DOS range (1980..=2107); the
/// writer then keeps the format's default timestamp.
pub(crate) fn dos_datetime(unix: i64) -> Option<zip::DateTime> {
    let days = unix.div_euclid(86_400);
    let tod = unix.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    if !(1980..=2107).contains(&year) {
        return None;
    }
    zip::DateTime::from_date_and_time(
        year as u16,
        month,
        day,
        (tod / 3600) as u8,
        ((tod % 3600) / 60) as u8,
        (tod % 60) as u8,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(18_262), (2020, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
    }

    #[test]
    fn test_dos_datetime_range() {
        // 1970 is below the DOS epoch.
        assert!(dos_datetime(0).is_none());
        // 2020-06-15 12:30:45 UTC
        let dt = dos_datetime(1_592_224_245).unwrap();
        assert_eq!(dt.year(), 2020);
        assert_eq!(dt.month(), 6);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_unix_from_system() {
        assert_eq!(unix_from_system(UNIX_EPOCH), 0);
        let later = UNIX_EPOCH + std::time::Duration::from_secs(1000);
        assert_eq!(unix_from_system(later), 1000);
    }
}
