//! Reconstruction of the absolute GPS timestamp from raw header fields.
//!
//! The header has changed several times and early runs suffered from
//! firmware bugs in the date fields. Each era is handled here so that the
//! rest of the timing code sees one clean timestamp.

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use tracing::warn;

use crate::consts::SECONDS_PER_DAY;
use crate::timing::header::{HeaderFormat, RawHeader};
use crate::timing::server::{Run, ServerData};

// Era boundaries, as Unix seconds at 00:00 UT unless noted.

/// 2000-01-01, origin of times taken without GPS.
pub const NO_GPS_EPOCH: i64 = 946_684_800;
/// 2002-05-12, start of the GPS week of the first run.
pub const MAY_2002_WEEK: i64 = 1_021_161_600;
/// 2002-05-16.
pub const MAY_2002_ROLLOVER: i64 = 1_021_507_200;
/// 2002-05-17 12:00, end of the short-vertical-clock night.
pub const MAY_2002_SHORT_VCLOCK_END: i64 = 1_021_636_800;
/// 2002-09-08, start of the first GPS week of the September 2002 run.
pub const SEPT_2002_WEEK: i64 = 1_031_443_200;
/// 2003-08-01, clock board change and first timestamp inversion.
pub const CLOCKBOARD_CHANGE: i64 = 1_059_696_000;
/// 2005-01-01, timestamp inversion fixed.
pub const TIMESTAMP_CHANGE2: i64 = 1_104_537_600;
/// 2010-03-01, inversion returned with the new GPS.
pub const TIMESTAMP_CHANGE3: i64 = 1_267_401_600;
/// 2011-09-21, ULTRASPEC controller upgrade.
pub const ULTRASPEC_CHANGE1: i64 = 1_316_563_200;
/// 2014-03-29, ULTRASPEC double clears.
pub const ULTRASPEC_CHANGE2: i64 = 1_396_051_200;

/// UTC instant `secs` seconds after 1970-01-01.
pub fn unix(secs: i64) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::seconds(secs)
}

/// `t` shifted by a (possibly negative) number of seconds.
pub fn add_seconds(t: DateTime<Utc>, secs: f64) -> DateTime<Utc> {
    t + TimeDelta::nanoseconds((secs * 1.0e9).round() as i64)
}

/// `a - b` in seconds.
pub fn seconds_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let whole = (a.timestamp() - b.timestamp()) as f64;
    let frac = f64::from(a.timestamp_subsec_nanos()) - f64::from(b.timestamp_subsec_nanos());
    whole + frac * 1.0e-9
}

/// Modified Julian Date of `t`.
pub fn mjd(t: DateTime<Utc>) -> f64 {
    40_587.0
        + (t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) * 1.0e-9)
            / f64::from(SECONDS_PER_DAY)
}

/// Seconds taken to shift one row, from the vertical clock setting.
///
/// The conversion changed with the clock board in August 2003.
pub fn vclock_from_setting(v_ft_clk: u8, post_clockboard: bool) -> f64 {
    let v = f64::from(v_ft_clk);
    match (post_clockboard, v_ft_clk > 127) {
        (true, true) => 6.0e-9 * (40.0 + 320.0 * (v - 128.0)),
        (true, false) => 6.0e-9 * (40.0 + 40.0 * v),
        (false, true) => 6.0e-9 * (80.0 + 160.0 * (v - 128.0)),
        (false, false) => 6.0e-9 * (80.0 + 20.0 * v),
    }
}

/// Outcome of timestamp reconstruction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpsTime {
    pub timestamp: DateTime<Utc>,
    /// Seconds to shift one row.
    pub vclock_frame: f64,
    /// The header date could not be interpreted; the timestamp is not absolute.
    pub bad_date: bool,
}

/// Previous frame as seen by the reconstruction, for the May 2002 repair.
#[derive(Clone, Copy, Debug)]
pub struct PreviousFrame {
    pub frame_number: i32,
    pub timestamp: DateTime<Utc>,
}

/// Turn the raw header fields into an absolute UTC timestamp.
pub fn reconstruct(raw: &RawHeader, server: &ServerData, previous: Option<PreviousFrame>) -> GpsTime {
    let nsec = i64::from(raw.nsec);
    let frac = f64::from(raw.nnanosec) * 1.0e-9;
    let offset = |base: DateTime<Utc>, secs: i64| add_seconds(base + TimeDelta::seconds(secs), frac);
    let mut bad_date = false;

    let (mut timestamp, vclock_frame) = if raw.format == HeaderFormat::V1 && raw.nsatellite == -1 {
        // No GPS: times count from when the driver was loaded.
        (offset(unix(NO_GPS_EPOCH), nsec), vclock_from_setting(server.v_ft_clk, true))
    } else if raw.format == HeaderFormat::V1 && server.which_run == Run::May2002 {
        let mut ts = offset(unix(MAY_2002_WEEK), nsec);
        if ts < unix(MAY_2002_ROLLOVER) {
            ts += TimeDelta::weeks(1);
        }
        if let Some(prev) = previous {
            if consecutive(prev.frame_number, raw.frame_number) && ts < prev.timestamp {
                ts += TimeDelta::seconds(10);
            }
        }
        let vclock = if ts < unix(MAY_2002_SHORT_VCLOCK_END) {
            10.0e-6
        } else {
            24.46e-6
        };
        (ts, vclock)
    } else {
        let ts = match raw.format {
            HeaderFormat::V1 => {
                let year = if raw.month == 9 && raw.year == 263 { 2002 } else { raw.year };
                if year < 2002 {
                    // First night of September 2002 had no year.
                    offset(unix(SEPT_2002_WEEK), nsec)
                } else {
                    match NaiveDate::from_ymd_opt(i32::from(year), u32::from(raw.month), u32::from(raw.day)) {
                        Some(date) if raw.month == 9 && year == 2002 => {
                            offset(unix(SEPT_2002_WEEK), 0) + september_2002_week(date, raw.nsec)
                                + TimeDelta::seconds(nsec)
                        }
                        Some(date) => {
                            let days = (date - DateTime::UNIX_EPOCH.date_naive()).num_days();
                            let midnight = DateTime::UNIX_EPOCH + TimeDelta::days(days);
                            offset(midnight, nsec % i64::from(SECONDS_PER_DAY))
                        }
                        None => {
                            bad_date = true;
                            offset(unix(NO_GPS_EPOCH), nsec)
                        }
                    }
                }
            }
            HeaderFormat::V2 => offset(DateTime::UNIX_EPOCH, nsec),
        };
        (ts, vclock_from_setting(server.v_ft_clk, ts > unix(CLOCKBOARD_CHANGE)))
    };

    // Midnight bug: the date was latched before midnight, the seconds after.
    let dow = timestamp.weekday().num_days_from_sunday() as i64;
    if (dow + 1) % 7 == (nsec / i64::from(SECONDS_PER_DAY)) % 7 {
        warn!(frame = raw.frame_number, "midnight bug detected and corrected");
        timestamp += TimeDelta::days(1);
    }

    GpsTime {
        timestamp,
        vclock_frame,
        bad_date,
    }
}

/// Whether the timestamp follows the "default" ordering of events.
///
/// Firmware between August 2003 and January 2005, and again from March 2010,
/// placed the timestamp differently; `timestamp_default = false` inverts
/// the verdict for runs where the dates alone give the wrong answer.
/// True if `next` directly follows `prev`, for any pair of header values.
pub(crate) fn consecutive(prev: i32, next: i32) -> bool {
    i64::from(prev) + 1 == i64::from(next)
}

pub fn default_ordering(timestamp: DateTime<Utc>, timestamp_default: bool) -> bool {
    let dated = timestamp < unix(CLOCKBOARD_CHANGE)
        || (timestamp > unix(TIMESTAMP_CHANGE2) && timestamp < unix(TIMESTAMP_CHANGE3));
    dated == timestamp_default
}

/// Offset to the start of the GPS week containing a September 2002 frame.
///
/// Day numbers from that run are right to within a day, so the week they
/// indicate is cross-checked against the seconds into the week.
fn september_2002_week(date: NaiveDate, nsec: u32) -> TimeDelta {
    let day = f64::from(SECONDS_PER_DAY);
    let first_week = unix(SEPT_2002_WEEK).date_naive();
    let secdiff = (date - first_week).num_seconds() as f64;
    let mut nweek = (secdiff / day / 7.0) as i64;
    let days = (secdiff - day * 7.0 * nweek as f64) / day;
    if days > 3.5 && nsec < 2 * SECONDS_PER_DAY {
        nweek += 1;
    } else if days < 3.5 && nsec > 5 * SECONDS_PER_DAY {
        nweek -= 1;
    }
    TimeDelta::weeks(nweek)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn consecutive_frames_at_integer_limits() {
        assert!(consecutive(1, 2));
        assert!(consecutive(i32::MAX - 1, i32::MAX));
        assert!(!consecutive(i32::MAX, i32::MIN));
        assert!(!consecutive(i32::MAX, i32::MAX));
    }

    #[test]
    fn era_constants_match_calendar() {
        let check = |secs: i64, y, m, d| {
            assert_eq!(unix(secs), Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap());
        };
        check(NO_GPS_EPOCH, 2000, 1, 1);
        check(MAY_2002_WEEK, 2002, 5, 12);
        check(MAY_2002_ROLLOVER, 2002, 5, 16);
        check(SEPT_2002_WEEK, 2002, 9, 8);
        check(CLOCKBOARD_CHANGE, 2003, 8, 1);
        check(TIMESTAMP_CHANGE2, 2005, 1, 1);
        check(TIMESTAMP_CHANGE3, 2010, 3, 1);
        check(ULTRASPEC_CHANGE1, 2011, 9, 21);
        check(ULTRASPEC_CHANGE2, 2014, 3, 29);
        assert_eq!(
            unix(MAY_2002_SHORT_VCLOCK_END),
            Utc.with_ymd_and_hms(2002, 5, 17, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn september_week_moves_forward_late_in_week() {
        // 2002-09-14 is a Saturday, 6 days into the first week; 1 hour into
        // the week by the seconds count means the next week has started.
        let date = NaiveDate::from_ymd_opt(2002, 9, 14).unwrap();
        assert_eq!(september_2002_week(date, 3600), TimeDelta::weeks(1));
        assert_eq!(september_2002_week(date, 6 * 86_400), TimeDelta::weeks(0));
    }

    #[test]
    fn ordering_flips_with_switch() {
        let early = unix(CLOCKBOARD_CHANGE - 86_400);
        let late = unix(ULTRASPEC_CHANGE1);
        assert!(default_ordering(early, true));
        assert!(!default_ordering(late, true));
        assert!(default_ordering(late, false));
    }

    #[test]
    fn seconds_between_keeps_nanoseconds() {
        let a = add_seconds(unix(1_000), 0.25);
        let b = add_seconds(unix(999), 0.5);
        assert!((seconds_between(a, b) - 0.75).abs() < 1e-12);
    }
}
