#[allow(dead_code)]
mod common;

use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};

use ucam_core::error::UcamError;
use ucam_core::timing::gps::{seconds_between, unix};
use ucam_core::timing::header::{HeaderFormat, PCPS_FREER, PCPS_SYNCD};
use ucam_core::timing::{
    read_header, Instrument, ReadoutMode, Run, ServerData, TimingInfo, TimingSession, Wind,
};

use common::{v1_header, v2_header};

// ---- Helpers ----

/// 2012-06-01 00:00:00 UTC.
const JUNE_2012: u32 = 1_338_508_800;

/// Row clock for `v_ft_clk = 0` after the 2003 clock-board change.
const VCLOCK: f64 = 6.0e-9 * 40.0;

fn pair(ny: i32) -> Vec<Wind> {
    vec![
        Wind { llx: 100, lly: 1, nx: 50, ny },
        Wind { llx: 600, lly: 1, nx: 50, ny },
    ]
}

fn ultracam(mode: ReadoutMode, timestamp_default: bool) -> ServerData {
    ServerData {
        instrument: Instrument::Ultracam,
        version: 120716,
        readout_mode: mode,
        expose_time: 0.5,
        windows: pair(100),
        timestamp_default,
        ..Default::default()
    }
}

fn ultraspec(en_clr: bool) -> ServerData {
    let mut server = ServerData {
        instrument: Instrument::Ultraspec,
        version: 130307,
        readout_mode: ReadoutMode::L3ccdWindows,
        expose_time: 0.2,
        windows: pair(100),
        ..Default::default()
    };
    server.l3.en_clr = en_clr;
    server
}

/// Feed frames `first..` at the given offsets (seconds) from `base`.
fn run(session: &mut TimingSession, first: u32, base: u32, offsets: &[f64]) -> Vec<TimingInfo> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, &dt)| {
            let secs = base + dt.floor() as u32;
            let ticks = ((dt - dt.floor()) * 1.0e7).round() as u32;
            let header = v2_header(first + i as u32, secs, ticks, 5000, PCPS_SYNCD, false);
            read_header(&header, false, session).unwrap()
        })
        .collect()
}

fn offset(info_time: chrono::DateTime<Utc>, base: u32) -> f64 {
    seconds_between(info_time, unix(i64::from(base)))
}

// ---------------------------------------------------------------------------
// ULTRACAM windows mode
// ---------------------------------------------------------------------------

#[test]
fn test_mid_time_is_midpoint_less_frame_transfer() {
    // After March 2010 dates alone give the inverted ordering; the switch
    // restores the default one.
    let mut session = TimingSession::new(ultracam(ReadoutMode::Windows, false)).unwrap();
    let infos = run(&mut session, 1, JUNE_2012, &[0.0, 1.5]);
    let ft = 1033.0 * VCLOCK;

    let first = &infos[0];
    assert!(first.default_tstamp);
    assert!(first.reliable, "{}", first.reason);
    assert_relative_eq!(offset(first.ut_date, JUNE_2012), -ft - 0.25, epsilon = 1e-6);
    assert_relative_eq!(first.exposure_time, 0.5);

    let second = &infos[1];
    assert!(second.reliable);
    assert_relative_eq!(offset(second.ut_date, JUNE_2012), 0.75 - ft / 2.0, epsilon = 1e-6);
    assert_relative_eq!(second.exposure_time, 1.5 - ft, epsilon = 1e-6);
    assert_relative_eq!(second.vclock_frame, VCLOCK, epsilon = 1e-15);
    assert_eq!(second.format, HeaderFormat::V2);
    assert_eq!(second.tstamp_status, Some(PCPS_SYNCD));
    assert_eq!(second.nsatellite, None);

    let overheads = session.overheads().unwrap();
    assert_relative_eq!(overheads.frame_transfer, ft, epsilon = 1e-12);
    assert!(overheads.readout_time > 0.0);
}

#[test]
fn test_inverted_ordering_needs_two_prior_timestamps() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::Windows, true)).unwrap();
    let infos = run(&mut session, 1, JUNE_2012, &[0.0, 1.0, 2.5]);
    let ft = 1033.0 * VCLOCK;

    assert!(!infos[0].default_tstamp);
    assert!(!infos[0].reliable);
    assert_eq!(
        infos[0].reason,
        "cannot establish an accurate time for first frame in this mode"
    );
    assert!(!infos[1].reliable);
    assert_eq!(
        infos[1].reason,
        "cannot establish an accurate time without at least 2 prior timestamps"
    );

    let third = &infos[2];
    assert!(third.reliable);
    // Exposure measured between the two earlier frames, ending e after t1.
    let texp = 1.0 - ft;
    assert_relative_eq!(third.exposure_time, texp, epsilon = 1e-6);
    assert_relative_eq!(
        offset(third.ut_date, JUNE_2012),
        1.0 + 0.5 - texp / 2.0,
        epsilon = 1e-6
    );
}

#[test]
fn test_frame_gap_clears_history() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::Windows, false)).unwrap();
    run(&mut session, 1, JUNE_2012, &[0.0, 1.0]);
    assert_eq!(session.history_len(), 2);

    let infos = run(&mut session, 7, JUNE_2012, &[10.0]);
    assert_eq!(session.history_len(), 1);
    assert!(!infos[0].reliable);
    assert_eq!(
        infos[0].reason,
        "cannot establish an accurate time without previous GPS timestamp"
    );
    let readout = session.overheads().unwrap().readout_time;
    assert_relative_eq!(infos[0].exposure_time, readout + 0.5, epsilon = 1e-9);
}

#[test]
fn test_reset_forgets_previous_frames() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::Windows, false)).unwrap();
    run(&mut session, 1, JUNE_2012, &[0.0, 1.0, 2.0]);
    assert_eq!(session.history_len(), 3);
    session.reset();
    assert_eq!(session.history_len(), 0);
    // Continuing the frame sequence after a reset starts a new history.
    let infos = run(&mut session, 4, JUNE_2012, &[3.0]);
    assert!(!infos[0].reliable);
    assert!(session.overheads().is_some());
}

#[test]
fn test_frame_numbers_at_upper_limit() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::Windows, false)).unwrap();
    let first = i32::MAX as u32 - 1;
    let infos = run(&mut session, first, JUNE_2012, &[0.0, 1.0, 2.0]);

    assert_eq!(infos[1].frame_number, i32::MAX);
    assert!(infos[1].reliable, "{}", infos[1].reason);
    // The next header wraps to a negative frame number and starts afresh.
    assert_eq!(infos[2].frame_number, i32::MIN);
    assert!(!infos[2].reliable);
    assert_eq!(session.history_len(), 1);
}

#[test]
fn test_history_is_bounded() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::Windows, false)).unwrap();
    let offsets: Vec<f64> = (0..10).map(f64::from).collect();
    run(&mut session, 1, JUNE_2012, &offsets);
    assert_eq!(session.history_len(), 3);
}

// ---------------------------------------------------------------------------
// Other ULTRACAM modes
// ---------------------------------------------------------------------------

#[test]
fn test_clear_mode_default_ordering_is_start_of_exposure() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::FullframeClear, false)).unwrap();
    let infos = run(&mut session, 1, JUNE_2012, &[0.0, 3.0]);
    assert!(infos.iter().all(|i| i.reliable));
    assert_relative_eq!(offset(infos[1].ut_date, JUNE_2012), 3.25, epsilon = 1e-6);
    assert_relative_eq!(infos[1].exposure_time, 0.5);
}

#[test]
fn test_clear_mode_inverted_steps_over_clear() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::FullframeClear, true)).unwrap();
    let infos = run(&mut session, 1, JUNE_2012, &[0.0, 3.0]);
    assert!(!infos[0].reliable);
    let clear = 2060.0 * VCLOCK;
    assert!(infos[1].reliable);
    assert_relative_eq!(offset(infos[1].ut_date, JUNE_2012), clear + 0.25, epsilon = 1e-6);
}

#[test]
fn test_drift_mode_waits_for_pipeline() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::Drift, false)).unwrap();
    let offsets: Vec<f64> = (0..6).map(f64::from).collect();
    let infos = run(&mut session, 1, JUNE_2012, &offsets);
    let nwins = session.overheads().unwrap().nwins;
    assert_eq!(nwins, 5);

    for info in &infos[..5] {
        assert!(!info.reliable);
        assert_eq!(info.reason, "too few stored timestamps");
        assert_eq!(info.ut_date, Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
    }
    let last = &infos[5];
    assert!(last.reliable);
    let ft = 100.0 * VCLOCK;
    assert_relative_eq!(last.exposure_time, 1.0 - ft, epsilon = 1e-6);
    assert_relative_eq!(offset(last.ut_date, JUNE_2012), (1.0 - ft) / 2.0, epsilon = 1e-6);

    run(&mut session, 7, JUNE_2012, &[6.0, 7.0, 8.0]);
    assert_eq!(session.history_len(), nwins + 2);
}

#[test]
fn test_unsupported_mode_returns_raw_timestamp() {
    let server = ServerData {
        readout_mode: ReadoutMode::L3ccdWindows,
        ..ultracam(ReadoutMode::Windows, false)
    };
    let mut session = TimingSession::new(server).unwrap();
    let info = &run(&mut session, 1, JUNE_2012, &[0.0])[0];
    assert!(!info.reliable);
    assert!(info.reason.contains("no timing model"), "{}", info.reason);
    assert_eq!(info.ut_date, info.gps_time);
}

// ---------------------------------------------------------------------------
// ULTRASPEC and MOSCAM
// ---------------------------------------------------------------------------

#[test]
fn test_ultraspec_clear_mode_adds_clear_time() {
    let mut session = TimingSession::new(ultraspec(true)).unwrap();
    let infos = run(&mut session, 1, JUNE_2012, &[0.0, 1.0]);
    assert_eq!(
        infos[0].reason,
        "cannot establish an accurate time without at least 1 prior timestamp"
    );
    assert!(infos[1].reliable);
    assert_relative_eq!(
        offset(infos[1].ut_date, JUNE_2012),
        0.0309516 + 0.1,
        epsilon = 1e-6
    );
}

#[test]
fn test_ultraspec_identical_timestamps_are_flagged() {
    let mut session = TimingSession::new(ultraspec(false)).unwrap();
    let infos = run(&mut session, 1, JUNE_2012, &[0.0, 0.0, 1.0]);
    assert!(!infos[2].reliable);
    assert_eq!(infos[2].reason, "GPS time identical to previous frame");

    let infos = run(&mut session, 4, JUNE_2012, &[2.0]);
    assert!(infos[0].reliable);
    assert_relative_eq!(infos[0].exposure_time, 1.0 - 0.0149818, epsilon = 1e-6);
}

#[test]
fn test_moscam_timestamp_marks_exposure_start() {
    let server = ServerData {
        instrument: Instrument::Moscam,
        version: -1,
        readout_mode: ReadoutMode::FullframeClear,
        expose_time: 2.0,
        ..Default::default()
    };
    let mut session = TimingSession::new(server).unwrap();
    assert_eq!(session.format(), HeaderFormat::V2);
    let info = &run(&mut session, 1, JUNE_2012, &[0.0])[0];
    assert_relative_eq!(offset(info.ut_date, JUNE_2012), 1.0, epsilon = 1e-6);
}

// ---------------------------------------------------------------------------
// Header problems
// ---------------------------------------------------------------------------

#[test]
fn test_gps_status_marks_time_unreliable() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::FullframeClear, false)).unwrap();
    let header = v2_header(1, JUNE_2012, 0, 5000, PCPS_SYNCD | PCPS_FREER, false);
    let info = read_header(&header, false, &mut session).unwrap();
    assert!(!info.reliable);
    assert_eq!(info.reason, "GPS receiver has not verified its position");

    let header = v2_header(2, JUNE_2012 + 1, 0, 5000, 0, false);
    let info = read_header(&header, false, &mut session).unwrap();
    assert_eq!(info.reason, "GPS clock not yet synced since power up");
}

#[test]
fn test_swapped_header_gives_same_result() {
    let header = v2_header(1, JUNE_2012, 1234, 5000, PCPS_SYNCD, false);
    let swapped = v2_header(1, JUNE_2012, 1234, 5000, PCPS_SYNCD, true);
    let server = ultracam(ReadoutMode::FullframeClear, false);

    let mut a = TimingSession::new(server.clone()).unwrap();
    let mut b = TimingSession::new(server).unwrap();
    let ia = read_header(&header, false, &mut a).unwrap();
    let ib = read_header(&swapped, true, &mut b).unwrap();
    assert_eq!(ia, ib);
    assert_eq!(ia.gps_time.timestamp_subsec_nanos(), 123_400);
}

#[test]
fn test_short_header_is_an_error() {
    let mut session = TimingSession::new(ultracam(ReadoutMode::FullframeClear, false)).unwrap();
    let err = read_header(&[0u8; 12], false, &mut session).unwrap_err();
    assert!(matches!(err, UcamError::TruncatedHeader { needed: 26, got: 12 }));
}

#[test]
fn test_session_rejects_bad_server_data() {
    let mut server = ultracam(ReadoutMode::Windows, false);
    server.windows.pop();
    assert!(matches!(
        TimingSession::new(server),
        Err(UcamError::InvalidServerData(_))
    ));
}

// ---------------------------------------------------------------------------
// Pre-2010 headers
// ---------------------------------------------------------------------------

fn ultracam_2006() -> ServerData {
    ServerData {
        version: 80127,
        ..ultracam(ReadoutMode::FullframeClear, true)
    }
}

#[test]
fn test_week_seconds_combine_with_date() {
    let mut session = TimingSession::new(ultracam_2006()).unwrap();
    assert_eq!(session.format(), HeaderFormat::V1);
    // Wednesday 2006-03-15, 01:00 is 3 days + 1 hour into the GPS week.
    let header = v1_header(1, 3 * 86_400 + 3600, 250_000_000, 15, 3, 2006, 6, false);
    let info = read_header(&header, false, &mut session).unwrap();
    let expected = Utc.with_ymd_and_hms(2006, 3, 15, 1, 0, 0).unwrap();
    assert_relative_eq!(seconds_between(info.gps_time, expected), 0.25, epsilon = 1e-9);
    assert!(info.default_tstamp);
    assert!(info.reliable);
    assert_eq!(info.nsatellite, Some(6));
    assert_relative_eq!(seconds_between(info.ut_date, info.gps_time), 0.25, epsilon = 1e-9);
}

#[test]
fn test_midnight_bug_is_corrected() {
    let mut session = TimingSession::new(ultracam_2006()).unwrap();
    // Date still says Tuesday but the week seconds are 00:30 on Wednesday.
    let header = v1_header(1, 3 * 86_400 + 1800, 0, 14, 3, 2006, 6, false);
    let info = read_header(&header, false, &mut session).unwrap();
    assert_eq!(info.gps_time, Utc.with_ymd_and_hms(2006, 3, 15, 0, 30, 0).unwrap());
}

#[test]
fn test_few_satellites_is_unreliable() {
    let mut session = TimingSession::new(ultracam_2006()).unwrap();
    let header = v1_header(1, 3 * 86_400, 0, 15, 3, 2006, 2, true);
    let info = read_header(&header, true, &mut session).unwrap();
    assert!(!info.reliable);
    assert_eq!(info.reason, "too few = 2 satellites");
}

#[test]
fn test_may_2002_run_rebuilds_dates() {
    let server = ServerData {
        version: -1,
        which_run: Run::May2002,
        ..ultracam(ReadoutMode::FullframeClear, true)
    };
    let mut session = TimingSession::new(server).unwrap();

    let header = v1_header(1, 4 * 86_400 + 100, 0, 0, 0, 0, 5, false);
    let info = read_header(&header, false, &mut session).unwrap();
    assert_eq!(info.gps_time, Utc.with_ymd_and_hms(2002, 5, 16, 0, 1, 40).unwrap());
    assert_relative_eq!(info.vclock_frame, 10.0e-6);

    // Early in the week means the second week of the run.
    let header = v1_header(5, 100, 0, 0, 0, 0, 5, false);
    let info = read_header(&header, false, &mut session).unwrap();
    assert_eq!(info.gps_time, Utc.with_ymd_and_hms(2002, 5, 19, 0, 1, 40).unwrap());
    assert_relative_eq!(info.vclock_frame, 24.46e-6);
}

// ---------------------------------------------------------------------------
// Blue channel co-adds
// ---------------------------------------------------------------------------

#[test]
fn test_blue_coadd_spans_contributing_frames() {
    let server = ServerData {
        nblue: 2,
        ..ultracam(ReadoutMode::FullframeClear, false)
    };
    let mut session = TimingSession::new(server).unwrap();

    let first = run(&mut session, 1, JUNE_2012, &[0.0]).remove(0);
    assert!(!first.reliable_blue);
    assert_relative_eq!(first.exposure_time_blue, 1.0, epsilon = 1e-6);
    assert_relative_eq!(offset(first.ut_date_blue, JUNE_2012), 0.0, epsilon = 1e-6);

    let mut header = v2_header(2, JUNE_2012 + 1, 0, 5000, PCPS_SYNCD, false);
    header[0] |= 1 << 4;
    let second = read_header(&header, false, &mut session).unwrap();
    assert!(second.blue_is_bad);
    assert_eq!(second.ut_date_blue, second.ut_date);

    let third = run(&mut session, 3, JUNE_2012, &[2.0]).remove(0);
    assert!(third.reliable_blue);
    assert_relative_eq!(third.exposure_time_blue, 1.5, epsilon = 1e-6);
    assert_relative_eq!(offset(third.ut_date_blue, JUNE_2012), 1.75, epsilon = 1e-6);
    assert!(third.mjd_blue() > third.mjd() - 1.0);
}
