//! Per-run timing state and the mid-exposure time calculation.
//!
//! The GPS timestamp marks a point in the readout cycle that depends on the
//! instrument, the readout mode and the firmware era. Recovering the middle
//! of the exposure needs the timestamps of one or more earlier frames, so a
//! [`TimingSession`] holds that history between calls.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::consts::{
    CDS_TIME_CDD, CDS_TIME_FBB, CDS_TIME_FDD, DUMP_GATE_HCLOCKS, HCLOCK, SWITCH_TIME,
    ULTRACAM_CLEAR_ROWS, ULTRACAM_FT_ROWS, ULTRACAM_HALF_WIDTH, USPEC_CLR_TIME, USPEC_DRIFT_ROWS,
    USPEC_FT_OFF, USPEC_FT_ROW, USPEC_FT_TIME, USPEC_FT_TIME_OLD,
};
use crate::error::Result;
use crate::timing::blue::BlueCoadd;
use crate::timing::gps::{
    self, add_seconds, consecutive, seconds_between, unix, PreviousFrame, NO_GPS_EPOCH,
    ULTRASPEC_CHANGE1, ULTRASPEC_CHANGE2,
};
use crate::timing::header::{HeaderFormat, RawHeader};
use crate::timing::server::{Instrument, ReadoutMode, ServerData, Wind};

const TOO_FEW_STORED: &str = "too few stored timestamps";
const NO_PREVIOUS: &str = "cannot establish an accurate time without previous GPS timestamp";
const IDENTICAL: &str = "GPS time identical to previous frame";

/// Timing of one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TimingInfo {
    /// Reconstructed raw GPS timestamp.
    pub gps_time: DateTime<Utc>,
    /// Mid-exposure time.
    pub ut_date: DateTime<Utc>,
    /// Exposure length in seconds.
    pub exposure_time: f64,
    pub frame_number: i32,
    pub format: HeaderFormat,
    pub reliable: bool,
    /// Why the time is unreliable; empty when it is reliable.
    pub reason: String,
    pub ut_date_blue: DateTime<Utc>,
    pub exposure_time_blue: f64,
    pub reliable_blue: bool,
    /// Satellites in view (layout 1 only).
    pub nsatellite: Option<i16>,
    /// GPS receiver status word (layout 2 only).
    pub tstamp_status: Option<u16>,
    /// Seconds to shift one row.
    pub vclock_frame: f64,
    pub default_tstamp: bool,
    pub blue_is_bad: bool,
}

impl TimingInfo {
    pub fn mjd(&self) -> f64 {
        gps::mjd(self.ut_date)
    }

    pub fn mjd_blue(&self) -> f64 {
        gps::mjd(self.ut_date_blue)
    }
}

/// Fixed overheads of the readout cycle, derived once per run.
///
/// Times are in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Overheads {
    /// Correlated double sampling time, microseconds.
    pub cds_time: f64,
    /// Time per pixel through the video chain, microseconds.
    pub video: f64,
    pub clear_time: f64,
    pub readout_time: f64,
    pub frame_transfer: f64,
    /// Windows held in the drift-mode pipeline.
    pub nwins: usize,
}

impl Overheads {
    /// Derive the overheads for a run given the row clock of its first frame.
    pub fn derive(server: &ServerData, vclock: f64) -> Self {
        let cds_time = match server.instrument {
            Instrument::Ultracam => match server.gain_speed.as_str() {
                "3293" => CDS_TIME_CDD,
                "4027" => CDS_TIME_FBB,
                "4061" => CDS_TIME_FDD,
                other => {
                    warn!(
                        gain_speed = other,
                        "unrecognised gain speed setting (expected 3293, 4027 or 4061), assuming CDD"
                    );
                    CDS_TIME_CDD
                }
            },
            Instrument::Ultraspec => 0.0,
            Instrument::Moscam => CDS_TIME_CDD,
        };
        let video = SWITCH_TIME + cds_time;
        let mut overheads = Overheads {
            cds_time,
            video,
            ..Default::default()
        };

        let xbin = server.xbin;
        let ybin = server.ybin;
        let wins = &server.windows;
        // The row clock enters these formulae in seconds alongside
        // microsecond terms; readout times have always been computed this way.
        let line_read = |nxb: i32, hclocks: i32| {
            vclock * f64::from(ybin) + f64::from(hclocks) * HCLOCK + f64::from(nxb + 2) * video
        };

        match (server.instrument, server.readout_mode) {
            (
                Instrument::Ultracam,
                ReadoutMode::FullframeClear
                | ReadoutMode::FullframeNoclear
                | ReadoutMode::FullframeOverscan
                | ReadoutMode::WindowsClear
                | ReadoutMode::Windows,
            ) => {
                overheads.clear_time = (ULTRACAM_FT_ROWS + ULTRACAM_CLEAR_ROWS) * vclock;
                overheads.frame_transfer = ULTRACAM_FT_ROWS * vclock;
                overheads.readout_time = match server.readout_mode {
                    ReadoutMode::FullframeOverscan => {
                        f64::from(1032 / ybin)
                            * (vclock * f64::from(ybin)
                                + 540.0 * HCLOCK
                                + f64::from(540 / xbin + 2) * video)
                            / 1.0e6
                    }
                    ReadoutMode::WindowsClear => match wins.as_slice() {
                        [left, right, ..] => {
                            let nxu = xbin * right.nx;
                            let xright = right.llx + nxu - 1;
                            let hclocks = dump_hclocks(nxu, left.llx, xright);
                            f64::from(right.ny) * line_read(right.nx, hclocks) / 1.0e6
                        }
                        _ => 0.0,
                    },
                    ReadoutMode::Windows => windows_readout(wins, xbin, ybin, vclock, &line_read),
                    _ => {
                        f64::from(1024 / ybin)
                            * (vclock * f64::from(ybin)
                                + 536.0 * HCLOCK
                                + f64::from(512 / xbin + 2) * video)
                            / 1.0e6
                    }
                };
            }
            (Instrument::Ultracam, ReadoutMode::Drift) => {
                if let [left, right, ..] = wins.as_slice() {
                    let nx = xbin * left.nx;
                    let ny = ybin * left.ny;
                    let xright = right.llx + nx - 1;
                    let nwins = ((ULTRACAM_FT_ROWS / f64::from(ny) + 1.0) / 2.0) as usize;
                    let pipe_shift =
                        (ULTRACAM_FT_ROWS - (2.0 * nwins as f64 - 1.0) * f64::from(ny)) as i32;
                    let hclocks = dump_hclocks(nx, left.llx, xright);
                    overheads.nwins = nwins;
                    overheads.frame_transfer = f64::from(ny + left.lly - 1) * vclock;
                    overheads.readout_time = (f64::from(left.ny) * line_read(left.nx, hclocks)
                        + f64::from(pipe_shift) * vclock)
                        / 1.0e6;
                }
            }
            (Instrument::Ultraspec, ReadoutMode::L3ccdDrift) => {
                if let Some(w) = wins.first() {
                    let ny = ybin * w.ny;
                    overheads.nwins = ((USPEC_DRIFT_ROWS / f64::from(ny) + 1.0) / 2.0) as usize;
                    overheads.frame_transfer =
                        USPEC_FT_ROW * f64::from(w.lly + ny - 1) + USPEC_FT_OFF;
                }
            }
            _ => {}
        }
        overheads
    }
}

/// Horizontal clocks to read one row of a window pair, including those
/// spent shifting the further window level with the nearer one and dumping
/// the pixels beyond it.
fn dump_hclocks(nx: i32, xleft: i32, xright: i32) -> i32 {
    let left_gap = xleft - 1;
    let right_gap = ULTRACAM_HALF_WIDTH - xright;
    let diff_shift = (left_gap - right_gap).abs();
    nx + diff_shift + left_gap.min(right_gap) + DUMP_GATE_HCLOCKS
}

fn windows_readout(
    wins: &[Wind],
    xbin: i32,
    ybin: i32,
    vclock: f64,
    line_read: &impl Fn(i32, i32) -> f64,
) -> f64 {
    let mut readout = 0.0;
    let mut below: Option<&Wind> = None;
    for pair in wins.chunks_exact(2) {
        let (left, right) = (&pair[0], &pair[1]);
        let nx = xbin * left.nx;
        let xright = right.llx + nx - 1;
        // Rows between the top of the previous pair and the bottom of this one.
        let y_shift = match below {
            Some(prev) => f64::from(left.lly - prev.lly - ybin * prev.ny) * vclock,
            None => f64::from(left.lly - 1) * vclock,
        };
        let hclocks = dump_hclocks(nx, left.llx, xright);
        readout += y_shift + f64::from(left.ny) * line_read(left.nx, hclocks);
        below = Some(left);
    }
    readout / 1.0e6
}

/// Running reliability verdict; the first reason recorded is kept.
#[derive(Debug)]
struct Verdict {
    frame: i32,
    reliable: bool,
    reason: String,
}

impl Verdict {
    fn new(frame: i32) -> Self {
        Self {
            frame,
            reliable: true,
            reason: String::new(),
        }
    }

    fn flag(&mut self, reason: &str) {
        if self.reliable {
            warn!(frame = self.frame, reason, "time unreliable");
            self.reliable = false;
            self.reason = reason.to_string();
        }
    }
}

/// Timing state of one run, fed one frame at a time in frame order.
#[derive(Debug)]
pub struct TimingSession {
    server: ServerData,
    format: HeaderFormat,
    overheads: Option<Overheads>,
    /// Raw timestamps, newest first.
    history: VecDeque<DateTime<Utc>>,
    blue: BlueCoadd,
    old_frame_number: i32,
    old_gps: Option<DateTime<Utc>>,
    warned_no_gps: bool,
}

impl TimingSession {
    /// Start a session for a run, checking its metadata first.
    pub fn new(server: ServerData) -> Result<Self> {
        server.validate()?;
        let format = HeaderFormat::for_server(&server);
        let blue = BlueCoadd::new(server.nblue.max(1) as usize);
        Ok(Self {
            server,
            format,
            overheads: None,
            history: VecDeque::new(),
            blue,
            old_frame_number: -1000,
            old_gps: None,
            warned_no_gps: false,
        })
    }

    pub fn server(&self) -> &ServerData {
        &self.server
    }

    pub fn format(&self) -> HeaderFormat {
        self.format
    }

    /// Overheads of the run, once the first frame has been seen.
    pub fn overheads(&self) -> Option<&Overheads> {
        self.overheads.as_ref()
    }

    /// Timestamps currently held, newest first.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Forget all earlier frames. The next frame is treated as the first of
    /// a new sequence; the run overheads are kept.
    pub fn reset(&mut self) {
        self.history.clear();
        self.blue.clear();
        self.old_frame_number = -1000;
        self.old_gps = None;
    }

    /// Decode one frame header and work out its timing.
    pub fn process(&mut self, buffer: &[u8], swap_bytes: bool) -> Result<TimingInfo> {
        let raw = RawHeader::decode(buffer, self.format, swap_bytes)?;
        let mut verdict = Verdict::new(raw.frame_number);
        if let Some(problem) = raw.problem() {
            verdict.flag(&problem);
        }

        if raw.format == HeaderFormat::V2 {
            let header_expose = raw.expose_units as f32 * self.server.time_units;
            if header_expose != self.server.expose_time {
                warn!(
                    header = header_expose,
                    server = self.server.expose_time,
                    "exposure delay in the timing header does not match the run metadata"
                );
            }
        }
        let bad_blue = self.server.nblue > 1 && raw.blue_flag;

        let previous = self.old_gps.map(|timestamp| PreviousFrame {
            frame_number: self.old_frame_number,
            timestamp,
        });
        let gps = gps::reconstruct(&raw, &self.server, previous);
        if raw.format == HeaderFormat::V1 && raw.nsatellite == -1 && !self.warned_no_gps {
            warn!("no GPS attached; times are relative and the date is unknown");
            self.warned_no_gps = true;
        }
        if gps.bad_date {
            verdict.flag("invalid date in timing header");
        }

        let default_tstamp = gps::default_ordering(gps.timestamp, self.server.timestamp_default);

        if !consecutive(self.old_frame_number, raw.frame_number) {
            self.history.clear();
            self.blue.clear();
        }
        self.history.push_front(gps.timestamp);

        let overheads = match self.overheads {
            Some(overheads) => overheads,
            None => {
                let overheads = Overheads::derive(&self.server, gps.vclock_frame);
                info!(
                    instrument = ?self.server.instrument,
                    mode = ?self.server.readout_mode,
                    default_tstamp,
                    vclock = gps.vclock_frame,
                    clear = overheads.clear_time,
                    frame_transfer = overheads.frame_transfer,
                    readout = overheads.readout_time,
                    expose = self.server.expose_time,
                    nwins = overheads.nwins,
                    "timing overheads"
                );
                self.overheads = Some(overheads);
                overheads
            }
        };
        self.history.truncate(self.history_limit(&overheads));

        let (ut_date, exposure_time) =
            self.mid_exposure(raw.frame_number, default_tstamp, &overheads, &mut verdict);

        let blue = self
            .blue
            .update(ut_date, exposure_time, verdict.reliable, bad_blue);

        self.old_frame_number = raw.frame_number;
        self.old_gps = Some(gps.timestamp);

        Ok(TimingInfo {
            gps_time: gps.timestamp,
            ut_date,
            exposure_time,
            frame_number: raw.frame_number,
            format: raw.format,
            reliable: verdict.reliable,
            reason: verdict.reason,
            ut_date_blue: blue.ut,
            exposure_time_blue: blue.exposure,
            reliable_blue: blue.reliable,
            nsatellite: (raw.format == HeaderFormat::V1).then_some(raw.nsatellite),
            tstamp_status: (raw.format == HeaderFormat::V2).then_some(raw.tstamp),
            vclock_frame: gps.vclock_frame,
            default_tstamp,
            blue_is_bad: bad_blue,
        })
    }

    /// Timestamps needed by the current readout mode.
    fn history_limit(&self, overheads: &Overheads) -> usize {
        match (self.server.instrument, self.server.readout_mode) {
            (Instrument::Ultracam, ReadoutMode::FullframeNoclear | ReadoutMode::Windows) => 3,
            (Instrument::Ultracam, ReadoutMode::Drift) => overheads.nwins + 2,
            (Instrument::Ultraspec, ReadoutMode::L3ccdWindows) => 3,
            (Instrument::Ultraspec, ReadoutMode::L3ccdDrift) => overheads.nwins + 2,
            _ => 2,
        }
    }

    fn mid_exposure(
        &self,
        frame: i32,
        default_tstamp: bool,
        o: &Overheads,
        verdict: &mut Verdict,
    ) -> (DateTime<Utc>, f64) {
        let expose = f64::from(self.server.expose_time);
        let t = &self.history;
        let t0 = t[0];

        match (self.server.instrument, self.server.readout_mode) {
            (
                Instrument::Ultracam,
                ReadoutMode::FullframeClear | ReadoutMode::FullframeOverscan | ReadoutMode::WindowsClear,
            ) => {
                // Timestamp at the start of the exposure, or after the readout.
                if default_tstamp {
                    (add_seconds(t0, expose / 2.0), expose)
                } else if t.len() == 1 {
                    verdict.flag(NO_PREVIOUS);
                    (
                        add_seconds(t0, -o.frame_transfer - o.readout_time - expose / 2.0),
                        expose,
                    )
                } else {
                    (add_seconds(t[1], o.clear_time + expose / 2.0), expose)
                }
            }

            (Instrument::Ultracam, ReadoutMode::FullframeNoclear | ReadoutMode::Windows) => {
                // Without clears the exposure runs from one frame transfer to
                // the next, covering the readout and the exposure delay.
                let ft = o.frame_transfer;
                if default_tstamp {
                    if frame == 1 {
                        (add_seconds(t0, -ft - expose / 2.0), expose)
                    } else if t.len() > 1 {
                        let texp = seconds_between(t0, t[1]) - ft;
                        (add_seconds(t[1], texp / 2.0), texp)
                    } else {
                        let texp = o.readout_time + expose;
                        verdict.flag(NO_PREVIOUS);
                        (add_seconds(t0, -ft - texp / 2.0), texp)
                    }
                } else if frame == 1 {
                    verdict.flag("cannot establish an accurate time for first frame in this mode");
                    (
                        add_seconds(t0, -ft - o.readout_time - expose / 2.0),
                        expose,
                    )
                } else if t.len() > 2 {
                    let texp = seconds_between(t[1], t[2]) - ft;
                    (add_seconds(t[1], expose - texp / 2.0), texp)
                } else if t.len() == 2 {
                    let texp = seconds_between(t0, t[1]) - ft;
                    verdict.flag("cannot establish an accurate time without at least 2 prior timestamps");
                    (add_seconds(t[1], expose - texp / 2.0), texp)
                } else {
                    let texp = o.readout_time + expose;
                    verdict.flag("cannot establish an accurate time without at least a prior timestamp");
                    (add_seconds(t0, -texp - ft + expose - texp / 2.0), texp)
                }
            }

            (Instrument::Ultracam, ReadoutMode::Drift) => {
                let n = o.nwins;
                if default_tstamp {
                    if n > 0 && t.len() > n {
                        let texp = seconds_between(t[n - 1], t[n]) - o.frame_transfer;
                        (add_seconds(t[n], texp / 2.0), texp)
                    } else {
                        verdict.flag(TOO_FEW_STORED);
                        (unix(NO_GPS_EPOCH), expose)
                    }
                } else {
                    self.drift_non_default(n, o.frame_transfer, expose, false, verdict)
                }
            }

            (Instrument::Ultraspec, ReadoutMode::L3ccdWindows) => {
                self.l3_windows(frame, expose, verdict)
            }

            (Instrument::Ultraspec, ReadoutMode::L3ccdDrift) => {
                self.drift_non_default(o.nwins, o.frame_transfer, expose, true, verdict)
            }

            (Instrument::Moscam, _) => (add_seconds(t0, expose / 2.0), expose),

            (instrument, mode) => {
                verdict.flag(&format!(
                    "no timing model for {instrument:?} in {mode:?} mode"
                ));
                (t0, expose)
            }
        }
    }

    /// Drift mode with the timestamp following the readout: the frame read
    /// now was exposed `nwins` frames ago.
    fn drift_non_default(
        &self,
        n: usize,
        ft: f64,
        expose: f64,
        check_identical: bool,
        verdict: &mut Verdict,
    ) -> (DateTime<Utc>, f64) {
        let t = &self.history;
        if n > 0 && t.len() > n + 1 {
            let texp = seconds_between(t[n], t[n + 1]) - ft;
            if check_identical && t[n] == t[n + 1] {
                verdict.flag(IDENTICAL);
            }
            (add_seconds(t[n], expose - texp / 2.0), texp)
        } else if n > 0 && t.len() == n + 1 {
            let texp = seconds_between(t[n - 1], t[n]) - ft;
            verdict.flag(TOO_FEW_STORED);
            (add_seconds(t[n], expose - texp / 2.0), texp)
        } else {
            verdict.flag(TOO_FEW_STORED);
            (unix(NO_GPS_EPOCH), expose)
        }
    }

    fn l3_windows(&self, frame: i32, expose: f64, verdict: &mut Verdict) -> (DateTime<Utc>, f64) {
        let t = &self.history;
        let t0 = t[0];
        let clear_every = self.server.l3.en_clr || frame == 1;

        if t0 < unix(ULTRASPEC_CHANGE1) {
            return if clear_every {
                (add_seconds(t0, -expose / 2.0), expose)
            } else if t.len() > 1 {
                let texp = seconds_between(t0, t[1]) - USPEC_FT_TIME_OLD;
                if t0 == t[1] {
                    verdict.flag(IDENTICAL);
                }
                (add_seconds(t0, -texp / 2.0), texp)
            } else {
                verdict.flag(TOO_FEW_STORED);
                (add_seconds(t0, -expose / 2.0), expose)
            };
        }

        // Sequence is CLR|EXP|FT|READ|TS, with the clear dropped between
        // exposures unless clears are enabled.
        if clear_every {
            if t.len() == 1 {
                verdict.flag("cannot establish an accurate time without at least 1 prior timestamp");
                (add_seconds(t0, -USPEC_FT_TIME - expose / 2.0), expose)
            } else {
                // Double clears from March 2014.
                let clear = if t[1] < unix(ULTRASPEC_CHANGE2) {
                    USPEC_CLR_TIME
                } else {
                    2.0 * USPEC_CLR_TIME
                };
                (add_seconds(t[1], clear + expose / 2.0), expose)
            }
        } else if t.len() > 2 {
            let texp = seconds_between(t[1], t[2]) - USPEC_FT_TIME;
            if t[1] == t[2] {
                verdict.flag(IDENTICAL);
            }
            (add_seconds(t[1], expose - texp / 2.0), texp)
        } else if t.len() == 2 {
            let texp = seconds_between(t0, t[1]) - USPEC_FT_TIME;
            verdict.flag("cannot establish an accurate time without at least 2 prior timestamps");
            (add_seconds(t[1], expose - texp / 2.0), texp)
        } else {
            verdict.flag(TOO_FEW_STORED);
            (add_seconds(t0, -expose / 2.0 - expose), expose)
        }
    }
}

/// Work out the timing of one frame from its raw header.
///
/// Frames of a run must be passed in order through the same `session`; a
/// break in the frame numbers clears the stored history.
pub fn read_header(
    buffer: &[u8],
    swap_bytes: bool,
    session: &mut TimingSession,
) -> Result<TimingInfo> {
    session.process(buffer, swap_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_hclocks_uses_nearer_edge() {
        // Left window 10 columns in, right window ending 100 columns from the edge.
        let nx = 50;
        let xright = ULTRACAM_HALF_WIDTH - 100;
        assert_eq!(dump_hclocks(nx, 11, xright), nx + 90 + 10 + DUMP_GATE_HCLOCKS);
        assert_eq!(dump_hclocks(nx, 101, ULTRACAM_HALF_WIDTH - 10), nx + 90 + 10 + DUMP_GATE_HCLOCKS);
    }

    #[test]
    fn drift_overheads_fill_pipeline() {
        let server = ServerData {
            readout_mode: ReadoutMode::Drift,
            windows: vec![
                Wind { llx: 100, lly: 1, nx: 50, ny: 100 },
                Wind { llx: 600, lly: 1, nx: 50, ny: 100 },
            ],
            ..Default::default()
        };
        let o = Overheads::derive(&server, 1.0e-6);
        assert_eq!(o.nwins, 5);
        assert!((o.frame_transfer - 100.0e-6).abs() < 1e-12);
    }

    #[test]
    fn first_reason_is_kept() {
        let mut v = Verdict::new(3);
        v.flag("first");
        v.flag("second");
        assert!(!v.reliable);
        assert_eq!(v.reason, "first");
    }
}
