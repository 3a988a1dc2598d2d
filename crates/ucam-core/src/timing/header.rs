//! Decoding of the raw per-frame timing header.

use tracing::warn;

use crate::error::{Result, UcamError};
use crate::io::codec::{i16_at, u16_at, u32_at};
use crate::timing::server::{Instrument, ServerData};

// GPS receiver status bits (layout 2).
pub const PCPS_FREER: u16 = 0x01;
pub const PCPS_SYNCD: u16 = 0x04;
pub const PCPS_INVT: u16 = 0x80;
pub const PCPS_ANT_FAIL: u16 = 0x0200;

/// Generation of the timing header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderFormat {
    /// Up to early 2010: seconds into the GPS week, a date and a satellite count.
    V1,
    /// From February 2010: Unix seconds, 100 ns ticks and a receiver status word.
    V2,
}

impl HeaderFormat {
    /// Work out the layout from the server configuration version.
    pub fn for_server(server: &ServerData) -> Self {
        if matches!(server.instrument, Instrument::Ultraspec | Instrument::Moscam)
            && server.version == -1
        {
            return HeaderFormat::V2;
        }
        match server.version {
            -1 | 70514 | 80127 => HeaderFormat::V1,
            100222 | 110921 | 111205 | 120716 | 120813 | 130307 | 130317 | 140331 => {
                HeaderFormat::V2
            }
            other => {
                warn!(version = other, "unrecognised server version, assuming the post-2010 header layout");
                HeaderFormat::V2
            }
        }
    }

    pub fn number(self) -> i32 {
        match self {
            HeaderFormat::V1 => 1,
            HeaderFormat::V2 => 2,
        }
    }

    /// Bytes of the header that are decoded.
    pub fn header_len(self) -> usize {
        match self {
            HeaderFormat::V1 => 23,
            HeaderFormat::V2 => 26,
        }
    }
}

/// Fields of one timing header, before any era corrections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawHeader {
    pub format: HeaderFormat,
    pub frame_number: i32,
    /// Seconds into the GPS week (V1) or since 1970 (V2).
    pub nsec: u32,
    pub nnanosec: u32,
    pub day: u8,
    pub month: u8,
    pub year: u16,
    /// V1 only; -1 means no GPS was attached.
    pub nsatellite: i16,
    /// V2 only.
    pub expose_units: u32,
    /// V2 only.
    pub tstamp: u16,
    /// Junk-blue-frame marker bit as set by the camera.
    pub blue_flag: bool,
}

impl RawHeader {
    pub fn decode(buffer: &[u8], format: HeaderFormat, swap: bool) -> Result<Self> {
        let needed = format.header_len();
        if buffer.len() < needed {
            return Err(UcamError::TruncatedHeader {
                needed,
                got: buffer.len(),
            });
        }

        let frame_number = u32_at(buffer, 4, swap) as i32;
        let header = match format {
            HeaderFormat::V1 => {
                let all_ones = |v: u32| if v == u32::MAX { 0 } else { v };
                RawHeader {
                    format,
                    frame_number,
                    nsec: all_ones(u32_at(buffer, 9, swap)),
                    nnanosec: all_ones(u32_at(buffer, 13, swap)),
                    day: buffer[17],
                    month: buffer[18],
                    year: u16_at(buffer, 19, swap),
                    nsatellite: i16_at(buffer, 21, swap),
                    expose_units: 0,
                    tstamp: 0,
                    blue_flag: buffer[0] & (1 << 3) != 0,
                }
            }
            HeaderFormat::V2 => RawHeader {
                format,
                frame_number,
                nsec: u32_at(buffer, 12, swap),
                nnanosec: u32_at(buffer, 16, swap).wrapping_mul(100),
                day: 0,
                month: 0,
                year: 0,
                nsatellite: 0,
                expose_units: u32_at(buffer, 8, swap),
                tstamp: u16_at(buffer, 24, swap),
                blue_flag: buffer[0] & (1 << 4) != 0,
            },
        };
        Ok(header)
    }

    /// The first problem flagged by the header itself, if any.
    pub fn problem(&self) -> Option<String> {
        match self.format {
            HeaderFormat::V1 if self.nsatellite <= 2 => {
                Some(format!("too few = {} satellites", self.nsatellite))
            }
            HeaderFormat::V1 => None,
            HeaderFormat::V2 => status_problem(self.tstamp).map(str::to_string),
        }
    }
}

/// First failing condition of a GPS status word, in order of severity.
pub fn status_problem(tstamp: u16) -> Option<&'static str> {
    if tstamp & PCPS_ANT_FAIL != 0 {
        Some("GPS antenna failure")
    } else if tstamp & PCPS_INVT != 0 {
        Some("GPS battery disconnected")
    } else if tstamp & PCPS_SYNCD == 0 {
        Some("GPS clock not yet synced since power up")
    } else if tstamp & PCPS_FREER != 0 {
        Some("GPS receiver has not verified its position")
    } else {
        None
    }
}
