//! Static description of an observing run, as supplied by the camera server.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{MAX_NXTOT, MAX_NYTOT, MAX_XBIN, MAX_YBIN};
use crate::error::{Result, UcamError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instrument {
    #[default]
    Ultracam,
    Ultraspec,
    Moscam,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadoutMode {
    /// Full frame, cleared before every exposure.
    #[default]
    FullframeClear,
    /// Full frame, cleared only before the first exposure.
    FullframeNoclear,
    FullframeOverscan,
    /// One to three window pairs.
    Windows,
    /// One window pair pipelined through the storage area.
    Drift,
    /// One window pair, cleared before every exposure.
    WindowsClear,
    L3ccdWindows,
    L3ccdDrift,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Run {
    /// First commissioning run, which had no date information.
    #[serde(rename = "MAY_2002")]
    May2002,
    #[default]
    #[serde(rename = "OTHERS")]
    Others,
}

/// One readout window as described by the server, unbinned start and binned
/// size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wind {
    pub llx: i32,
    pub lly: i32,
    pub nx: i32,
    pub ny: i32,
}

/// Settings specific to the L3 (avalanche) CCD.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct L3Settings {
    /// Clear before every exposure.
    pub en_clr: bool,
}

/// Run metadata needed to interpret timing headers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerData {
    pub instrument: Instrument,
    /// Server configuration version, which fixes the header layout.
    pub version: i32,
    pub readout_mode: ReadoutMode,
    pub which_run: Run,
    /// Exposure delay in seconds.
    pub expose_time: f32,
    /// Seconds per exposure-delay unit in the header.
    pub time_units: f32,
    pub xbin: i32,
    pub ybin: i32,
    /// Windows in left/right pairs going up the chip.
    pub windows: Vec<Wind>,
    /// Vertical clock setting byte.
    pub v_ft_clk: u8,
    /// Gain/speed setting in hex: "3293" (CDD), "4027" (FBB), "4061" (FDD).
    pub gain_speed: String,
    /// Number of frames co-added in the blue channel.
    pub nblue: i32,
    /// Apply the dated timestamp corrections as they are (true) or inverted.
    pub timestamp_default: bool,
    pub l3: L3Settings,
}

impl Default for ServerData {
    fn default() -> Self {
        Self {
            instrument: Instrument::Ultracam,
            version: -1,
            readout_mode: ReadoutMode::FullframeClear,
            which_run: Run::Others,
            expose_time: 0.0,
            time_units: 1.0e-4,
            xbin: 1,
            ybin: 1,
            windows: Vec::new(),
            v_ft_clk: 0,
            gain_speed: "3293".into(),
            nblue: 1,
            timestamp_default: true,
            l3: L3Settings::default(),
        }
    }
}

impl ServerData {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn is_fullframe(&self) -> bool {
        matches!(
            self.readout_mode,
            ReadoutMode::FullframeClear | ReadoutMode::FullframeNoclear | ReadoutMode::FullframeOverscan
        )
    }

    /// Whether a frame carries no useful data: the pipeline-filling frames of
    /// drift mode and the first frame in windows mode.
    pub fn is_junk(&self, frame: i32) -> bool {
        match self.readout_mode {
            ReadoutMode::Drift => self.windows.first().is_some_and(|w| {
                let limit = ((1033.0 / f64::from(w.ny) / f64::from(self.ybin) + 1.0) / 2.0) as i32;
                frame <= limit
            }),
            ReadoutMode::Windows => frame == 1,
            _ => false,
        }
    }

    /// Check the fields the timing code relies on for this readout mode.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(UcamError::InvalidServerData(msg));

        if !(1..=MAX_XBIN).contains(&self.xbin) || !(1..=MAX_YBIN).contains(&self.ybin) {
            return bad(format!(
                "binning factors must lie in 1..={MAX_XBIN} x 1..={MAX_YBIN}, got {}x{}",
                self.xbin, self.ybin
            ));
        }
        if self.nblue < 1 {
            return bad(format!("nblue must be >= 1, got {}", self.nblue));
        }
        if self.expose_time.is_nan() || self.expose_time < 0.0 {
            return bad(format!("invalid exposure time {}", self.expose_time));
        }
        if let Some((i, w)) = self
            .windows
            .iter()
            .enumerate()
            .find(|(_, w)| {
                !(1..=MAX_NXTOT).contains(&w.llx)
                    || !(1..=MAX_NYTOT).contains(&w.lly)
                    || !(1..=MAX_NXTOT).contains(&w.nx)
                    || !(1..=MAX_NYTOT).contains(&w.ny)
            })
        {
            return bad(format!("window {} is invalid: {:?}", i + 1, w));
        }

        let nwin = self.windows.len();
        match self.readout_mode {
            ReadoutMode::Windows if nwin == 0 || nwin % 2 != 0 => {
                bad(format!("windows mode needs window pairs, got {nwin} windows"))
            }
            ReadoutMode::WindowsClear | ReadoutMode::Drift if nwin < 2 => {
                bad(format!("{:?} mode needs a window pair, got {nwin} windows", self.readout_mode))
            }
            ReadoutMode::Drift if i64::from(self.ybin) * i64::from(self.windows[0].ny) > 1033 => {
                bad("drift window taller than the storage area".into())
            }
            ReadoutMode::L3ccdDrift if nwin == 0 => bad("drift mode needs a window".into()),
            ReadoutMode::L3ccdDrift if i64::from(self.ybin) * i64::from(self.windows[0].ny) > 1037 => {
                bad("drift window taller than the storage area".into())
            }
            _ => Ok(()),
        }
    }
}
