/// Maximum unbinned X dimension of any CCD.
pub const MAX_NXTOT: i32 = 10_000;

/// Maximum unbinned Y dimension of any CCD.
pub const MAX_NYTOT: i32 = 10_000;

/// Maximum binning factor in X.
pub const MAX_XBIN: i32 = 100;

/// Maximum binning factor in Y.
pub const MAX_YBIN: i32 = 100;

/// Border (unbinned pixels) around a window inside which a point still selects it.
pub const WINDOW_SELECT_BORDER: f32 = 10.0;

/// Border added to 1.2 x the outer sky radius when selecting an aperture.
pub const APERTURE_SELECT_BORDER: f32 = 3.0;

/// Magic number leading every `.ucm` frame file written since September 2004.
pub const UCM_MAGIC: i32 = 47_561_009;

/// Minimum window pixel count (ny*nx) to use Rayon for per-pixel transforms.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Seconds in a day.
pub const SECONDS_PER_DAY: u32 = 86_400;

// ---------------------------------------------------------------------------
// ULTRACAM readout constants (microseconds unless noted)
// ---------------------------------------------------------------------------

/// Time to clock one pixel along the serial register.
pub const HCLOCK: f64 = 0.48;

/// Correlated double sampling time, CDD gain/speed setting.
pub const CDS_TIME_CDD: f64 = 10.0;

/// Correlated double sampling time, FBB gain/speed setting.
pub const CDS_TIME_FBB: f64 = 4.4;

/// Correlated double sampling time, FDD gain/speed setting.
pub const CDS_TIME_FDD: f64 = 2.2;

/// Video switch time.
pub const SWITCH_TIME: f64 = 1.2;

/// Rows shifted during a full ULTRACAM frame transfer.
pub const ULTRACAM_FT_ROWS: f64 = 1033.0;

/// Extra rows clocked (on top of the frame transfer) when clearing the chip.
pub const ULTRACAM_CLEAR_ROWS: f64 = 1027.0;

/// Unbinned columns on each half of an ULTRACAM chip.
pub const ULTRACAM_HALF_WIDTH: i32 = 1024;

/// Serial clocks needed to open the dump gates.
pub const DUMP_GATE_HCLOCKS: i32 = 8;

// ---------------------------------------------------------------------------
// ULTRASPEC readout constants (seconds)
// ---------------------------------------------------------------------------

/// Full frame transfer before the 2011-09-21 upgrade.
pub const USPEC_FT_TIME_OLD: f64 = 0.006_719_6;

/// Full frame transfer after the 2011-09-21 upgrade.
pub const USPEC_FT_TIME: f64 = 0.014_981_8;

/// Drift-mode frame transfer per row.
pub const USPEC_FT_ROW: f64 = 14.4e-6;

/// Drift-mode frame transfer offset.
pub const USPEC_FT_OFF: f64 = 49.0e-6;

/// Time taken by one chip clear.
pub const USPEC_CLR_TIME: f64 = 0.030_951_6;

/// Rows involved in an ULTRASPEC drift-mode pipeline calculation.
pub const USPEC_DRIFT_ROWS: f64 = 1037.0;
