use thiserror::Error;

#[derive(Error, Debug)]
pub enum UcamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Invalid window: llx,lly = {llx}, {lly}; nx,ny = {nx}, {ny}; \
         xbin,ybin = {xbin}, {ybin}; nxtot,nytot = {nxtot}, {nytot}"
    )]
    InvalidWindow {
        llx: i32,
        lly: i32,
        nx: i32,
        ny: i32,
        xbin: i32,
        ybin: i32,
        nxtot: i32,
        nytot: i32,
    },

    #[error("Invalid aperture radii: rstar = {rstar}, rsky1 = {rsky1}, rsky2 = {rsky2}")]
    InvalidAperture { rstar: f32, rsky1: f32, rsky2: f32 },

    #[error("{kind} at index {index} clashes with another {kind}")]
    Clash { kind: &'static str, index: usize },

    #[error("Index {index} out of range (total: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    #[error("Windows do not overlap")]
    NoOverlap,

    #[error("Position ({x}, {y}) is not inside any window")]
    NotEnclosed { x: f32, y: f32 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unrecognised pixel output type: {0}")]
    UnknownOutType(i32),

    #[error("CCD {requested} requested but only {available} available")]
    CcdOutOfRange { requested: usize, available: usize },

    #[error("Timing header too short: need {needed} bytes, got {got}")]
    TruncatedHeader { needed: usize, got: usize },

    #[error("Invalid server data: {0}")]
    InvalidServerData(String),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, UcamError>;
