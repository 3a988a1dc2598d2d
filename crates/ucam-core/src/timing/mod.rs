//! Frame timing: from raw GPS headers to mid-exposure times.

pub mod blue;
pub mod gps;
pub mod header;
pub mod server;
pub mod session;

pub use header::{HeaderFormat, RawHeader};
pub use server::{Instrument, ReadoutMode, Run, ServerData, Wind};
pub use session::{read_header, Overheads, TimingInfo, TimingSession};
