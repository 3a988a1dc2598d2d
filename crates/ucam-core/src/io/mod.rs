pub mod ascii;
pub mod codec;
pub mod ucm;

pub use ucm::{read_ucm, write_ucm, UcmFile};
