//! `.ucm` frame files: a magic number followed by an [`Mimage`].

use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::consts::UCM_MAGIC;
use crate::error::{Result, UcamError};
use crate::io::codec;
use crate::mccd::Mimage;
use crate::windata::OutType;

/// Which generation of the binary layout a file uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UcmLayout {
    /// Leading magic number, signed counts.
    Current,
    /// No magic number, unsigned window counts, written little-endian.
    Legacy,
}

/// Memory-mapped frame file with its byte order already worked out.
pub struct UcmFile {
    mmap: Mmap,
    layout: UcmLayout,
    swap: bool,
}

impl UcmFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < 4 {
            return Err(UcamError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} is too short to be a frame file", path.display()),
            )));
        }

        let magic = codec::read_i32(&mut &mmap[..4], false)?;
        let (layout, swap) = if magic == UCM_MAGIC {
            (UcmLayout::Current, false)
        } else if magic.swap_bytes() == UCM_MAGIC {
            (UcmLayout::Current, true)
        } else {
            (UcmLayout::Legacy, cfg!(target_endian = "big"))
        };
        debug!(path = %path.display(), ?layout, swap, "opened frame file");

        Ok(Self { mmap, layout, swap })
    }

    pub fn layout(&self) -> UcmLayout {
        self.layout
    }

    /// Whether the file's byte order differs from this machine's.
    pub fn swap(&self) -> bool {
        self.swap
    }

    /// Decode the frame; `nccd` selects a single CCD (from 1) or 0 for all.
    pub fn read(&self, nccd: usize) -> Result<Mimage> {
        match self.layout {
            UcmLayout::Current => {
                let mut cursor = Cursor::new(&self.mmap[4..]);
                Mimage::read(&mut cursor, self.swap, nccd)
            }
            UcmLayout::Legacy => {
                let mut cursor = Cursor::new(&self.mmap[..]);
                Mimage::read_old(&mut cursor, self.swap, nccd)
            }
        }
    }
}

/// Read a frame file in one call.
pub fn read_ucm(path: &Path, nccd: usize) -> Result<Mimage> {
    UcmFile::open(path)?.read(nccd)
}

/// Write a frame file in the current layout and native byte order.
pub fn write_ucm(path: &Path, frame: &Mimage, otype: OutType) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    codec::write_i32(&mut w, UCM_MAGIC)?;
    frame.write(&mut w, otype)?;
    w.flush()?;
    Ok(())
}
