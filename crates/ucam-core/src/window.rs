use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use crate::ccd::CcdObject;
use crate::consts::{MAX_NXTOT, MAX_NYTOT, MAX_XBIN, MAX_YBIN, WINDOW_SELECT_BORDER};
use crate::error::{Result, UcamError};
use crate::io::ascii::parse_values;
use crate::io::codec;

/// A rectangular, possibly binned, region of a CCD.
///
/// `llx`/`lly` are the unbinned CCD coordinates of the lower-left pixel,
/// counting from (1,1). `nx`/`ny` are in binned pixels. Pixel `n` covers
/// `[n - 0.5, n + 0.5]` in CCD coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Window {
    llx: i32,
    lly: i32,
    nx: i32,
    ny: i32,
    xbin: i32,
    ybin: i32,
    nxtot: i32,
    nytot: i32,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            llx: 1,
            lly: 1,
            nx: 1,
            ny: 1,
            xbin: 1,
            ybin: 1,
            nxtot: 1,
            nytot: 1,
        }
    }
}

impl Window {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llx: i32,
        lly: i32,
        nx: i32,
        ny: i32,
        xbin: i32,
        ybin: i32,
        nxtot: i32,
        nytot: i32,
    ) -> Result<Self> {
        let w = Self {
            llx,
            lly,
            nx,
            ny,
            xbin,
            ybin,
            nxtot,
            nytot,
        };
        w.validate()?;
        Ok(w)
    }

    fn validate(&self) -> Result<()> {
        let in_range = self.llx > 0
            && self.lly > 0
            && self.nx > 0
            && self.ny > 0
            && (1..=MAX_XBIN).contains(&self.xbin)
            && (1..=MAX_YBIN).contains(&self.ybin)
            && (1..=MAX_NXTOT).contains(&self.nxtot)
            && (1..=MAX_NYTOT).contains(&self.nytot);
        let fits = in_range
            && i64::from(self.llx) + i64::from(self.xbin) * i64::from(self.nx) - 1
                <= i64::from(self.nxtot)
            && i64::from(self.lly) + i64::from(self.ybin) * i64::from(self.ny) - 1
                <= i64::from(self.nytot);
        if fits {
            Ok(())
        } else {
            Err(UcamError::InvalidWindow {
                llx: self.llx,
                lly: self.lly,
                nx: self.nx,
                ny: self.ny,
                xbin: self.xbin,
                ybin: self.ybin,
                nxtot: self.nxtot,
                nytot: self.nytot,
            })
        }
    }

    pub fn llx(&self) -> i32 {
        self.llx
    }
    pub fn lly(&self) -> i32 {
        self.lly
    }
    pub fn nx(&self) -> i32 {
        self.nx
    }
    pub fn ny(&self) -> i32 {
        self.ny
    }
    pub fn xbin(&self) -> i32 {
        self.xbin
    }
    pub fn ybin(&self) -> i32 {
        self.ybin
    }
    pub fn nxtot(&self) -> i32 {
        self.nxtot
    }
    pub fn nytot(&self) -> i32 {
        self.nytot
    }

    /// Number of binned pixels.
    pub fn ntot(&self) -> usize {
        self.nx as usize * self.ny as usize
    }

    /// Array shape `(ny, nx)` as used for pixel storage.
    pub fn shape(&self) -> (usize, usize) {
        (self.ny as usize, self.nx as usize)
    }

    pub fn is_oned(&self) -> bool {
        self.nx == 1 || self.ny == 1
    }

    /// Unbinned X coordinate one past the right-most pixel.
    pub fn urx(&self) -> i32 {
        self.llx + self.xbin * self.nx
    }

    /// Unbinned Y coordinate one past the top pixel.
    pub fn ury(&self) -> i32 {
        self.lly + self.ybin * self.ny
    }

    pub fn left(&self) -> f32 {
        self.llx as f32 - 0.5
    }
    pub fn right(&self) -> f32 {
        self.urx() as f32 - 0.5
    }
    pub fn bottom(&self) -> f32 {
        self.lly as f32 - 0.5
    }
    pub fn top(&self) -> f32 {
        self.ury() as f32 - 0.5
    }

    // ---- Coordinate transforms ----

    /// Computer X (zero-based binned index) to CCD X.
    pub fn xccd(&self, x: f32) -> f32 {
        self.llx as f32 + self.xbin as f32 * (x + 0.5) - 0.5
    }

    /// Computer Y to CCD Y.
    pub fn yccd(&self, y: f32) -> f32 {
        self.lly as f32 + self.ybin as f32 * (y + 0.5) - 0.5
    }

    /// CCD X to computer X.
    pub fn xcomp(&self, x: f32) -> f32 {
        (x - self.llx as f32 + 0.5) / self.xbin as f32 - 0.5
    }

    /// CCD Y to computer Y.
    pub fn ycomp(&self, y: f32) -> f32 {
        (y - self.lly as f32 + 0.5) / self.ybin as f32 - 0.5
    }

    // ---- Predicates ----

    /// True if (x,y) lies strictly inside the window's pixel extent.
    pub fn enclose(&self, x: f32, y: f32) -> bool {
        x > self.left() && x < self.right() && y > self.bottom() && y < self.top()
    }

    /// True if the pixel extents of the two windows intersect.
    pub fn overlap(&self, other: &Window) -> bool {
        self.llx < other.urx()
            && other.llx < self.urx()
            && self.lly < other.ury()
            && other.lly < self.ury()
    }

    // ---- Validating setters ----

    /// Replace every field at once; `self` is untouched on failure.
    #[allow(clippy::too_many_arguments)]
    pub fn set(
        &mut self,
        llx: i32,
        lly: i32,
        nx: i32,
        ny: i32,
        xbin: i32,
        ybin: i32,
        nxtot: i32,
        nytot: i32,
    ) -> Result<()> {
        *self = Window::new(llx, lly, nx, ny, xbin, ybin, nxtot, nytot)?;
        Ok(())
    }

    fn update(&mut self, f: impl FnOnce(&mut Window)) -> Result<()> {
        let mut w = *self;
        f(&mut w);
        w.validate()?;
        *self = w;
        Ok(())
    }

    pub fn set_llx(&mut self, llx: i32) -> Result<()> {
        self.update(|w| w.llx = llx)
    }
    pub fn set_lly(&mut self, lly: i32) -> Result<()> {
        self.update(|w| w.lly = lly)
    }
    pub fn set_nx(&mut self, nx: i32) -> Result<()> {
        self.update(|w| w.nx = nx)
    }
    pub fn set_ny(&mut self, ny: i32) -> Result<()> {
        self.update(|w| w.ny = ny)
    }
    pub fn set_xbin(&mut self, xbin: i32) -> Result<()> {
        self.update(|w| w.xbin = xbin)
    }
    pub fn set_ybin(&mut self, ybin: i32) -> Result<()> {
        self.update(|w| w.ybin = ybin)
    }
    pub fn set_nxtot(&mut self, nxtot: i32) -> Result<()> {
        self.update(|w| w.nxtot = nxtot)
    }
    pub fn set_nytot(&mut self, nytot: i32) -> Result<()> {
        self.update(|w| w.nytot = nytot)
    }

    // ---- Binary I/O ----

    /// Write the eight geometry fields in native byte order.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        for v in self.fields() {
            codec::write_i32(w, v)?;
        }
        Ok(())
    }

    /// Read a window written by [`Window::write`].
    pub fn read<R: Read>(r: &mut R, swap: bool) -> Result<Self> {
        let mut f = [0i32; 8];
        for v in f.iter_mut() {
            *v = codec::read_i32(r, swap)?;
        }
        Window::new(f[0], f[1], f[2], f[3], f[4], f[5], f[6], f[7])
    }

    /// Read a window from a pre-2004 stream.
    ///
    /// The geometry block has the same layout in both generations; only the
    /// enclosing counts differ.
    pub fn read_old<R: Read>(r: &mut R, swap: bool) -> Result<Self> {
        Self::read(r, swap)
    }

    fn fields(&self) -> [i32; 8] {
        [
            self.llx, self.lly, self.nx, self.ny, self.xbin, self.ybin, self.nxtot, self.nytot,
        ]
    }
}

impl CcdObject for Window {
    const NAME: &'static str = "Window";
    const PLURAL: &'static str = "windows";
    const EXTENSION: &'static str = ".win";

    /// Squared distance from (x,y) to the nearest edge, 0 inside.
    fn how_far(&self, x: f32, y: f32) -> f32 {
        let dx = if x < self.left() {
            self.left() - x
        } else if x > self.right() {
            x - self.right()
        } else {
            0.0
        };
        let dy = if y < self.bottom() {
            self.bottom() - y
        } else if y > self.top() {
            y - self.top()
        } else {
            0.0
        };
        dx * dx + dy * dy
    }

    fn near_enough(&self, x: f32, y: f32) -> bool {
        x > self.left() - WINDOW_SELECT_BORDER
            && x < self.right() + WINDOW_SELECT_BORDER
            && y > self.bottom() - WINDOW_SELECT_BORDER
            && y < self.top() + WINDOW_SELECT_BORDER
    }

    fn clash(&self, other: &Self) -> bool {
        self.overlap(other)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "llx,lly = {}, {}; nx,ny = {}, {}; xbin,ybin = {}, {}; nxtot,nytot = {}, {}",
            self.llx, self.lly, self.nx, self.ny, self.xbin, self.ybin, self.nxtot, self.nytot
        )
    }
}

impl FromStr for Window {
    type Err = UcamError;

    fn from_str(s: &str) -> Result<Self> {
        let [llx, lly, nx, ny, xbin, ybin, nxtot, nytot] = parse_values::<i32, 8>(s)?;
        Window::new(llx, lly, nx, ny, xbin, ybin, nxtot, nytot)
    }
}
