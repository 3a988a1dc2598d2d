//! One CCD's worth of windowed pixel data.

use std::io::{Read, Write};
use std::ops::{AddAssign, DivAssign, Index, MulAssign, SubAssign};

use ndarray::{s, Array2, ArrayViewMut2};
use tracing::debug;

use crate::ccd::Ccd;
use crate::error::{Result, UcamError};
use crate::io::codec;
use crate::windata::{self, ceil_div, OutType, Windata};
use crate::window::Window;

/// Summary statistics over a region of an [`Image`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stats {
    pub npoints: usize,
    pub min: f32,
    pub max: f32,
    pub raw_mean: f64,
    pub raw_rms: f64,
    pub clipped_mean: f64,
    pub clipped_rms: f64,
    pub nrejected: usize,
    /// Only computed on request.
    pub median: Option<f32>,
}

/// The windows of one CCD with their data. Windows never overlap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Image {
    windows: Ccd<Windata>,
}

impl Image {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-filled image with the given format.
    pub fn from_windows(format: &Ccd<Window>) -> Self {
        let data = format.iter().map(|w| Windata::new(*w)).collect();
        Self {
            windows: Ccd::from_vec_unchecked(data),
        }
    }

    /// Reset to the given format with all pixels zero.
    pub fn format(&mut self, format: &Ccd<Window>) {
        *self = Self::from_windows(format);
    }

    /// The windows without their data.
    pub fn windows(&self) -> Ccd<Window> {
        Ccd::from_vec_unchecked(self.windows.iter().map(|w| *w.window()).collect())
    }

    pub fn as_ccd(&self) -> &Ccd<Windata> {
        &self.windows
    }

    pub fn into_ccd(self) -> Ccd<Windata> {
        self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Windata> {
        self.windows.get(index)
    }

    /// Pixels of one window. The format can only change through
    /// [`Image::modify`].
    pub fn data_mut(&mut self, index: usize) -> Option<ArrayViewMut2<'_, f32>> {
        self.windows.objects_mut().get_mut(index).map(Windata::data_mut)
    }

    /// Reformat window `index` with zeroed data, failing if the new window
    /// overlaps any other.
    pub fn modify(&mut self, index: usize, window: Window) -> Result<()> {
        self.windows.modify(index, Windata::new(window))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Windata> {
        self.windows.iter()
    }

    fn windata_mut(&mut self) -> std::slice::IterMut<'_, Windata> {
        self.windows.objects_mut().iter_mut()
    }

    /// Add a window of data, failing if it overlaps an existing one.
    pub fn push(&mut self, windata: Windata) -> Result<()> {
        self.windows.push(windata)
    }

    /// True if both images have the same windows, regardless of data.
    pub fn same_format(&self, other: &Image) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.window() == b.window())
    }

    pub fn fill(&mut self, value: f32) {
        for w in self.windata_mut() {
            w.fill(value);
        }
    }

    /// Total X dimension of the CCD, 0 if there are no windows.
    pub fn nxtot(&self) -> i32 {
        self.get(0).map_or(0, |w| w.window().nxtot())
    }

    pub fn nytot(&self) -> i32 {
        self.get(0).map_or(0, |w| w.window().nytot())
    }

    /// Index of the window containing (x,y).
    pub fn enclose(&self, x: f32, y: f32) -> Result<usize> {
        self.iter()
            .position(|w| w.window().enclose(x, y))
            .ok_or(UcamError::NotEnclosed { x, y })
    }

    // ---- Whole-image statistics ----

    fn all_pixels(&self) -> Vec<f32> {
        let n = self.iter().map(|w| w.window().ntot()).sum();
        let mut buf = Vec::with_capacity(n);
        for w in self.iter() {
            buf.extend(w.data().iter().copied());
        }
        buf
    }

    pub fn min(&self) -> f32 {
        min_of(self.iter().map(|w| w.min()))
    }

    pub fn max(&self) -> f32 {
        max_of(self.iter().map(|w| w.max()))
    }

    pub fn mean(&self) -> f32 {
        let np: usize = self.iter().map(|w| w.window().ntot()).sum();
        if np == 0 {
            return 0.0;
        }
        let sum: f64 = self.iter().map(|w| w.sum()).sum();
        (sum / np as f64) as f32
    }

    pub fn centile(&self, l: f32) -> f32 {
        windata::select_centile(&mut self.all_pixels(), l)
    }

    pub fn centiles(&self, l1: f32, l2: f32) -> (f32, f32) {
        let mut buf = self.all_pixels();
        let c1 = windata::select_centile(&mut buf, l1);
        let c2 = windata::select_centile(&mut buf, l2);
        (c1, c2)
    }

    // ---- Region statistics ----

    /// Every pixel whose whole area lies inside one of the region windows.
    ///
    /// Pixels come back grouped by data window and carry no position
    /// information.
    pub fn region_buffer(&self, region: &Ccd<Window>) -> Vec<f32> {
        let mut buf = Vec::new();
        for dwin in self.iter() {
            let d = dwin.window();
            for swin in region {
                let xlo = ceil_div(swin.llx() - d.llx(), d.xbin()).max(0);
                let xhi = (swin.urx() - d.llx()).div_euclid(d.xbin()).min(d.nx());
                let ylo = ceil_div(swin.lly() - d.lly(), d.ybin()).max(0);
                let yhi = (swin.ury() - d.lly()).div_euclid(d.ybin()).min(d.ny());
                if xhi > xlo && yhi > ylo {
                    let view = dwin.data();
                    let sub = view.slice(s![ylo as usize..yhi as usize, xlo as usize..xhi as usize]);
                    buf.extend(sub.iter().copied());
                }
            }
        }
        buf
    }

    /// Minimum within `region`, 0 if the region holds no pixels.
    pub fn min_in(&self, region: &Ccd<Window>) -> f32 {
        min_of(self.region_buffer(region).into_iter())
    }

    pub fn max_in(&self, region: &Ccd<Window>) -> f32 {
        max_of(self.region_buffer(region).into_iter())
    }

    pub fn centile_in(&self, l: f32, region: &Ccd<Window>) -> f32 {
        windata::select_centile(&mut self.region_buffer(region), l)
    }

    pub fn centiles_in(&self, l1: f32, l2: f32, region: &Ccd<Window>) -> (f32, f32) {
        let mut buf = self.region_buffer(region);
        let c1 = windata::select_centile(&mut buf, l1);
        let c2 = windata::select_centile(&mut buf, l2);
        (c1, c2)
    }

    /// Raw and sigma-clipped statistics over `region`.
    pub fn statistics(
        &self,
        region: &Ccd<Window>,
        sigma: f32,
        compute_median: bool,
        careful: bool,
    ) -> Stats {
        let mut buf = self.region_buffer(region);
        let clipped = windata::sigma_reject(&buf, sigma, careful);
        Stats {
            npoints: buf.len(),
            min: min_of(buf.iter().copied()),
            max: max_of(buf.iter().copied()),
            raw_mean: clipped.raw_mean,
            raw_rms: clipped.raw_rms,
            clipped_mean: clipped.mean,
            clipped_rms: clipped.rms,
            nrejected: clipped.nrejected,
            median: compute_median.then(|| windata::median(&mut buf)),
        }
    }

    // ---- Reformatting ----

    /// Re-bin into the format `target`, summing contributing pixels.
    ///
    /// Each target window must lie inside one source window, have binning
    /// factors that are multiples of the source's, start on a source pixel
    /// boundary and share the chip dimensions. The image is left untouched on
    /// failure.
    pub fn crop(&mut self, target: &Ccd<Window>) -> Result<()> {
        let mut out = Vec::with_capacity(target.len());
        for (it, sref) in target.iter().enumerate() {
            let (ib, bdata) = self
                .iter()
                .enumerate()
                .find(|(_, b)| encloses(b.window(), sref))
                .ok_or_else(|| {
                    UcamError::FormatMismatch(format!(
                        "target window {}: no enclosing window",
                        it + 1
                    ))
                })?;
            let b = bdata.window();
            let ctx = format!("target window {}, source window {}", it + 1, ib + 1);

            if sref.xbin() % b.xbin() != 0 || sref.ybin() % b.ybin() != 0 {
                return Err(UcamError::FormatMismatch(format!(
                    "{ctx}: binning {}x{} is not a multiple of {}x{}",
                    sref.xbin(),
                    sref.ybin(),
                    b.xbin(),
                    b.ybin()
                )));
            }
            if (sref.llx() - b.llx()) % b.xbin() != 0 || (sref.lly() - b.lly()) % b.ybin() != 0 {
                return Err(UcamError::FormatMismatch(format!("{ctx}: windows out of step")));
            }
            if sref.nxtot() != b.nxtot() || sref.nytot() != b.nytot() {
                return Err(UcamError::FormatMismatch(format!(
                    "{ctx}: chip dimensions differ"
                )));
            }

            let fx = (sref.xbin() / b.xbin()) as usize;
            let fy = (sref.ybin() / b.ybin()) as usize;
            let ix0 = ((sref.llx() - b.llx()) / b.xbin()) as usize;
            let iy0 = ((sref.lly() - b.lly()) / b.ybin()) as usize;
            let src = bdata.data();
            let (ny, nx) = sref.shape();
            let data = Array2::from_shape_fn((ny, nx), |(iy, ix)| {
                let y = iy0 + fy * iy;
                let x = ix0 + fx * ix;
                src.slice(s![y..y + fy, x..x + fx])
                    .iter()
                    .map(|&v| f64::from(v))
                    .sum::<f64>() as f32
            });
            out.push(Windata::from_array(*sref, data)?);
        }
        self.windows = Ccd::from_vec_unchecked(out);
        Ok(())
    }

    /// Crop to the format of another image.
    pub fn crop_to(&mut self, other: &Image) -> Result<()> {
        self.crop(&other.windows())
    }

    /// Keep only what is visible through `selectors`.
    ///
    /// Every data/selector pair that shares at least one whole data pixel
    /// yields one output window; pairs that do not overlap are skipped.
    pub fn window(&mut self, selectors: &Ccd<Window>) -> Result<()> {
        let mut out = Ccd::new();
        for dwin in self.iter() {
            for swin in selectors {
                if !dwin.window().overlap(swin) {
                    continue;
                }
                match dwin.window_to(swin) {
                    Ok(part) => out.push(part)?,
                    Err(UcamError::NoOverlap) => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        self.windows = out;
        Ok(())
    }

    pub fn step(&mut self, threshold: f32) {
        for w in self.windata_mut() {
            w.step(threshold);
        }
    }

    // ---- Image arithmetic ----

    fn zip_with(
        &mut self,
        other: &Image,
        f: impl Fn(&mut Windata, &Windata) -> Result<()>,
    ) -> Result<()> {
        if !self.same_format(other) {
            return Err(UcamError::FormatMismatch(format!(
                "images differ in format ({} vs {} windows)",
                self.len(),
                other.len()
            )));
        }
        for (a, b) in self.windows.objects_mut().iter_mut().zip(other.iter()) {
            f(a, b)?;
        }
        Ok(())
    }

    pub fn try_add_assign(&mut self, other: &Image) -> Result<()> {
        self.zip_with(other, Windata::try_add_assign)
    }

    pub fn try_sub_assign(&mut self, other: &Image) -> Result<()> {
        self.zip_with(other, Windata::try_sub_assign)
    }

    pub fn try_mul_assign(&mut self, other: &Image) -> Result<()> {
        self.zip_with(other, Windata::try_mul_assign)
    }

    pub fn try_div_assign(&mut self, other: &Image) -> Result<()> {
        self.zip_with(other, Windata::try_div_assign)
    }

    // ---- Binary I/O ----

    pub fn write<W: Write>(&self, w: &mut W, otype: OutType) -> Result<()> {
        codec::write_i32(w, self.len() as i32)?;
        for wd in self.iter() {
            wd.write(w, otype)?;
        }
        Ok(())
    }

    /// Read an image, rejecting any window that overlaps one read earlier.
    pub fn read<R: Read>(r: &mut R, swap: bool) -> Result<Self> {
        let count = read_count(r, swap)?;
        Self::read_windows(r, count, |r| Windata::read(r, swap))
    }

    /// Read an image in the pre-2004 layout, which counts windows with an
    /// unsigned integer.
    pub fn read_old<R: Read>(r: &mut R, swap: bool) -> Result<Self> {
        let count = codec::read_u32(r, swap)? as usize;
        Self::read_windows(r, count, |r| Windata::read_old(r, swap))
    }

    pub fn skip<R: Read>(r: &mut R, swap: bool) -> Result<()> {
        let count = read_count(r, swap)?;
        for _ in 0..count {
            Windata::skip(r, swap)?;
        }
        Ok(())
    }

    pub fn skip_old<R: Read>(r: &mut R, swap: bool) -> Result<()> {
        let count = codec::read_u32(r, swap)?;
        for _ in 0..count {
            Windata::skip_old(r, swap)?;
        }
        Ok(())
    }

    fn read_windows<R: Read>(
        r: &mut R,
        count: usize,
        mut read_one: impl FnMut(&mut R) -> Result<Windata>,
    ) -> Result<Self> {
        debug!(count, "reading image");
        let mut windows = Ccd::new();
        for _ in 0..count {
            windows.push(read_one(r)?)?;
        }
        Ok(Self { windows })
    }
}

/// Window count of the current layout; negative counts are corrupt.
fn read_count<R: Read>(r: &mut R, swap: bool) -> Result<usize> {
    let count = codec::read_i32(r, swap)?;
    usize::try_from(count)
        .map_err(|_| UcamError::FormatMismatch(format!("negative window count {count}")))
}

fn encloses(big: &Window, small: &Window) -> bool {
    big.llx() <= small.llx()
        && big.lly() <= small.lly()
        && big.urx() >= small.urx()
        && big.ury() >= small.ury()
}

fn min_of(values: impl Iterator<Item = f32>) -> f32 {
    values.reduce(f32::min).unwrap_or(0.0)
}

fn max_of(values: impl Iterator<Item = f32>) -> f32 {
    values.reduce(f32::max).unwrap_or(0.0)
}

impl From<Ccd<Windata>> for Image {
    fn from(windows: Ccd<Windata>) -> Self {
        Self { windows }
    }
}

impl Index<usize> for Image {
    type Output = Windata;

    fn index(&self, index: usize) -> &Windata {
        &self.windows[index]
    }
}

impl<'a> IntoIterator for &'a Image {
    type Item = &'a Windata;
    type IntoIter = std::slice::Iter<'a, Windata>;

    fn into_iter(self) -> Self::IntoIter {
        self.windows.iter()
    }
}

macro_rules! scalar_op {
    ($trait:ident, $method:ident) => {
        impl $trait<f32> for Image {
            fn $method(&mut self, rhs: f32) {
                for w in self.windata_mut() {
                    w.$method(rhs);
                }
            }
        }
    };
}

scalar_op!(AddAssign, add_assign);
scalar_op!(SubAssign, sub_assign);
scalar_op!(MulAssign, mul_assign);
scalar_op!(DivAssign, div_assign);
