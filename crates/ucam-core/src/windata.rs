use std::fmt;
use std::io::{Read, Write};
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use ndarray::{s, Array2, ArrayView1, ArrayView2, ArrayViewMut2, Zip};
use tracing::debug;

use crate::ccd::CcdObject;
use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{Result, UcamError};
use crate::io::codec;
use crate::window::Window;

/// On-disk pixel encoding of one window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutType {
    /// 32-bit float, lossless.
    #[default]
    Normal,
    /// 16-bit unsigned, rounded and clamped to `0..=65535`.
    Raw,
}

impl OutType {
    pub fn code(self) -> i32 {
        match self {
            OutType::Normal => 0,
            OutType::Raw => 1,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(OutType::Normal),
            1 => Ok(OutType::Raw),
            other => Err(UcamError::UnknownOutType(other)),
        }
    }

    /// Bytes per stored pixel.
    pub fn pixel_size(self) -> u64 {
        match self {
            OutType::Normal => 4,
            OutType::Raw => 2,
        }
    }
}

/// Amount of detail in the ASCII rendering of a [`Windata`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrintLevel {
    /// Window format only.
    #[default]
    Format,
    /// Format plus range, mean, RMS and 10-90 centiles.
    Summary,
    /// Summary plus every pixel, row by row from the bottom.
    Full,
}

/// A window together with its pixel values.
///
/// Pixels are stored as `data[[iy, ix]]` with row 0 at the bottom of the
/// window, matching the computer coordinates of [`Window`].
#[derive(Clone, Debug, PartialEq)]
pub struct Windata {
    window: Window,
    data: Array2<f32>,
}

impl Windata {
    /// Zero-filled data matching `window`.
    pub fn new(window: Window) -> Self {
        Self {
            data: Array2::zeros(window.shape()),
            window,
        }
    }

    pub fn from_array(window: Window, data: Array2<f32>) -> Result<Self> {
        if data.dim() != window.shape() {
            return Err(UcamError::FormatMismatch(format!(
                "array shape {:?} does not match window {}x{}",
                data.dim(),
                window.nx(),
                window.ny()
            )));
        }
        Ok(Self { window, data })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn data_mut(&mut self) -> ArrayViewMut2<'_, f32> {
        self.data.view_mut()
    }

    pub fn into_array(self) -> Array2<f32> {
        self.data
    }

    /// Change the format; pixel values are reset to zero.
    pub fn set_format(&mut self, window: Window) {
        self.data = Array2::zeros(window.shape());
        self.window = window;
    }

    /// Change the binned dimensions, keeping position and binning.
    pub fn resize(&mut self, ny: i32, nx: i32) -> Result<()> {
        let w = &self.window;
        let window = Window::new(w.llx(), w.lly(), nx, ny, w.xbin(), w.ybin(), w.nxtot(), w.nytot())?;
        self.set_format(window);
        Ok(())
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Pixel values in row-major order.
    pub fn buffer(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    pub fn row(&self, iy: usize) -> ArrayView1<'_, f32> {
        self.data.row(iy)
    }

    // ---- Statistics ----

    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&v| f64::from(v)).sum()
    }

    pub fn mean(&self) -> f32 {
        (self.sum() / self.data.len() as f64) as f32
    }

    /// RMS scatter about the mean.
    pub fn rms(&self) -> f32 {
        mean_rms(self.data.iter().copied(), self.data.len()).1 as f32
    }

    /// Value at fraction `l` (0 to 1) of the sorted pixel values.
    pub fn centile(&self, l: f32) -> f32 {
        select_centile(&mut self.buffer(), l)
    }

    pub fn centiles(&self, l1: f32, l2: f32) -> (f32, f32) {
        let mut buf = self.buffer();
        let c1 = select_centile(&mut buf, l1);
        let c2 = select_centile(&mut buf, l2);
        (c1, c2)
    }

    pub fn median(&self) -> f32 {
        median(&mut self.buffer())
    }

    // ---- Transforms ----

    /// Set each pixel to 1 if above `threshold`, else 0.
    pub fn step(&mut self, threshold: f32) {
        self.map_inplace(move |v| if v > threshold { 1.0 } else { 0.0 });
    }

    fn map_inplace<F>(&mut self, f: F)
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        if self.data.len() >= PARALLEL_PIXEL_THRESHOLD {
            self.data.par_mapv_inplace(f);
        } else {
            self.data.mapv_inplace(f);
        }
    }

    fn zip_with(&mut self, other: &Windata, f: impl Fn(&mut f32, f32)) -> Result<()> {
        if self.window != other.window {
            return Err(UcamError::FormatMismatch(format!(
                "windows differ: {} vs {}",
                self.window, other.window
            )));
        }
        Zip::from(&mut self.data)
            .and(&other.data)
            .for_each(|a, &b| f(a, b));
        Ok(())
    }

    pub fn try_add_assign(&mut self, other: &Windata) -> Result<()> {
        self.zip_with(other, |a, b| *a += b)
    }

    pub fn try_sub_assign(&mut self, other: &Windata) -> Result<()> {
        self.zip_with(other, |a, b| *a -= b)
    }

    pub fn try_mul_assign(&mut self, other: &Windata) -> Result<()> {
        self.zip_with(other, |a, b| *a *= b)
    }

    pub fn try_div_assign(&mut self, other: &Windata) -> Result<()> {
        self.zip_with(other, |a, b| *a /= b)
    }

    /// The part of this window visible through `win`, on this window's pixel
    /// grid.
    ///
    /// Only whole data pixels lying completely inside `win` are kept.
    pub fn window_to(&self, win: &Window) -> Result<Windata> {
        let w = &self.window;
        let ix0 = ceil_div(win.llx() - w.llx(), w.xbin()).max(0);
        let iy0 = ceil_div(win.lly() - w.lly(), w.ybin()).max(0);
        let ix1 = ((win.urx() - w.llx()).div_euclid(w.xbin())).min(w.nx());
        let iy1 = ((win.ury() - w.lly()).div_euclid(w.ybin())).min(w.ny());
        if ix1 <= ix0 || iy1 <= iy0 {
            return Err(UcamError::NoOverlap);
        }
        let window = Window::new(
            w.llx() + w.xbin() * ix0,
            w.lly() + w.ybin() * iy0,
            ix1 - ix0,
            iy1 - iy0,
            w.xbin(),
            w.ybin(),
            w.nxtot(),
            w.nytot(),
        )?;
        let data = self
            .data
            .slice(s![iy0 as usize..iy1 as usize, ix0 as usize..ix1 as usize])
            .to_owned();
        Ok(Windata { window, data })
    }

    pub fn display(&self, level: PrintLevel) -> WindataDisplay<'_> {
        WindataDisplay { windata: self, level }
    }

    // ---- Binary I/O ----

    /// Write the window, the encoding code and the pixels, bottom row first.
    pub fn write<W: Write>(&self, w: &mut W, otype: OutType) -> Result<()> {
        self.window.write(w)?;
        codec::write_i32(w, otype.code())?;
        match otype {
            OutType::Normal => {
                for &v in self.data.iter() {
                    codec::write_f32(w, v)?;
                }
            }
            OutType::Raw => {
                for &v in self.data.iter() {
                    // float-to-int casts saturate
                    codec::write_u16(w, (v + 0.5).max(0.0) as u16)?;
                }
            }
        }
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R, swap: bool) -> Result<Self> {
        let window = Window::read(r, swap)?;
        Self::read_pixels(r, swap, window)
    }

    pub fn read_old<R: Read>(r: &mut R, swap: bool) -> Result<Self> {
        let window = Window::read_old(r, swap)?;
        Self::read_pixels(r, swap, window)
    }

    /// Step over one window without allocating its pixels.
    pub fn skip<R: Read>(r: &mut R, swap: bool) -> Result<()> {
        let window = Window::read(r, swap)?;
        Self::skip_pixels(r, swap, &window)
    }

    pub fn skip_old<R: Read>(r: &mut R, swap: bool) -> Result<()> {
        let window = Window::read_old(r, swap)?;
        Self::skip_pixels(r, swap, &window)
    }

    fn read_pixels<R: Read>(r: &mut R, swap: bool, window: Window) -> Result<Self> {
        let otype = OutType::from_code(codec::read_i32(r, swap)?)?;
        let n = window.ntot();
        let pixels = match otype {
            OutType::Normal => {
                let mut buf = vec![0f32; n];
                codec::read_f32_into(r, swap, &mut buf)?;
                buf
            }
            OutType::Raw => {
                let mut raw = vec![0u16; n];
                codec::read_u16_into(r, swap, &mut raw)?;
                raw.into_iter().map(f32::from).collect()
            }
        };
        let data = Array2::from_shape_vec(window.shape(), pixels)
            .map_err(|e| UcamError::FormatMismatch(e.to_string()))?;
        Ok(Self { window, data })
    }

    fn skip_pixels<R: Read>(r: &mut R, swap: bool, window: &Window) -> Result<()> {
        let otype = OutType::from_code(codec::read_i32(r, swap)?)?;
        debug!(nx = window.nx(), ny = window.ny(), ?otype, "skipping window");
        codec::skip_bytes(r, window.ntot() as u64 * otype.pixel_size())
    }
}

/// Integer division rounding towards positive infinity.
pub(crate) fn ceil_div(a: i32, b: i32) -> i32 {
    let q = a.div_euclid(b);
    if a.rem_euclid(b) > 0 { q + 1 } else { q }
}

impl CcdObject for Windata {
    const NAME: &'static str = "Window";
    const PLURAL: &'static str = "windows";
    const EXTENSION: &'static str = ".ucm";

    fn how_far(&self, x: f32, y: f32) -> f32 {
        self.window.how_far(x, y)
    }

    fn near_enough(&self, x: f32, y: f32) -> bool {
        self.window.near_enough(x, y)
    }

    fn clash(&self, other: &Self) -> bool {
        self.window.overlap(&other.window)
    }
}

impl Default for Windata {
    fn default() -> Self {
        Self::new(Window::default())
    }
}

impl From<Window> for Windata {
    fn from(window: Window) -> Self {
        Windata::new(window)
    }
}

macro_rules! scalar_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<f32> for Windata {
            fn $method(&mut self, rhs: f32) {
                self.map_inplace(move |v| v $op rhs);
            }
        }
    };
}

scalar_op!(AddAssign, add_assign, +);
scalar_op!(SubAssign, sub_assign, -);
scalar_op!(MulAssign, mul_assign, *);
scalar_op!(DivAssign, div_assign, /);

impl fmt::Display for Windata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(PrintLevel::Format))
    }
}

/// [`fmt::Display`] adaptor returned by [`Windata::display`].
pub struct WindataDisplay<'a> {
    windata: &'a Windata,
    level: PrintLevel,
}

impl fmt::Display for WindataDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.windata;
        write!(f, "{}", w.window)?;
        if self.level >= PrintLevel::Summary {
            let (p1, p2) = w.centiles(0.1, 0.9);
            write!(
                f,
                "\nRange: {} to {}; mean = {}; RMS = {}; 10 - 90 centiles = {} to {}",
                w.min(),
                w.max(),
                w.mean(),
                w.rms(),
                p1,
                p2
            )?;
        }
        if self.level == PrintLevel::Full {
            write!(f, "\n   Now the data, row by row (starting from the bottom):")?;
            for row in w.data.rows() {
                write!(f, "\n  ")?;
                for v in row {
                    write!(f, " {v}")?;
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Order statistics and clipping shared with `Image`
// ---------------------------------------------------------------------------

/// Percentile by selection. `buf` is reordered; 0 if empty.
///
/// The rank is `floor(N*l + 0.5)` counted from 1 and clamped to `1..=N`.
pub(crate) fn select_centile(buf: &mut [f32], l: f32) -> f32 {
    let n = buf.len();
    if n == 0 {
        return 0.0;
    }
    let k = (n as f64 * f64::from(l) + 0.5).floor();
    let rank = k.clamp(1.0, n as f64) as usize;
    *buf.select_nth_unstable_by(rank - 1, |a, b| a.total_cmp(b)).1
}

/// Median, averaging the two central values for even counts.
pub(crate) fn median(buf: &mut [f32]) -> f32 {
    let n = buf.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    let upper = *buf.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1;
    if n % 2 == 1 {
        upper
    } else {
        let lower = *buf[..mid]
            .select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b))
            .1;
        (lower + upper) / 2.0
    }
}

/// Mean and RMS (n-1 normalisation) of `n` values.
pub(crate) fn mean_rms(values: impl Iterator<Item = f32> + Clone, n: usize) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.clone().map(f64::from).sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let ss: f64 = values.map(|v| (f64::from(v) - mean).powi(2)).sum();
    (mean, (ss / (n - 1) as f64).sqrt())
}

/// Result of iterative sigma rejection.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Clipped {
    pub raw_mean: f64,
    pub raw_rms: f64,
    pub mean: f64,
    pub rms: f64,
    pub nrejected: usize,
}

/// Reject points more than `sigma` RMS from the mean until none remain.
///
/// With `careful` only the single worst point goes per cycle; otherwise every
/// point outside the current threshold goes at once.
pub(crate) fn sigma_reject(values: &[f32], sigma: f32, careful: bool) -> Clipped {
    let mut keep = vec![true; values.len()];
    let (raw_mean, raw_rms) = mean_rms(values.iter().copied(), values.len());
    let (mut mean, mut rms) = (raw_mean, raw_rms);
    let mut nkept = values.len();

    while rms > 0.0 && nkept > 0 {
        let thresh = f64::from(sigma) * rms;
        let mut nrej = 0;
        if careful {
            let worst = values
                .iter()
                .enumerate()
                .filter(|&(i, _)| keep[i])
                .map(|(i, &v)| (i, (f64::from(v) - mean).abs()))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((i, dev)) = worst {
                if dev > thresh {
                    keep[i] = false;
                    nrej = 1;
                }
            }
        } else {
            for (k, &v) in keep.iter_mut().zip(values.iter()) {
                if *k && (f64::from(v) - mean).abs() > thresh {
                    *k = false;
                    nrej += 1;
                }
            }
        }
        if nrej == 0 {
            break;
        }
        nkept -= nrej;
        (mean, rms) = mean_rms(kept(values, &keep), nkept);
    }

    Clipped {
        raw_mean,
        raw_rms,
        mean,
        rms,
        nrejected: values.len() - nkept,
    }
}

fn kept<'a>(values: &'a [f32], keep: &'a [bool]) -> impl Iterator<Item = f32> + Clone + 'a {
    values
        .iter()
        .zip(keep.iter())
        .filter(|(_, k)| **k)
        .map(|(v, _)| *v)
}
