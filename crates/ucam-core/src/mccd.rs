//! Multi-CCD aggregates: one collection per physical sensor.

use std::fmt;
use std::io::{Read, Write};
use std::ops::{AddAssign, DivAssign, Index, IndexMut, MulAssign, SubAssign};
use std::path::Path;
use std::str::FromStr;

use rayon::prelude::*;
use tracing::debug;

use crate::aperture::Aperture;
use crate::ccd::{Ccd, CcdObject};
use crate::error::{Result, UcamError};
use crate::image::Image;
use crate::io::ascii::{with_extension, AsciiCursor};
use crate::io::codec;
use crate::windata::OutType;
use crate::window::Window;

/// One [`Ccd`] per sensor, in sensor order.
#[derive(Clone, Debug, PartialEq)]
pub struct Mccd<T> {
    ccds: Vec<Ccd<T>>,
}

/// Window layout of every CCD of a camera.
pub type Mwindow = Mccd<Window>;

/// Apertures of every CCD of a camera.
pub type Maperture = Mccd<Aperture>;

impl<T> Default for Mccd<T> {
    fn default() -> Self {
        Self { ccds: Vec::new() }
    }
}

impl<T: CcdObject> Mccd<T> {
    /// `nccd` empty collections.
    pub fn new(nccd: usize) -> Self {
        Self {
            ccds: (0..nccd).map(|_| Ccd::new()).collect(),
        }
    }

    pub fn from_ccds(ccds: Vec<Ccd<T>>) -> Self {
        Self { ccds }
    }

    pub fn len(&self) -> usize {
        self.ccds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ccds.is_empty()
    }

    pub fn get(&self, nccd: usize) -> Option<&Ccd<T>> {
        self.ccds.get(nccd)
    }

    pub fn get_mut(&mut self, nccd: usize) -> Option<&mut Ccd<T>> {
        self.ccds.get_mut(nccd)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Ccd<T>> {
        self.ccds.iter()
    }

    /// True if every CCD is free of clashes.
    pub fn is_valid(&self) -> bool {
        self.ccds.iter().all(Ccd::is_valid)
    }
}

impl<T: CcdObject + FromStr<Err = UcamError>> Mccd<T> {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(with_extension(path, T::EXTENSION))?;
        text.parse()
    }
}

impl<T: CcdObject + fmt::Display> Mccd<T> {
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(with_extension(path, T::EXTENSION), self.to_string())?;
        Ok(())
    }
}

impl<T: CcdObject + FromStr<Err = UcamError>> FromStr for Mccd<T> {
    type Err = UcamError;

    fn from_str(s: &str) -> Result<Self> {
        let mut cursor = AsciiCursor::new(s);
        let nccd = cursor.read_count("CCDs")?;
        let mut ccds = Vec::new();
        for _ in 0..nccd {
            cursor.read_label()?;
            ccds.push(Ccd::read_ascii(&mut cursor)?);
        }
        Ok(Self { ccds })
    }
}

impl<T: CcdObject + fmt::Display> fmt::Display for Mccd<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of CCDs = {}", self.ccds.len())?;
        for (i, ccd) in self.ccds.iter().enumerate() {
            write!(f, "\nCCD {}: \n{}", i + 1, ccd)?;
        }
        Ok(())
    }
}

impl<T> Index<usize> for Mccd<T> {
    type Output = Ccd<T>;

    fn index(&self, nccd: usize) -> &Ccd<T> {
        &self.ccds[nccd]
    }
}

impl<T> IndexMut<usize> for Mccd<T> {
    fn index_mut(&mut self, nccd: usize) -> &mut Ccd<T> {
        &mut self.ccds[nccd]
    }
}

// ---------------------------------------------------------------------------
// Mimage
// ---------------------------------------------------------------------------

/// Pixel data of every CCD of one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mimage {
    images: Vec<Image>,
}

impl Mimage {
    /// `nccd` images with no windows.
    pub fn new(nccd: usize) -> Self {
        Self {
            images: vec![Image::new(); nccd],
        }
    }

    pub fn from_images(images: Vec<Image>) -> Self {
        Self { images }
    }

    /// Zero-filled frame in the given format.
    pub fn from_mwindow(format: &Mwindow) -> Self {
        Self {
            images: format.iter().map(Image::from_windows).collect(),
        }
    }

    /// The window layout without the data.
    pub fn mwindow(&self) -> Mwindow {
        Mccd::from_ccds(self.images.iter().map(Image::windows).collect())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, nccd: usize) -> Option<&Image> {
        self.images.get(nccd)
    }

    pub fn get_mut(&mut self, nccd: usize) -> Option<&mut Image> {
        self.images.get_mut(nccd)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.images.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Image> {
        self.images.iter_mut()
    }

    pub fn same_format(&self, other: &Mimage) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.same_format(b))
    }

    /// Threshold every CCD, one per rayon task.
    pub fn step(&mut self, threshold: f32) {
        self.images
            .par_iter_mut()
            .for_each(|image| image.step(threshold));
    }

    fn zip_with(
        &mut self,
        other: &Mimage,
        f: impl Fn(&mut Image, &Image) -> Result<()> + Sync,
    ) -> Result<()> {
        if self.len() != other.len() {
            return Err(UcamError::FormatMismatch(format!(
                "frames have {} and {} CCDs",
                self.len(),
                other.len()
            )));
        }
        self.images
            .par_iter_mut()
            .zip(other.images.par_iter())
            .try_for_each(|(a, b)| f(a, b))
    }

    pub fn try_add_assign(&mut self, other: &Mimage) -> Result<()> {
        self.zip_with(other, Image::try_add_assign)
    }

    pub fn try_sub_assign(&mut self, other: &Mimage) -> Result<()> {
        self.zip_with(other, Image::try_sub_assign)
    }

    pub fn try_mul_assign(&mut self, other: &Mimage) -> Result<()> {
        self.zip_with(other, Image::try_mul_assign)
    }

    pub fn try_div_assign(&mut self, other: &Mimage) -> Result<()> {
        self.zip_with(other, Image::try_div_assign)
    }

    // ---- Binary I/O ----

    /// Write the CCD count then every image with the given pixel encoding.
    pub fn write<W: Write>(&self, w: &mut W, otype: OutType) -> Result<()> {
        codec::write_i32(w, self.images.len() as i32)?;
        for image in &self.images {
            image.write(w, otype)?;
        }
        Ok(())
    }

    /// Read a frame. With `nccd == 0` every CCD is read; otherwise only CCD
    /// `nccd` (counting from 1) is read and the others are skipped, leaving
    /// their slots empty.
    pub fn read<R: Read>(r: &mut R, swap: bool, nccd: usize) -> Result<Self> {
        Self::read_with(r, swap, nccd, Image::read, Image::skip)
    }

    /// As [`Mimage::read`] for the pre-2004 layout.
    pub fn read_old<R: Read>(r: &mut R, swap: bool, nccd: usize) -> Result<Self> {
        Self::read_with(r, swap, nccd, Image::read_old, Image::skip_old)
    }

    fn read_with<R: Read>(
        r: &mut R,
        swap: bool,
        nccd: usize,
        read: fn(&mut R, bool) -> Result<Image>,
        skip: fn(&mut R, bool) -> Result<()>,
    ) -> Result<Self> {
        let count = codec::read_i32(r, swap)?;
        let count = usize::try_from(count)
            .map_err(|_| UcamError::FormatMismatch(format!("negative CCD count {count}")))?;
        if nccd > count {
            return Err(UcamError::CcdOutOfRange {
                requested: nccd,
                available: count,
            });
        }
        debug!(count, nccd, "reading frame");

        let mut images = Vec::new();
        for ic in 1..=count {
            if nccd == 0 || ic == nccd {
                images.push(read(r, swap)?);
            } else {
                skip(r, swap)?;
                images.push(Image::new());
            }
        }
        Ok(Self { images })
    }
}

impl Index<usize> for Mimage {
    type Output = Image;

    fn index(&self, nccd: usize) -> &Image {
        &self.images[nccd]
    }
}

impl IndexMut<usize> for Mimage {
    fn index_mut(&mut self, nccd: usize) -> &mut Image {
        &mut self.images[nccd]
    }
}

macro_rules! scalar_op {
    ($trait:ident, $method:ident) => {
        impl $trait<f32> for Mimage {
            fn $method(&mut self, rhs: f32) {
                for image in &mut self.images {
                    image.$method(rhs);
                }
            }
        }
    };
}

scalar_op!(AddAssign, add_assign);
scalar_op!(SubAssign, sub_assign);
scalar_op!(MulAssign, mul_assign);
scalar_op!(DivAssign, div_assign);
