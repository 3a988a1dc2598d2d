//! Ordered per-CCD collections whose elements must never clash.

use std::fmt;
use std::ops::Index;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, UcamError};
use crate::io::ascii::{with_extension, AsciiCursor};

/// Capabilities an element needs to live in a [`Ccd`].
pub trait CcdObject {
    /// Label used in ASCII files and error messages, e.g. `Window`.
    const NAME: &'static str;
    /// Plural used in the `Number of ...` header line.
    const PLURAL: &'static str;
    /// Default file extension for collections of this type.
    const EXTENSION: &'static str;

    /// Distance measure from a point, smaller is closer.
    fn how_far(&self, x: f32, y: f32) -> f32;

    /// Whether a point is close enough to pick this object.
    fn near_enough(&self, x: f32, y: f32) -> bool;

    /// Whether two objects conflict and so may not share a collection.
    fn clash(&self, other: &Self) -> bool;
}

/// The objects belonging to one CCD, in insertion order.
///
/// Every mutator checks the clash predicate first and leaves the collection
/// unchanged if the new state would contain a conflicting pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Ccd<T> {
    objects: Vec<T>,
}

impl<T> Default for Ccd<T> {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
        }
    }
}

impl<T: CcdObject> Ccd<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection by pushing each object in turn.
    pub fn from_objects(objects: impl IntoIterator<Item = T>) -> Result<Self> {
        let mut ccd = Self::new();
        for obj in objects {
            ccd.push(obj)?;
        }
        Ok(ccd)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.objects.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.objects.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.objects
    }

    /// Append an object, failing if it clashes with any already present.
    pub fn push(&mut self, obj: T) -> Result<()> {
        if self.objects.iter().any(|o| o.clash(&obj)) {
            return Err(UcamError::Clash {
                kind: T::NAME,
                index: self.objects.len(),
            });
        }
        self.objects.push(obj);
        Ok(())
    }

    /// Replace the object at `index`, checking it against all the others.
    pub fn modify(&mut self, index: usize, obj: T) -> Result<()> {
        self.check_index(index)?;
        let clashes = self
            .objects
            .iter()
            .enumerate()
            .any(|(i, o)| i != index && o.clash(&obj));
        if clashes {
            return Err(UcamError::Clash {
                kind: T::NAME,
                index,
            });
        }
        self.objects[index] = obj;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<T> {
        self.check_index(index)?;
        Ok(self.objects.remove(index))
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// True if no pair of objects clashes.
    pub fn is_valid(&self) -> bool {
        self.objects
            .iter()
            .enumerate()
            .all(|(i, a)| self.objects[i + 1..].iter().all(|b| !a.clash(b)))
    }

    /// Index of the object with the smallest `how_far` from (x,y).
    pub fn closest(&self, x: f32, y: f32) -> Option<usize> {
        self.objects
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.how_far(x, y).total_cmp(&b.how_far(x, y)))
            .map(|(i, _)| i)
    }

    /// The closest object, provided it is near enough to (x,y).
    pub fn selected(&self, x: f32, y: f32) -> Option<usize> {
        self.closest(x, y)
            .filter(|&i| self.objects[i].near_enough(x, y))
    }

    /// Remove and return the selected object, if any.
    pub fn delete_nearest(&mut self, x: f32, y: f32) -> Option<T> {
        self.selected(x, y).map(|i| self.objects.remove(i))
    }

    /// Wrap objects already known not to clash.
    pub(crate) fn from_vec_unchecked(objects: Vec<T>) -> Self {
        Self { objects }
    }

    pub(crate) fn objects_mut(&mut self) -> &mut [T] {
        &mut self.objects
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.objects.len() {
            return Err(UcamError::IndexOutOfRange {
                index,
                len: self.objects.len(),
            });
        }
        Ok(())
    }
}

impl<T: CcdObject + FromStr<Err = UcamError>> Ccd<T> {
    /// Read one `Number of ... = N` block, re-validating each object against
    /// those read before it.
    pub(crate) fn read_ascii(cursor: &mut AsciiCursor<'_>) -> Result<Self> {
        let count = cursor.read_count(T::PLURAL)?;
        let mut ccd = Self::new();
        for _ in 0..count {
            cursor.read_label()?;
            let obj: T = cursor.next_line()?.parse()?;
            ccd.push(obj)?;
        }
        Ok(ccd)
    }

    /// Load from an ASCII file, adding the default extension if missing.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(with_extension(path, T::EXTENSION))?;
        text.parse()
    }
}

impl<T: CcdObject + fmt::Display> Ccd<T> {
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(with_extension(path, T::EXTENSION), self.to_string())?;
        Ok(())
    }
}

impl<T: CcdObject + FromStr<Err = UcamError>> FromStr for Ccd<T> {
    type Err = UcamError;

    fn from_str(s: &str) -> Result<Self> {
        Self::read_ascii(&mut AsciiCursor::new(s))
    }
}

impl<T: CcdObject + fmt::Display> fmt::Display for Ccd<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of {} = {}\n", T::PLURAL, self.objects.len())?;
        for (i, obj) in self.objects.iter().enumerate() {
            writeln!(f, "{} {}: \n{}", T::NAME, i + 1, obj)?;
        }
        Ok(())
    }
}

impl<T> Index<usize> for Ccd<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.objects[index]
    }
}

impl<'a, T> IntoIterator for &'a Ccd<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

impl<T> IntoIterator for Ccd<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}
