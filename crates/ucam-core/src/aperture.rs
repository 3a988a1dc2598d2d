use std::fmt;
use std::str::FromStr;

use crate::ccd::CcdObject;
use crate::consts::APERTURE_SELECT_BORDER;
use crate::error::{Result, UcamError};
use crate::io::ascii::{assigned_values, parse_field};

/// A circular photometric aperture with a surrounding sky annulus.
///
/// The aperture is centred at the reference position plus an offset. Radii are
/// in unbinned pixels and must satisfy `0 < rstar`, `0 < rsky1 < rsky2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aperture {
    xref: f64,
    yref: f64,
    xoff: f64,
    yoff: f64,
    rstar: f32,
    rsky1: f32,
    rsky2: f32,
    /// Marks a reference star.
    pub reference: bool,
    /// Cleared when the aperture should be ignored.
    pub valid: bool,
}

fn bad_radii(rstar: f32, rsky1: f32, rsky2: f32) -> bool {
    rstar <= 0.0 || rsky1 <= 0.0 || rsky1 >= rsky2
}

impl Aperture {
    pub fn new(xref: f64, yref: f64, rstar: f32, rsky1: f32, rsky2: f32) -> Result<Self> {
        if bad_radii(rstar, rsky1, rsky2) {
            return Err(UcamError::InvalidAperture { rstar, rsky1, rsky2 });
        }
        Ok(Self {
            xref,
            yref,
            xoff: 0.0,
            yoff: 0.0,
            rstar,
            rsky1,
            rsky2,
            reference: false,
            valid: true,
        })
    }

    pub fn xref(&self) -> f64 {
        self.xref
    }
    pub fn yref(&self) -> f64 {
        self.yref
    }
    pub fn xoff(&self) -> f64 {
        self.xoff
    }
    pub fn yoff(&self) -> f64 {
        self.yoff
    }
    pub fn rstar(&self) -> f32 {
        self.rstar
    }
    pub fn rsky1(&self) -> f32 {
        self.rsky1
    }
    pub fn rsky2(&self) -> f32 {
        self.rsky2
    }

    /// Centre of the aperture, reference plus offset.
    pub fn xpos(&self) -> f64 {
        self.xref + self.xoff
    }
    pub fn ypos(&self) -> f64 {
        self.yref + self.yoff
    }

    pub fn set_position(&mut self, xref: f64, yref: f64) {
        self.xref = xref;
        self.yref = yref;
    }

    pub fn set_offset(&mut self, xoff: f64, yoff: f64) {
        self.xoff = xoff;
        self.yoff = yoff;
    }

    pub fn set_radii(&mut self, rstar: f32, rsky1: f32, rsky2: f32) -> Result<()> {
        if bad_radii(rstar, rsky1, rsky2) {
            return Err(UcamError::InvalidAperture { rstar, rsky1, rsky2 });
        }
        self.rstar = rstar;
        self.rsky1 = rsky1;
        self.rsky2 = rsky2;
        Ok(())
    }

    fn distance(&self, x: f32, y: f32) -> f32 {
        let dx = f64::from(x) - self.xpos();
        let dy = f64::from(y) - self.ypos();
        dx.hypot(dy) as f32
    }
}

impl CcdObject for Aperture {
    const NAME: &'static str = "Aperture";
    const PLURAL: &'static str = "apertures";
    const EXTENSION: &'static str = ".ape";

    fn how_far(&self, x: f32, y: f32) -> f32 {
        let d = self.distance(x, y);
        if d < self.rstar {
            d - 10_000.0
        } else {
            d - self.rstar
        }
    }

    fn near_enough(&self, x: f32, y: f32) -> bool {
        self.distance(x, y) < 1.2 * self.rsky2 + APERTURE_SELECT_BORDER
    }

    /// Apertures are allowed to overlap.
    fn clash(&self, _other: &Self) -> bool {
        false
    }
}

impl fmt::Display for Aperture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x,y = {}, {}; x_off,y_off = {}, {}; rstar,rsky1,rsky2 = {}, {}, {}; ref = {}; state = {}",
            self.xref,
            self.yref,
            self.xoff,
            self.yoff,
            self.rstar,
            self.rsky1,
            self.rsky2,
            u8::from(self.reference),
            u8::from(self.valid)
        )
    }
}

impl FromStr for Aperture {
    type Err = UcamError;

    fn from_str(s: &str) -> Result<Self> {
        // Mask and extra-star groups may follow; they are not kept.
        let v = assigned_values(s);
        if v.len() < 9 {
            return Err(UcamError::Parse(format!(
                "expected at least 9 aperture values in \"{}\"",
                s.trim()
            )));
        }
        let mut ap = Aperture::new(
            parse_field(v[0])?,
            parse_field(v[1])?,
            parse_field(v[4])?,
            parse_field(v[5])?,
            parse_field(v[6])?,
        )?;
        ap.set_offset(parse_field(v[2])?, parse_field(v[3])?);
        ap.reference = parse_field::<i32>(v[7])? != 0;
        ap.valid = parse_field::<i32>(v[8])? != 0;
        Ok(ap)
    }
}
