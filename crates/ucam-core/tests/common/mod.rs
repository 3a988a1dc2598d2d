use ndarray::Array2;

use ucam_core::ccd::Ccd;
use ucam_core::image::Image;
use ucam_core::windata::Windata;
use ucam_core::window::Window;

pub const NXTOT: i32 = 1024;
pub const NYTOT: i32 = 1024;

/// Window on a 1024x1024 chip.
pub fn window(llx: i32, lly: i32, nx: i32, ny: i32, xbin: i32, ybin: i32) -> Window {
    Window::new(llx, lly, nx, ny, xbin, ybin, NXTOT, NYTOT).unwrap()
}

/// Window whose pixel at row `iy`, column `ix` holds `iy * nx + ix`.
pub fn ramp(win: Window) -> Windata {
    let (ny, nx) = win.shape();
    let data = Array2::from_shape_fn((ny, nx), |(iy, ix)| (iy * nx + ix) as f32);
    Windata::from_array(win, data).unwrap()
}

/// Window filled with one value.
pub fn constant(win: Window, value: f32) -> Windata {
    let mut wd = Windata::new(win);
    wd.fill(value);
    wd
}

pub fn ccd_of(windows: &[Window]) -> Ccd<Window> {
    Ccd::from_objects(windows.iter().copied()).unwrap()
}

/// Two-window image with ramp data, the usual left/right pair.
pub fn pair_image() -> Image {
    let mut image = Image::new();
    image.push(ramp(window(1, 1, 8, 6, 1, 1))).unwrap();
    image.push(ramp(window(101, 11, 4, 4, 2, 2))).unwrap();
    image
}

// ---- Timing headers ----

fn put_u32(buf: &mut [u8], off: usize, v: u32, swap: bool) {
    let v = if swap { v.swap_bytes() } else { v };
    buf[off..off + 4].copy_from_slice(&v.to_ne_bytes());
}

fn put_u16(buf: &mut [u8], off: usize, v: u16, swap: bool) {
    let v = if swap { v.swap_bytes() } else { v };
    buf[off..off + 2].copy_from_slice(&v.to_ne_bytes());
}

/// Post-2010 header: Unix seconds, 100 ns ticks and a GPS status word.
pub fn v2_header(
    frame: u32,
    unix_secs: u32,
    ticks: u32,
    expose_units: u32,
    status: u16,
    swap: bool,
) -> Vec<u8> {
    let mut buf = vec![0u8; 26];
    put_u32(&mut buf, 4, frame, swap);
    put_u32(&mut buf, 8, expose_units, swap);
    put_u32(&mut buf, 12, unix_secs, swap);
    put_u32(&mut buf, 16, ticks, swap);
    put_u16(&mut buf, 24, status, swap);
    buf
}

/// Pre-2010 header: seconds into the GPS week, a date and satellites.
#[allow(clippy::too_many_arguments)]
pub fn v1_header(
    frame: u32,
    week_secs: u32,
    nanosecs: u32,
    day: u8,
    month: u8,
    year: u16,
    nsat: i16,
    swap: bool,
) -> Vec<u8> {
    let mut buf = vec![0u8; 23];
    put_u32(&mut buf, 4, frame, swap);
    put_u32(&mut buf, 9, week_secs, swap);
    put_u32(&mut buf, 13, nanosecs, swap);
    buf[17] = day;
    buf[18] = month;
    put_u16(&mut buf, 19, year, swap);
    put_u16(&mut buf, 21, nsat as u16, swap);
    buf
}
