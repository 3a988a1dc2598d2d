#[allow(dead_code)]
mod common;

use approx::assert_relative_eq;

use ucam_core::ccd::CcdObject;
use ucam_core::error::UcamError;
use ucam_core::window::Window;

use common::window;

// ---------------------------------------------------------------------------
// Construction and validation
// ---------------------------------------------------------------------------

#[test]
fn test_window_accepts_full_chip() {
    let w = Window::new(1, 1, 1024, 1024, 1, 1, 1024, 1024).unwrap();
    assert_eq!(w.ntot(), 1024 * 1024);
    assert_eq!(w.shape(), (1024, 1024));
}

#[test]
fn test_window_rejects_overhang() {
    // 2x binning of 513 pixels from column 1 runs to column 1026.
    let err = Window::new(1, 1, 513, 10, 2, 1, 1024, 1024).unwrap_err();
    assert!(matches!(err, UcamError::InvalidWindow { nx: 513, xbin: 2, .. }));
}

#[test]
fn test_window_rejects_out_of_range_fields() {
    assert!(Window::new(0, 1, 10, 10, 1, 1, 100, 100).is_err());
    assert!(Window::new(1, 1, 10, 10, 101, 1, 10_000, 100).is_err());
    assert!(Window::new(1, 1, 10, 10, 1, 1, 10_001, 100).is_err());
    assert!(Window::new(1, 1, 0, 10, 1, 1, 100, 100).is_err());
}

#[test]
fn test_window_default_is_single_pixel() {
    let w = Window::default();
    assert_eq!((w.llx(), w.lly(), w.nx(), w.ny()), (1, 1, 1, 1));
    assert!(w.is_oned());
}

#[test]
fn test_setter_leaves_window_untouched_on_failure() {
    let mut w = window(1000, 1, 10, 10, 1, 1);
    assert!(w.set_xbin(4).is_err());
    assert_eq!(w.xbin(), 1);
    w.set_xbin(2).unwrap();
    assert_eq!(w.urx(), 1020);
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[test]
fn test_coordinate_transforms_invert() {
    let w = window(11, 21, 10, 10, 2, 3);
    // Centre of binned pixel 0 spans unbinned 11..12, centre at 11.5.
    assert_relative_eq!(w.xccd(0.0), 11.5);
    assert_relative_eq!(w.yccd(0.0), 22.0);
    for x in [0.0f32, 3.5, 9.0] {
        assert_relative_eq!(w.xcomp(w.xccd(x)), x, epsilon = 1e-5);
        assert_relative_eq!(w.ycomp(w.yccd(x)), x, epsilon = 1e-5);
    }
}

#[test]
fn test_enclose_uses_pixel_edges() {
    let w = window(11, 21, 10, 10, 1, 1);
    assert!(w.enclose(10.6, 20.6));
    assert!(!w.enclose(10.5, 25.0));
    assert!(w.enclose(20.4, 30.4));
    assert!(!w.enclose(20.5, 25.0));
}

#[test]
fn test_overlap_is_symmetric_and_edge_exclusive() {
    let a = window(1, 1, 10, 10, 1, 1);
    let b = window(11, 1, 10, 10, 1, 1);
    let c = window(10, 10, 5, 5, 1, 1);
    assert!(!a.overlap(&b));
    assert!(!b.overlap(&a));
    assert!(a.overlap(&c));
    assert!(c.overlap(&a));
    assert!(a.clash(&c));
}

#[test]
fn test_how_far_is_zero_inside() {
    let w = window(11, 11, 10, 10, 1, 1);
    assert_eq!(w.how_far(15.0, 15.0), 0.0);
    // 3 pixels left of the left edge at 10.5 and 4 below the bottom.
    assert_relative_eq!(w.how_far(7.5, 6.5), 25.0);
    assert!(w.near_enough(5.0, 15.0));
    assert!(!w.near_enough(-1.0, 15.0));
}

// ---------------------------------------------------------------------------
// Text form
// ---------------------------------------------------------------------------

#[test]
fn test_display_and_parse_agree() {
    let w = window(3, 5, 7, 9, 2, 1);
    let text = w.to_string();
    assert_eq!(
        text,
        "llx,lly = 3, 5; nx,ny = 7, 9; xbin,ybin = 2, 1; nxtot,nytot = 1024, 1024"
    );
    let parsed: Window = text.parse().unwrap();
    assert_eq!(parsed, w);
}

#[test]
fn test_parse_rejects_invalid_geometry() {
    let err = "llx,lly = 1020, 1; nx,ny = 10, 1; xbin,ybin = 1, 1; nxtot,nytot = 1024, 1024"
        .parse::<Window>()
        .unwrap_err();
    assert!(matches!(err, UcamError::InvalidWindow { .. }));
    assert!("llx,lly = 1, x; nx,ny".parse::<Window>().is_err());
}
