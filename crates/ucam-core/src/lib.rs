pub mod error;
pub mod consts;
pub mod window;
pub mod ccd;
pub mod aperture;
pub mod windata;
pub mod image;
pub mod mccd;
pub mod io;
pub mod timing;
