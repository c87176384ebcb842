pub mod geometry;
#[cfg(windows)]
pub mod input;
pub mod screen_capture;
pub mod window;
