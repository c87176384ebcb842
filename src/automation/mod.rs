#[cfg(windows)]
pub mod context;
pub mod detection;
pub mod engine;
#[cfg(windows)]
pub mod interaction;
pub mod tab_closer;
