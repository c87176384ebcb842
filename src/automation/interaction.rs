//! Pointer and keyboard interaction with the configured settle delays.

use std::thread;
use std::time::Duration;

use log::debug;
use windows::Win32::UI::Input::KeyboardAndMouse::{VK_CONTROL, VK_W};

use crate::config::TimingSettings;
use crate::core::input;
use crate::error::Result;

/// Delay for a specified number of milliseconds.
pub fn delay_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}

/// Performs clicks as move -> settle -> press -> micro-pause -> release ->
/// post-click delay. The explicit press/release split (instead of an atomic
/// click) is what makes hover-gated buttons register reliably.
pub struct ClickActuator {
    timing: TimingSettings,
}

impl ClickActuator {
    pub fn new(timing: TimingSettings) -> Self {
        Self { timing }
    }

    pub fn click(&self, x: i32, y: i32) -> Result<()> {
        debug!("clicking at ({}, {})", x, y);
        input::move_pointer(x, y, self.timing.pointer_move_ms)?;
        delay_ms(self.timing.hover_settle_ms);
        input::press_left()?;
        delay_ms(self.timing.press_release_gap_ms);
        input::release_left()?;
        delay_ms(self.timing.post_click_delay_ms);
        Ok(())
    }

    /// Ctrl+W against whichever window currently has focus.
    pub fn send_close_tab_chord(&self) -> Result<()> {
        debug!("sending close-tab chord");
        input::send_key_chord(VK_CONTROL, VK_W)
    }
}
