//! Global pointer and keyboard primitives via SendInput.
//!
//! Clicks are deliberately split into press and release so the actuator can
//! honor a configured pause between the two; some hover-sensitive buttons
//! drop an atomic click.

use std::thread;
use std::time::Duration;

use windows::Win32::Foundation::POINT;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT,
    KEYEVENTF_KEYUP, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEINPUT, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{GetCursorPos, SetCursorPos};

use crate::error::{AutomationError, Result};

/// Current pointer position in screen coordinates.
pub fn pointer_position() -> Option<(i32, i32)> {
    unsafe {
        let mut point = POINT::default();
        if GetCursorPos(&mut point).is_ok() {
            Some((point.x, point.y))
        } else {
            None
        }
    }
}

/// Move the pointer to (x, y), interpolating over `duration_ms` so that
/// hover-dependent UI states get a chance to trigger. Zero duration jumps.
pub fn move_pointer(x: i32, y: i32, duration_ms: u64) -> Result<()> {
    const STEP_MS: u64 = 10;

    if duration_ms >= STEP_MS {
        if let Some((sx, sy)) = pointer_position() {
            let steps = (duration_ms / STEP_MS).max(1) as i32;
            for i in 1..steps {
                let ix = sx + (x - sx) * i / steps;
                let iy = sy + (y - sy) * i / steps;
                unsafe {
                    let _ = SetCursorPos(ix, iy);
                }
                thread::sleep(Duration::from_millis(STEP_MS));
            }
        }
    }
    unsafe {
        SetCursorPos(x, y)
            .map_err(|e| AutomationError::Actuation(format!("SetCursorPos failed: {}", e)))
    }
}

fn mouse_event(flags: windows::Win32::UI::Input::KeyboardAndMouse::MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn key_event(vk: VIRTUAL_KEY, up: bool) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: 0,
                dwFlags: if up { KEYEVENTF_KEYUP } else { Default::default() },
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send(inputs: &[INPUT], what: &str) -> Result<()> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(AutomationError::Actuation(format!(
            "SendInput injected {}/{} events for {}",
            sent,
            inputs.len(),
            what
        )));
    }
    Ok(())
}

/// Left button down, without the matching release.
pub fn press_left() -> Result<()> {
    send(&[mouse_event(MOUSEEVENTF_LEFTDOWN)], "left press")
}

/// Left button up.
pub fn release_left() -> Result<()> {
    send(&[mouse_event(MOUSEEVENTF_LEFTUP)], "left release")
}

/// Hold `modifier`, tap `key`, release `modifier`. Used for Ctrl+W.
pub fn send_key_chord(modifier: VIRTUAL_KEY, key: VIRTUAL_KEY) -> Result<()> {
    send(&[key_event(modifier, false)], "chord modifier down")?;
    thread::sleep(Duration::from_millis(30));
    send(
        &[key_event(key, false), key_event(key, true)],
        "chord key tap",
    )?;
    thread::sleep(Duration::from_millis(30));
    send(&[key_event(modifier, true)], "chord modifier up")
}

/// Check if ESC is currently down (works even without focus).
pub fn is_escape_key_down() -> bool {
    unsafe {
        let key_state = GetAsyncKeyState(0x1B); // VK_ESCAPE
        (key_state as u16) & 0x8000 != 0
    }
}

/// pyautogui-style failsafe: pointer parked in the top-left corner means the
/// operator wants everything to stop, now.
pub fn pointer_in_failsafe_corner() -> bool {
    match pointer_position() {
        Some((x, y)) => x <= 2 && y <= 2,
        None => false,
    }
}
