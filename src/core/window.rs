use crate::core::geometry::Rect;
use crate::error::Result;

/// Opaque top-level window handle (HWND on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle(pub isize);

/// Snapshot of one visible top-level window.
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub rect: Rect,
}

/// Capability interface over the host window manager. The engine never calls
/// platform APIs directly; tests substitute a fake.
pub trait WindowSystem {
    /// Enumerate all currently visible top-level windows with a non-empty
    /// title, in OS enumeration order.
    fn list_windows(&mut self) -> Vec<WindowInfo>;

    fn foreground_window(&mut self) -> Option<WindowHandle>;

    /// Restore (if minimized) and bring a window to the foreground.
    fn focus_window(&mut self, handle: WindowHandle) -> Result<()>;
}

/// Case-insensitive title-substring search over visible windows.
///
/// Returns matches in enumeration order; absence is a normal outcome, never an
/// error. Callers that take the first match rely on a heuristic, not on
/// uniqueness.
pub fn find_windows_by_title<W: WindowSystem + ?Sized>(
    windows: &mut W,
    title_substring: &str,
) -> Vec<WindowInfo> {
    let needle = title_substring.to_lowercase();
    windows
        .list_windows()
        .into_iter()
        .filter(|w| w.title.to_lowercase().contains(&needle))
        .collect()
}

/// First visible window whose title contains any of the given keywords.
pub fn find_window_by_any_title<W: WindowSystem + ?Sized>(
    windows: &mut W,
    keywords: &[String],
) -> Option<WindowInfo> {
    windows.list_windows().into_iter().find(|w| {
        let title = w.title.to_lowercase();
        keywords.iter().any(|k| title.contains(&k.to_lowercase()))
    })
}

#[cfg(windows)]
pub use win32::Win32WindowSystem;

#[cfg(windows)]
mod win32 {
    use super::{WindowHandle, WindowInfo, WindowSystem};
    use crate::core::geometry::Rect;
    use crate::error::{AutomationError, Result};
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetForegroundWindow, GetWindowRect, GetWindowTextW, IsWindow,
        IsWindowVisible, SetForegroundWindow, ShowWindow, SW_RESTORE,
    };

    /// The one shipped `WindowSystem` implementation, backed by user32.
    #[derive(Debug, Default)]
    pub struct Win32WindowSystem;

    extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let out = unsafe { &mut *(lparam.0 as *mut Vec<WindowInfo>) };
        unsafe {
            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }
            let mut buf = [0u16; 512];
            let len = GetWindowTextW(hwnd, &mut buf);
            if len <= 0 {
                return TRUE;
            }
            let title = String::from_utf16_lossy(&buf[..len as usize]);

            let mut rect = RECT::default();
            if GetWindowRect(hwnd, &mut rect).is_ok() {
                out.push(WindowInfo {
                    handle: WindowHandle(hwnd.0),
                    title,
                    rect: Rect::new(rect.left, rect.top, rect.right, rect.bottom),
                });
            }
        }
        TRUE
    }

    impl WindowSystem for Win32WindowSystem {
        fn list_windows(&mut self) -> Vec<WindowInfo> {
            let mut out: Vec<WindowInfo> = Vec::new();
            let lparam = LPARAM(&mut out as *mut Vec<WindowInfo> as isize);
            // EnumWindows only fails if the callback returns FALSE; ours never does.
            unsafe {
                let _ = EnumWindows(Some(enum_proc), lparam);
            }
            out
        }

        fn foreground_window(&mut self) -> Option<WindowHandle> {
            let hwnd = unsafe { GetForegroundWindow() };
            if hwnd.0 != 0 {
                Some(WindowHandle(hwnd.0))
            } else {
                None
            }
        }

        fn focus_window(&mut self, handle: WindowHandle) -> Result<()> {
            let hwnd = HWND(handle.0);
            unsafe {
                if !IsWindow(hwnd).as_bool() {
                    return Err(AutomationError::Window(format!(
                        "window {:#x} no longer exists",
                        handle.0
                    )));
                }
                let _ = ShowWindow(hwnd, SW_RESTORE);
                if !SetForegroundWindow(hwnd).as_bool() {
                    return Err(AutomationError::Window(format!(
                        "SetForegroundWindow refused for {:#x}",
                        handle.0
                    )));
                }
            }
            Ok(())
        }
    }
}
