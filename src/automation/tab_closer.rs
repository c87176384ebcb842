//! Closing the browser tab a download click left behind.

use log::{info, warn};

use crate::core::window::{find_window_by_any_title, WindowHandle, WindowSystem};
use crate::error::Result;

/// Bring a browser window to the foreground (found by title heuristic), send
/// the close-tab chord via `send_chord`, then hand focus back to
/// `previous_foreground`.
///
/// Absence of a browser window is a no-op, not an error: the tab may already
/// be gone, or the operator may have closed it themselves.
pub fn close_tab_and_restore<W, F>(
    windows: &mut W,
    browser_titles: &[String],
    previous_foreground: Option<WindowHandle>,
    mut send_chord: F,
) -> Result<()>
where
    W: WindowSystem + ?Sized,
    F: FnMut() -> Result<()>,
{
    let browser = match find_window_by_any_title(windows, browser_titles) {
        Some(w) => w,
        None => {
            warn!("no browser window found to close the tab in");
            return Ok(());
        }
    };

    info!("closing tab in \"{}\"", browser.title);
    windows.focus_window(browser.handle)?;
    send_chord()?;

    if let Some(previous) = previous_foreground {
        if previous != browser.handle {
            if let Err(e) = windows.focus_window(previous) {
                // Losing focus restoration is cosmetic; the cycle continues.
                warn!("could not restore previous foreground window: {}", e);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::window::tests::FakeWindowSystem;

    #[test]
    fn focuses_browser_sends_chord_and_restores() {
        let mut ws = FakeWindowSystem::with_titles(&[
            "Vortex",
            "Nexus Mods - Mozilla Firefox",
        ]);
        let vortex = ws.windows[0].handle;
        let firefox = ws.windows[1].handle;
        ws.foreground = Some(vortex);

        let mut chords = 0;
        close_tab_and_restore(
            &mut ws,
            &["firefox".to_string()],
            Some(vortex),
            || {
                chords += 1;
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(chords, 1);
        assert_eq!(ws.focus_calls, vec![firefox, vortex]);
    }

    #[test]
    fn missing_browser_is_a_quiet_no_op() {
        let mut ws = FakeWindowSystem::with_titles(&["Vortex"]);
        let mut chords = 0;
        close_tab_and_restore(&mut ws, &["firefox".to_string()], None, || {
            chords += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(chords, 0);
        assert!(ws.focus_calls.is_empty());
    }

    #[test]
    fn no_redundant_refocus_when_browser_was_already_foreground() {
        let mut ws = FakeWindowSystem::with_titles(&["Nexus Mods - Google Chrome"]);
        let chrome = ws.windows[0].handle;
        ws.foreground = Some(chrome);

        close_tab_and_restore(&mut ws, &["chrome".to_string()], Some(chrome), || Ok(()))
            .unwrap();
        assert_eq!(ws.focus_calls, vec![chrome]);
    }
}
