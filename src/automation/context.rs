//! Live wiring of the workflow stages against the real desktop.
//!
//! This is the only place where capture, window lookup, detection and
//! actuation meet. Every per-cycle failure is downgraded here to a logged
//! miss so the engine's polling loop can never crash on a bad frame.

use image::GrayImage;
use log::{debug, info, warn};

use crate::automation::detection::{find_button, match_template};
use crate::automation::engine::Workflow;
use crate::automation::interaction::{delay_ms, ClickActuator};
use crate::automation::tab_closer::close_tab_and_restore;
use crate::config::{ButtonProfile, Config, TemplateSettings};
use crate::core::screen_capture::{capture_screen, ScreenFrame};
use crate::core::window::{
    find_window_by_any_title, find_windows_by_title, Win32WindowSystem, WindowInfo,
    WindowSystem,
};

pub struct AutomationContext {
    config: Config,
    windows: Win32WindowSystem,
    actuator: ClickActuator,
    dialog_template: Option<GrayImage>,
    page_template: Option<GrayImage>,
}

impl AutomationContext {
    pub fn new(config: Config) -> Self {
        let dialog_template = load_template(config.detection.dialog_button.template.as_ref());
        let page_template = load_template(config.detection.page_button.template.as_ref());
        let actuator = ClickActuator::new(config.timing.clone());
        Self {
            config,
            windows: Win32WindowSystem,
            actuator,
            dialog_template,
            page_template,
        }
    }

    fn capture(&self, tag: &str) -> Option<ScreenFrame> {
        match capture_screen() {
            Ok(frame) => {
                if self.config.debug.save_captures {
                    frame.save_debug(&self.config.debug.capture_dir, tag);
                }
                Some(frame)
            }
            Err(e) => {
                // Recoverable: treat as "nothing detected" this tick.
                warn!("capture failed, skipping this tick: {}", e);
                None
            }
        }
    }

    /// Template first, color mask second, calibrated percentage last.
    fn locate_in_window(
        &self,
        frame: &ScreenFrame,
        window: &WindowInfo,
        profile: &ButtonProfile,
        template: Option<&GrayImage>,
    ) -> (i32, i32) {
        let host = window.rect.clipped_to(frame.width(), frame.height());
        let search = host.sub_region(
            profile.search_region.left,
            profile.search_region.top,
            profile.search_region.right,
            profile.search_region.bottom,
        );

        if let Some(template_img) = template {
            let confidence = profile
                .template
                .as_ref()
                .and_then(|t| t.confidence)
                .unwrap_or(self.config.detection.confidence_threshold);
            let gray = frame.to_grayscale();
            let cropped = image::imageops::crop_imm(
                &gray,
                search.left.max(0) as u32,
                search.top.max(0) as u32,
                search.width() as u32,
                search.height() as u32,
            )
            .to_image();
            if let Some(hit) = match_template(&cropped, template_img, confidence) {
                info!("template match at {:?} (score {:.2})", hit.center, hit.score);
                return (search.left + hit.center.0, search.top + hit.center.1);
            }
            debug!("template pass missed, trying color mask");
        }

        if let Some(candidate) = find_button(&frame.image, search, profile) {
            info!(
                "color-mask candidate at {:?}, area {}",
                candidate.center, candidate.area
            );
            return candidate.center;
        }

        let fallback = host.point_at(profile.fallback_percent.0, profile.fallback_percent.1);
        warn!("no candidate survived; using calibrated fallback {:?}", fallback);
        fallback
    }

    fn page_window(&mut self) -> Option<WindowInfo> {
        let browser = find_window_by_any_title(&mut self.windows, &self.config.windows.browser_titles)?;
        let keyword = self.config.windows.page_keyword.to_lowercase();
        if browser.title.to_lowercase().contains(&keyword) {
            Some(browser)
        } else {
            debug!(
                "browser \"{}\" is not on the download page yet",
                browser.title
            );
            None
        }
    }

    fn click(&self, target: (i32, i32)) -> bool {
        match self.actuator.click(target.0, target.1) {
            Ok(()) => true,
            Err(e) => {
                warn!("click failed, retrying next tick: {}", e);
                false
            }
        }
    }
}

fn load_template(settings: Option<&TemplateSettings>) -> Option<GrayImage> {
    let settings = settings?;
    match image::open(&settings.path) {
        Ok(img) => {
            info!("loaded template {:?}", settings.path);
            Some(img.to_luma8())
        }
        Err(e) => {
            // The template pass is opportunistic; run without it.
            warn!("could not load template {:?}: {}", settings.path, e);
            None
        }
    }
}

impl Workflow for AutomationContext {
    fn try_dialog_click(&mut self) -> bool {
        let dialog_title = self.config.windows.dialog_title.clone();
        let matches = find_windows_by_title(&mut self.windows, &dialog_title);
        // First match wins; a heuristic, not a uniqueness guarantee.
        let Some(dialog) = matches.into_iter().next() else {
            return false;
        };
        info!("dialog window detected: \"{}\"", dialog.title);

        let Some(frame) = self.capture("dialog") else {
            return false;
        };
        let profile = self.config.detection.dialog_button.clone();
        let target = self.locate_in_window(&frame, &dialog, &profile, self.dialog_template.as_ref());
        self.click(target)
    }

    fn try_page_click(&mut self) -> bool {
        let Some(browser) = self.page_window() else {
            return false;
        };
        info!("download page detected: \"{}\"", browser.title);

        let Some(frame) = self.capture("page") else {
            return false;
        };
        let profile = self.config.detection.page_button.clone();
        let target = self.locate_in_window(&frame, &browser, &profile, self.page_template.as_ref());
        self.click(target)
    }

    fn click_page_fallback(&mut self) -> bool {
        let browser_titles = self.config.windows.browser_titles.clone();
        let Some(browser) = find_window_by_any_title(&mut self.windows, &browser_titles) else {
            warn!("forced fallback requested but no browser window found");
            return false;
        };
        let (fx, fy) = self.config.detection.page_button.fallback_percent;
        let target = browser.rect.point_at(fx, fy);
        info!("forced fallback click at {:?}", target);
        self.click(target)
    }

    fn close_download_tab(&mut self) {
        // Nexus shows a countdown before the download starts; closing the tab
        // early cancels it.
        delay_ms(self.config.timing.tab_close_delay_ms);

        let previous = self.windows.foreground_window();
        let browser_titles = self.config.windows.browser_titles.clone();
        let focus_settle_ms = self.config.timing.focus_settle_ms;
        let actuator = &self.actuator;

        let result = close_tab_and_restore(&mut self.windows, &browser_titles, previous, || {
            delay_ms(focus_settle_ms);
            actuator.send_close_tab_chord()
        });
        if let Err(e) = result {
            warn!("tab close failed (tab left open): {}", e);
        }
    }
}
