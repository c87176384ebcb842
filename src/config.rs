//! Runtime configuration.
//!
//! Every numeric threshold the detector and state machine use lives here so
//! operators can retune for a changed UI theme or resolution without touching
//! detection code. A missing file runs on the defaults below; a file that is
//! present but malformed or out of range refuses to start.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AutomationError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "vortex_autodl.json";

/// Inclusive per-channel HSV band (OpenCV ranges: H 0-179, S/V 0-255).
///
/// Hue does not wrap inside a single range; red-ish bands crossing 179->0 are
/// written as two ranges, and the mask ORs all configured ranges together.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }
}

/// A color band belonging to a visually adjacent but different button, used
/// to throw away look-alike candidates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfusableGuard {
    pub range: ColorRange,
    /// Candidate is rejected when at least this fraction of its bounding box
    /// matches `range`.
    #[serde(default = "default_max_overlap")]
    pub max_overlap: f32,
}

/// Search region as fractions of the host rect (window or screen).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchRegion {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Optional template-match first pass for a button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSettings {
    pub path: PathBuf,
    /// Overrides `DetectionSettings::confidence_threshold` when set.
    pub confidence: Option<f32>,
}

/// Everything the detector needs to know about one target button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonProfile {
    pub search_region: SearchRegion,
    pub color_ranges: Vec<ColorRange>,
    #[serde(default)]
    pub confusable: Option<ConfusableGuard>,
    #[serde(default = "default_min_area")]
    pub min_area: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Pre-calibrated position, as fractions of the host rect, clicked when
    /// no candidate survives the filters.
    pub fallback_percent: (f32, f32),
    #[serde(default)]
    pub template: Option<TemplateSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Minimum normalized cross-correlation score for template matches.
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_dialog_button")]
    pub dialog_button: ButtonProfile,
    #[serde(default = "default_page_button")]
    pub page_button: ButtonProfile,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence(),
            dialog_button: default_dialog_button(),
            page_button: default_page_button(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Poll tick length.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Idle time after a completed cycle before looking for the next dialog.
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
    /// Minimum elapsed time after the dialog click before stage-two detection
    /// is even attempted (the browser needs load time).
    #[serde(default = "default_browser_load_wait")]
    pub browser_load_wait_ms: u64,
    /// Give up on stage two and reset to idle after this long.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_ms: u64,
    /// Wait before closing the tab. Nexus shows a 5 s countdown, so this must
    /// stay above that plus a buffer.
    #[serde(default = "default_tab_close_delay")]
    pub tab_close_delay_ms: u64,
    /// Pointer travel time to the target, to trigger hover states.
    #[serde(default = "default_pointer_move")]
    pub pointer_move_ms: u64,
    /// Pause between arriving on the button and pressing.
    #[serde(default = "default_hover_settle")]
    pub hover_settle_ms: u64,
    /// Pause between press and release.
    #[serde(default = "default_press_release_gap")]
    pub press_release_gap_ms: u64,
    /// Pause after the release before anything else happens.
    #[serde(default = "default_post_click")]
    pub post_click_delay_ms: u64,
    /// Pause after focusing the browser before sending the close chord.
    #[serde(default = "default_focus_settle")]
    pub focus_settle_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            cooldown_ms: default_cooldown(),
            browser_load_wait_ms: default_browser_load_wait(),
            stage_timeout_ms: default_stage_timeout(),
            tab_close_delay_ms: default_tab_close_delay(),
            pointer_move_ms: default_pointer_move(),
            hover_settle_ms: default_hover_settle(),
            press_release_gap_ms: default_press_release_gap(),
            post_click_delay_ms: default_post_click(),
            focus_settle_ms: default_focus_settle(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSettings {
    /// Title substring identifying the Vortex download dialog.
    #[serde(default = "default_dialog_title")]
    pub dialog_title: String,
    /// Title keywords identifying a browser window.
    #[serde(default = "default_browser_titles")]
    pub browser_titles: Vec<String>,
    /// Title keyword identifying the mod download page inside a browser.
    #[serde(default = "default_page_keyword")]
    pub page_keyword: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            dialog_title: default_dialog_title(),
            browser_titles: default_browser_titles(),
            page_keyword: default_page_keyword(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabSettings {
    /// Close the browser tab after the download click.
    #[serde(default = "default_true")]
    pub auto_close: bool,
    /// Leave the first cycle's tab open so the browser window stays around
    /// for later cycles. Deliberate asymmetry, not a bug; see DESIGN.md.
    #[serde(default = "default_true")]
    pub keep_first_tab_open: bool,
    /// After this many consecutive stage-two misses, click the fallback
    /// position even without a detection. Off by default.
    #[serde(default)]
    pub forced_fallback_after_misses: Option<u32>,
}

impl Default for TabSettings {
    fn default() -> Self {
        Self {
            auto_close: true,
            keep_first_tab_open: true,
            forced_fallback_after_misses: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugSettings {
    #[serde(default)]
    pub save_captures: bool,
    #[serde(default = "default_capture_dir")]
    pub capture_dir: PathBuf,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            save_captures: false,
            capture_dir: default_capture_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub detection: DetectionSettings,
    #[serde(default)]
    pub windows: WindowSettings,
    #[serde(default)]
    pub tabs: TabSettings,
    #[serde(default)]
    pub debug: DebugSettings,
    #[serde(default)]
    pub logging: LogSettings,
}

fn default_confidence() -> f32 {
    0.8
}
fn default_max_overlap() -> f32 {
    0.1
}
fn default_min_area() -> u32 {
    1000
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_cooldown() -> u64 {
    10_000
}
fn default_browser_load_wait() -> u64 {
    3000
}
fn default_stage_timeout() -> u64 {
    30_000
}
fn default_tab_close_delay() -> u64 {
    6000
}
fn default_pointer_move() -> u64 {
    200
}
fn default_hover_settle() -> u64 {
    150
}
fn default_press_release_gap() -> u64 {
    40
}
fn default_post_click() -> u64 {
    500
}
fn default_focus_settle() -> u64 {
    300
}
fn default_dialog_title() -> String {
    "Download mod".to_string()
}
fn default_browser_titles() -> Vec<String> {
    vec![
        "firefox".to_string(),
        "chrome".to_string(),
        "edge".to_string(),
        "brave".to_string(),
    ]
}
fn default_page_keyword() -> String {
    "nexus".to_string()
}
fn default_capture_dir() -> PathBuf {
    PathBuf::from("debug_screenshots")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

/// The Vortex "Download manually" button: dark, low-saturation, bottom-left
/// quadrant of the dialog.
fn default_dialog_button() -> ButtonProfile {
    ButtonProfile {
        search_region: SearchRegion {
            left: 0.0,
            top: 0.6,
            right: 0.5,
            bottom: 1.0,
        },
        color_ranges: vec![ColorRange {
            lower: [0, 0, 10],
            upper: [179, 60, 80],
        }],
        confusable: None,
        min_area: default_min_area(),
        min_width: 100,
        max_width: 300,
        min_height: 30,
        max_height: 60,
        min_aspect: 1.5,
        max_aspect: 10.0,
        fallback_percent: (0.25, 0.75),
        template: None,
    }
}

/// The Nexus "Slow download" button: mid-gray, with the purple premium
/// buttons nearby as the classic false positive.
fn default_page_button() -> ButtonProfile {
    ButtonProfile {
        search_region: SearchRegion {
            left: 0.0,
            top: 0.3,
            right: 0.5,
            bottom: 0.7,
        },
        color_ranges: vec![ColorRange {
            lower: [0, 0, 50],
            upper: [179, 40, 130],
        }],
        confusable: Some(ConfusableGuard {
            range: ColorRange {
                lower: [125, 60, 60],
                upper: [160, 255, 255],
            },
            max_overlap: default_max_overlap(),
        }),
        min_area: default_min_area(),
        min_width: 150,
        max_width: 400,
        min_height: 40,
        max_height: 80,
        min_aspect: 2.0,
        max_aspect: 8.0,
        fallback_percent: (0.638, 0.558),
        template: None,
    }
}

fn check_fraction(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(AutomationError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

impl ColorRange {
    fn validate(&self, name: &str) -> Result<()> {
        if self.lower[0] > 179 || self.upper[0] > 179 {
            return Err(AutomationError::Config(format!(
                "{}: hue must be within [0, 179]",
                name
            )));
        }
        for c in 0..3 {
            if self.lower[c] > self.upper[c] {
                return Err(AutomationError::Config(format!(
                    "{}: lower bound exceeds upper bound in channel {}",
                    name, c
                )));
            }
        }
        Ok(())
    }
}

impl ButtonProfile {
    fn validate(&self, name: &str) -> Result<()> {
        check_fraction(&format!("{}.search_region.left", name), self.search_region.left)?;
        check_fraction(&format!("{}.search_region.top", name), self.search_region.top)?;
        check_fraction(&format!("{}.search_region.right", name), self.search_region.right)?;
        check_fraction(&format!("{}.search_region.bottom", name), self.search_region.bottom)?;
        if self.search_region.left >= self.search_region.right
            || self.search_region.top >= self.search_region.bottom
        {
            return Err(AutomationError::Config(format!(
                "{}.search_region is empty",
                name
            )));
        }
        if self.color_ranges.is_empty() && self.template.is_none() {
            return Err(AutomationError::Config(format!(
                "{} has neither color ranges nor a template",
                name
            )));
        }
        for (i, range) in self.color_ranges.iter().enumerate() {
            range.validate(&format!("{}.color_ranges[{}]", name, i))?;
        }
        if let Some(guard) = &self.confusable {
            guard.range.validate(&format!("{}.confusable.range", name))?;
            check_fraction(&format!("{}.confusable.max_overlap", name), guard.max_overlap)?;
        }
        if self.min_width > self.max_width || self.min_height > self.max_height {
            return Err(AutomationError::Config(format!(
                "{}: min button dimensions exceed max",
                name
            )));
        }
        if self.min_aspect <= 0.0 || self.min_aspect >= self.max_aspect {
            return Err(AutomationError::Config(format!(
                "{}: aspect band ({}, {}) is invalid",
                name, self.min_aspect, self.max_aspect
            )));
        }
        check_fraction(&format!("{}.fallback_percent.x", name), self.fallback_percent.0)?;
        check_fraction(&format!("{}.fallback_percent.y", name), self.fallback_percent.1)?;
        if let Some(template) = &self.template {
            if let Some(conf) = template.confidence {
                check_fraction(&format!("{}.template.confidence", name), conf)?;
            }
        }
        Ok(())
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    /// A present-but-broken file is a fatal configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<Config>(&contents).map_err(|e| {
                AutomationError::Config(format!("failed to parse {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(AutomationError::Config(format!(
                    "failed to read {:?}: {}",
                    path, e
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on out-of-range values; called once at startup.
    pub fn validate(&self) -> Result<()> {
        if self.timing.poll_interval_ms == 0 {
            return Err(AutomationError::Config(
                "timing.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.timing.browser_load_wait_ms >= self.timing.stage_timeout_ms {
            return Err(AutomationError::Config(format!(
                "timing.browser_load_wait_ms ({}) must be below timing.stage_timeout_ms ({})",
                self.timing.browser_load_wait_ms, self.timing.stage_timeout_ms
            )));
        }
        check_fraction(
            "detection.confidence_threshold",
            self.detection.confidence_threshold,
        )?;
        self.detection.dialog_button.validate("detection.dialog_button")?;
        self.detection.page_button.validate("detection.page_button")?;
        if self.windows.dialog_title.trim().is_empty() {
            return Err(AutomationError::Config(
                "windows.dialog_title must not be empty".to_string(),
            ));
        }
        if self.windows.browser_titles.is_empty() {
            return Err(AutomationError::Config(
                "windows.browser_titles must not be empty".to_string(),
            ));
        }
        if let Some(0) = self.tabs.forced_fallback_after_misses {
            return Err(AutomationError::Config(
                "tabs.forced_fallback_after_misses must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().expect("default config");
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let json = r#"{ "timing": { "poll_interval_ms": 250 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.timing.poll_interval_ms, 250);
        assert_eq!(config.timing.cooldown_ms, 10_000);
        assert_eq!(config.windows.dialog_title, "Download mod");
        config.validate().unwrap();
    }

    #[test]
    fn confidence_outside_unit_interval_is_fatal() {
        let mut config = Config::default();
        config.detection.confidence_threshold = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_color_range_is_fatal() {
        let mut config = Config::default();
        config.detection.page_button.color_ranges[0] = ColorRange {
            lower: [0, 200, 50],
            upper: [179, 40, 130],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_aspect_band_is_fatal() {
        let mut config = Config::default();
        config.detection.page_button.min_aspect = 8.0;
        config.detection.page_button.max_aspect = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_forced_fallback_is_fatal() {
        let mut config = Config::default();
        config.tabs.forced_fallback_after_misses = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_poll_interval_is_fatal() {
        let mut config = Config::default();
        config.timing.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn color_range_membership_is_inclusive() {
        let range = ColorRange {
            lower: [0, 0, 50],
            upper: [179, 40, 130],
        };
        assert!(range.contains([0, 40, 130]));
        assert!(range.contains([90, 0, 50]));
        assert!(!range.contains([90, 41, 100]));
        assert!(!range.contains([90, 10, 131]));
    }
}
