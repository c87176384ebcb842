use std::path::Path;
use std::time::Instant;

use image::{GrayImage, RgbImage};
use log::{debug, warn};

/// One immutable full-screen grab. Owned transiently by the detection call
/// that produced it; never persisted (debug dumps are copies on disk).
pub struct ScreenFrame {
    pub image: RgbImage,
    pub captured_at: Instant,
}

impl ScreenFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn to_grayscale(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }

    /// Best-effort debug dump, keyed by a wall-clock timestamp. Failures are
    /// logged and swallowed; they must never fail the capture that produced
    /// this frame.
    pub fn save_debug(&self, dir: &Path, tag: &str) {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        let path = dir.join(format!("{}_{}.png", tag, stamp));
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("debug capture dir {:?} unavailable: {}", dir, e);
            return;
        }
        match self.image.save(&path) {
            Ok(()) => debug!("saved debug capture {:?}", path),
            Err(e) => warn!("failed to save debug capture {:?}: {}", path, e),
        }
    }
}

/// RGB -> HSV in OpenCV ranges: H in [0, 179], S and V in [0, 255].
///
/// Matching the cv2 convention keeps the configured color ranges portable
/// from values probed with an eyedropper on saved cv2 screenshots.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max == 0.0 { 0.0 } else { delta / max * 255.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == rf {
        30.0 * (gf - bf) / delta
    } else if max == gf {
        60.0 + 30.0 * (bf - rf) / delta
    } else {
        120.0 + 30.0 * (rf - gf) / delta
    };
    let h = if h < 0.0 { h + 180.0 } else { h };

    [
        (h.round() as i32).rem_euclid(180) as u8,
        s.round().min(255.0) as u8,
        v.round().min(255.0) as u8,
    ]
}

#[cfg(windows)]
pub use win32::capture_screen;

#[cfg(windows)]
mod win32 {
    use super::ScreenFrame;
    use crate::error::{AutomationError, Result};
    use image::{ImageBuffer, Rgb};
    use std::time::Instant;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC,
        GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
        DIB_RGB_COLORS, SRCCOPY,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN,
    };

    /// Grab the whole primary screen using BitBlt.
    ///
    /// Fails with a recoverable `Capture` error when any GDI call refuses;
    /// callers treat that as "nothing detected this tick".
    pub fn capture_screen() -> Result<ScreenFrame> {
        unsafe {
            let width = GetSystemMetrics(SM_CXSCREEN);
            let height = GetSystemMetrics(SM_CYSCREEN);
            if width <= 0 || height <= 0 {
                return Err(AutomationError::Capture(
                    "screen metrics unavailable".to_string(),
                ));
            }

            let hdc = GetDC(HWND(0));
            if hdc.is_invalid() {
                return Err(AutomationError::Capture(
                    "failed to get screen device context".to_string(),
                ));
            }

            let mem_dc = CreateCompatibleDC(hdc);
            if mem_dc.is_invalid() {
                let _ = ReleaseDC(HWND(0), hdc);
                return Err(AutomationError::Capture(
                    "failed to create compatible DC".to_string(),
                ));
            }

            let bitmap = CreateCompatibleBitmap(hdc, width, height);
            if bitmap.is_invalid() {
                let _ = DeleteDC(mem_dc);
                let _ = ReleaseDC(HWND(0), hdc);
                return Err(AutomationError::Capture(
                    "failed to create compatible bitmap".to_string(),
                ));
            }

            let old_bitmap = SelectObject(mem_dc, bitmap);

            let blt = BitBlt(mem_dc, 0, 0, width, height, hdc, 0, 0, SRCCOPY);
            if blt.is_err() {
                let _ = SelectObject(mem_dc, old_bitmap);
                let _ = DeleteObject(bitmap);
                let _ = DeleteDC(mem_dc);
                let _ = ReleaseDC(HWND(0), hdc);
                return Err(AutomationError::Capture(
                    "BitBlt failed - could not capture screen".to_string(),
                ));
            }

            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    biHeight: -height, // Negative for top-down bitmap
                    biPlanes: 1,
                    biBitCount: 24, // BGR, 3 bytes per pixel
                    biCompression: BI_RGB.0 as u32,
                    biSizeImage: 0,
                    biXPelsPerMeter: 0,
                    biYPelsPerMeter: 0,
                    biClrUsed: 0,
                    biClrImportant: 0,
                },
                bmiColors: [Default::default(); 1],
            };

            // Scan lines are padded to 4-byte boundaries.
            let stride = ((width * 3 + 3) & !3) as usize;
            let mut buffer: Vec<u8> = vec![0; stride * height as usize];

            let scan_lines = GetDIBits(
                mem_dc,
                bitmap,
                0,
                height as u32,
                Some(buffer.as_mut_ptr() as *mut _),
                &mut bmi,
                DIB_RGB_COLORS,
            );

            let _ = SelectObject(mem_dc, old_bitmap);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            let _ = ReleaseDC(HWND(0), hdc);

            if scan_lines == 0 {
                return Err(AutomationError::Capture(
                    "failed to get bitmap bits".to_string(),
                ));
            }

            // Windows hands us BGR; flip to RGB while copying out.
            let mut img = ImageBuffer::new(width as u32, height as u32);
            for y in 0..height as usize {
                let row = &buffer[y * stride..];
                for x in 0..width as usize {
                    let i = x * 3;
                    img.put_pixel(
                        x as u32,
                        y as u32,
                        Rgb([row[i + 2], row[i + 1], row[i]]),
                    );
                }
            }

            Ok(ScreenFrame {
                image: img,
                captured_at: Instant::now(),
            })
        }
    }
}
