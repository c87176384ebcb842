//! Button detection over captured frames.
//!
//! Two strategies. Template matching (normalized cross-correlation over
//! grayscale) is the cheap opportunistic first pass; the color-mask +
//! contour-ranking pass is the primary strategy for the buttons that template
//! matching keeps losing to theme and scale changes. Nothing in here performs
//! OS calls and nothing in here is allowed to panic the polling loop: absence
//! is a normal result, not an error.

use image::{GrayImage, RgbImage};
use log::{debug, trace};

use crate::config::{ButtonProfile, ColorRange};
use crate::core::geometry::Rect;
use crate::core::screen_capture::rgb_to_hsv;

/// A mask contour that survived the size filters but has not yet been ranked.
#[derive(Debug, Clone)]
pub struct ButtonCandidate {
    pub center: (i32, i32),
    /// Bounding-box area in pixels (width x height).
    pub area: u32,
    pub aspect_ratio: f32,
    pub bounding_box: Rect,
}

/// Best surviving candidate inside `search`, or `None` when the target is
/// absent. The caller decides whether to fall back to a calibrated position.
pub fn find_button(frame: &RgbImage, search: Rect, profile: &ButtonProfile) -> Option<ButtonCandidate> {
    let search = search.clipped_to(frame.width(), frame.height());
    let (w, h) = (search.width() as u32, search.height() as u32);
    if w == 0 || h == 0 || profile.color_ranges.is_empty() {
        return None;
    }

    let mask = build_mask(frame, search, &profile.color_ranges);
    let boxes = extract_components(&mask, w, h);
    trace!("{} raw contours in {:?}", boxes.len(), search);

    let mut best: Option<ButtonCandidate> = None;
    let mut survivors = 0usize;
    for local in boxes {
        // Back to frame coordinates.
        let bbox = Rect::new(
            search.left + local.left,
            search.top + local.top,
            search.left + local.right,
            search.top + local.bottom,
        );
        let (bw, bh) = (bbox.width() as u32, bbox.height() as u32);
        let area = bw * bh;

        // Rejects both specks and oversized regions such as panel backgrounds.
        if area < profile.min_area
            || bw < profile.min_width
            || bw > profile.max_width
            || bh < profile.min_height
            || bh > profile.max_height
        {
            continue;
        }

        // Primary false-positive guard: a look-alike button of a different
        // purpose bleeds its accent color into the bounding box.
        if let Some(guard) = &profile.confusable {
            let overlap = confusable_overlap(frame, bbox, &guard.range);
            if overlap >= guard.max_overlap {
                debug!(
                    "contour at {:?} rejected: {:.0}% confusable overlap",
                    bbox,
                    overlap * 100.0
                );
                continue;
            }
        }

        // Buttons are wider than tall; icons, dividers and text blocks are not.
        let aspect = if bh == 0 { 0.0 } else { bw as f32 / bh as f32 };
        if aspect <= profile.min_aspect || aspect >= profile.max_aspect {
            continue;
        }

        survivors += 1;
        let candidate = ButtonCandidate {
            center: bbox.center(),
            area,
            aspect_ratio: aspect,
            bounding_box: bbox,
        };
        // Strict > keeps the first contour on exact-area ties.
        match &best {
            Some(current) if candidate.area <= current.area => {}
            _ => best = Some(candidate),
        }
    }

    if let Some(found) = &best {
        debug!(
            "selected candidate at {:?}, area {} ({} survivor(s))",
            found.center, found.area, survivors
        );
    }
    best
}

/// Binary mask of `search` pixels inside any of the configured ranges.
fn build_mask(frame: &RgbImage, search: Rect, ranges: &[ColorRange]) -> Vec<bool> {
    let (w, h) = (search.width() as u32, search.height() as u32);
    let mut mask = vec![false; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let px = frame.get_pixel(search.left as u32 + x, search.top as u32 + y);
            let hsv = rgb_to_hsv(px[0], px[1], px[2]);
            if ranges.iter().any(|r| r.contains(hsv)) {
                mask[(y * w + x) as usize] = true;
            }
        }
    }
    mask
}

/// Bounding boxes of 8-connected mask components, in mask-local coordinates,
/// in scan order of their first pixel.
fn extract_components(mask: &[bool], w: u32, h: u32) -> Vec<Rect> {
    let mut visited = vec![false; mask.len()];
    let mut boxes = Vec::new();
    let mut stack: Vec<(u32, u32)> = Vec::new();

    for start_y in 0..h {
        for start_x in 0..w {
            let idx = (start_y * w + start_x) as usize;
            if !mask[idx] || visited[idx] {
                continue;
            }

            let (mut min_x, mut max_x) = (start_x, start_x);
            let (mut min_y, mut max_y) = (start_y, start_y);
            visited[idx] = true;
            stack.push((start_x, start_y));

            while let Some((x, y)) = stack.pop() {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);

                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                            continue;
                        }
                        let nidx = (ny as u32 * w + nx as u32) as usize;
                        if mask[nidx] && !visited[nidx] {
                            visited[nidx] = true;
                            stack.push((nx as u32, ny as u32));
                        }
                    }
                }
            }

            boxes.push(Rect::new(
                min_x as i32,
                min_y as i32,
                max_x as i32 + 1,
                max_y as i32 + 1,
            ));
        }
    }
    boxes
}

/// Fraction of `bbox` pixels matching the confusable range.
fn confusable_overlap(frame: &RgbImage, bbox: Rect, range: &ColorRange) -> f32 {
    let bbox = bbox.clipped_to(frame.width(), frame.height());
    let total = bbox.area();
    if total == 0 {
        return 0.0;
    }
    let mut hits = 0i64;
    for y in bbox.top..bbox.bottom {
        for x in bbox.left..bbox.right {
            let px = frame.get_pixel(x as u32, y as u32);
            if range.contains(rgb_to_hsv(px[0], px[1], px[2])) {
                hits += 1;
            }
        }
    }
    hits as f32 / total as f32
}

#[derive(Debug, Clone, Copy)]
pub struct TemplateMatch {
    pub center: (i32, i32),
    pub score: f32,
}

/// Normalized cross-correlation (zero-mean, cv2 TM_CCOEFF_NORMED style) of
/// `template` against `haystack`, both grayscale.
///
/// Returns the best location only when its score reaches `min_confidence`.
/// Deterministic but brittle to scale and theme changes, so callers use it as
/// a first pass, never as the sole strategy.
pub fn match_template(
    haystack: &GrayImage,
    template: &GrayImage,
    min_confidence: f32,
) -> Option<TemplateMatch> {
    let (hw, hh) = (haystack.width(), haystack.height());
    let (tw, th) = (template.width(), template.height());
    if tw == 0 || th == 0 || tw > hw || th > hh {
        return None;
    }

    let n = (tw * th) as f64;
    let t_mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let t_norm: f64 = template
        .pixels()
        .map(|p| {
            let d = p[0] as f64 - t_mean;
            d * d
        })
        .sum();
    if t_norm == 0.0 {
        // A flat template correlates with everything or nothing; call it absent.
        return None;
    }

    let mut best_score = f64::MIN;
    let mut best_pos = (0u32, 0u32);
    for oy in 0..=(hh - th) {
        for ox in 0..=(hw - tw) {
            let mut f_sum = 0.0f64;
            for y in 0..th {
                for x in 0..tw {
                    f_sum += haystack.get_pixel(ox + x, oy + y)[0] as f64;
                }
            }
            let f_mean = f_sum / n;

            let mut cross = 0.0f64;
            let mut f_norm = 0.0f64;
            for y in 0..th {
                for x in 0..tw {
                    let fv = haystack.get_pixel(ox + x, oy + y)[0] as f64 - f_mean;
                    let tv = template.get_pixel(x, y)[0] as f64 - t_mean;
                    cross += fv * tv;
                    f_norm += fv * fv;
                }
            }
            if f_norm == 0.0 {
                continue;
            }
            let score = cross / (f_norm * t_norm).sqrt();
            if score > best_score {
                best_score = score;
                best_pos = (ox, oy);
            }
        }
    }

    let score = best_score as f32;
    if score >= min_confidence {
        Some(TemplateMatch {
            center: (
                best_pos.0 as i32 + tw as i32 / 2,
                best_pos.1 as i32 + th as i32 / 2,
            ),
            score,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfusableGuard, SearchRegion};
    use image::{Luma, Rgb};

    const GRAY: Rgb<u8> = Rgb([78, 75, 75]); // HSV about (0, 10, 78)
    const PURPLE: Rgb<u8> = Rgb([128, 0, 128]); // HSV (150, 255, 128)
    const BACKGROUND: Rgb<u8> = Rgb([230, 230, 230]);

    fn page_profile() -> ButtonProfile {
        crate::config::Config::default().detection.page_button
    }

    fn page_search(frame: &RgbImage, profile: &ButtonProfile) -> Rect {
        let screen = Rect::from_size(0, 0, frame.width() as i32, frame.height() as i32);
        let SearchRegion {
            left,
            top,
            right,
            bottom,
        } = profile.search_region;
        screen.sub_region(left, top, right, bottom)
    }

    fn frame_with_rect(rect: Rect, color: Rgb<u8>) -> RgbImage {
        let mut frame = RgbImage::from_pixel(1920, 1080, BACKGROUND);
        for y in rect.top..rect.bottom {
            for x in rect.left..rect.right {
                frame.put_pixel(x as u32, y as u32, color);
            }
        }
        frame
    }

    #[test]
    fn gray_button_found_at_expected_center() {
        // 220x55 gray region at (300, 500), shaped like the Slow-download button.
        let button = Rect::from_size(300, 500, 220, 55);
        let frame = frame_with_rect(button, GRAY);
        let profile = page_profile();
        let search = page_search(&frame, &profile);

        let hit = find_button(&frame, search, &profile).expect("button present");
        assert_eq!(hit.center, (410, 527));
        assert_eq!(hit.area, 12_100);
        assert_eq!(hit.bounding_box, button);
        assert!((hit.aspect_ratio - 4.0).abs() < 0.01);
    }

    #[test]
    fn confusable_overlap_rejects_the_contour() {
        // Same region, but a fifth of its pixels are the premium purple.
        let button = Rect::from_size(300, 500, 220, 55);
        let mut frame = frame_with_rect(button, GRAY);
        let mut painted = 0u32;
        let target = button.area() as u32 / 5;
        'outer: for y in button.top..button.bottom {
            for x in button.left..button.right {
                if (x + y) % 5 == 2 {
                    frame.put_pixel(x as u32, y as u32, PURPLE);
                    painted += 1;
                    if painted >= target {
                        break 'outer;
                    }
                }
            }
        }
        assert!(painted >= target);

        let profile = page_profile();
        let search = page_search(&frame, &profile);
        assert!(find_button(&frame, search, &profile).is_none());
    }

    #[test]
    fn specks_below_min_area_are_never_candidates() {
        let speck = Rect::from_size(400, 500, 20, 10); // area 200 < 1000
        let frame = frame_with_rect(speck, GRAY);
        let profile = page_profile();
        let search = page_search(&frame, &profile);
        assert!(find_button(&frame, search, &profile).is_none());
    }

    #[test]
    fn oversized_regions_are_never_candidates() {
        // A full-panel wash of the right color, wider than max_width.
        let panel = Rect::from_size(100, 400, 700, 300);
        let frame = frame_with_rect(panel, GRAY);
        let profile = page_profile();
        let search = page_search(&frame, &profile);
        assert!(find_button(&frame, search, &profile).is_none());
    }

    #[test]
    fn bad_aspect_is_excluded_even_with_maximal_area() {
        // Square-ish blob, in-bounds dimensions, aspect 1.0 outside (2, 8).
        let square = Rect::from_size(400, 450, 160, 80);
        let frame = frame_with_rect(square, GRAY);
        let mut profile = page_profile();
        profile.max_height = 90;
        let search = page_search(&frame, &profile);
        assert!(find_button(&frame, search, &profile).is_none());
    }

    #[test]
    fn largest_survivor_wins() {
        let small = Rect::from_size(50, 420, 160, 45);
        let large = Rect::from_size(300, 500, 220, 55);
        let mut frame = frame_with_rect(small, GRAY);
        for y in large.top..large.bottom {
            for x in large.left..large.right {
                frame.put_pixel(x as u32, y as u32, GRAY);
            }
        }
        let profile = page_profile();
        let search = page_search(&frame, &profile);
        let hit = find_button(&frame, search, &profile).unwrap();
        assert_eq!(hit.bounding_box, large);
    }

    #[test]
    fn candidates_outside_search_region_are_ignored(){
        // Same shape, placed above the configured search band (top 30%).
        let button = Rect::from_size(300, 100, 220, 55);
        let frame = frame_with_rect(button, GRAY);
        let profile = page_profile();
        let search = page_search(&frame, &profile);
        assert!(find_button(&frame, search, &profile).is_none());
    }

    #[test]
    fn confusable_guard_ignores_purple_elsewhere_in_region() {
        // Purple far away from the candidate box must not count as overlap.
        let button = Rect::from_size(300, 500, 220, 55);
        let purple = Rect::from_size(700, 400, 100, 200);
        let mut frame = frame_with_rect(button, GRAY);
        for y in purple.top..purple.bottom {
            for x in purple.left..purple.right {
                frame.put_pixel(x as u32, y as u32, PURPLE);
            }
        }
        let profile = page_profile();
        let search = page_search(&frame, &profile);
        let hit = find_button(&frame, search, &profile).expect("button present");
        assert_eq!(hit.bounding_box, button);
    }

    fn gradient_haystack() -> GrayImage {
        // Quadratic terms keep every window distinct; a linear ramp would
        // repeat under the correlation's shift invariance.
        GrayImage::from_fn(120, 90, |x, y| Luma([((x * x + x * y + 7 * y) % 256) as u8]))
    }

    #[test]
    fn template_found_where_it_was_cut_from() {
        let haystack = gradient_haystack();
        let template = image::imageops::crop_imm(&haystack, 40, 25, 30, 12).to_image();
        let hit = match_template(&haystack, &template, 0.95).expect("exact patch");
        assert_eq!(hit.center, (55, 31));
        assert!(hit.score > 0.99);
    }

    #[test]
    fn template_below_confidence_is_a_miss() {
        let haystack = GrayImage::from_fn(60, 60, |x, y| Luma([((x + y) % 2 * 255) as u8]));
        let template = GrayImage::from_fn(10, 10, |x, _| Luma([(x * 25) as u8]));
        assert!(match_template(&haystack, &template, 0.9).is_none());
    }

    #[test]
    fn flat_template_is_rejected() {
        let haystack = gradient_haystack();
        let template = GrayImage::from_pixel(10, 10, Luma([128]));
        assert!(match_template(&haystack, &template, 0.5).is_none());
    }

    #[test]
    fn template_larger_than_frame_is_a_miss() {
        let haystack = GrayImage::from_pixel(10, 10, Luma([10]));
        let template = gradient_haystack();
        assert!(match_template(&haystack, &template, 0.5).is_none());
    }

    #[test]
    fn confusable_rejection_applies_before_ranking() {
        // A tainted large contour must not shadow a clean smaller one.
        let clean = Rect::from_size(50, 420, 180, 50);
        let tainted = Rect::from_size(300, 500, 300, 60);
        let mut frame = frame_with_rect(clean, GRAY);
        for y in tainted.top..tainted.bottom {
            for x in tainted.left..tainted.right {
                if (x + y) % 3 == 0 {
                    frame.put_pixel(x as u32, y as u32, PURPLE);
                } else {
                    frame.put_pixel(x as u32, y as u32, GRAY);
                }
            }
        }
        let mut profile = page_profile();
        profile.confusable = Some(ConfusableGuard {
            range: crate::config::ColorRange {
                lower: [125, 60, 60],
                upper: [160, 255, 255],
            },
            max_overlap: 0.1,
        });
        let search = page_search(&frame, &profile);
        let hit = find_button(&frame, search, &profile).expect("clean candidate");
        assert_eq!(hit.bounding_box, clean);
    }
}
