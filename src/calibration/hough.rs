//! Gradient Hough transform for circle detection.
//!
//! Every Canny edge pixel casts votes along its gradient direction (both
//! senses) for all radii in `[min_radius, max_radius]`. Local maxima of the
//! accumulator above `accumulator_threshold` become center candidates, ordered
//! by vote count. Each candidate then gets a radius from the distribution of
//! edge distances around it, and is rejected when it lies closer than
//! `min_center_distance` to an accepted circle or its best radius has too
//! little edge support.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::geometry::Circle;

/// Hough detector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughConfig {
    /// Inverse accumulator resolution (1.0 = image resolution).
    pub dp: f32,
    /// Minimum distance between accepted circle centers, in pixels.
    pub min_center_distance: f32,
    /// Upper Canny threshold; the lower one is half of it.
    pub edge_threshold: f32,
    /// Minimum votes for a center and minimum edge support for a radius.
    pub accumulator_threshold: u32,
    /// Smallest radius searched, in pixels.
    pub min_radius: u32,
    /// Largest radius searched, in pixels.
    pub max_radius: u32,
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            dp: 1.2,
            min_center_distance: 100.0,
            edge_threshold: 50.0,
            accumulator_threshold: 30,
            min_radius: 30,
            max_radius: 150,
        }
    }
}

struct EdgePoint {
    x: f32,
    y: f32,
}

/// Detect circles in a grayscale image.
///
/// Circles are returned in detector order (strongest center first). At most
/// `limit` circles are returned when given.
pub fn detect_circles(gray: &GrayImage, config: &HoughConfig, limit: Option<usize>) -> Vec<Circle> {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 || config.dp <= 0.0 || config.max_radius < config.min_radius {
        return Vec::new();
    }

    let edges = imageproc::edges::canny(gray, config.edge_threshold / 2.0, config.edge_threshold);
    let gx = imageproc::gradients::horizontal_sobel(gray);
    let gy = imageproc::gradients::vertical_sobel(gray);

    let acc_w = (w as f32 / config.dp).ceil() as usize + 2;
    let acc_h = (h as f32 / config.dp).ceil() as usize + 2;
    let mut accum = vec![0u32; acc_w * acc_h];
    let mut edge_points = Vec::new();
    let idp = 1.0 / config.dp;

    for (x, y, px) in edges.enumerate_pixels() {
        if px[0] == 0 {
            continue;
        }
        let vx = gx.get_pixel(x, y)[0] as f32;
        let vy = gy.get_pixel(x, y)[0] as f32;
        let mag = vx.hypot(vy);
        if mag < f32::EPSILON {
            continue;
        }
        edge_points.push(EdgePoint {
            x: x as f32,
            y: y as f32,
        });

        let sx = vx / mag * idp;
        let sy = vy / mag * idp;
        let x0 = x as f32 * idp;
        let y0 = y as f32 * idp;

        for sign in [1.0f32, -1.0] {
            let mut ax = x0 + sign * sx * config.min_radius as f32;
            let mut ay = y0 + sign * sy * config.min_radius as f32;
            for _ in config.min_radius..=config.max_radius {
                if ax < 0.0 || ay < 0.0 {
                    break;
                }
                let (cx, cy) = (ax as usize, ay as usize);
                if cx >= acc_w || cy >= acc_h {
                    break;
                }
                accum[cy * acc_w + cx] += 1;
                ax += sign * sx;
                ay += sign * sy;
            }
        }
    }

    if edge_points.is_empty() {
        return Vec::new();
    }

    let centers = find_centers(&accum, acc_w, acc_h, config.accumulator_threshold);
    tracing::debug!(
        edge_points = edge_points.len(),
        candidates = centers.len(),
        "hough accumulator filled"
    );

    let min_dist_sq = config.min_center_distance * config.min_center_distance;
    let mut circles: Vec<Circle> = Vec::new();

    for (cx, cy, _) in centers {
        let center_x = (cx as f32 + 0.5) * config.dp;
        let center_y = (cy as f32 + 0.5) * config.dp;

        let too_close = circles.iter().any(|c| {
            let dx = c.center_x - center_x;
            let dy = c.center_y - center_y;
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }

        if let Some(radius) = estimate_radius(&edge_points, center_x, center_y, config) {
            circles.push(Circle::new(center_x, center_y, radius));
            if limit.is_some_and(|n| circles.len() >= n) {
                break;
            }
        }
    }

    circles
}

/// Accumulator local maxima above threshold, strongest first.
fn find_centers(accum: &[u32], acc_w: usize, acc_h: usize, threshold: u32) -> Vec<(usize, usize, u32)> {
    let mut centers = Vec::new();
    for y in 1..acc_h.saturating_sub(1) {
        for x in 1..acc_w.saturating_sub(1) {
            let idx = y * acc_w + x;
            let v = accum[idx];
            if v > threshold
                && v > accum[idx - 1]
                && v >= accum[idx + 1]
                && v > accum[idx - acc_w]
                && v >= accum[idx + acc_w]
            {
                centers.push((x, y, v));
            }
        }
    }
    // Stable sort keeps raster order among equal scores.
    centers.sort_by(|a, b| b.2.cmp(&a.2));
    centers
}

/// Pick the radius with the best edge support per unit radius.
///
/// Edge distances are binned at one pixel and counted over a three-bin window,
/// so a center that is off by a pixel still collects the whole rim.
fn estimate_radius(edges: &[EdgePoint], cx: f32, cy: f32, config: &HoughConfig) -> Option<f32> {
    let min_r = config.min_radius as f32;
    let max_r = config.max_radius as f32;
    let bins = (config.max_radius - config.min_radius + 1) as usize;
    let mut hist = vec![0u32; bins];
    let mut sums = vec![0f32; bins];

    for p in edges {
        let d = (p.x - cx).hypot(p.y - cy);
        if d < min_r || d > max_r {
            continue;
        }
        let bin = ((d - min_r).round() as usize).min(bins - 1);
        hist[bin] += 1;
        sums[bin] += d;
    }

    let window = |i: usize| {
        let lo = i.saturating_sub(1);
        let hi = (i + 1).min(bins - 1);
        (lo..=hi).fold((0u32, 0f32), |(n, s), j| (n + hist[j], s + sums[j]))
    };

    let mut best: Option<(usize, f32)> = None;
    for i in 0..bins {
        let (count, _) = window(i);
        if count == 0 {
            continue;
        }
        let ratio = count as f32 / (min_r + i as f32);
        if best.is_none_or(|(_, r)| ratio > r) {
            best = Some((i, ratio));
        }
    }

    let (bin, _) = best?;
    let (count, sum) = window(bin);
    if count <= config.accumulator_threshold {
        return None;
    }
    Some(sum / count as f32)
}
