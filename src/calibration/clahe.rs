//! Contrast-limited adaptive histogram equalization.
//!
//! The image is split into a grid of tiles. Each tile gets its own
//! equalization lookup table built from a clipped histogram, and every output
//! pixel is a bilinear blend of the four nearest tile tables so that no seams
//! appear at tile borders.
//!
//! When the image size is not a multiple of the grid, the last row and column
//! of tiles extend past the border and sample a mirrored copy of the image,
//! so every tile covers the same area.

use image::GrayImage;
use serde::{Deserialize, Serialize};

const HIST_SIZE: usize = 256;

/// CLAHE parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaheConfig {
    /// Histogram clip limit, relative to a flat histogram.
    pub clip_limit: f32,
    /// Number of tiles along X.
    pub tiles_x: u32,
    /// Number of tiles along Y.
    pub tiles_y: u32,
}

impl Default for ClaheConfig {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

/// Apply CLAHE to a grayscale image.
///
/// A clip limit of zero or less disables clipping, which degrades to plain
/// per-tile histogram equalization.
pub fn clahe(gray: &GrayImage, config: &ClaheConfig) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }

    let tiles_x = config.tiles_x.clamp(1, w);
    let tiles_y = config.tiles_y.clamp(1, h);
    let tile_w = w.div_ceil(tiles_x);
    let tile_h = h.div_ceil(tiles_y);

    let mut luts = vec![[0u8; HIST_SIZE]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let origin = (tx * tile_w, ty * tile_h);
            luts[(ty * tiles_x + tx) as usize] =
                tile_lut(gray, origin, (tile_w, tile_h), config.clip_limit);
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(w, h, |x, y| {
        let (tx1, tx2, xa) = neighbours(x, tile_w, tiles_x);
        let (ty1, ty2, ya) = neighbours(y, tile_h, tiles_y);
        let v = gray.get_pixel(x, y)[0] as usize;

        let top = lut_at(tx1, ty1)[v] as f32 * (1.0 - xa) + lut_at(tx2, ty1)[v] as f32 * xa;
        let bottom = lut_at(tx1, ty2)[v] as f32 * (1.0 - xa) + lut_at(tx2, ty2)[v] as f32 * xa;
        let blended = top * (1.0 - ya) + bottom * ya;

        image::Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

/// Indices of the two tiles whose centers bracket `pos`, plus the blend weight
/// of the second one.
fn neighbours(pos: u32, tile_size: u32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile_size as f32 - 0.5;
    let first = f.floor();
    let weight = f - first;
    let last = tiles as i64 - 1;
    let t1 = (first as i64).clamp(0, last) as u32;
    let t2 = (first as i64 + 1).clamp(0, last) as u32;
    (t1, t2, weight)
}

/// Mirror a coordinate past the far edge back into `[0, len)` without
/// repeating the edge pixel. Padding never exceeds `len - 1`.
fn reflect(pos: u32, len: u32) -> u32 {
    if pos < len {
        pos
    } else {
        (2 * (len - 1)).saturating_sub(pos)
    }
}

fn tile_lut(gray: &GrayImage, origin: (u32, u32), size: (u32, u32), clip_limit: f32) -> [u8; HIST_SIZE] {
    let (w, h) = gray.dimensions();
    let (x0, y0) = origin;
    let (tile_w, tile_h) = size;

    let mut hist = [0u32; HIST_SIZE];
    for y in y0..y0 + tile_h {
        let sy = reflect(y, h);
        for x in x0..x0 + tile_w {
            hist[gray.get_pixel(reflect(x, w), sy)[0] as usize] += 1;
        }
    }

    let area = tile_w * tile_h;
    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / HIST_SIZE as f32) as u32).max(1);
        clip_histogram(&mut hist, clip);
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; HIST_SIZE];
    let mut cdf = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Clip every bin at `clip` and spread the excess evenly over all bins.
fn clip_histogram(hist: &mut [u32; HIST_SIZE], clip: u32) {
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    let batch = excess / HIST_SIZE as u32;
    let mut residual = excess % HIST_SIZE as u32;
    for bin in hist.iter_mut() {
        *bin += batch;
    }

    if residual > 0 {
        let step = (HIST_SIZE as u32 / residual).max(1) as usize;
        for bin in hist.iter_mut().step_by(step) {
            if residual == 0 {
                break;
            }
            *bin += 1;
            residual -= 1;
        }
    }
}
