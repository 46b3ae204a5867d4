//! Annotation drawing for calibration and measurement results.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use crate::geometry::{Circle, Point};

pub const DISC_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const CALIBRATION_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
pub const MEASUREMENT_COLOR: Rgb<u8> = Rgb([0, 160, 255]);
pub const PENDING_COLOR: Rgb<u8> = Rgb([255, 0, 255]);

/// Radius of point markers, scaled down for small images.
fn marker_radius(img: &RgbImage) -> i32 {
    (img.width().min(img.height()) / 150).clamp(2, 8) as i32
}

/// Draw a detected disc onto a copy of the image: outline plus center dot.
pub fn disc_overlay(image: &DynamicImage, circle: &Circle) -> RgbImage {
    let mut canvas = image.to_rgb8();
    draw_disc(&mut canvas, circle);
    canvas
}

pub(crate) fn draw_disc(canvas: &mut RgbImage, circle: &Circle) {
    let center = circle.center_px();
    let radius = circle.radius.round() as i32;
    // Two passes so the outline stays visible on large photographs.
    draw_hollow_circle_mut(canvas, center, radius, DISC_COLOR);
    draw_hollow_circle_mut(canvas, center, radius + 1, DISC_COLOR);
    draw_filled_circle_mut(canvas, center, marker_radius(canvas), CENTER_COLOR);
}

pub(crate) fn draw_point(canvas: &mut RgbImage, point: &Point, color: Rgb<u8>) {
    let radius = marker_radius(canvas);
    draw_filled_circle_mut(canvas, (point.x as i32, point.y as i32), radius, color);
}

pub(crate) fn draw_segment(canvas: &mut RgbImage, a: &Point, b: &Point, color: Rgb<u8>) {
    draw_line_segment_mut(canvas, a.as_f32(), b.as_f32(), color);
    draw_point(canvas, a, color);
    draw_point(canvas, b, color);
}
