//! Perceptual image diffing.
//!
//! Pixels are compared by their distance in YIQ color space, the metric
//! introduced by Kotsarenko and Ramos and popularized by the pixelmatch
//! library. Anti-aliased edge pixels are detected and marked in the diff
//! image but never counted as differences.

use crate::{CompareError, Result};
use image::{imageops, RgbaImage};
use std::io::Cursor;

/// Per-pixel color sensitivity on a 0..1 scale. Lower is stricter.
const PIXEL_THRESHOLD: f64 = 0.1;

/// Brightness retained when fading unchanged pixels into the diff image.
const GRAY_ALPHA: f64 = 0.1;

/// Largest possible YIQ distance between two colors.
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Outcome of diffing two images.
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// Differing pixels as a percentage of the compared area, 0 to 100
    pub percentage: f64,

    /// Count of differing pixels
    pub diff_pixels: u64,

    /// Width of the compared area in pixels
    pub width: u32,

    /// Height of the compared area in pixels
    pub height: u32,

    /// Rendered diff as an encoded PNG: red where pixels differ, yellow
    /// where anti-aliasing was detected, faded grayscale elsewhere
    pub diff_png: Vec<u8>,
}

/// Diff two encoded PNG images.
///
/// Images of unequal dimensions are cropped to their common area,
/// anchored at the top-left corner, without resampling.
pub fn diff_images(figma_png: &[u8], story_png: &[u8]) -> Result<DiffOutcome> {
    let figma = decode_rgba(figma_png)?;
    let story = decode_rgba(story_png)?;

    let width = figma.width().min(story.width());
    let height = figma.height().min(story.height());
    if width == 0 || height == 0 {
        return Err(CompareError::Image(
            "images have no overlapping area to compare".to_string(),
        ));
    }

    let figma = crop_to(figma, width, height);
    let story = crop_to(story, width, height);

    let mut out = vec![0u8; (width as usize) * (height as usize) * 4];
    let diff_pixels = pixelmatch(figma.as_raw(), story.as_raw(), &mut out, width, height);

    let total = width as u64 * height as u64;
    let percentage = diff_pixels as f64 / total as f64 * 100.0;

    let diff = RgbaImage::from_raw(width, height, out)
        .ok_or_else(|| CompareError::Image("diff image allocation failed".to_string()))?;

    Ok(DiffOutcome {
        percentage,
        diff_pixels,
        width,
        height,
        diff_png: encode_png(&diff)?,
    })
}

fn decode_rgba(data: &[u8]) -> Result<RgbaImage> {
    let img = image::load_from_memory(data)
        .map_err(|e| CompareError::Image(format!("failed to decode image: {e}")))?;
    Ok(img.to_rgba8())
}

fn crop_to(img: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.width() == width && img.height() == height {
        return img;
    }
    imageops::crop_imm(&img, 0, 0, width, height).to_image()
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| CompareError::Image(format!("failed to encode diff image: {e}")))?;
    Ok(buf)
}

/// Walk two equally-sized RGBA buffers, classify each pixel, paint the
/// diff image, and return the count of differing pixels.
fn pixelmatch(a: &[u8], b: &[u8], out: &mut [u8], width: u32, height: u32) -> u64 {
    let max_delta = MAX_YIQ_DELTA * PIXEL_THRESHOLD * PIXEL_THRESHOLD;

    // Identical buffers skip the pixel walk and fade everything.
    if a == b {
        for pos in (0..a.len()).step_by(4) {
            draw_gray_pixel(a, pos, out);
        }
        return 0;
    }

    let mut diff_count = 0u64;

    for y in 0..height {
        for x in 0..width {
            let pos = ((y * width + x) * 4) as usize;
            let delta = color_delta(a, b, pos, pos, false);

            if delta.abs() > max_delta {
                if antialiased(a, x, y, width, height, b)
                    || antialiased(b, x, y, width, height, a)
                {
                    draw_pixel(out, pos, 255, 255, 0);
                } else {
                    draw_pixel(out, pos, 255, 0, 0);
                    diff_count += 1;
                }
            } else {
                draw_gray_pixel(a, pos, out);
            }
        }
    }

    diff_count
}

/// YIQ distance between a pixel of `img1` and a pixel of `img2`, signed
/// by brightness: negative when the first pixel is lighter. With
/// `y_only`, returns the plain brightness delta instead.
fn color_delta(img1: &[u8], img2: &[u8], k: usize, m: usize, y_only: bool) -> f64 {
    let mut r1 = img1[k] as f64;
    let mut g1 = img1[k + 1] as f64;
    let mut b1 = img1[k + 2] as f64;
    let mut a1 = img1[k + 3] as f64;
    let mut r2 = img2[m] as f64;
    let mut g2 = img2[m + 1] as f64;
    let mut b2 = img2[m + 2] as f64;
    let mut a2 = img2[m + 3] as f64;

    if a1 == a2 && r1 == r2 && g1 == g2 && b1 == b2 {
        return 0.0;
    }

    if a1 < 255.0 {
        a1 /= 255.0;
        r1 = blend(r1, a1);
        g1 = blend(g1, a1);
        b1 = blend(b1, a1);
    }
    if a2 < 255.0 {
        a2 /= 255.0;
        r2 = blend(r2, a2);
        g2 = blend(g2, a2);
        b2 = blend(b2, a2);
    }

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;

    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

/// Detect anti-aliasing at (x1, y1): the pixel must sit on a brightness
/// gradient, with its darkest or brightest neighbor belonging to a flat
/// region in both images.
fn antialiased(img: &[u8], x1: u32, y1: u32, width: u32, height: u32, other: &[u8]) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = ((y1 * width + x1) * 4) as usize;

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    let mut min = 0.0f64;
    let mut max = 0.0f64;
    let mut min_x = 0u32;
    let mut min_y = 0u32;
    let mut max_x = 0u32;
    let mut max_y = 0u32;

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }

            let delta = color_delta(img, img, pos, ((y * width + x) * 4) as usize, true);

            if delta == 0.0 {
                zeroes += 1;
                // More than two equal neighbors means a flat region, not an edge.
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_x = x;
                min_y = y;
            } else if delta > max {
                max = delta;
                max_x = x;
                max_y = y;
            }
        }
    }

    // An anti-aliased pixel has both darker and brighter neighbors.
    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_x, min_y, width, height)
        && has_many_siblings(other, min_x, min_y, width, height))
        || (has_many_siblings(img, max_x, max_y, width, height)
            && has_many_siblings(other, max_x, max_y, width, height))
}

/// Whether the pixel at (x1, y1) has more than two identical neighbors.
fn has_many_siblings(img: &[u8], x1: u32, y1: u32, width: u32, height: u32) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = ((y1 * width + x1) * 4) as usize;

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }

            let neighbor = ((y * width + x) * 4) as usize;
            if img[pos..pos + 4] == img[neighbor..neighbor + 4] {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }

    false
}

fn draw_pixel(out: &mut [u8], pos: usize, r: u8, g: u8, b: u8) {
    out[pos] = r;
    out[pos + 1] = g;
    out[pos + 2] = b;
    out[pos + 3] = 255;
}

fn draw_gray_pixel(img: &[u8], pos: usize, out: &mut [u8]) {
    let r = img[pos] as f64;
    let g = img[pos + 1] as f64;
    let b = img[pos + 2] as f64;
    let a = img[pos + 3] as f64;
    let val = blend(rgb2y(r, g, b), GRAY_ALPHA * a / 255.0) as u8;
    draw_pixel(out, pos, val, val, val);
}

fn blend(c: f64, a: f64) -> f64 {
    255.0 + (c - 255.0) * a
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}
