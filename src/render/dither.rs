//! # Dithering
//!
//! This module converts a grayscale [`RawImage`] into pure black and white
//! in place, so the encoder's `< 128` test produces a pleasing halftone.
//!
//! ## What is Dithering?
//!
//! Dithering simulates grayscale on a device that can only print black or
//! white. By varying the density of black dots, we create the illusion of
//! different gray levels.
//!
//! ```text
//! Grayscale:    White    Light    Medium    Dark    Black
//!               ░░░░░░   ░░▒░░░   ░▒░▒░▒   ▒▓▒▓▒▓   ██████
//! ```
//!
//! ## Available Modes
//!
//! | Mode | Speed | Quality | Artifacts |
//! |------|-------|---------|-----------|
//! | Atkinson | Fast | Good, high contrast | Blown highlights |
//! | Floyd-Steinberg | Fast | Best for photos | Worms |
//! | Bayer | Fastest | Good for flat art | Regular pattern |
//! | Threshold | Fastest | Poor | Banding |
//! | None | - | - | Encoder cuts at 128 |
//!
//! ## Atkinson Error Diffusion
//!
//! Each pixel is quantized to 0 or 255 and the error is spread to six
//! neighbors at 1/8 each. Only 6/8 of the error survives, which keeps
//! thermal output crisp:
//!
//! ```text
//!          X   1/8 1/8
//!     1/8 1/8 1/8
//!         1/8
//! ```
//!
//! Neighbors outside the image are skipped, never wrapped. Values are
//! clamped to 0..=255 after every addition.
//!
//! ## Determinism
//!
//! All modes are pure integer arithmetic over the buffer: the same pixels
//! and mode always produce byte-identical output.

use std::time::Instant;

use log::debug;

use super::image::RawImage;
use crate::printer::DitherMode;

/// Midpoint: values below are black
pub const THRESHOLD: u8 = 128;

/// Bayer 8x8 dithering matrix
///
/// Values range from 0-63. The pattern creates a pleasing halftone screen
/// when used as thresholds for binary conversion.
pub const BAYER8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Atkinson neighbor offsets `(dx, dy)`
const ATKINSON_NEIGHBORS: [(isize, usize); 6] = [(1, 0), (2, 0), (-1, 1), (0, 1), (1, 1), (0, 2)];

/// Dither `img` in place with `mode`.
pub fn apply(img: &mut RawImage, mode: DitherMode) {
    let start = Instant::now();
    match mode {
        DitherMode::Atkinson => atkinson(img),
        DitherMode::FloydSteinberg => floyd_steinberg(img),
        DitherMode::Bayer => bayer(img),
        DitherMode::Threshold => threshold(img),
        DitherMode::None => return,
    }
    debug!(
        "{} dither {}x{} took {} ms",
        mode,
        img.width,
        img.height,
        start.elapsed().as_millis()
    );
}

#[inline]
fn quantize(value: u8) -> u8 {
    if value < THRESHOLD { 0 } else { 255 }
}

#[inline]
fn add_clamped(value: u8, delta: i32) -> u8 {
    (value as i32 + delta).clamp(0, 255) as u8
}

/// Hard threshold: `< 128` becomes 0, everything else 255.
pub fn threshold(img: &mut RawImage) {
    for p in img.pixels.iter_mut() {
        *p = quantize(*p);
    }
}

/// Atkinson error diffusion (see module docs).
///
/// The per-neighbor share is `error >> 3`, an arithmetic shift, so
/// negative errors round toward negative infinity.
pub fn atkinson(img: &mut RawImage) {
    let (w, h) = (img.width, img.height);
    let g = &mut img.pixels;

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let old = g[idx];
            let new = quantize(old);
            g[idx] = new;

            let share = (old as i32 - new as i32) >> 3;
            if share == 0 {
                continue;
            }

            for (dx, dy) in ATKINSON_NEIGHBORS {
                let nx = x as isize + dx;
                let ny = y + dy;
                if nx < 0 || nx as usize >= w || ny >= h {
                    continue;
                }
                let n = ny * w + nx as usize;
                g[n] = add_clamped(g[n], share);
            }
        }
    }
}

/// Floyd-Steinberg error diffusion, in place with clamping.
///
/// ```text
///          X   7/16
///   3/16 5/16  1/16
/// ```
pub fn floyd_steinberg(img: &mut RawImage) {
    let (w, h) = (img.width, img.height);
    let g = &mut img.pixels;

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let old = g[idx];
            let new = quantize(old);
            g[idx] = new;

            let err = old as i32 - new as i32;
            if err == 0 {
                continue;
            }

            if x + 1 < w {
                g[idx + 1] = add_clamped(g[idx + 1], err * 7 / 16);
            }
            if y + 1 < h {
                let below = idx + w;
                if x > 0 {
                    g[below - 1] = add_clamped(g[below - 1], err * 3 / 16);
                }
                g[below] = add_clamped(g[below], err * 5 / 16);
                if x + 1 < w {
                    g[below + 1] = add_clamped(g[below + 1], err / 16);
                }
            }
        }
    }
}

/// Get the Bayer threshold for a pixel position, in (0, 1).
///
/// ```text
/// matrix_value = BAYER8[y mod 8][x mod 8]
/// threshold = (matrix_value + 0.5) / 64.0
/// ```
#[inline]
pub fn bayer_threshold(x: usize, y: usize) -> f32 {
    let matrix_value = BAYER8[y & 7][x & 7];
    (matrix_value as f32 + 0.5) / 64.0
}

/// Bayer 8x8 ordered dither.
///
/// Darkness (`1 - value/255`) above the cell threshold prints black, so
/// pure black always prints and pure white never does.
pub fn bayer(img: &mut RawImage) {
    let w = img.width;
    for (i, p) in img.pixels.iter_mut().enumerate() {
        let darkness = 1.0 - (*p as f32 / 255.0);
        *p = if darkness > bayer_threshold(i % w, i / w) { 0 } else { 255 };
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_image(width: usize, height: usize, seed: u64) -> RawImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let pixels = (0..width * height).map(|_| rng.random::<u8>()).collect();
        RawImage::new(width, height, pixels).unwrap()
    }

    fn is_binary(img: &RawImage) -> bool {
        img.pixels.iter().all(|&p| p == 0 || p == 255)
    }

    #[test]
    fn test_bayer_matrix_values() {
        let mut seen = [false; 64];
        for row in &BAYER8 {
            for &val in row {
                assert!(val < 64, "Matrix value {} out of range", val);
                assert!(!seen[val as usize], "Duplicate value {}", val);
                seen[val as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "Not all values 0-63 present");
    }

    #[test]
    fn test_bayer_threshold_range() {
        for y in 0..8 {
            for x in 0..8 {
                let t = bayer_threshold(x, y);
                assert!(t > 0.0 && t < 1.0);
                assert_eq!(t, bayer_threshold(x + 8, y + 8));
            }
        }
    }

    #[test]
    fn test_threshold_polarity() {
        let mut img = RawImage::new(4, 1, vec![0, 127, 128, 255]).unwrap();
        threshold(&mut img);
        assert_eq!(img.pixels, vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_threshold_output_is_binary() {
        let mut img = random_image(50, 20, 7);
        let original = img.clone();
        threshold(&mut img);
        assert!(is_binary(&img));
        for (before, after) in original.pixels.iter().zip(&img.pixels) {
            assert_eq!(*after == 0, *before < 128);
        }
    }

    /// Straight-line Atkinson: every neighbor written out by hand.
    fn atkinson_by_hand(w: usize, h: usize, mut g: Vec<u8>) -> Vec<u8> {
        let spread = |g: &mut Vec<u8>, x: isize, y: usize, share: i32| {
            if x >= 0 && (x as usize) < w && y < h {
                let i = y * w + x as usize;
                g[i] = (g[i] as i32 + share).clamp(0, 255) as u8;
            }
        };
        for y in 0..h {
            for x in 0..w {
                let old = g[y * w + x] as i32;
                let new = if old < 128 { 0 } else { 255 };
                g[y * w + x] = new as u8;
                let share = (old - new) >> 3;
                let xi = x as isize;
                spread(&mut g, xi + 1, y, share);
                spread(&mut g, xi + 2, y, share);
                spread(&mut g, xi - 1, y + 1, share);
                spread(&mut g, xi, y + 1, share);
                spread(&mut g, xi + 1, y + 1, share);
                spread(&mut g, xi, y + 2, share);
            }
        }
        g
    }

    #[test]
    fn test_atkinson_neighbors_and_shares() {
        let sizes = [(1, 1), (2, 3), (3, 2), (7, 5), (64, 40), (129, 3), (1, 9)];
        for (seed, (w, h)) in sizes.into_iter().enumerate() {
            let mut img = random_image(w, h, 100 + seed as u64);
            let expected = atkinson_by_hand(w, h, img.pixels.clone());
            atkinson(&mut img);
            assert_eq!(img.pixels, expected, "{}x{}", w, h);
        }
    }

    #[test]
    fn test_atkinson_single_row() {
        // 127 -> 0 pushes 15 into (1,0) and (2,0): 113 + 15 = 128 turns white,
        // whose -16 then pulls (2,0) and (3,0) back under
        let mut img = RawImage::new(5, 1, vec![127, 113, 113, 113, 113]).unwrap();
        atkinson(&mut img);
        assert_eq!(img.pixels, vec![0, 255, 0, 0, 255]);
    }

    #[test]
    fn test_atkinson_distribution() {
        let mut img = RawImage::filled(3, 3, 120);
        img.pixels[0] = 127; // -> 0, error 127, share 15
        atkinson(&mut img);
        // (1,0) = 120 + 15 = 135 -> 255
        assert_eq!(img.get(1, 0), 255);
        assert!(is_binary(&img));
    }

    #[test]
    fn test_atkinson_negative_error_rounds_down() {
        // 200 -> 255, error -55, share -55 >> 3 = -7
        let mut img = RawImage::new(2, 1, vec![200, 134]).unwrap();
        atkinson(&mut img);
        // 134 - 7 = 127 -> black
        assert_eq!(img.pixels, vec![255, 0]);
    }

    #[test]
    fn test_atkinson_skips_out_of_bounds() {
        // 1x1 image: no neighbors at all
        let mut img = RawImage::new(1, 1, vec![90]).unwrap();
        atkinson(&mut img);
        assert_eq!(img.pixels, vec![0]);
    }

    #[test]
    fn test_atkinson_is_deterministic() {
        let source = random_image(97, 61, 42);
        let mut a = source.clone();
        let mut b = source.clone();
        atkinson(&mut a);
        atkinson(&mut b);
        assert_eq!(a, b);
        assert!(is_binary(&a));
    }

    #[test]
    fn test_floyd_steinberg_is_binary_and_deterministic() {
        let source = random_image(64, 33, 3);
        let mut a = source.clone();
        let mut b = source;
        floyd_steinberg(&mut a);
        floyd_steinberg(&mut b);
        assert_eq!(a, b);
        assert!(is_binary(&a));
    }

    #[test]
    fn test_mid_gray_prints_roughly_half() {
        for mode in [DitherMode::Atkinson, DitherMode::FloydSteinberg, DitherMode::Bayer] {
            let mut img = RawImage::filled(64, 64, 128);
            apply(&mut img, mode);
            let black = img.pixels.iter().filter(|&&p| p == 0).count();
            let ratio = black as f32 / (64.0 * 64.0);
            assert!(
                ratio > 0.25 && ratio < 0.75,
                "{} printed {:.2} black at 50% gray",
                mode,
                ratio
            );
        }
    }

    #[test]
    fn test_extremes_survive_every_mode() {
        for mode in DitherMode::ALL {
            let mut black = RawImage::filled(16, 16, 0);
            apply(&mut black, mode);
            assert!(black.pixels.iter().all(|&p| p == 0), "{} black", mode);

            let mut white = RawImage::filled(16, 16, 255);
            apply(&mut white, mode);
            assert!(white.pixels.iter().all(|&p| p == 255), "{} white", mode);
        }
    }

    #[test]
    fn test_none_leaves_gray() {
        let mut img = RawImage::filled(3, 3, 77);
        apply(&mut img, DitherMode::None);
        assert!(img.pixels.iter().all(|&p| p == 77));
    }
}
