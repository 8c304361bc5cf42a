//! Pixel statistics feeding the quality scores.
//!
//! Gray conversion, HSV saturation and the Laplacian follow the usual
//! 8-bit conventions (BT.601 luma weights, 3x3 aperture, reflected
//! borders) so scores are comparable with other tooling.

use image::{DynamicImage, RgbImage};
use relaize_core::metrics::{ImageStats, QualityScores};

/// 8-bit BT.601 luma of every pixel, row-major.
fn gray_levels(rgb: &RgbImage) -> Vec<u8> {
    rgb.pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            let y = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
            y.round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// HSV saturation on the 0..=255 scale.
fn saturation(r: u8, g: u8, b: u8) -> f64 {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == 0 {
        return 0.0;
    }
    (f64::from(max - min) * 255.0 / f64::from(max)).round()
}

fn mean_and_variance(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let (count, sum) = values.clone().fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    (mean, var)
}

/// Mirror an out-of-range index back into `0..len` without repeating the
/// edge pixel.
fn reflect101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let n = len as isize;
    let i = if i < 0 { -i } else { i };
    let i = if i >= n { 2 * n - 2 - i } else { i };
    i as usize
}

/// Variance of the 4-neighbour Laplacian of a gray image.
fn laplacian_variance(gray: &[u8], width: usize, height: usize) -> f64 {
    if width == 0 || height == 0 {
        return 0.0;
    }
    let at = |x: isize, y: isize| -> f64 {
        f64::from(gray[reflect101(y, height) * width + reflect101(x, width)])
    };
    let responses: Vec<f64> = (0..height as isize)
        .flat_map(|y| (0..width as isize).map(move |x| (x, y)))
        .map(|(x, y)| at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y))
        .collect();
    mean_and_variance(responses.iter().copied()).1
}

/// Shannon entropy in bits of the 256-bin histogram.
fn histogram_entropy(gray: &[u8]) -> f64 {
    if gray.is_empty() {
        return 0.0;
    }
    let mut hist = [0u64; 256];
    for &v in gray {
        hist[usize::from(v)] += 1;
    }
    let total = gray.len() as f64;
    -hist
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            p * p.log2()
        })
        .sum::<f64>()
}

/// Statistics of one decoded image.
pub fn image_stats(image: &DynamicImage) -> ImageStats {
    let rgb = image.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let gray = gray_levels(&rgb);

    let (mean_gray, var_gray) = mean_and_variance(gray.iter().map(|&v| f64::from(v)));
    let (mean_sat, _) = mean_and_variance(rgb.pixels().map(|p| saturation(p.0[0], p.0[1], p.0[2])));

    ImageStats {
        brightness: mean_gray / 255.0,
        contrast: var_gray.sqrt() / 64.0,
        saturation: mean_sat / 255.0,
        laplacian_variance: laplacian_variance(&gray, width, height),
        entropy: histogram_entropy(&gray),
    }
}

/// Quality scores of one decoded image.
pub fn quality_scores(image: &DynamicImage) -> QualityScores {
    QualityScores::from_stats(&image_stats(image))
}
