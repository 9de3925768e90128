//! CPU rendition of the fragment-stage filters.
//!
//! Mirrors the shader for an output surface the size of the source image:
//! nearest sampling, clamp-to-edge addressing and unclamped `f32` results. Used
//! to check GPU output and to pin down the filter arithmetic in unit tests.

use image::{Rgba, Rgba32FImage, RgbaImage};

use super::{FilterMode, Kernel, Palette, LUMINANCE_WEIGHTS};
use crate::source::SourceImage;

/// Applies `mode` to every pixel of `image`.
pub fn apply(image: &SourceImage, mode: &FilterMode) -> Rgba32FImage {
    let (width, height) = image.dimensions();
    Rgba32FImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let texel = image.texel_clamped(x, y);
        Rgba(match mode {
            FilterMode::None => texel,
            FilterMode::Grayscale => grayscale(texel),
            FilterMode::Inverse => [1.0 - texel[0], 1.0 - texel[1], 1.0 - texel[2], 1.0],
            FilterMode::Kernel(kernel) => convolve(image, kernel, x, y),
            FilterMode::ColorPalette(palette) => remap(palette, texel),
        })
    })
}

/// Quantizes the way a `Rgba8Unorm` render target stores a fragment.
pub fn quantize(image: &Rgba32FImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba(image.get_pixel(x, y).0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
    })
}

fn grayscale(texel: [f32; 4]) -> [f32; 4] {
    let [r, g, b] = LUMINANCE_WEIGHTS;
    let l = r * texel[0] + g * texel[1] + b * texel[2];
    [l, l, l, 1.0]
}

fn convolve(image: &SourceImage, kernel: &Kernel, x: i64, y: i64) -> [f32; 4] {
    let mut sum = [0.0f32; 3];
    for (index, weight) in kernel.weights().iter().enumerate() {
        let dx = (index % 3) as i64 - 1;
        let dy = (index / 3) as i64 - 1;
        let texel = image.texel_clamped(x + dx, y + dy);
        for channel in 0..3 {
            sum[channel] += texel[channel] * weight;
        }
    }
    let divisor = kernel.weight();
    [sum[0] / divisor, sum[1] / divisor, sum[2] / divisor, 1.0]
}

fn remap(palette: &Palette, texel: [f32; 4]) -> [f32; 4] {
    palette.lookup(texel[0]).map(|c| c as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn assert_close(actual: &Rgba32FImage, expected: &Rgba32FImage) {
        assert_eq!(actual.dimensions(), expected.dimensions());
        for (a, e) in actual.pixels().zip(expected.pixels()) {
            for channel in 0..4 {
                assert!(
                    (a.0[channel] - e.0[channel]).abs() < EPSILON,
                    "{:?} != {:?}",
                    a.0,
                    e.0
                );
            }
        }
    }

    fn gradient(width: u32, height: u32) -> SourceImage {
        let pixels = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                (x * 37 % 256) as u8,
                (y * 59 % 256) as u8,
                ((x + y) * 23 % 256) as u8,
                255,
            ])
        });
        SourceImage::from_rgba8(pixels).unwrap()
    }

    fn as_source(image: &Rgba32FImage) -> SourceImage {
        SourceImage::from_rgba8(quantize(image)).unwrap()
    }

    #[test]
    fn output_keeps_input_dimensions() {
        let image = gradient(7, 3);
        let modes = [
            FilterMode::None,
            FilterMode::Grayscale,
            FilterMode::Inverse,
            FilterMode::Kernel(Kernel::box_blur()),
            FilterMode::ColorPalette(Palette::grayscale_ramp()),
        ];
        for mode in &modes {
            assert_eq!(apply(&image, mode).dimensions(), (7, 3), "{mode}");
        }
    }

    #[test]
    fn grayscale_is_idempotent() {
        let once = apply(&gradient(5, 5), &FilterMode::Grayscale);
        let twice = apply(&as_source(&once), &FilterMode::Grayscale);
        for (a, b) in once.pixels().zip(twice.pixels()) {
            // One quantization step between passes.
            assert!((a.0[0] - b.0[0]).abs() <= 1.0 / 255.0);
            assert_eq!(b.0[3], 1.0);
        }
    }

    #[test]
    fn inverse_is_involutive() {
        let image = gradient(4, 6);
        let twice = apply(&as_source(&apply(&image, &FilterMode::Inverse)), &FilterMode::Inverse);
        assert_close(&twice, &apply(&image, &FilterMode::None));
    }

    #[test]
    fn identity_kernel_reproduces_input() {
        let image = gradient(6, 4);
        let filtered = apply(&image, &FilterMode::Kernel(Kernel::identity()));
        assert_close(&filtered, &apply(&image, &FilterMode::None));
    }

    #[test]
    fn box_kernel_yields_neighbourhood_mean() {
        // Red channel only; values chosen so the centre mean is 45/255.
        let reds = [10u8, 20, 30, 40, 50, 60, 70, 80, 45];
        let data = reds.iter().flat_map(|&r| [r, 0, 0, 255]).collect();
        let image = SourceImage::from_raw(3, 3, data).unwrap();
        let filtered = apply(&image, &FilterMode::Kernel(Kernel::box_blur()));

        let centre = filtered.get_pixel(1, 1).0;
        let expected = reds.iter().map(|&r| r as f32).sum::<f32>() / 9.0 / 255.0;
        assert!((centre[0] - expected).abs() < EPSILON);
        assert_eq!(centre[3], 1.0);

        // Top-left corner clamps: rows/cols 0 counted twice.
        let corner = filtered.get_pixel(0, 0).0;
        let clamped = [10, 10, 20, 10, 10, 20, 40, 40, 50];
        let expected = clamped.iter().sum::<i32>() as f32 / 9.0 / 255.0;
        assert!((corner[0] - expected).abs() < EPSILON);
    }

    #[test]
    fn grayscale_ramp_palette_reproduces_grayscale_source() {
        let gray = as_source(&apply(&gradient(8, 8), &FilterMode::Grayscale));
        let remapped = apply(&gray, &FilterMode::ColorPalette(Palette::grayscale_ramp()));
        assert_close(&remapped, &apply(&gray, &FilterMode::None));
    }

    #[test]
    fn grayscale_of_primaries() {
        let data = vec![
            255, 0, 0, 255, //
            0, 255, 0, 255, //
            0, 0, 255, 255, //
            255, 255, 255, 255,
        ];
        let image = SourceImage::from_raw(2, 2, data).unwrap();
        let filtered = apply(&image, &FilterMode::Grayscale);
        let expected = [(0, 0, 0.59), (1, 0, 0.30), (0, 1, 0.11), (1, 1, 1.0)];
        for (x, y, l) in expected {
            let pixel = filtered.get_pixel(x, y).0;
            for channel in 0..3 {
                assert!((pixel[channel] - l).abs() < EPSILON, "({x},{y}) {pixel:?}");
            }
            assert_eq!(pixel[3], 1.0);
        }
    }

    #[test]
    fn negated_box_kernel_still_averages() {
        let image = gradient(5, 5);
        let negated = apply(&image, &FilterMode::Kernel(Kernel::new([-1.0; 9])));
        let blurred = apply(&image, &FilterMode::Kernel(Kernel::box_blur()));
        assert_close(&negated, &blurred);
    }

    #[test]
    fn edge_kernels_are_not_clamped() {
        let image = SourceImage::from_raw(1, 1, vec![255, 255, 255, 255]).unwrap();
        let kernel = Kernel::with_weight([0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0], 1.0);
        let filtered = apply(&image, &FilterMode::Kernel(kernel));
        assert_eq!(filtered.get_pixel(0, 0).0, [2.0, 2.0, 2.0, 1.0]);
        assert_eq!(quantize(&filtered).get_pixel(0, 0).0, [255, 255, 255, 255]);
    }
}
