use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::{bilateral_filter, filter3x3, gaussian_blur_f32};
use imageproc::gradients::horizontal_sobel;
use imageproc::morphology::{grayscale_close, Mask};
use tracing::instrument;

use crate::StageSink;

/// 3x3 kernel emphasizing horizontal intensity change; boosts the vertical
/// strokes plate characters are made of.
const SHARPEN_KERNEL: [i16; 9] = [-1, 0, 1, -2, 0, 2, 1, 0, 1];

/// Sigma matching a 5x5 Gaussian window.
const GAUSSIAN_SIGMA: f32 = 1.1;

/// Collapses a color raster into a binary map where regions dense in
/// character-like edges show up as elongated white blobs.
///
/// Each step is a pure transform: grayscale, directional sharpen, Gaussian
/// smoothing, horizontal Sobel, Otsu binarization, then a morphological close
/// that bridges the gaps between adjacent character edges.
#[instrument(level = "debug", skip(image, sink))]
pub(crate) fn edge_feature_map(
    image: &DynamicImage,
    closing_kernel: (u8, u8),
    sink: &dyn StageSink,
) -> GrayImage {
    let gray = image.to_luma8();
    sink.stage("gray", &gray);

    let sharpened = filter3x3::<Luma<u8>, i16, u8>(&gray, &SHARPEN_KERNEL);
    sink.stage("sharpen", &sharpened);

    let smoothed = gaussian_blur_f32(&sharpened, GAUSSIAN_SIGMA);
    let sobel = horizontal_sobel(&smoothed);
    // Saturate back to u8; negative responses carry no extra information here.
    let gradient = ImageBuffer::from_fn(sobel.width(), sobel.height(), |x, y| {
        Luma([sobel.get_pixel(x, y)[0].clamp(0, 255) as u8])
    });
    sink.stage("sobel", &gradient);

    let binary = otsu_binarize(&gradient);
    sink.stage("binary", &binary);

    let mask = Mask::from_image(
        &GrayImage::from_pixel(
            closing_kernel.0.into(),
            closing_kernel.1.into(),
            Luma([255]),
        ),
        (closing_kernel.0 - 1) / 2,
        (closing_kernel.1 - 1) / 2,
    );
    let closed = grayscale_close(&binary, &mask);
    sink.stage("closed", &closed);
    closed
}

/// Global binarization with the threshold that minimizes intra-class variance.
pub(crate) fn otsu_binarize(image: &GrayImage) -> GrayImage {
    let (lo, hi) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| {
            (lo.min(p.0[0]), hi.max(p.0[0]))
        });
    // A uniform patch has no separating threshold; short-circuit so bright
    // patches stay foreground instead of vanishing behind their own level.
    if lo == hi {
        return threshold(image, 0, ThresholdType::Binary);
    }
    let level = otsu_level(image);
    threshold(image, level, ThresholdType::Binary)
}

/// Cleanup pass for crops handed to text recognition: edge-preserving
/// smoothing followed by global binarization.
pub fn preprocess_for_ocr(crop: &DynamicImage) -> GrayImage {
    let gray = crop.to_luma8();
    let smoothed = bilateral_filter(&gray, 11, 17.0, 17.0);
    otsu_binarize(&smoothed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullSink;
    use image::Rgb;

    #[test]
    fn flat_image_produces_empty_edge_map() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(64, 48, Rgb([90, 90, 90])));
        let closed = edge_feature_map(&image, (17, 5), &NullSink);
        assert_eq!(closed.dimensions(), (64, 48));
        assert!(closed.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn stripes_survive_as_foreground_blob() {
        let image = image::RgbImage::from_fn(96, 48, |x, _| {
            if (20..76).contains(&x) && (x / 4) % 2 == 0 {
                Rgb([250, 250, 250])
            } else {
                Rgb([20, 20, 20])
            }
        });
        let closed = edge_feature_map(&DynamicImage::ImageRgb8(image), (17, 5), &NullSink);
        let white = closed.pixels().filter(|p| p.0[0] > 0).count();
        assert!(white > 200, "expected a merged blob, got {white} white pixels");
    }
}
