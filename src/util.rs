use geo::{Coord, LineString, Polygon};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::point::Point;
use ndarray::Array3;
use tracing::instrument;

pub(crate) fn to_geo_poly(points: &[Point<i32>]) -> Polygon<f32> {
    let points = points
        .iter()
        .map(|point| Coord {
            x: point.x as f32,
            y: point.y as f32,
        })
        .collect();
    Polygon::new(LineString::new(points), vec![])
}

/// Extracts a `size` window centered at `center`, replicating border pixels
/// where the window leaves the raster.
pub(crate) fn crop_centered<P: Pixel>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    center: (f32, f32),
    size: (u32, u32),
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let left = center.0 - size.0 as f32 / 2.0;
    let top = center.1 - size.1 as f32 / 2.0;
    let max_x = image.width().saturating_sub(1) as f32;
    let max_y = image.height().saturating_sub(1) as f32;
    ImageBuffer::from_fn(size.0, size.1, |x, y| {
        let sx = (left + x as f32).round().clamp(0.0, max_x) as u32;
        let sy = (top + y as f32).round().clamp(0.0, max_y) as u32;
        *image.get_pixel(sx, sy)
    })
}

/// Crops `size` around `center`, undoes the in-plane tilt, then re-crops the
/// tight `target` window from the middle of the straightened patch.
pub(crate) fn deskew_crop_gray(
    image: &GrayImage,
    center: (f32, f32),
    size: (u32, u32),
    angle: f32,
    target: (u32, u32),
) -> GrayImage {
    let sub = crop_centered(image, center, size);
    let straight = rotate_about_center(
        &sub,
        -angle.to_radians(),
        Interpolation::Bilinear,
        Luma([0u8]),
    );
    let mid = (size.0 as f32 / 2.0, size.1 as f32 / 2.0);
    crop_centered(&straight, mid, target)
}

pub(crate) fn deskew_crop_rgb(
    image: &RgbImage,
    center: (f32, f32),
    size: (u32, u32),
    angle: f32,
    target: (u32, u32),
) -> RgbImage {
    let sub = crop_centered(image, center, size);
    let straight = rotate_about_center(
        &sub,
        -angle.to_radians(),
        Interpolation::Bilinear,
        Rgb([0u8, 0, 0]),
    );
    let mid = (size.0 as f32 / 2.0, size.1 as f32 / 2.0);
    crop_centered(&straight, mid, target)
}

#[instrument(level = "debug", skip(image))]
pub(crate) fn subtract_mean_normalize(
    image: &DynamicImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array3<f32> {
    let mut image = image.to_rgb32f();
    let norm = Rgb::<f32>(*norm_vals);
    let mean_vals = Rgb::<f32>(*mean_vals).map2(&norm, |c1, c2| c1 * c2);
    for pixel in image.pixels_mut() {
        *pixel = pixel
            .map2(&norm, |c1, c2| c1 * c2)
            .map2(&mean_vals, |c1, c2| c1 - c2);
    }
    Array3::<f32>::from_shape_fn(
        (3, image.height() as usize, image.width() as usize),
        |(ch, y, x)| image.get_pixel(x as u32, y as u32).channels()[ch],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([(x + y * width) as u8]))
    }

    #[test]
    fn crop_centered_reads_interior_window() {
        let image = gradient_image(10, 10);
        let crop = crop_centered(&image, (5.0, 5.0), (4, 2));
        assert_eq!(crop.dimensions(), (4, 2));
        assert_eq!(crop.get_pixel(0, 0), image.get_pixel(3, 4));
        assert_eq!(crop.get_pixel(3, 1), image.get_pixel(6, 5));
    }

    #[test]
    fn crop_centered_replicates_border() {
        let image = gradient_image(4, 4);
        let crop = crop_centered(&image, (0.0, 0.0), (4, 4));
        // Window extends past the top-left corner; outside pixels clamp to it.
        assert_eq!(crop.get_pixel(0, 0), image.get_pixel(0, 0));
        assert_eq!(crop.get_pixel(1, 1), image.get_pixel(0, 0));
    }

    #[test]
    fn deskew_crop_with_zero_angle_is_plain_crop() {
        let image = gradient_image(20, 20);
        let direct = crop_centered(&image, (10.0, 10.0), (8, 4));
        let deskewed = deskew_crop_gray(&image, (10.0, 10.0), (8, 4), 0.0, (8, 4));
        assert_eq!(direct, deskewed);
    }
}
