use float_ord::FloatOrd;
use geo::MinimumRotatedRect;
use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use tracing::instrument;

use crate::edges::otsu_binarize;
use crate::result::OrientedRect;
use crate::util::{deskew_crop_gray, deskew_crop_rgb, to_geo_poly};
use crate::DetectionOptions;

/// A candidate that cleared both geometric screening and the edge-density bar.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub rect: OrientedRect,
    /// Center of the axis-aligned bounding box of the rect corners.
    pub bbox_center: (f32, f32),
    /// Size of that bounding box; the deskew works inside this window.
    pub bbox_size: (u32, u32),
    /// Tight (long, short) dimensions of the straightened plate.
    pub plate_size: (u32, u32),
    pub deskew: f32,
    pub edge_density: f32,
}

/// Walks the external contours of the closed edge map and returns the first
/// candidate that passes validation and scoring. Later contours are never
/// considered once one is accepted.
#[instrument(level = "debug", skip(closed, options))]
pub(crate) fn locate_plate(closed: &GrayImage, options: &DetectionOptions) -> Option<Candidate> {
    find_contours::<i32>(closed)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .filter(|contour| contour.points.len() > 2)
        .filter_map(|contour| to_geo_poly(&contour.points).minimum_rotated_rect())
        .filter_map(|poly| OrientedRect::from_polygon(&poly))
        .filter(|rect| validate_rect(rect, closed.width(), options))
        .find_map(|rect| score_candidate(closed, &rect, options))
}

/// Geometric plausibility screen: plate-like candidates are markedly
/// elongated, not tiny, not image-sized, and not steeply tilted.
pub(crate) fn validate_rect(
    rect: &OrientedRect,
    image_width: u32,
    options: &DetectionOptions,
) -> bool {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return false;
    }
    let half_width = image_width as f32 / 2.0;
    if rect.width >= half_width || rect.height >= half_width {
        return false;
    }

    let (min_ratio, max_ratio) = options.aspect_ratio_range;
    let aspect = rect.width.max(rect.height) / rect.width.min(rect.height);
    if aspect < min_ratio || aspect > max_ratio {
        return false;
    }

    let area = rect.width * rect.height;
    if area <= options.min_area || area >= options.max_area {
        return false;
    }

    log::trace!(
        "candidate at {:?}: aspect {:.2}, area {:.0}, long-axis tilt {:.1} deg",
        rect.center,
        aspect,
        area,
        rect.long_axis_angle()
    );
    diagonal_tilt(rect) <= options.max_tilt_degrees
}

/// Tilt of the dominant diagonal relative to horizontal, in degrees.
///
/// From one corner, the point with the second-smallest squared distance is
/// the far corner along the long side; the short-edge neighbor would always
/// be nearest and says nothing about orientation.
fn diagonal_tilt(rect: &OrientedRect) -> f32 {
    let corners = rect.corners();
    let origin = corners[0];
    let mut rest: Vec<(f32, (f32, f32))> = corners[1..]
        .iter()
        .map(|p| {
            let d2 = (p.0 - origin.0).powi(2) + (p.1 - origin.1).powi(2);
            (d2, *p)
        })
        .collect();
    rest.sort_by_key(|(d2, _)| FloatOrd(*d2));
    let (_, far) = rest[1];

    let dx = (far.0 - origin.0).abs();
    if dx > 0.0 {
        ((far.1 - origin.1).abs() / dx).atan().to_degrees()
    } else {
        90.0
    }
}

/// Deskews the candidate window of the closed edge map, re-binarizes it and
/// measures the fraction of foreground pixels. Text-dense plate regions
/// clear the density bar; generic rectangular blobs do not.
#[instrument(level = "trace", skip(closed, options))]
fn score_candidate(
    closed: &GrayImage,
    rect: &OrientedRect,
    options: &DetectionOptions,
) -> Option<Candidate> {
    let corners = rect.corners();
    let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
    let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
    let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
    let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);

    let bbox_center = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);
    let bbox_size = (
        (max_x - min_x).round().max(1.0) as u32,
        (max_y - min_y).round().max(1.0) as u32,
    );
    let plate_size = (
        rect.width.max(rect.height).round().max(1.0) as u32,
        rect.width.min(rect.height).round().max(1.0) as u32,
    );
    let deskew = rect.deskew_angle();

    let patch = deskew_crop_gray(closed, bbox_center, bbox_size, deskew, plate_size);
    let binary = otsu_binarize(&patch);
    let density = edge_density(&binary);
    log::debug!("candidate at {:?}: edge density {density:.3}", rect.center);

    (density > options.min_edge_density).then_some(Candidate {
        rect: *rect,
        bbox_center,
        bbox_size,
        plate_size,
        deskew,
        edge_density: density,
    })
}

/// Fraction of foreground pixels; always in `[0, 1]`.
pub(crate) fn edge_density(binary: &GrayImage) -> f32 {
    let foreground = binary.pixels().filter(|p| p.0[0] > 0).count();
    foreground as f32 / (binary.width() * binary.height()) as f32
}

/// Repeats the accepted candidate's crop/rotate/re-crop against the original
/// color raster.
pub(crate) fn extract_plate(image: &DynamicImage, candidate: &Candidate) -> RgbImage {
    deskew_crop_rgb(
        &image.to_rgb8(),
        candidate.bbox_center,
        candidate.bbox_size,
        candidate.deskew,
        candidate.plate_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    const IMAGE_WIDTH: u32 = 400;

    fn rect(width: f32, height: f32, angle: f32) -> OrientedRect {
        OrientedRect {
            center: (200.0, 150.0),
            width,
            height,
            angle,
        }
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        let options = DetectionOptions::default();
        assert!(!validate_rect(&rect(0.0, 30.0, -90.0), IMAGE_WIDTH, &options));
        assert!(!validate_rect(&rect(40.0, -1.0, -90.0), IMAGE_WIDTH, &options));
    }

    #[test]
    fn rejects_near_image_sized_contours() {
        let options = DetectionOptions::default();
        // Half the image width is 200; either dimension at or past it fails.
        assert!(!validate_rect(&rect(50.0, 210.0, -90.0), IMAGE_WIDTH, &options));
        assert!(!validate_rect(&rect(200.0, 50.0, -90.0), IMAGE_WIDTH, &options));
    }

    #[test]
    fn aspect_ratio_boundary_is_exact() {
        let options = DetectionOptions::default();
        // Horizontal elongated rect in canonical form: short edge points down.
        assert!(validate_rect(&rect(10.0, 22.0, -90.0), IMAGE_WIDTH, &options));
        assert!(!validate_rect(&rect(10.0, 21.999, -90.0), IMAGE_WIDTH, &options));
        assert!(validate_rect(&rect(10.0, 120.0, -90.0), IMAGE_WIDTH, &options));
        assert!(!validate_rect(&rect(10.0, 121.0, -90.0), IMAGE_WIDTH, &options));
    }

    #[test]
    fn rejects_tiny_areas() {
        let options = DetectionOptions::default();
        // Aspect 3.0 but area 108 is below the noise floor.
        assert!(!validate_rect(&rect(6.0, 18.0, -90.0), IMAGE_WIDTH, &options));
    }

    #[test]
    fn rejects_steep_diagonals() {
        let options = DetectionOptions::default();
        // Long axis tilted 60 degrees from horizontal reads as a diamond.
        assert!(!validate_rect(&rect(100.0, 20.0, -60.0), IMAGE_WIDTH, &options));
        assert!(validate_rect(&rect(100.0, 20.0, -30.0), IMAGE_WIDTH, &options));
    }

    #[test]
    fn edge_density_spans_unit_interval() {
        let white = GrayImage::from_pixel(40, 10, Luma([255]));
        let black = GrayImage::from_pixel(40, 10, Luma([0]));
        assert_eq!(edge_density(&white), 1.0);
        assert_eq!(edge_density(&black), 0.0);

        let half = GrayImage::from_fn(40, 10, |x, _| Luma([if x < 20 { 255 } else { 0 }]));
        assert!((edge_density(&half) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_edge_map_yields_no_candidate() {
        let closed = GrayImage::from_pixel(200, 100, Luma([0]));
        assert!(locate_plate(&closed, &DetectionOptions::default()).is_none());
    }

    #[test]
    fn solid_elongated_blob_is_accepted() {
        // 120x30 solid blob: aspect 4, area 3600, fully dense after deskew.
        let closed = GrayImage::from_fn(300, 200, |x, y| {
            Luma([if (90..210).contains(&x) && (85..115).contains(&y) {
                255
            } else {
                0
            }])
        });
        let candidate = locate_plate(&closed, &DetectionOptions::default())
            .expect("blob should pass validation and scoring");
        assert!(candidate.edge_density > 0.5);
        assert!((candidate.bbox_center.0 - 150.0).abs() < 3.0);
        assert!((candidate.bbox_center.1 - 100.0).abs() < 3.0);
    }
}
