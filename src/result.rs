use geo::{Coord, Polygon};
use image::DynamicImage;

/// Minimum-area bounding rectangle of a contour.
///
/// `angle` is kept in the `[-90, 0)` degree range, swapping `width` and
/// `height` as needed so that `angle` is always the direction of the edge
/// with length `width`. This mirrors the rectangle convention the screening
/// thresholds were tuned against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedRect {
    pub center: (f32, f32),
    pub width: f32,
    pub height: f32,
    /// Rotation of the `width` edge relative to horizontal, in degrees.
    pub angle: f32,
}

impl OrientedRect {
    /// Derives the rectangle from a minimum rotated rect polygon.
    ///
    /// Returns `None` for degenerate rings with fewer than four corners.
    pub(crate) fn from_polygon(poly: &Polygon<f32>) -> Option<Self> {
        let corners: Vec<Coord<f32>> = poly.exterior().coords().copied().collect();
        if corners.len() < 4 {
            return None;
        }
        let [p0, p1, p2, p3] = [corners[0], corners[1], corners[2], corners[3]];

        let mut width = distance(p0, p1);
        let mut height = distance(p1, p2);
        let center = (
            (p0.x + p1.x + p2.x + p3.x) / 4.0,
            (p0.y + p1.y + p2.y + p3.y) / 4.0,
        );

        let raw = (p1.y - p0.y).atan2(p1.x - p0.x).to_degrees();
        let mut angle = raw.rem_euclid(180.0);
        if angle >= 90.0 {
            angle -= 180.0;
        }
        if angle >= 0.0 {
            angle -= 90.0;
            std::mem::swap(&mut width, &mut height);
        }

        Some(Self {
            center,
            width,
            height,
            angle,
        })
    }

    /// The four corner points, in winding order.
    pub fn corners(&self) -> [(f32, f32); 4] {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        let u = (cos * hw, sin * hw);
        let v = (-sin * hh, cos * hh);
        let (cx, cy) = self.center;
        [
            (cx - u.0 - v.0, cy - u.1 - v.1),
            (cx + u.0 - v.0, cy + u.1 - v.1),
            (cx + u.0 + v.0, cy + u.1 + v.1),
            (cx - u.0 + v.0, cy - u.1 + v.1),
        ]
    }

    /// Tilt of the long axis: the reference frame is turned by 180 degrees
    /// when the rectangle is taller than wide, by 90 degrees otherwise.
    pub fn long_axis_angle(&self) -> f32 {
        if self.width < self.height {
            self.angle + 180.0
        } else {
            self.angle + 90.0
        }
    }

    /// Rotation to undo before cropping, within a canonical ±45 degree band.
    pub fn deskew_angle(&self) -> f32 {
        normalize_deskew_angle(self.angle)
    }
}

/// Folds a rectangle angle into the ±45 degree band used for deskewing.
/// Idempotent over the canonical `[-90, 0)` input range.
pub fn normalize_deskew_angle(angle: f32) -> f32 {
    if angle < -45.0 {
        angle + 90.0
    } else {
        angle
    }
}

fn distance(a: Coord<f32>, b: Coord<f32>) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// An accepted plate region. At most one is produced per image.
#[derive(Debug, Clone)]
pub struct PlateRegion {
    /// Oriented bounds of the plate in the source image.
    pub rect: OrientedRect,
    /// Fraction of foreground pixels in the deskewed, re-binarized edge crop.
    pub edge_density: f32,
    /// Deskewed crop of the original color raster.
    pub crop: DynamicImage,
}

#[derive(Debug, Clone, Default)]
pub struct TextLine {
    pub text: String,
    pub character_scores: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    fn rect_poly(coords: &[(f32, f32)]) -> Polygon<f32> {
        Polygon::new(
            LineString::new(coords.iter().map(|&(x, y)| Coord { x, y }).collect()),
            vec![],
        )
    }

    #[test]
    fn axis_aligned_polygon_round_trips() {
        let poly = rect_poly(&[
            (10.0, 20.0),
            (50.0, 20.0),
            (50.0, 30.0),
            (10.0, 30.0),
            (10.0, 20.0),
        ]);
        let rect = OrientedRect::from_polygon(&poly).unwrap();
        assert_eq!(rect.center, (30.0, 25.0));
        // First edge is horizontal, so the canonical form swaps to angle -90.
        assert_eq!(rect.angle, -90.0);
        assert_eq!((rect.width, rect.height), (10.0, 40.0));

        let corners = rect.corners();
        let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);
        assert!((min_x - 10.0).abs() < 1e-3 && (max_x - 50.0).abs() < 1e-3);
        assert!((min_y - 20.0).abs() < 1e-3 && (max_y - 30.0).abs() < 1e-3);
    }

    #[test]
    fn degenerate_ring_is_rejected() {
        let poly = rect_poly(&[(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        assert!(OrientedRect::from_polygon(&poly).is_none());
    }

    #[test]
    fn deskew_normalization_is_idempotent() {
        for angle in [-90.0f32, -67.3, -45.0, -44.9, -10.0, -0.5] {
            let once = normalize_deskew_angle(angle);
            assert_eq!(normalize_deskew_angle(once), once);
            assert!((-45.0..=45.0).contains(&once));
        }
    }

    #[test]
    fn long_axis_angle_follows_dominant_dimension() {
        let wide = OrientedRect {
            center: (0.0, 0.0),
            width: 40.0,
            height: 10.0,
            angle: -10.0,
        };
        assert_eq!(wide.long_axis_angle(), 80.0);

        let tall = OrientedRect {
            center: (0.0, 0.0),
            width: 10.0,
            height: 40.0,
            angle: -80.0,
        };
        assert_eq!(tall.long_axis_angle(), 100.0);
    }
}
