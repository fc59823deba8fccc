//! Geometric primitives for document regions.
//!
//! All types are plain values: operations return new values instead of
//! mutating in place, and every coordinate is an integer pixel position.
//! Rescaling rounds to the nearest integer so that scaling by `r` and then
//! `1/r` restores the original up to rounding, but not necessarily exactly.

use image::GrayImage;
use imageproc::contours::{self, BorderType};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::{QuireError, QuireResult};

/// A 2D point with integer pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    /// Creates a new point.
    #[inline]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns this point scaled by `ratio`, rounded to the nearest pixel.
    pub fn rescale(&self, ratio: f64) -> Self {
        Self {
            x: scale_coord(self.x, ratio),
            y: scale_coord(self.y, ratio),
        }
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An axis-aligned bounding box, half-open on the max edge: a box of
/// width `w` starting at `x` spans `x..x + w`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbox {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl Bbox {
    /// Creates a bounding box from its corner coordinates.
    #[inline]
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Creates a box of the given size anchored at the origin.
    #[inline]
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    #[inline]
    pub fn x1(&self) -> i32 {
        self.x1
    }

    #[inline]
    pub fn y1(&self) -> i32 {
        self.y1
    }

    #[inline]
    pub fn x2(&self) -> i32 {
        self.x2
    }

    #[inline]
    pub fn y2(&self) -> i32 {
        self.y2
    }

    /// Top-left corner.
    #[inline]
    pub fn p1(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    /// Bottom-right corner (exclusive).
    #[inline]
    pub fn p2(&self) -> Point {
        Point::new(self.x2, self.y2)
    }

    /// Box width; degenerate boxes report 0.
    #[inline]
    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    /// Box height; degenerate boxes report 0.
    #[inline]
    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    /// True if the box covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// Returns this box translated by `offset`.
    pub fn move_by(&self, offset: Point) -> Self {
        Self::new(
            self.x1 + offset.x,
            self.y1 + offset.y,
            self.x2 + offset.x,
            self.y2 + offset.y,
        )
    }

    /// Returns this box scaled by `ratio`, each corner rounded to the
    /// nearest pixel.
    pub fn rescale(&self, ratio: f64) -> Self {
        Self::new(
            scale_coord(self.x1, ratio),
            scale_coord(self.y1, ratio),
            scale_coord(self.x2, ratio),
            scale_coord(self.y2, ratio),
        )
    }

    /// Returns this box clipped to a `width` x `height` raster.
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        Self::new(
            self.x1.clamp(0, width as i32),
            self.y1.clamp(0, height as i32),
            self.x2.clamp(0, width as i32),
            self.y2.clamp(0, height as i32),
        )
    }

    /// The box outline as a four-corner polygon.
    pub fn polygon(&self) -> Polygon {
        Polygon::new(vec![
            Point::new(self.x1, self.y1),
            Point::new(self.x2, self.y1),
            Point::new(self.x2, self.y2),
            Point::new(self.x1, self.y2),
        ])
    }
}

impl fmt::Display for Bbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x1, self.y1, self.x2, self.y2)
    }
}

/// An ordered sequence of points outlining a region.
///
/// `Display` renders the PAGE/ALTO points syntax: `"x,y x,y ..."`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    /// Creates a polygon from its vertices.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// The polygon's vertices in order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns this polygon translated by `offset`.
    pub fn move_by(&self, offset: Point) -> Self {
        Self::new(self.points.iter().map(|p| *p + offset).collect())
    }

    /// Returns this polygon scaled by `ratio`, every vertex rounded to the
    /// nearest pixel.
    pub fn rescale(&self, ratio: f64) -> Self {
        Self::new(self.points.iter().map(|p| p.rescale(ratio)).collect())
    }

    /// Axis-aligned hull of the vertices; empty polygons yield an empty box.
    pub fn bbox(&self) -> Bbox {
        let xs = self.points.iter().map(|p| p.x).minmax().into_option();
        let ys = self.points.iter().map(|p| p.y).minmax().into_option();
        match (xs, ys) {
            (Some((x1, x2)), Some((y1, y2))) => Bbox::new(x1, y1, x2, y2),
            _ => Bbox::default(),
        }
    }

    /// Enclosed area via the shoelace formula.
    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        let mut doubled = 0i64;
        for (a, b) in self
            .points
            .iter()
            .zip(self.points.iter().cycle().skip(1))
            .take(self.points.len())
        {
            doubled += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
        }
        (doubled.abs() as f64) / 2.0
    }
}

impl From<Vec<Point>> for Polygon {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

impl fmt::Display for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for p in &self.points {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{},{}", p.x, p.y)?;
            first = false;
        }
        Ok(())
    }
}

/// A binary raster local to its owning region's bounding box.
///
/// Zero bytes are background; anything else is foreground. A region without
/// a mask is exactly its bounding box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    /// Creates a mask from raw row-major bytes.
    ///
    /// # Returns
    ///
    /// * `Ok(Mask)` - If `data.len() == width * height`.
    /// * `Err(QuireError::InvalidInput)` - On a length mismatch.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> QuireResult<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(QuireError::invalid_input(format!(
                "mask buffer holds {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Creates a uniformly filled mask.
    pub fn filled(width: u32, height: u32, foreground: bool) -> Self {
        let value = if foreground { 255 } else { 0 };
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Builds a mask from a grayscale image; nonzero pixels become foreground.
    pub fn from_gray(img: &GrayImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            data: img.as_raw().clone(),
        }
    }

    /// Renders the mask as a grayscale image with foreground at 255.
    pub fn to_gray(&self) -> GrayImage {
        let data = self
            .data
            .iter()
            .map(|&v| if v != 0 { 255 } else { 0 })
            .collect();
        GrayImage::from_vec(self.width, self.height, data)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Foreground test; out-of-range coordinates are background.
    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return false;
        }
        self.data[y as usize * self.width as usize + x as usize] != 0
    }

    /// True if the mask has any foreground pixel.
    pub fn any(&self) -> bool {
        self.data.iter().any(|&v| v != 0)
    }

    /// Crops the mask to `bbox` (in the mask's own frame), clamped to the
    /// raster. The result may be empty.
    pub fn crop(&self, bbox: &Bbox) -> Self {
        let clamped = bbox.clamp(self.width, self.height);
        let width = clamped.width();
        let height = clamped.height();
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in clamped.y1()..clamped.y2() {
            let row = y as usize * self.width as usize;
            for x in clamped.x1()..clamped.x2() {
                data.push(self.data[row + x as usize]);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Resizes the mask to exactly `width` x `height` (nearest neighbor).
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let resized = image::imageops::resize(
            &self.to_gray(),
            width.max(1),
            height.max(1),
            image::imageops::FilterType::Nearest,
        );
        Self::from_gray(&resized)
    }

    /// Returns this mask scaled by `ratio` (nearest neighbor, so the raster
    /// stays binary).
    pub fn rescale(&self, ratio: f64) -> Self {
        let width = ((self.width as f64 * ratio).round() as u32).max(1);
        let height = ((self.height as f64 * ratio).round() as u32).max(1);
        self.resize(width, height)
    }
}

/// Extracts the outer contour of the largest connected foreground region.
///
/// Returns an empty polygon when the mask has no foreground; callers must
/// check before relying on the result.
pub fn mask_to_polygon(mask: &Mask) -> Polygon {
    if !mask.any() {
        return Polygon::default();
    }
    let gray = mask.to_gray();
    contours::find_contours::<i32>(&gray)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| Polygon::new(c.points.into_iter().map(|p| Point::new(p.x, p.y)).collect()))
        .max_by(|a, b| a.area().total_cmp(&b.area()))
        .unwrap_or_default()
}

#[inline]
fn scale_coord(value: i32, ratio: f64) -> i32 {
    (value as f64 * ratio).round() as i32
}

/// Scales a dimension by `ratio`, rounding to the nearest pixel.
#[inline]
pub(crate) fn scale_dimension(value: u32, ratio: f64) -> u32 {
    (value as f64 * ratio).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_from_size_and_move() {
        let bbox = Bbox::from_size(30, 20).move_by(Point::new(5, 7));
        assert_eq!(bbox, Bbox::new(5, 7, 35, 27));
        assert_eq!(bbox.width(), 30);
        assert_eq!(bbox.height(), 20);
        assert_eq!(bbox.p1(), Point::new(5, 7));
    }

    #[test]
    fn bbox_rescale_rounds_to_nearest() {
        let bbox = Bbox::new(1, 1, 10, 10).rescale(0.5);
        assert_eq!(bbox, Bbox::new(1, 1, 5, 5));
    }

    #[test]
    fn bbox_rescale_round_trip_is_close() {
        let bbox = Bbox::new(13, 27, 311, 457);
        let back = bbox.rescale(0.37).rescale(1.0 / 0.37);
        assert!((back.x1() - bbox.x1()).abs() <= 2);
        assert!((back.y2() - bbox.y2()).abs() <= 2);
    }

    #[test]
    fn bbox_rescale_by_one_is_identity() {
        let bbox = Bbox::new(3, 4, 100, 200);
        assert_eq!(bbox.rescale(1.0), bbox);
    }

    #[test]
    fn bbox_clamp_clips_to_raster() {
        let bbox = Bbox::new(-5, 10, 120, 300);
        assert_eq!(bbox.clamp(100, 200), Bbox::new(0, 10, 100, 200));
    }

    #[test]
    fn bbox_polygon_has_four_corners() {
        let polygon = Bbox::new(0, 0, 10, 5).polygon();
        assert_eq!(polygon.len(), 4);
        assert_eq!(polygon.bbox(), Bbox::new(0, 0, 10, 5));
    }

    #[test]
    fn polygon_move_and_rescale_apply_to_every_vertex() {
        let polygon = Polygon::new(vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10)]);
        let moved = polygon.move_by(Point::new(2, 3));
        assert_eq!(moved.points()[2], Point::new(12, 13));
        let scaled = polygon.rescale(2.0);
        assert_eq!(scaled.points()[1], Point::new(20, 0));
    }

    #[test]
    fn polygon_area_uses_shoelace() {
        let square = Bbox::new(0, 0, 10, 10).polygon();
        assert_eq!(square.area(), 100.0);
        let degenerate = Polygon::new(vec![Point::new(0, 0), Point::new(5, 5)]);
        assert_eq!(degenerate.area(), 0.0);
    }

    #[test]
    fn polygon_display_matches_points_syntax() {
        let polygon = Polygon::new(vec![Point::new(1, 2), Point::new(3, 4)]);
        assert_eq!(polygon.to_string(), "1,2 3,4");
    }

    #[test]
    fn mask_rejects_wrong_buffer_length() {
        assert!(Mask::new(4, 4, vec![0; 15]).is_err());
        assert!(Mask::new(4, 4, vec![0; 16]).is_ok());
    }

    #[test]
    fn mask_crop_is_clamped() {
        let mut data = vec![0u8; 100];
        data[55] = 1; // (5, 5)
        let mask = Mask::new(10, 10, data).unwrap();
        let cropped = mask.crop(&Bbox::new(4, 4, 20, 20));
        assert_eq!(cropped.width(), 6);
        assert_eq!(cropped.height(), 6);
        assert!(cropped.get(1, 1));
        assert!(cropped.any());
    }

    #[test]
    fn mask_crop_outside_is_empty() {
        let mask = Mask::filled(10, 10, true);
        let cropped = mask.crop(&Bbox::new(20, 20, 30, 30));
        assert!(!cropped.any());
        assert_eq!(cropped.width(), 0);
    }

    #[test]
    fn mask_rescale_keeps_binary_values() {
        let mask = Mask::filled(8, 8, true);
        let scaled = mask.rescale(0.5);
        assert_eq!(scaled.width(), 4);
        assert_eq!(scaled.height(), 4);
        assert!(scaled.get(0, 0));
    }

    #[test]
    fn mask_to_polygon_finds_largest_region() {
        let mut data = vec![0u8; 400];
        // Small 2x2 blob near the origin.
        for y in 1..3 {
            for x in 1..3 {
                data[y * 20 + x] = 255;
            }
        }
        // Larger 8x8 blob.
        for y in 8..16 {
            for x in 8..16 {
                data[y * 20 + x] = 255;
            }
        }
        let mask = Mask::new(20, 20, data).unwrap();
        let polygon = mask_to_polygon(&mask);
        assert!(!polygon.is_empty());
        let hull = polygon.bbox();
        assert!(hull.x1() >= 7 && hull.x1() <= 9);
        assert!(hull.x2() >= 14 && hull.x2() <= 16);
    }

    #[test]
    fn mask_to_polygon_without_foreground_is_empty() {
        let mask = Mask::filled(10, 10, false);
        assert!(mask_to_polygon(&mask).is_empty());
    }
}
