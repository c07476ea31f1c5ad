//! Colour-masked map features and blob correspondences.

use image::{GrayImage, Luma, RgbImage};

use crate::domain::model::Point;
use crate::infrastructure::config::ColorRange;

/// Number of neighbour-distance ratios per descriptor
const DESCRIPTOR_LEN: usize = 4;

type Descriptor = [f64; DESCRIPTOR_LEN];

/// Keep the grey intensity of pixels inside any of `colors`, zero elsewhere.
pub fn extract_mask(rgb: &RgbImage, colors: &[ColorRange]) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let pixel = rgb.get_pixel(x, y).0;
        if colors.iter().any(|c| c.contains(pixel)) {
            Luma([luma(pixel)])
        } else {
            Luma([0])
        }
    })
}

fn luma(rgb: [u8; 3]) -> u8 {
    (0.299 * rgb[0] as f64 + 0.587 * rgb[1] as f64 + 0.114 * rgb[2] as f64).round() as u8
}

/// Connected blob of mask pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub center: Point,
    pub area: u32,
}

/// 4-connected components of non-zero pixels with at least `min_area` pixels.
pub fn detect_blobs(mask: &GrayImage, min_area: u32) -> Vec<Keypoint> {
    let (width, height) = mask.dimensions();
    let mut seen = vec![false; (width * height) as usize];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let start = (start_y * width + start_x) as usize;
            if seen[start] || mask.get_pixel(start_x, start_y)[0] == 0 {
                continue;
            }

            seen[start] = true;
            stack.push((start_x, start_y));
            let (mut area, mut sum_x, mut sum_y) = (0u32, 0u64, 0u64);
            while let Some((x, y)) = stack.pop() {
                area += 1;
                sum_x += x as u64;
                sum_y += y as u64;
                let neighbours = [
                    (x.wrapping_sub(1), y),
                    (x + 1, y),
                    (x, y.wrapping_sub(1)),
                    (x, y + 1),
                ];
                for (nx, ny) in neighbours {
                    if nx >= width || ny >= height {
                        continue;
                    }
                    let idx = (ny * width + nx) as usize;
                    if !seen[idx] && mask.get_pixel(nx, ny)[0] != 0 {
                        seen[idx] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            if area >= min_area {
                blobs.push(Keypoint {
                    center: Point::new(sum_x as f64 / area as f64, sum_y as f64 / area as f64),
                    area,
                });
            }
        }
    }
    blobs
}

/// Ratios of the distances to the nearest neighbours over the nearest one.
/// Unchanged by translation, rotation and uniform zoom.
fn describe(keypoints: &[Keypoint]) -> Vec<Descriptor> {
    keypoints
        .iter()
        .enumerate()
        .map(|(i, kp)| {
            let mut distances: Vec<f64> = keypoints
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, other)| kp.center.distance(&other.center))
                .collect();
            distances.sort_by(|a, b| a.total_cmp(b));

            let mut descriptor = [0.0; DESCRIPTOR_LEN];
            if let Some(&nearest) = distances.first() {
                let nearest = nearest.max(f64::EPSILON);
                for (slot, d) in descriptor.iter_mut().zip(distances.iter().skip(1)) {
                    *slot = d / nearest;
                }
            }
            descriptor
        })
        .collect()
}

fn descriptor_distance(a: &Descriptor, b: &Descriptor) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Feature mask of the static reference map, extracted once.
#[derive(Debug, Clone)]
pub struct ReferenceMap {
    pub mask: GrayImage,
    pub keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
}

impl ReferenceMap {
    pub fn new(mask: GrayImage, min_blob_area: u32) -> Self {
        let keypoints = detect_blobs(&mask, min_blob_area);
        let descriptors = describe(&keypoints);
        tracing::debug!(keypoints = keypoints.len(), "Reference map prepared");
        Self {
            mask,
            keypoints,
            descriptors,
        }
    }

    pub fn from_image(rgb: &RgbImage, colors: &[ColorRange], min_blob_area: u32) -> Self {
        Self::new(extract_mask(rgb, colors), min_blob_area)
    }
}

/// Finds `(reference, live)` point correspondences between the reference
/// map and a live feature mask.
pub trait FeatureMatcher: Send + Sync {
    fn correspondences(&self, reference: &ReferenceMap, live: &GrayImage) -> Vec<(Point, Point)>;
}

/// Matches blob keypoints by their neighbour-distance descriptors with a
/// ratio test against the second best candidate.
#[derive(Debug, Clone, Copy)]
pub struct BlobMatcher {
    pub min_blob_area: u32,
    pub ratio: f64,
}

impl BlobMatcher {
    pub fn new(min_blob_area: u32, ratio: f64) -> Self {
        Self { min_blob_area, ratio }
    }
}

impl FeatureMatcher for BlobMatcher {
    fn correspondences(&self, reference: &ReferenceMap, live: &GrayImage) -> Vec<(Point, Point)> {
        let keypoints = detect_blobs(live, self.min_blob_area);
        if keypoints.len() < 2 {
            return Vec::new();
        }
        let descriptors = describe(&keypoints);

        let mut pairs = Vec::new();
        for (ref_kp, ref_desc) in reference.keypoints.iter().zip(&reference.descriptors) {
            let mut best = (f64::INFINITY, usize::MAX);
            let mut second = f64::INFINITY;
            for (j, desc) in descriptors.iter().enumerate() {
                let d = descriptor_distance(ref_desc, desc);
                if d < best.0 {
                    second = best.0;
                    best = (d, j);
                } else if d < second {
                    second = d;
                }
            }
            if best.1 != usize::MAX && best.0 < self.ratio * second {
                pairs.push((ref_kp.center, keypoints[best.1].center));
            }
        }
        tracing::trace!(
            reference = reference.keypoints.len(),
            live = keypoints.len(),
            matched = pairs.len(),
            "Blob correspondences"
        );
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resolver::homography::Homography;
    use image::Rgb;

    const WHITE: ColorRange = ColorRange {
        lower: [240, 240, 240],
        upper: [255, 255, 255],
    };

    fn map_with_squares(
        width: u32,
        height: u32,
        squares: &[(u32, u32, u32)],
        offset: (u32, u32),
    ) -> RgbImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([30, 60, 30]));
        for &(x, y, size) in squares {
            for dy in 0..size {
                for dx in 0..size {
                    img.put_pixel(x + dx + offset.0, y + dy + offset.1, Rgb([255, 255, 255]));
                }
            }
        }
        img
    }

    const SQUARES: [(u32, u32, u32); 8] = [
        (20, 30, 6),
        (95, 40, 5),
        (60, 110, 7),
        (150, 75, 6),
        (30, 160, 5),
        (130, 170, 8),
        (200, 20, 6),
        (210, 140, 5),
    ];

    #[test]
    fn test_mask_keeps_intensity_of_selected_colors() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([10, 10, 10]));
        img.put_pixel(1, 0, Rgb([250, 250, 250]));
        let mask = extract_mask(&img, &[WHITE]);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 0)[0], 250);
    }

    #[test]
    fn test_blobs_filter_small_components() {
        let mut img = map_with_squares(60, 60, &[(5, 5, 4), (30, 30, 6)], (0, 0));
        img.put_pixel(50, 50, Rgb([255, 255, 255]));
        let blobs = detect_blobs(&extract_mask(&img, &[WHITE]), 4);
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].center, Point::new(6.5, 6.5));
        assert_eq!(blobs[1].area, 36);
    }

    #[test]
    fn test_matcher_recovers_translation() {
        let reference =
            ReferenceMap::from_image(&map_with_squares(260, 220, &SQUARES, (0, 0)), &[WHITE], 10);
        let live = extract_mask(&map_with_squares(320, 280, &SQUARES, (37, 21)), &[WHITE]);

        let pairs = BlobMatcher::new(10, 0.8).correspondences(&reference, &live);
        assert!(pairs.len() >= 6, "only {} pairs", pairs.len());
        for (r, l) in &pairs {
            assert_eq!(l.x - r.x, 37.0);
            assert_eq!(l.y - r.y, 21.0);
        }

        let h = Homography::estimate(&pairs).unwrap();
        let p = h.apply(Point::new(100.0, 100.0)).unwrap();
        assert!(p.distance(&Point::new(137.0, 121.0)) < 1e-6);
    }
}
