//! Binary morphology over `[[y, x]]` masks, on top of `imageproc`.
//!
//! Masks are converted to 0/255 `GrayImage`s at the boundary. Pixels outside
//! the image never contribute, so dilation does not grow from the border and
//! erosion does not eat into it.

use super::types::{DistanceField, LabelMap, Mask};
use image::{GrayImage, Luma};
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::morphology;
use imageproc::region_labelling::{self, Connectivity};
use ndarray::Array2;

fn to_gray(mask: &Mask) -> GrayImage {
    let (height, width) = mask.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([if mask[[y as usize, x as usize]] != 0 { 255 } else { 0 }])
    })
}

fn from_gray(image: &GrayImage) -> Mask {
    let shape = (image.height() as usize, image.width() as usize);
    Array2::from_shape_fn(shape, |(y, x)| {
        u8::from(image.get_pixel(x as u32, y as u32)[0] != 0)
    })
}

// A `ksize` x `ksize` square is the L-infinity ball of radius `ksize / 2`
fn square_radius(ksize: usize) -> u8 {
    u8::try_from(ksize / 2).unwrap_or(u8::MAX)
}

/// Dilate with a `ksize` x `ksize` square, `iterations` times
pub fn dilate(mask: &Mask, ksize: usize, iterations: u32) -> Mask {
    if mask.is_empty() || iterations == 0 {
        return mask.clone();
    }
    let radius = square_radius(ksize);
    let mut image = to_gray(mask);
    for _ in 0..iterations {
        image = morphology::dilate(&image, Norm::LInf, radius);
    }
    from_gray(&image)
}

/// Erode with a `ksize` x `ksize` square, `iterations` times
pub fn erode(mask: &Mask, ksize: usize, iterations: u32) -> Mask {
    if mask.is_empty() || iterations == 0 {
        return mask.clone();
    }
    let radius = square_radius(ksize);
    let mut image = to_gray(mask);
    for _ in 0..iterations {
        image = morphology::erode(&image, Norm::LInf, radius);
    }
    from_gray(&image)
}

/// Euclidean distance from every foreground pixel to the nearest background
/// pixel; background pixels get 0
///
/// A mask with no background at all gets the image diagonal everywhere.
pub fn distance_transform(mask: &Mask) -> DistanceField {
    let (height, width) = mask.dim();
    if !mask.iter().any(|&v| v == 0) {
        let diagonal = (width as f32).hypot(height as f32);
        return DistanceField::from_elem((height, width), diagonal);
    }

    // The transform measures distance to the nearest non-zero pixel, so the
    // background is what gets lit.
    let background = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([if mask[[y as usize, x as usize]] == 0 { 255 } else { 0 }])
    });
    let squared = euclidean_squared_distance_transform(&background);
    Array2::from_shape_fn((height, width), |(y, x)| {
        squared.get_pixel(x as u32, y as u32)[0].sqrt() as f32
    })
}

/// Label 8-connected foreground blobs
///
/// Background pixels get 0; blobs get 1..=count.
pub fn connected_components(mask: &Mask) -> (LabelMap, usize) {
    let (height, width) = mask.dim();
    if mask.is_empty() {
        return (LabelMap::zeros((height, width)), 0);
    }
    let labelled =
        region_labelling::connected_components(&to_gray(mask), Connectivity::Eight, Luma([0u8]));

    let mut count = 0u32;
    let labels = Array2::from_shape_fn((height, width), |(y, x)| {
        let label = labelled.get_pixel(x as u32, y as u32)[0];
        count = count.max(label);
        label as i32
    });
    (labels, count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dilate_single_pixel() {
        let mut mask = Array2::<u8>::zeros((7, 7));
        mask[[3, 3]] = 1;
        let out = dilate(&mask, 3, 1);
        assert_eq!(out.iter().filter(|&&v| v == 1).count(), 9);
        assert_eq!(out[[2, 2]], 1);
        assert_eq!(out[[1, 1]], 0);

        let twice = dilate(&mask, 3, 2);
        assert_eq!(twice.iter().filter(|&&v| v == 1).count(), 25);
    }

    #[test]
    fn test_dilate_clips_at_border() {
        let mut mask = Array2::<u8>::zeros((4, 4));
        mask[[0, 0]] = 1;
        let out = dilate(&mask, 3, 1);
        let expected = array![[1u8, 1, 0, 0], [1, 1, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_erode_square() {
        let mut mask = Array2::<u8>::zeros((9, 9));
        for y in 2..7 {
            for x in 2..7 {
                mask[[y, x]] = 1;
            }
        }
        let out = erode(&mask, 3, 1);
        assert_eq!(out.iter().filter(|&&v| v == 1).count(), 9);
        assert_eq!(out[[3, 3]], 1);
        assert_eq!(out[[2, 2]], 0);
    }

    #[test]
    fn test_erode_keeps_border_touching_region() {
        let mask = Array2::<u8>::ones((5, 5));
        assert_eq!(erode(&mask, 3, 2), mask);
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let mask = array![[0u8, 1, 0], [1, 1, 1], [0, 1, 0]];
        assert_eq!(dilate(&mask, 3, 0), mask);
        assert_eq!(erode(&mask, 3, 0), mask);
    }

    #[test]
    fn test_distance_transform_line() {
        let mask = array![[0u8, 1, 1, 1, 1, 1, 0]];
        let dist = distance_transform(&mask);
        let expected = [0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0];
        for (got, want) in dist.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_distance_transform_is_euclidean() {
        let mut mask = Array2::<u8>::ones((5, 5));
        mask[[0, 0]] = 0;
        let dist = distance_transform(&mask);
        assert!((dist[[0, 0]]).abs() < 1e-6);
        assert!((dist[[3, 4]] - 5.0).abs() < 1e-5);
        assert!((dist[[1, 1]] - 2f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_distance_transform_full_mask() {
        let mask = Array2::<u8>::ones((3, 4));
        let dist = distance_transform(&mask);
        assert!(dist.iter().all(|&d| (d - 5.0).abs() < 1e-5));
    }

    #[test]
    fn test_distance_transform_empty_mask() {
        let mask = Array2::<u8>::zeros((4, 6));
        let dist = distance_transform(&mask);
        assert!(dist.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_connected_components_eight_way() {
        let mask = array![
            [1u8, 0, 0, 0, 1],
            [0, 1, 0, 0, 1],
            [0, 0, 0, 0, 0],
            [1, 1, 0, 0, 0],
        ];
        let (labels, count) = connected_components(&mask);
        assert_eq!(count, 3);
        // diagonal neighbours join
        assert_eq!(labels[[0, 0]], labels[[1, 1]]);
        assert_eq!(labels[[0, 4]], labels[[1, 4]]);
        assert_eq!(labels[[3, 0]], labels[[3, 1]]);

        let mut ids = vec![labels[[0, 0]], labels[[0, 4]], labels[[3, 0]]];
        ids.sort_unstable();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(labels[[2, 2]], 0);
    }

    #[test]
    fn test_connected_components_empty() {
        let mask = Array2::<u8>::zeros((3, 3));
        let (labels, count) = connected_components(&mask);
        assert_eq!(count, 0);
        assert!(labels.iter().all(|&l| l == 0));
    }
}
