use super::types::{LabelMap, BACKGROUND, BOUNDARY, UNKNOWN};
use crate::error::{DetectionError, Result};
use image::RgbImage;
use ndarray::Array2;
use std::collections::VecDeque;

/// One FIFO per elevation level; pops lowest level first, oldest first
struct LevelQueue {
    levels: Vec<VecDeque<(usize, usize)>>,
    current: usize,
}

impl LevelQueue {
    fn new() -> Self {
        Self {
            levels: vec![VecDeque::new(); 256],
            current: 0,
        }
    }

    fn push(&mut self, level: u8, pixel: (usize, usize)) {
        self.levels[level as usize].push_back(pixel);
    }

    fn pop(&mut self) -> Option<(u8, (usize, usize))> {
        while self.current < self.levels.len() {
            if let Some(pixel) = self.levels[self.current].pop_front() {
                return Some((self.current as u8, pixel));
            }
            self.current += 1;
        }
        None
    }
}

fn neighbours_4con(
    (y, x): (usize, usize),
    (height, width): (usize, usize),
) -> impl Iterator<Item = (usize, usize)> {
    let up = y.checked_sub(1).map(|ny| (ny, x));
    let down = (y + 1 < height).then_some((y + 1, x));
    let left = x.checked_sub(1).map(|nx| (y, nx));
    let right = (x + 1 < width).then_some((y, x + 1));
    [up, down, left, right].into_iter().flatten()
}

/// Topographic surface: largest channel difference to any 4-neighbour
pub fn gradient(image: &RgbImage) -> Array2<u8> {
    let (width, height) = image.dimensions();
    let shape = (height as usize, width as usize);
    Array2::from_shape_fn(shape, |(y, x)| {
        let here = image.get_pixel(x as u32, y as u32);
        neighbours_4con((y, x), shape)
            .map(|(ny, nx)| {
                let there = image.get_pixel(nx as u32, ny as u32);
                (0..3).map(|c| here[c].abs_diff(there[c])).max().unwrap_or(0)
            })
            .max()
            .unwrap_or(0)
    })
}

/// Marker-controlled watershed
///
/// Floods from every positive label across the gradient of `image`, lowest
/// elevation first. An unknown pixel takes the label of the region that
/// reaches it; where two different regions touch it becomes `BOUNDARY`.
/// The caller's marker map is left untouched and no pixel of the result is
/// `UNKNOWN`.
pub fn segment(image: &RgbImage, markers: &LabelMap) -> Result<LabelMap> {
    let _span = tracing::debug_span!("watershed").entered();

    let (width, height) = image.dimensions();
    let shape = (height as usize, width as usize);
    if markers.dim() != shape {
        return Err(DetectionError::invalid_frame(format!(
            "frame is {}x{} but marker map is {}x{}",
            width,
            height,
            markers.dim().1,
            markers.dim().0
        )));
    }

    let elevation = gradient(image);
    let mut labels = markers.clone();
    let mut queued = Array2::from_elem(shape, false);
    let mut queue = LevelQueue::new();

    for ((y, x), &label) in markers.indexed_iter() {
        if label == UNKNOWN && neighbours_4con((y, x), shape).any(|n| markers[n] > 0) {
            queue.push(elevation[[y, x]], (y, x));
            queued[[y, x]] = true;
        }
    }

    while let Some((level, pixel)) = queue.pop() {
        let mut region = None;
        let mut contested = false;
        for n in neighbours_4con(pixel, shape) {
            let label = labels[n];
            if label <= 0 {
                continue;
            }
            match region {
                None => region = Some(label),
                Some(existing) if existing != label => contested = true,
                Some(_) => {}
            }
        }

        if contested {
            labels[pixel] = BOUNDARY;
            continue;
        }
        let Some(label) = region else { continue };
        labels[pixel] = label;

        for n in neighbours_4con(pixel, shape) {
            if labels[n] == UNKNOWN && !queued[n] {
                queue.push(level.max(elevation[n]), n);
                queued[n] = true;
            }
        }
    }

    resolve_enclosed(&mut labels);
    Ok(labels)
}

/// Give every pixel the flood never reached (pockets walled in by boundary
/// pixels) the label of its nearest region
fn resolve_enclosed(labels: &mut LabelMap) {
    if !labels.iter().any(|&l| l == UNKNOWN) {
        return;
    }

    let shape = labels.dim();
    let mut frontier: VecDeque<((usize, usize), i32)> = labels
        .indexed_iter()
        .filter(|(_, label)| **label > 0)
        .map(|(idx, label)| (idx, *label))
        .collect();

    if frontier.is_empty() {
        tracing::debug!("Marker map has no seeds, resolving everything to background");
        labels.mapv_inplace(|l| if l == UNKNOWN { BACKGROUND } else { l });
        return;
    }

    let mut visited = labels.mapv(|l| l > 0);
    while let Some((pixel, label)) = frontier.pop_front() {
        for n in neighbours_4con(pixel, shape) {
            if visited[n] {
                continue;
            }
            visited[n] = true;
            if labels[n] == UNKNOWN {
                labels[n] = label;
            }
            frontier.push_back((n, label));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::array;

    fn ridge_image() -> RgbImage {
        RgbImage::from_fn(9, 5, |x, _| {
            if x == 4 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn two_seed_markers() -> LabelMap {
        Array2::from_shape_fn((5, 9), |(_, x)| match x {
            0 => 2,
            8 => 3,
            _ => UNKNOWN,
        })
    }

    fn textured_scene() -> (RgbImage, LabelMap) {
        let image = RgbImage::from_fn(16, 12, |x, y| {
            Rgb([(x * 13 % 256) as u8, (y * 29 % 256) as u8, ((x * y) % 256) as u8])
        });
        let mut markers = LabelMap::zeros((12, 16));
        markers[[0, 0]] = BACKGROUND;
        markers[[6, 8]] = 2;
        markers[[11, 15]] = 3;
        (image, markers)
    }

    #[test]
    fn test_gradient_marks_edges() {
        let grad = gradient(&ridge_image());
        assert_eq!(grad[[2, 2]], 0);
        assert_eq!(grad[[2, 3]], 255);
        assert_eq!(grad[[2, 4]], 255);
        assert_eq!(grad[[2, 5]], 255);
        assert_eq!(grad[[2, 6]], 0);
    }

    #[test]
    fn test_flood_stops_at_ridge() {
        let result = segment(&ridge_image(), &two_seed_markers()).unwrap();
        for y in 0..5 {
            for x in 0..4 {
                assert_eq!(result[[y, x]], 2, "({}, {})", y, x);
            }
            assert_eq!(result[[y, 4]], BOUNDARY);
            for x in 5..9 {
                assert_eq!(result[[y, x]], 3, "({}, {})", y, x);
            }
        }
    }

    #[test]
    fn test_no_pixel_left_unknown() {
        let (image, markers) = textured_scene();
        let result = segment(&image, &markers).unwrap();
        assert!(result.iter().all(|&l| l != UNKNOWN));
    }

    #[test]
    fn test_boundary_pixels_separate_different_regions() {
        let (image, markers) = textured_scene();
        let result = segment(&image, &markers).unwrap();
        let shape = result.dim();
        for ((y, x), &label) in result.indexed_iter() {
            if label != BOUNDARY {
                continue;
            }
            let mut seen: Vec<i32> = neighbours_4con((y, x), shape)
                .map(|n| result[n])
                .filter(|&l| l > 0)
                .collect();
            seen.sort_unstable();
            seen.dedup();
            assert!(seen.len() >= 2, "boundary at ({}, {}) touches {:?}", y, x, seen);
        }
    }

    #[test]
    fn test_segment_is_deterministic_and_pure() {
        let image = ridge_image();
        let markers = two_seed_markers();
        let snapshot = markers.clone();
        let first = segment(&image, &markers).unwrap();
        let second = segment(&image, &markers).unwrap();
        assert_eq!(first, second);
        assert_eq!(markers, snapshot);
    }

    #[test]
    fn test_seedless_map_resolves_to_background() {
        let image = RgbImage::from_pixel(4, 3, Rgb([10, 10, 10]));
        let result = segment(&image, &LabelMap::zeros((3, 4))).unwrap();
        assert!(result.iter().all(|&l| l == BACKGROUND));
    }

    #[test]
    fn test_fully_labelled_map_is_unchanged() {
        let image = RgbImage::from_pixel(3, 2, Rgb([0, 0, 0]));
        let markers = array![[1, 1, 2], [1, 2, 2]];
        assert_eq!(segment(&image, &markers).unwrap(), markers);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let image = RgbImage::new(4, 4);
        assert!(segment(&image, &LabelMap::zeros((3, 4))).is_err());
    }

    #[test]
    fn test_enclosed_pocket_resolved() {
        let mut labels = array![
            [2, -1, 0],
            [-1, -1, 0],
            [0, 0, 0],
        ];
        resolve_enclosed(&mut labels);
        assert!(labels.iter().all(|&l| l != UNKNOWN));
        assert_eq!(labels[[2, 2]], 2);
        assert_eq!(labels[[1, 1]], BOUNDARY);
    }
}
