//! Connected-component labelling of binary masks
//!
//! Two plume pixels belong to the same component when they touch along an
//! edge (4-connectivity). The mask is handed to `imageproc` as a grayscale
//! image with a black background.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Label the 4-connected components of the non-zero pixels of a row-major mask
///
/// Returns one label per pixel (0 for background, 1..=count for components)
/// and the number of components.
pub fn label_components(mask: &[i64], height: usize, width: usize) -> (Vec<u32>, usize) {
    debug_assert_eq!(mask.len(), height * width);

    let image = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let value = mask[y as usize * width + x as usize];
        Luma([if value != 0 { 255 } else { 0 }])
    });

    let labels = connected_components(&image, Connectivity::Four, Luma([0])).into_raw();
    let count = labels.iter().copied().max().unwrap_or(0) as usize;
    (labels, count)
}

/// Number of components that contain at least one predicted plume pixel
pub fn count_captured(labels: &[u32], count: usize, prediction: &[i64]) -> usize {
    let mut captured = vec![false; count + 1];
    for (&label, &pred) in labels.iter().zip(prediction.iter()) {
        if label != 0 && pred != 0 {
            captured[label as usize] = true;
        }
    }
    captured.iter().filter(|&&c| c).count()
}
