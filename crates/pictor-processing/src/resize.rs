use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// Target dimensions for a rendition bounded by `max_dimension`.
///
/// The longer edge becomes `min(longer_edge, max_dimension)` and the shorter edge
/// follows the source aspect ratio, rounded to the nearest pixel and never below 1.
/// Images already within the bound keep their size; nothing is upscaled.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= max_dimension || max_dimension == 0 {
        return (width, height);
    }

    let scale_edge = |edge: u32| -> u32 {
        // round(edge * max / longer) in integer arithmetic
        let scaled = (u64::from(edge) * u64::from(max_dimension) * 2 + u64::from(longer))
            / (u64::from(longer) * 2);
        (scaled as u32).max(1)
    };

    if width >= height {
        (max_dimension, scale_edge(height))
    } else {
        (scale_edge(width), max_dimension)
    }
}

/// Select appropriate filter type based on resize ratio
pub fn select_filter(orig_width: u32, orig_height: u32, new_width: u32, new_height: u32) -> FilterType {
    let width_ratio = orig_width as f32 / new_width.max(1) as f32;
    let height_ratio = orig_height as f32 / new_height.max(1) as f32;
    let max_ratio = width_ratio.max(height_ratio);

    if max_ratio > 2.0 {
        FilterType::Triangle
    } else if max_ratio > 1.5 {
        FilterType::CatmullRom
    } else {
        FilterType::Lanczos3
    }
}

/// Downscale `img` to fit `max_dimension`, or `None` when it already fits.
pub fn resize_to_fit(img: &DynamicImage, max_dimension: u32) -> Option<DynamicImage> {
    let (orig_width, orig_height) = img.dimensions();
    let (width, height) = fit_within(orig_width, orig_height, max_dimension);
    if (width, height) == (orig_width, orig_height) {
        return None;
    }
    let filter = select_filter(orig_width, orig_height, width, height);
    Some(img.resize_exact(width, height, filter))
}
