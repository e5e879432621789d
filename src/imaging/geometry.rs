//! Pure geometry for proportional scaling and square thumbnails.
//!
//! All functions here are pure and testable without any I/O or images.
//! Inputs are validated once, at construction of [`ImageDimensions`] and
//! [`ScaleTarget`]; the fitting functions themselves cannot fail.

use super::backend::ImagingError;

/// Pixel extents of a decoded image. Both axes are always positive: the
/// only way in is [`ImageDimensions::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ImageDimensions {
    width: u32,
    height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Result<Self, ImagingError> {
        Ok(Self {
            width: positive("width", width)?,
            height: positive("height", height)?,
        })
    }

    pub fn width(self) -> u32 {
        self.width
    }

    pub fn height(self) -> u32 {
        self.height
    }
}

/// Bounding box an image should be fitted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleTarget {
    pub max_width: u32,
    pub max_height: u32,
    /// Let the backend fit inside the computed box instead of forcing it
    /// exactly.
    pub best_fit: bool,
}

impl ScaleTarget {
    pub fn new(max_width: u32, max_height: u32, best_fit: bool) -> Result<Self, ImagingError> {
        Ok(Self {
            max_width: positive("max width", max_width)?,
            max_height: positive("max height", max_height)?,
            best_fit,
        })
    }

    /// Square bound with best fit disabled, as used for thumbnails.
    pub fn square(size: u32) -> Result<Self, ImagingError> {
        Self::new(size, size, false)
    }
}

/// Region to extract from an image before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl CropRegion {
    pub fn dimensions(self) -> ImageDimensions {
        ImageDimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// True when the region covers the whole of `source`.
    pub fn covers(self, source: ImageDimensions) -> bool {
        self.offset_x == 0 && self.offset_y == 0 && self.dimensions() == source
    }
}

fn positive(axis: &'static str, value: u32) -> Result<u32, ImagingError> {
    if value == 0 {
        return Err(ImagingError::InvalidDimension { axis, value });
    }
    Ok(value)
}

/// `length * numerator / denominator`, rounded, never below one pixel.
fn proportional(length: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = length as f64 / denominator as f64 * numerator as f64;
    (scaled.round() as u32).max(1)
}

/// Fit `current` into `bound`, preserving aspect ratio.
///
/// Images already inside the bound are returned unchanged. Otherwise the
/// longer source axis is the limiting one: it is set to the bound on that
/// axis and the other axis follows proportionally. The other axis is not
/// checked against its own bound, so a portrait image fitted into a wide,
/// short box can come out wider than `max_width`, or larger than it was.
///
/// # Examples
/// ```
/// # use pixfit::imaging::{ImageDimensions, ScaleTarget, scale_to_fit};
/// let current = ImageDimensions::new(1600, 800).unwrap();
/// let bound = ScaleTarget::new(400, 400, true).unwrap();
/// assert_eq!(scale_to_fit(current, bound), ImageDimensions::new(400, 200).unwrap());
/// ```
pub fn scale_to_fit(current: ImageDimensions, bound: ScaleTarget) -> ImageDimensions {
    if current.width <= bound.max_width && current.height <= bound.max_height {
        return current;
    }

    if current.width > current.height {
        let width = bound.max_width;
        ImageDimensions {
            width,
            height: proportional(width, current.height, current.width),
        }
    } else {
        let height = bound.max_height;
        ImageDimensions {
            width: proportional(height, current.width, current.height),
            height,
        }
    }
}

/// Largest square centered on the longer axis of `current`.
///
/// Offsets use integer division, so an odd overhang leaves the extra pixel
/// on the right or bottom edge.
pub fn center_square_crop(current: ImageDimensions) -> CropRegion {
    let side = current.width.min(current.height);
    CropRegion {
        width: side,
        height: side,
        offset_x: (current.width - side) / 2,
        offset_y: (current.height - side) / 2,
    }
}

/// Crop to a centered square, then scale that square down to `target_size`.
///
/// Returns the crop region and the final dimensions.
pub fn thumbnail(
    current: ImageDimensions,
    target_size: u32,
) -> Result<(CropRegion, ImageDimensions), ImagingError> {
    let bound = ScaleTarget::square(target_size)?;
    let crop = center_square_crop(current);
    Ok((crop, scale_to_fit(crop.dimensions(), bound)))
}

/// [`scale_to_fit`] on raw numbers: `(width, height)` after fitting.
pub fn scale_to_fit_raw(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
    best_fit: bool,
) -> Result<(u32, u32), ImagingError> {
    let fitted = scale_to_fit(
        ImageDimensions::new(width, height)?,
        ScaleTarget::new(max_width, max_height, best_fit)?,
    );
    Ok((fitted.width, fitted.height))
}

/// [`center_square_crop`] on raw numbers: `(side, offset_x, offset_y)`.
pub fn center_square_crop_raw(width: u32, height: u32) -> Result<(u32, u32, u32), ImagingError> {
    let crop = center_square_crop(ImageDimensions::new(width, height)?);
    Ok((crop.width, crop.offset_x, crop.offset_y))
}
