use image::{imageops, DynamicImage};
use std::io::Cursor;

/// EXIF orientation tag value (1-8).
///
/// The sanitizer reads this before the EXIF block is stripped, so renditions can
/// still be displayed upright once the metadata is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orientation(u8);

impl Default for Orientation {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl Orientation {
    pub const NORMAL: Orientation = Orientation(1);

    /// Values outside 1..=8 are treated as normal.
    pub fn from_tag(value: u32) -> Self {
        match value {
            1..=8 => Orientation(value as u8),
            _ => Self::NORMAL,
        }
    }

    /// Read the orientation tag from a container's EXIF block. Missing or malformed
    /// EXIF yields normal orientation.
    pub fn read_from(data: &[u8]) -> Self {
        let mut cursor = Cursor::new(data);
        let exif = match exif::Reader::new().read_from_container(&mut cursor) {
            Ok(exif) => exif,
            Err(_) => return Self::NORMAL,
        };
        exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Self::from_tag)
            .unwrap_or(Self::NORMAL)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether applying this orientation swaps width and height
    pub fn swaps_dimensions(self) -> bool {
        matches!(self.value(), 5..=8)
    }

    /// (rotation clockwise in degrees, flip horizontal, flip vertical)
    pub fn transforms(self) -> (Option<u16>, bool, bool) {
        match self.value() {
            2 => (None, true, false),
            3 => (Some(180), false, false),
            4 => (None, false, true),
            5 => (Some(90), true, false),
            6 => (Some(90), false, false),
            7 => (Some(270), true, false),
            8 => (Some(270), false, false),
            _ => (None, false, false),
        }
    }

    /// Rotate and flip a decoded image so it displays upright.
    pub fn apply(self, mut img: DynamicImage) -> DynamicImage {
        let (rotate, flip_h, flip_v) = self.transforms();
        if rotate.is_none() && !flip_h && !flip_v {
            return img;
        }

        tracing::debug!(
            orientation = self.value(),
            rotate = ?rotate,
            flip_horizontal = flip_h,
            flip_vertical = flip_v,
            "Applying EXIF orientation"
        );

        // Rotation first, then flips
        if let Some(angle) = rotate {
            img = match angle {
                90 => DynamicImage::ImageRgba8(imageops::rotate90(&img.to_rgba8())),
                180 => DynamicImage::ImageRgba8(imageops::rotate180(&img.to_rgba8())),
                270 => DynamicImage::ImageRgba8(imageops::rotate270(&img.to_rgba8())),
                _ => img,
            };
        }
        if flip_h {
            img = DynamicImage::ImageRgba8(imageops::flip_horizontal(&img.to_rgba8()));
        }
        if flip_v {
            img = DynamicImage::ImageRgba8(imageops::flip_vertical(&img.to_rgba8()));
        }

        img
    }
}
