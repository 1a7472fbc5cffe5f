use ndarray::ArrayView3;

use crate::shared::bounding_box::BoundingBox;

/// A decoded photograph: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug, PartialEq)]
pub struct Photo {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Photo {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * 3,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, 3),
            &self.data,
        )
        .expect("Photo data length must match dimensions")
    }

    /// Copies out the pixels under `bbox`, clamped to the photo bounds.
    ///
    /// A box entirely outside the photo yields an empty (0×0) crop.
    pub fn crop(&self, bbox: &BoundingBox) -> Photo {
        let clamped = bbox.clamp_to(self.width, self.height);
        if clamped.is_empty() {
            return Photo::new(Vec::new(), 0, 0);
        }

        let w = clamped.width as usize;
        let h = clamped.height as usize;
        let src_w = self.width as usize;
        let mut data = Vec::with_capacity(w * h * 3);

        for row in 0..h {
            let src_y = clamped.y as usize + row;
            let start = (src_y * src_w + clamped.x as usize) * 3;
            data.extend_from_slice(&self.data[start..start + w * 3]);
        }

        Photo::new(data, clamped.width as u32, clamped.height as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: i32, y: i32, w: i32, h: i32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2
        let photo = Photo::new(data.clone(), 2, 2);
        assert_eq!(photo.width(), 2);
        assert_eq!(photo.height(), 2);
        assert_eq!(photo.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * 3")]
    fn test_mismatched_data_length_panics_in_debug() {
        let data = vec![0u8; 10]; // wrong size for 2x2
        Photo::new(data, 2, 2);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let data = vec![0u8; 24]; // 2 rows x 4 cols
        let photo = Photo::new(data, 4, 2);
        assert_eq!(photo.as_ndarray().shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_as_ndarray_pixel_access() {
        // 2x2 RGB: set pixel (row=1, col=0) to red
        let mut data = vec![0u8; 12];
        data[6] = 255;
        let photo = Photo::new(data, 2, 2);
        let arr = photo.as_ndarray();
        assert_eq!(arr[[1, 0, 0]], 255);
        assert_eq!(arr[[1, 0, 1]], 0);
    }

    #[test]
    fn test_crop_interior() {
        // 4x4 photo, pixel value encodes its column
        let mut data = Vec::new();
        for _row in 0..4 {
            for col in 0..4u8 {
                data.extend_from_slice(&[col, 0, 0]);
            }
        }
        let photo = Photo::new(data, 4, 4);

        let crop = photo.crop(&bbox(1, 1, 2, 2));
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
        // First pixel of the crop is column 1
        assert_eq!(crop.data()[0], 1);
        assert_eq!(crop.data()[3], 2);
    }

    #[test]
    fn test_crop_clamps_at_edges() {
        let photo = Photo::new(vec![128u8; 4 * 4 * 3], 4, 4);
        let crop = photo.crop(&bbox(-2, -2, 4, 4));
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
    }

    #[test]
    fn test_crop_outside_is_empty() {
        let photo = Photo::new(vec![0u8; 4 * 4 * 3], 4, 4);
        let crop = photo.crop(&bbox(10, 10, 4, 4));
        assert_eq!(crop.width(), 0);
        assert_eq!(crop.height(), 0);
        assert!(crop.data().is_empty());
    }

    #[test]
    fn test_crop_full_photo_is_identity() {
        let photo = Photo::new(vec![7u8; 3 * 2 * 3], 3, 2);
        let crop = photo.crop(&bbox(0, 0, 3, 2));
        assert_eq!(crop, photo);
    }
}
