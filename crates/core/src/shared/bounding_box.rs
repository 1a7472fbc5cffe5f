use serde::{Deserialize, Serialize};

/// A face's pixel region within its source photo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let area_a = self.width as f64 * self.height as f64;
        let area_b = other.width as f64 * other.height as f64;
        inter / (area_a + area_b - inter)
    }

    /// Intersects the box with a `photo_w` × `photo_h` canvas.
    ///
    /// The result may be empty (zero width or height) if the box lies
    /// entirely outside the canvas.
    pub fn clamp_to(&self, photo_w: u32, photo_h: u32) -> BoundingBox {
        let x1 = self.x.clamp(0, photo_w as i32);
        let y1 = self.y.clamp(0, photo_h as i32);
        let x2 = (self.x + self.width).clamp(0, photo_w as i32);
        let y2 = (self.y + self.height).clamp(0, photo_h as i32);
        BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}
