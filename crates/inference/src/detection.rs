use serde::{Deserialize, Serialize};

/// Axis-aligned box in source-image pixel coordinates. Serialised as
/// `x1, y1, x2, y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(rename = "x1")]
    pub x_min: f32,
    #[serde(rename = "y1")]
    pub y_min: f32,
    #[serde(rename = "x2")]
    pub x_max: f32,
    #[serde(rename = "y2")]
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union; 0 when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = BoundingBox::new(
            self.x_min.max(other.x_min),
            self.y_min.max(other.y_min),
            self.x_max.min(other.x_max),
            self.y_max.min(other.y_max),
        )
        .area();

        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    /// Clips the box to `[0, width] x [0, height]`.
    ///
    /// Reversed corners are reordered. Returns `None` for non-finite
    /// coordinates or a box lying entirely outside the image.
    pub fn clip(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }

        let (w, h) = (width as f32, height as f32);
        let x_min = self.x_min.min(self.x_max);
        let x_max = self.x_min.max(self.x_max);
        let y_min = self.y_min.min(self.y_max);
        let y_max = self.y_min.max(self.y_max);

        if x_max < 0.0 || y_max < 0.0 || x_min > w || y_min > h {
            return None;
        }

        Some(BoundingBox::new(
            x_min.clamp(0.0, w),
            y_min.clamp(0.0, h),
            x_max.clamp(0.0, w),
            y_max.clamp(0.0, h),
        ))
    }
}

/// One predicted object instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    #[serde(rename = "class_name")]
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            confidence,
        }
    }

    /// Text rendered next to the box, e.g. `cat 0.90`.
    pub fn tag(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }

    /// Copy of this detection constrained to the image bounds, with the
    /// confidence clamped to `[0, 1]`.
    pub fn clipped(&self, width: u32, height: u32) -> Option<Detection> {
        if !self.confidence.is_finite() {
            return None;
        }
        let bbox = self.bbox.clip(width, height)?;
        Some(Detection {
            bbox,
            label: self.label.clone(),
            confidence: self.confidence.clamp(0.0, 1.0),
        })
    }
}
