/// Axis-aligned box in TLBR format (x1, y1, x2, y2), the layout used by
/// region proposals, ground-truth annotations and tracked ROIs.
///
/// Widths and heights follow the pixel-inclusive convention of Fast R-CNN:
/// a box spanning `x1..=x2` is `x2 - x1 + 1` pixels wide.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    #[inline]
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[inline]
    pub fn from_array(tlbr: [f32; 4]) -> Self {
        Self::new(tlbr[0], tlbr[1], tlbr[2], tlbr[3])
    }

    #[inline]
    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1 + 1.0
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1 + 1.0
    }

    /// Get the center point of the bounding box.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x1 + 0.5 * self.width(), self.y1 + 0.5 * self.height())
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Calculate Intersection over Union (IoU) with another bounding box.
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter_width = (self.x2.min(other.x2) - self.x1.max(other.x1) + 1.0).max(0.0);
        let inter_height = (self.y2.min(other.y2) - self.y1.max(other.y1) + 1.0).max(0.0);
        let inter_area = inter_width * inter_height;

        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }

    /// Regression deltas (dx, dy, dw, dh) that move `self` onto `target`.
    pub fn deltas_to(&self, target: &Rect) -> [f32; 4] {
        let (ex, ey) = self.center();
        let (gx, gy) = target.center();
        let (ew, eh) = (self.width(), self.height());
        [
            (gx - ex) / ew,
            (gy - ey) / eh,
            (target.width() / ew).ln(),
            (target.height() / eh).ln(),
        ]
    }

    /// Inverse of [`Rect::deltas_to`]: apply regression deltas to this box.
    pub fn apply_deltas(&self, deltas: [f32; 4]) -> Rect {
        let (cx, cy) = self.center();
        let (w, h) = (self.width(), self.height());
        let pred_cx = deltas[0] * w + cx;
        let pred_cy = deltas[1] * h + cy;
        let pred_w = deltas[2].exp() * w;
        let pred_h = deltas[3].exp() * h;
        Rect::new(
            pred_cx - 0.5 * pred_w,
            pred_cy - 0.5 * pred_h,
            pred_cx + 0.5 * pred_w - 1.0,
            pred_cy + 0.5 * pred_h - 1.0,
        )
    }

    /// Clip the box into an image of the given size.
    pub fn clip(&self, width: f32, height: f32) -> Rect {
        let max_x = (width - 1.0).max(0.0);
        let max_y = (height - 1.0).max(0.0);
        Rect::new(
            self.x1.clamp(0.0, max_x),
            self.y1.clamp(0.0, max_y),
            self.x2.clamp(0.0, max_x),
            self.y2.clamp(0.0, max_y),
        )
    }
}
