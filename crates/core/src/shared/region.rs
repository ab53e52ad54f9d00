/// Axis-aligned rectangle in frame pixel coordinates.
///
/// Detectors are responsible for producing regions that are non-negative
/// and fully inside the frame; [`Region::clamp_to`] is the helper they use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the rectangle lies entirely inside a `frame_w` x `frame_h` frame.
    pub fn fits_within(&self, frame_w: u32, frame_h: u32) -> bool {
        self.right() <= frame_w && self.bottom() <= frame_h
    }

    /// Intersects the region with the frame bounds.
    ///
    /// Returns `None` when nothing of the region remains visible.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Option<Region> {
        if self.x >= frame_w || self.y >= frame_h {
            return None;
        }
        let clamped = Region {
            x: self.x,
            y: self.y,
            width: self.right().min(frame_w) - self.x,
            height: self.bottom().min(frame_h) - self.y,
        };
        (!clamped.is_empty()).then_some(clamped)
    }

    pub fn contains(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}
