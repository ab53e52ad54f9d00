use serde::{Deserialize, Serialize};

/// Display color as an RGB triple. Serialised as `[r, g, b]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Builds a color from OpenCV-style BGR channel order.
    pub const fn from_bgr(b: u8, g: u8, r: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        c.to_array()
    }
}

impl From<Rgb> for image::Rgb<u8> {
    fn from(c: Rgb) -> Self {
        image::Rgb(c.to_array())
    }
}
