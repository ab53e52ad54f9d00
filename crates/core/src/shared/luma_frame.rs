use crate::shared::frame::Frame;

// BT.601 weights in 14-bit fixed point: 0.299, 0.587, 0.114.
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;

/// Single-channel luminance representation of a [`Frame`].
///
/// Derived once per frame and shared read-only by every detector in a
/// pass, so it exposes no mutable access.
#[derive(Clone, Debug, PartialEq)]
pub struct LumaFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl LumaFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize),
            "data length must equal width * height"
        );
        Self {
            data,
            width,
            height,
        }
    }

    pub fn from_frame(frame: &Frame) -> Self {
        let channels = frame.channels() as usize;
        let data = if channels < 3 {
            frame.data().iter().step_by(channels.max(1)).copied().collect()
        } else {
            frame
                .data()
                .chunks_exact(channels)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect()
        };
        Self::new(data, frame.width(), frame.height())
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

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[(y as usize) * (self.width as usize) + x as usize]
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = (r as u32 * R_WEIGHT + g as u32 * G_WEIGHT + b as u32 * B_WEIGHT + (1 << (SHIFT - 1)))
        >> SHIFT;
    y.min(255) as u8
}
