/// A single camera frame: tightly packed RGB24 bytes in row-major order.
///
/// Each frame remembers which capture session produced it (`generation`)
/// so results computed from it can be matched against the session that is
/// live by the time they come back.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
    generation: u64,
}

/// Geometry and provenance of a frame without its pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub index: usize,
    pub generation: u64,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * Self::CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
            generation: 0,
        }
    }

    /// Stamps the frame with the capture session that produced it.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
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

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            width: self.width,
            height: self.height,
            index: self.index,
            generation: self.generation,
        }
    }

    /// Copies the pixels into an `image` buffer for resampling.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_has_generation_zero() {
        let frame = Frame::new(vec![0u8; 12], 2, 2, 4);
        assert_eq!(frame.generation(), 0);
        assert_eq!(frame.index(), 4);
    }

    #[test]
    fn test_info_carries_geometry_and_generation() {
        let frame = Frame::new(vec![0u8; 2 * 3 * 3], 3, 2, 0)
            .with_generation(7)
            .with_index(11);
        let info = frame.info();
        assert_eq!(
            info,
            FrameInfo {
                width: 3,
                height: 2,
                index: 11,
                generation: 7,
            }
        );
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * 3")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 0);
    }

    #[test]
    fn test_to_rgb_image_round_trips_dimensions() {
        let frame = Frame::new(vec![9u8; 5 * 3 * 3], 5, 3, 0);
        let img = frame.to_rgb_image().unwrap();
        assert_eq!(img.dimensions(), (5, 3));
        assert_eq!(img.get_pixel(4, 2).0, [9, 9, 9]);
    }
}
