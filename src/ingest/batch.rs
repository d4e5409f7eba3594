use std::collections::VecDeque;

use anyhow::{Context, Result};

use super::FrameSource;
use crate::batch::BatchImage;
use crate::frame::Frame;

/// Finite source over uploaded images.
///
/// Each image is decoded when it is read. An undecodable image surfaces as a read
/// error for that item only; the next read moves on to the following image.
pub struct BatchSource {
    pending: VecDeque<BatchImage>,
    total: usize,
}

impl BatchSource {
    pub fn new(images: Vec<BatchImage>) -> Self {
        Self {
            total: images.len(),
            pending: images.into(),
        }
    }

    /// Images not yet handed out.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for BatchSource {
    fn name(&self) -> String {
        format!("batch({} images)", self.total)
    }

    fn open(&mut self) -> Result<()> {
        log::info!("BatchSource: {} images queued", self.pending.len());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(image) = self.pending.pop_front() else {
            return Ok(None);
        };
        Frame::decode(&image.bytes)
            .with_context(|| format!("batch image {}", image.name))
            .map(Some)
    }

    fn release(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn yields_each_image_then_exhausts() -> Result<()> {
        let mut source = BatchSource::new(vec![
            BatchImage::new("a.png", png(4, 3)),
            BatchImage::new("b.png", b"corrupt".to_vec()),
            BatchImage::new("c.png", png(2, 2)),
        ]);
        source.open()?;

        let first = source.next_frame()?.expect("first frame");
        assert_eq!((first.width(), first.height()), (4, 3));

        let err = source.next_frame().unwrap_err();
        assert!(format!("{err:#}").contains("b.png"));

        let third = source.next_frame()?.expect("third frame");
        assert_eq!((third.width(), third.height()), (2, 2));

        assert!(source.next_frame()?.is_none());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn release_drops_pending_images() {
        let mut source = BatchSource::new(vec![BatchImage::new("a.png", png(1, 1))]);
        source.release();
        assert_eq!(source.remaining(), 0);
    }
}
