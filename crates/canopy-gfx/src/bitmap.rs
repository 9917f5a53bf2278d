//! Raster bitmap targets.
//!
//! A `Bitmap` is a width × height grid of packed 0xAARRGGBB pixels, backed
//! either by owned memory or by a shared-memory mapping (see
//! [`crate::shared`]). Window framebuffers on the server side are read-only
//! mappings; writes to those are rejected at the pixel accessors.

use crate::geometry::{Color, Point, Rect};
use crate::shared::Mapping;

enum Storage {
    Owned(Vec<u32>),
    Mapped(Mapping),
}

pub struct Bitmap {
    width: i32,
    height: i32,
    storage: Storage,
}

impl Bitmap {
    /// Allocate an owned bitmap, cleared to transparent black
    pub fn new(width: i32, height: i32) -> Self {
        assert!(width > 0 && height > 0, "bitmap dimensions must be positive");
        Self {
            width,
            height,
            storage: Storage::Owned(vec![0; (width * height) as usize]),
        }
    }

    pub(crate) fn from_mapping(width: i32, height: i32, mapping: Mapping) -> Self {
        Self {
            width,
            height,
            storage: Storage::Mapped(mapping),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bound(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    fn pixels(&self) -> &[u32] {
        match &self.storage {
            Storage::Owned(pixels) => pixels,
            Storage::Mapped(mapping) => mapping.as_slice(),
        }
    }

    fn pixels_mut(&mut self) -> Option<&mut [u32]> {
        match &mut self.storage {
            Storage::Owned(pixels) => Some(pixels),
            Storage::Mapped(mapping) => mapping.as_mut_slice(),
        }
    }

    pub fn get_pixel(&self, position: Point) -> Color {
        if !self.bound().contains(position) {
            return Color::TRANSPARENT;
        }
        let index = (position.y * self.width + position.x) as usize;
        Color::from_u32(self.pixels()[index])
    }

    /// Hard pixel write. Out-of-bounds positions and read-only mappings are
    /// no-ops.
    pub fn set_pixel(&mut self, position: Point, color: Color) {
        if !self.bound().contains(position) {
            return;
        }
        let index = (position.y * self.width + position.x) as usize;
        if let Some(pixels) = self.pixels_mut() {
            pixels[index] = color.to_u32();
        }
    }

    /// Alpha-blend `color` onto the existing pixel
    pub fn blend_pixel(&mut self, position: Point, color: Color) {
        let existing = self.get_pixel(position);
        self.set_pixel(position, color.blend_over(existing));
    }

    /// Nearest-neighbor sample at normalized `(u, v)` within `source`
    pub fn sample(&self, source: Rect, u: f32, v: f32) -> Color {
        if source.is_empty() {
            return Color::TRANSPARENT;
        }

        let x = source.x + ((u * source.width as f32) as i32).clamp(0, source.width - 1);
        let y = source.y + ((v * source.height as f32) as i32).clamp(0, source.height - 1);

        self.get_pixel(Point::new(x, y))
    }

    pub fn fill(&mut self, color: Color) {
        let pixel = color.to_u32();
        if let Some(pixels) = self.pixels_mut() {
            pixels.fill(pixel);
        }
    }
}
