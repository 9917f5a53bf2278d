//! The software rendering engine.
//!
//! A `Painter` draws into one borrowed bitmap through a pair of transform
//! stacks: a clip stack (progressively intersected rectangles) and an
//! origin stack (additive coordinate offsets). Every primitive routes its
//! pixels through [`Painter::plot_pixel`], so clipping and origin
//! translation apply uniformly to lines, fills, blits, and text.
//!
//! Both the compositor (painting window framebuffers into the screen) and
//! client-side drawing code (painting widgets into a framebuffer) use this
//! same engine.

use thiserror::Error;

use crate::bitmap::Bitmap;
use crate::font::{Font, Glyph};
use crate::geometry::{Color, Point, Rect};

/// Clip and origin stack depth, including the base entry
pub const STACK_DEPTH: usize = 32;

/// Clip/origin stack misuse. A mismatched push/pop pairing would corrupt
/// every subsequent draw, so these are surfaced as explicit errors instead
/// of being asserted away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PainterError {
    #[error("clip/origin stack overflow (depth {STACK_DEPTH})")]
    StackOverflow,
    #[error("attempted to pop the base clip/origin entry")]
    StackUnderflow,
}

pub struct Painter<'a> {
    target: &'a mut Bitmap,

    clip_stack: [Rect; STACK_DEPTH],
    clip_top: usize,

    origin_stack: [Point; STACK_DEPTH],
    origin_top: usize,
}

impl<'a> Painter<'a> {
    /// Begin a rendering pass over `target`. The base clip is the full
    /// target bound and the base origin is zero; neither can be popped.
    pub fn new(target: &'a mut Bitmap) -> Self {
        let mut clip_stack = [Rect::EMPTY; STACK_DEPTH];
        clip_stack[0] = target.bound();

        Self {
            target,
            clip_stack,
            clip_top: 0,
            origin_stack: [Point::ZERO; STACK_DEPTH],
            origin_top: 0,
        }
    }

    /// The active clip rectangle (intersection of everything pushed)
    pub fn clip(&self) -> Rect {
        self.clip_stack[self.clip_top]
    }

    /// The active origin offset (sum of everything pushed)
    pub fn origin(&self) -> Point {
        self.origin_stack[self.origin_top]
    }

    /// Intersect `clip` with the active clip rectangle
    pub fn push_clip(&mut self, clip: Rect) -> Result<(), PainterError> {
        if self.clip_top + 1 >= STACK_DEPTH {
            return Err(PainterError::StackOverflow);
        }

        self.clip_top += 1;
        self.clip_stack[self.clip_top] = self.clip_stack[self.clip_top - 1].intersect(clip);
        Ok(())
    }

    pub fn pop_clip(&mut self) -> Result<(), PainterError> {
        if self.clip_top == 0 {
            return Err(PainterError::StackUnderflow);
        }
        self.clip_top -= 1;
        Ok(())
    }

    pub fn push_origin(&mut self, origin: Point) -> Result<(), PainterError> {
        if self.origin_top + 1 >= STACK_DEPTH {
            return Err(PainterError::StackOverflow);
        }

        self.origin_top += 1;
        self.origin_stack[self.origin_top] = self.origin_stack[self.origin_top - 1] + origin;
        Ok(())
    }

    pub fn pop_origin(&mut self) -> Result<(), PainterError> {
        if self.origin_top == 0 {
            return Err(PainterError::StackUnderflow);
        }
        self.origin_top -= 1;
        Ok(())
    }

    /// Alpha-blend one pixel, subject to origin transform and clip test
    pub fn plot_pixel(&mut self, position: Point, color: Color) {
        let transformed = position + self.origin();

        if self.clip().contains(transformed) {
            self.target.blend_pixel(transformed, color);
        }
    }

    /// Overwrite one pixel unconditionally (no blending), subject to the
    /// same transform and clip test
    pub fn clear_pixel(&mut self, position: Point, color: Color) {
        let transformed = position + self.origin();

        if self.clip().contains(transformed) {
            self.target.set_pixel(transformed, color);
        }
    }

    fn draw_line_x_aligned(&mut self, x: i32, start: i32, end: i32, color: Color) {
        for y in start..end {
            self.plot_pixel(Point::new(x, y), color);
        }
    }

    fn draw_line_y_aligned(&mut self, y: i32, start: i32, end: i32, color: Color) {
        for x in start..end {
            self.plot_pixel(Point::new(x, y), color);
        }
    }

    fn draw_line_not_aligned(&mut self, a: Point, b: Point, color: Color) {
        // Bresenham, stepping one pixel at a time
        let dx = (b.x - a.x).abs();
        let dy = (b.y - a.y).abs();
        let sx = if a.x < b.x { 1 } else { -1 };
        let sy = if a.y < b.y { 1 } else { -1 };
        let mut err = if dx > dy { dx } else { -dy } / 2;

        let mut current = a;
        loop {
            self.plot_pixel(current, color);

            if current == b {
                break;
            }

            let e2 = err;
            if e2 > -dx {
                err -= dy;
                current.x += sx;
            }
            if e2 < dy {
                err += dx;
                current.y += sy;
            }
        }
    }

    /// Axis-aligned segments cover the half-open range `[start, end)`;
    /// diagonal segments include both endpoints.
    pub fn draw_line(&mut self, a: Point, b: Point, color: Color) {
        if a.x == b.x {
            self.draw_line_x_aligned(a.x, a.y.min(b.y), a.y.max(b.y), color);
        } else if a.y == b.y {
            self.draw_line_y_aligned(a.y, a.x.min(b.x), a.x.max(b.x), color);
        } else {
            self.draw_line_not_aligned(a, b, color);
        }
    }

    pub fn draw_rectangle(&mut self, rect: Rect, color: Color) {
        let top_left = rect.position();
        let top_right = Point::new(rect.right() - 1, rect.y);
        let bottom_left = Point::new(rect.x, rect.bottom() - 1);
        let bottom_right = Point::new(rect.right() - 1, rect.bottom() - 1);

        self.draw_line(top_left, top_right, color);
        self.draw_line(top_left, bottom_left, color);
        self.draw_line(top_right, bottom_right, color);
        self.draw_line(bottom_left, bottom_right, color);

        // The half-open edges all stop short of this corner
        self.plot_pixel(bottom_right, color);
    }

    pub fn draw_triangle(&mut self, p0: Point, p1: Point, p2: Point, color: Color) {
        self.draw_line(p0, p1, color);
        self.draw_line(p1, p2, color);
        self.draw_line(p2, p0, color);
    }

    /// Scanline fill. Vertices are sorted by Y, edge slopes interpolated in
    /// floating point, and each scanline span is widened by one pixel on
    /// each side so integer rounding never opens seams between spans.
    pub fn fill_triangle(&mut self, p0: Point, p1: Point, p2: Point, color: Color) {
        let mut a = (p0.x as f64, p0.y as f64);
        let mut b = (p1.x as f64, p1.y as f64);
        let mut c = (p2.x as f64, p2.y as f64);

        if a.1 > b.1 {
            std::mem::swap(&mut a, &mut b);
        }
        if a.1 > c.1 {
            std::mem::swap(&mut a, &mut c);
        }
        if b.1 > c.1 {
            std::mem::swap(&mut b, &mut c);
        }

        // Zero-height triangle: nothing to scan, and no slope to divide by
        if c.1 <= a.1 {
            return;
        }

        let mut dx1 = 0.0;
        let mut dx2 = 0.0;
        let mut dx3 = 0.0;

        if b.1 - a.1 > 0.0 {
            dx1 = (b.0 - a.0) / (b.1 - a.1);
        }
        if c.1 - a.1 > 0.0 {
            dx2 = (c.0 - a.0) / (c.1 - a.1);
        }
        if c.1 - b.1 > 0.0 {
            dx3 = (c.0 - b.0) / (c.1 - b.1);
        }

        let mut span = |painter: &mut Self, left: f64, right: f64, y: f64| {
            painter.draw_line(
                Point::new((left - 1.0) as i32, y as i32),
                Point::new((right + 1.0) as i32, y as i32),
                color,
            );
        };

        let mut s = a;
        let mut e = a;

        if dx1 > dx2 {
            while s.1 <= b.1 {
                span(self, s.0, e.0, s.1);
                s.1 += 1.0;
                e.1 += 1.0;
                s.0 += dx2;
                e.0 += dx1;
            }

            e = b;
            while s.1 <= c.1 {
                span(self, s.0, e.0, s.1);
                s.1 += 1.0;
                e.1 += 1.0;
                s.0 += dx2;
                e.0 += dx3;
            }
        } else {
            while s.1 <= b.1 {
                span(self, s.0, e.0, s.1);
                s.1 += 1.0;
                e.1 += 1.0;
                s.0 += dx1;
                e.0 += dx2;
            }

            s = b;
            while s.1 <= c.1 {
                span(self, s.0, e.0, s.1);
                s.1 += 1.0;
                e.1 += 1.0;
                s.0 += dx3;
                e.0 += dx2;
            }
        }
    }

    /// Per-pixel blend fill. Rectangles here are small UI regions; no span
    /// optimization needed.
    pub fn fill_rectangle(&mut self, rect: Rect, color: Color) {
        for x in 0..rect.width {
            for y in 0..rect.height {
                self.plot_pixel(Point::new(rect.x + x, rect.y + y), color);
            }
        }
    }

    /// Hard-set every pixel of the target (within clip)
    pub fn clear(&mut self, color: Color) {
        self.clear_rectangle(self.target.bound(), color);
    }

    pub fn clear_rectangle(&mut self, rect: Rect, color: Color) {
        for x in 0..rect.width {
            for y in 0..rect.height {
                self.clear_pixel(Point::new(rect.x + x, rect.y + y), color);
            }
        }
    }

    fn blit_bitmap_fast(&mut self, bitmap: &Bitmap, source: Rect, destination: Rect) {
        for x in 0..destination.width {
            for y in 0..destination.height {
                let sample = bitmap.get_pixel(Point::new(source.x + x, source.y + y));
                self.plot_pixel(destination.position() + Point::new(x, y), sample);
            }
        }
    }

    fn blit_bitmap_scaled(&mut self, bitmap: &Bitmap, source: Rect, destination: Rect) {
        for x in 0..destination.width {
            for y in 0..destination.height {
                let u = x as f32 / destination.width as f32;
                let v = y as f32 / destination.height as f32;

                let sample = bitmap.sample(source, u, v);
                self.plot_pixel(destination.position() + Point::new(x, y), sample);
            }
        }
    }

    /// Copy `source` of `bitmap` into `destination`, 1:1 when the sizes
    /// match, nearest-neighbor scaled otherwise
    pub fn blit_bitmap(&mut self, bitmap: &Bitmap, source: Rect, destination: Rect) {
        if destination.is_empty() {
            return;
        }

        if source.width == destination.width && source.height == destination.height {
            self.blit_bitmap_fast(bitmap, source, destination);
        } else {
            self.blit_bitmap_scaled(bitmap, source, destination);
        }
    }

    /// Scaled blit where the sampled red channel acts as a coverage mask
    /// for `color` — the glyph rendering mechanism.
    pub fn blit_bitmap_colored(
        &mut self,
        bitmap: &Bitmap,
        source: Rect,
        destination: Rect,
        color: Color,
    ) {
        if destination.is_empty() {
            return;
        }

        for x in 0..destination.width {
            for y in 0..destination.height {
                let u = x as f32 / destination.width as f32;
                let v = y as f32 / destination.height as f32;

                let sample = bitmap.sample(source, u, v);
                let alpha = (sample.r as u32 * color.a as u32 / 255) as u8;

                self.plot_pixel(
                    destination.position() + Point::new(x, y),
                    color.with_alpha(alpha),
                );
            }
        }
    }

    pub fn draw_glyph(&mut self, font: &Font, glyph: &Glyph, position: Point, color: Color) {
        let destination = Rect::new(
            position.x - glyph.origin.x,
            position.y - glyph.origin.y,
            glyph.bound.width,
            glyph.bound.height,
        );

        self.blit_bitmap_colored(font.atlas(), glyph.bound, destination, color);
    }

    /// Single-line text: fixed left-to-right advance, no kerning or
    /// wrapping. Characters the font cannot resolve are skipped.
    pub fn draw_string(&mut self, font: &Font, text: &str, position: Point, color: Color) {
        let mut pen = position;

        for ch in text.chars() {
            if let Some(glyph) = font.glyph(ch) {
                self.draw_glyph(font, glyph, pen, color);
                pen.x += glyph.advance;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_colored(bitmap: &Bitmap, color: Color) -> usize {
        let mut count = 0;
        for y in 0..bitmap.height() {
            for x in 0..bitmap.width() {
                if bitmap.get_pixel(Point::new(x, y)) == color {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn clip_stack_intersects_and_restores() {
        let mut target = Bitmap::new(20, 20);
        let mut painter = Painter::new(&mut target);

        painter.push_clip(Rect::new(2, 2, 10, 10)).unwrap();
        assert_eq!(painter.clip(), Rect::new(2, 2, 10, 10));

        painter.push_clip(Rect::new(5, 5, 10, 10)).unwrap();
        assert_eq!(painter.clip(), Rect::new(5, 5, 7, 7));

        painter.pop_clip().unwrap();
        assert_eq!(painter.clip(), Rect::new(2, 2, 10, 10));
    }

    #[test]
    fn base_stack_entries_cannot_be_popped() {
        let mut target = Bitmap::new(4, 4);
        let mut painter = Painter::new(&mut target);

        assert_eq!(painter.pop_clip(), Err(PainterError::StackUnderflow));
        assert_eq!(painter.pop_origin(), Err(PainterError::StackUnderflow));
    }

    #[test]
    fn stack_depth_is_bounded() {
        let mut target = Bitmap::new(4, 4);
        let mut painter = Painter::new(&mut target);

        for _ in 0..STACK_DEPTH - 1 {
            painter.push_origin(Point::new(0, 0)).unwrap();
        }
        assert_eq!(
            painter.push_origin(Point::new(0, 0)),
            Err(PainterError::StackOverflow)
        );

        for _ in 0..STACK_DEPTH - 1 {
            painter.push_clip(Rect::new(0, 0, 4, 4)).unwrap();
        }
        assert_eq!(
            painter.push_clip(Rect::new(0, 0, 4, 4)),
            Err(PainterError::StackOverflow)
        );
    }

    #[test]
    fn plot_outside_clip_is_a_noop() {
        let mut target = Bitmap::new(10, 10);
        let mut painter = Painter::new(&mut target);

        painter.push_clip(Rect::new(0, 0, 5, 5)).unwrap();
        painter.plot_pixel(Point::new(7, 7), Color::RED);
        painter.plot_pixel(Point::new(2, 2), Color::RED);

        assert_eq!(target.get_pixel(Point::new(7, 7)), Color::TRANSPARENT);
        assert_eq!(target.get_pixel(Point::new(2, 2)), Color::RED);
    }

    #[test]
    fn origin_translates_before_clip() {
        let mut target = Bitmap::new(10, 10);
        let mut painter = Painter::new(&mut target);

        painter.push_origin(Point::new(3, 4)).unwrap();
        painter.push_origin(Point::new(1, 1)).unwrap();
        painter.plot_pixel(Point::new(0, 0), Color::GREEN);
        painter.pop_origin().unwrap();
        painter.pop_origin().unwrap();
        painter.plot_pixel(Point::new(0, 0), Color::BLUE);

        assert_eq!(target.get_pixel(Point::new(4, 5)), Color::GREEN);
        assert_eq!(target.get_pixel(Point::new(0, 0)), Color::BLUE);
    }

    #[test]
    fn clear_pixel_overwrites_without_blending() {
        let mut target = Bitmap::new(4, 4);
        target.fill(Color::RED);
        let mut painter = Painter::new(&mut target);

        let faint = Color::from_rgba(0, 0, 255, 0);
        painter.clear_pixel(Point::new(1, 1), faint);
        painter.plot_pixel(Point::new(2, 2), faint);

        assert_eq!(target.get_pixel(Point::new(1, 1)), faint);
        assert_eq!(target.get_pixel(Point::new(2, 2)), Color::RED);
    }

    #[test]
    fn horizontal_line_is_half_open() {
        let mut target = Bitmap::new(10, 10);
        let mut painter = Painter::new(&mut target);

        painter.draw_line(Point::new(0, 0), Point::new(5, 0), Color::RED);

        for x in 0..5 {
            assert_eq!(target.get_pixel(Point::new(x, 0)), Color::RED, "x={x}");
        }
        assert_eq!(target.get_pixel(Point::new(5, 0)), Color::TRANSPARENT);
    }

    #[test]
    fn vertical_line_is_half_open() {
        let mut target = Bitmap::new(10, 10);
        let mut painter = Painter::new(&mut target);

        painter.draw_line(Point::new(3, 2), Point::new(3, 6), Color::BLUE);

        assert_eq!(target.get_pixel(Point::new(3, 1)), Color::TRANSPARENT);
        for y in 2..6 {
            assert_eq!(target.get_pixel(Point::new(3, y)), Color::BLUE, "y={y}");
        }
        assert_eq!(target.get_pixel(Point::new(3, 6)), Color::TRANSPARENT);
    }

    #[test]
    fn diagonal_line_touches_both_endpoints() {
        let mut target = Bitmap::new(10, 10);
        let mut painter = Painter::new(&mut target);

        painter.draw_line(Point::new(1, 1), Point::new(6, 4), Color::GREEN);

        assert_eq!(target.get_pixel(Point::new(1, 1)), Color::GREEN);
        assert_eq!(target.get_pixel(Point::new(6, 4)), Color::GREEN);
    }

    #[test]
    fn fill_rectangle_covers_exactly_its_area() {
        let mut target = Bitmap::new(10, 10);
        let mut painter = Painter::new(&mut target);

        painter.fill_rectangle(Rect::new(2, 3, 4, 2), Color::RED);

        assert_eq!(count_colored(&target, Color::RED), 8);
        assert_eq!(target.get_pixel(Point::new(2, 3)), Color::RED);
        assert_eq!(target.get_pixel(Point::new(5, 4)), Color::RED);
        assert_eq!(target.get_pixel(Point::new(6, 4)), Color::TRANSPARENT);
    }

    #[test]
    fn degenerate_triangle_plots_nothing() {
        let mut target = Bitmap::new(10, 10);
        let mut painter = Painter::new(&mut target);

        painter.fill_triangle(
            Point::new(1, 5),
            Point::new(4, 5),
            Point::new(8, 5),
            Color::RED,
        );

        assert_eq!(count_colored(&target, Color::RED), 0);
    }

    #[test]
    fn fill_triangle_covers_interior() {
        let mut target = Bitmap::new(20, 20);
        let mut painter = Painter::new(&mut target);

        painter.fill_triangle(
            Point::new(10, 2),
            Point::new(2, 16),
            Point::new(18, 16),
            Color::BLUE,
        );

        // Points comfortably inside the triangle
        assert_eq!(target.get_pixel(Point::new(10, 8)), Color::BLUE);
        assert_eq!(target.get_pixel(Point::new(8, 14)), Color::BLUE);
        assert_eq!(target.get_pixel(Point::new(12, 14)), Color::BLUE);
        // Far corners stay untouched
        assert_eq!(target.get_pixel(Point::new(0, 0)), Color::TRANSPARENT);
        assert_eq!(target.get_pixel(Point::new(19, 0)), Color::TRANSPARENT);
    }

    #[test]
    fn blit_unscaled_copies_pixels() {
        let mut source = Bitmap::new(4, 4);
        source.fill(Color::GREEN);
        source.set_pixel(Point::new(1, 1), Color::RED);

        let mut target = Bitmap::new(10, 10);
        let mut painter = Painter::new(&mut target);
        painter.blit_bitmap(&source, source.bound(), Rect::new(3, 3, 4, 4));

        assert_eq!(target.get_pixel(Point::new(3, 3)), Color::GREEN);
        assert_eq!(target.get_pixel(Point::new(4, 4)), Color::RED);
        assert_eq!(target.get_pixel(Point::new(2, 3)), Color::TRANSPARENT);
    }

    #[test]
    fn blit_scaled_stretches_source() {
        let mut source = Bitmap::new(2, 1);
        source.set_pixel(Point::new(0, 0), Color::RED);
        source.set_pixel(Point::new(1, 0), Color::BLUE);

        let mut target = Bitmap::new(8, 2);
        let mut painter = Painter::new(&mut target);
        painter.blit_bitmap(&source, source.bound(), Rect::new(0, 0, 8, 2));

        assert_eq!(target.get_pixel(Point::new(0, 0)), Color::RED);
        assert_eq!(target.get_pixel(Point::new(3, 1)), Color::RED);
        assert_eq!(target.get_pixel(Point::new(4, 0)), Color::BLUE);
        assert_eq!(target.get_pixel(Point::new(7, 1)), Color::BLUE);
    }

    #[test]
    fn blit_respects_clip() {
        let mut source = Bitmap::new(4, 4);
        source.fill(Color::RED);

        let mut target = Bitmap::new(10, 10);
        let mut painter = Painter::new(&mut target);
        painter.push_clip(Rect::new(0, 0, 2, 2)).unwrap();
        painter.blit_bitmap(&source, source.bound(), Rect::new(0, 0, 4, 4));

        assert_eq!(count_colored(&target, Color::RED), 4);
    }

    #[test]
    fn colored_blit_uses_red_channel_as_mask() {
        let mut mask = Bitmap::new(2, 1);
        mask.set_pixel(Point::new(0, 0), Color::from_rgb(255, 255, 255));
        mask.set_pixel(Point::new(1, 0), Color::from_rgb(0, 0, 0));

        let mut target = Bitmap::new(2, 1);
        let target_bound = target.bound();
        let mut painter = Painter::new(&mut target);
        painter.blit_bitmap_colored(&mask, mask.bound(), target_bound, Color::GREEN);

        assert_eq!(target.get_pixel(Point::new(0, 0)), Color::GREEN);
        assert_eq!(target.get_pixel(Point::new(1, 0)), Color::TRANSPARENT);
    }
}
