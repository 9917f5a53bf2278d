//! Font atlases for glyph-masked text rendering.
//!
//! A font is a single atlas bitmap plus per-character metrics. Glyph
//! coverage lives in the atlas red channel; the painter turns it into ink
//! of any color (see [`crate::painter::Painter::blit_bitmap_colored`]).
//! Loading atlases from disk is a collaborator concern, not handled here.

use std::collections::HashMap;

use crate::bitmap::Bitmap;
use crate::geometry::{Point, Rect};

/// One character's region within the atlas
#[derive(Debug, Clone, Copy)]
pub struct Glyph {
    /// Bounding box inside the atlas bitmap
    pub bound: Rect,
    /// Offset from the pen position to the glyph's top-left
    pub origin: Point,
    /// Horizontal pen advance after drawing
    pub advance: i32,
}

pub struct Font {
    atlas: Bitmap,
    glyphs: HashMap<char, Glyph>,
}

impl Font {
    pub fn new(atlas: Bitmap, glyphs: impl IntoIterator<Item = (char, Glyph)>) -> Self {
        Self {
            atlas,
            glyphs: glyphs.into_iter().collect(),
        }
    }

    pub fn atlas(&self) -> &Bitmap {
        &self.atlas
    }

    /// Glyph metrics for `ch`, falling back to `'?'` for characters the
    /// font does not cover
    pub fn glyph(&self, ch: char) -> Option<&Glyph> {
        self.glyphs.get(&ch).or_else(|| self.glyphs.get(&'?'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Color;
    use crate::painter::Painter;

    /// Two solid 4x4 glyphs side by side, 'a' and '?'
    fn test_font() -> Font {
        let mut atlas = Bitmap::new(8, 4);
        atlas.fill(Color::WHITE);

        let glyphs = [
            (
                'a',
                Glyph {
                    bound: Rect::new(0, 0, 4, 4),
                    origin: Point::ZERO,
                    advance: 5,
                },
            ),
            (
                '?',
                Glyph {
                    bound: Rect::new(4, 0, 4, 4),
                    origin: Point::ZERO,
                    advance: 5,
                },
            ),
        ];

        Font::new(atlas, glyphs)
    }

    #[test]
    fn lookup_falls_back_to_question_mark() {
        let font = test_font();
        assert_eq!(font.glyph('a').unwrap().bound.x, 0);
        assert_eq!(font.glyph('z').unwrap().bound.x, 4);
    }

    #[test]
    fn draw_string_advances_pen() {
        let font = test_font();
        let mut target = Bitmap::new(16, 4);
        let mut painter = Painter::new(&mut target);

        painter.draw_string(&font, "aa", Point::ZERO, Color::RED);

        // First glyph at x 0..4, second at x 5..9
        assert_eq!(target.get_pixel(Point::new(0, 0)), Color::RED);
        assert_eq!(target.get_pixel(Point::new(3, 3)), Color::RED);
        assert_eq!(target.get_pixel(Point::new(4, 0)), Color::TRANSPARENT);
        assert_eq!(target.get_pixel(Point::new(5, 0)), Color::RED);
        assert_eq!(target.get_pixel(Point::new(8, 3)), Color::RED);
    }

    #[test]
    fn glyph_origin_offsets_destination() {
        let font = test_font();
        let mut target = Bitmap::new(8, 8);
        let mut painter = Painter::new(&mut target);

        let glyph = Glyph {
            bound: Rect::new(0, 0, 4, 4),
            origin: Point::new(0, 4),
            advance: 5,
        };
        painter.draw_glyph(&font, &glyph, Point::new(0, 4), Color::GREEN);

        // Glyph top-left lands at pen - origin = (0, 0)
        assert_eq!(target.get_pixel(Point::new(0, 0)), Color::GREEN);
        assert_eq!(target.get_pixel(Point::new(3, 3)), Color::GREEN);
        assert_eq!(target.get_pixel(Point::new(0, 4)), Color::TRANSPARENT);
    }
}
