//! Canopy graphics primitives
//!
//! Software rendering shared by the compositor server and client-side
//! drawing code: geometry types, bitmaps (owned or shared-memory backed),
//! the `Painter` rendering engine, and font-atlas text rendering.

pub mod bitmap;
pub mod font;
pub mod geometry;
pub mod painter;
pub mod shared;

pub use bitmap::Bitmap;
pub use font::{Font, Glyph};
pub use geometry::{Color, Point, Rect};
pub use painter::{Painter, PainterError};
pub use shared::{BufferHandle, SharedBuffer};
