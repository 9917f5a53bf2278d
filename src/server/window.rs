use canopy_gfx::{Bitmap, Rect, SharedBuffer};

use crate::server::{ClientId, WindowId};

/// One on-screen surface: identity, owner, screen-space bound, and the
/// client-supplied framebuffer the server maps read-only. The framebuffer
/// is never copied; the owning client may be writing it while we
/// composite, which is an accepted tearing risk.
pub struct Window {
    pub id: WindowId,
    pub client: ClientId,
    pub bound: Rect,
    framebuffer: SharedBuffer,
}

impl Window {
    pub fn new(id: WindowId, client: ClientId, bound: Rect, framebuffer: SharedBuffer) -> Self {
        Self {
            id,
            client,
            bound,
            framebuffer,
        }
    }

    pub fn framebuffer(&self) -> &Bitmap {
        self.framebuffer.bitmap()
    }
}
