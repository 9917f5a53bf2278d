//! The registry and dispatcher.
//!
//! The manager owns the screen bitmap, the set of connected clients, and
//! the window list. Window list order is paint order: later entries
//! composite on top of earlier ones, and creation appends, so
//! later-created windows start on top. All state here is mutated from the
//! single dispatch task; there is no internal locking.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use canopy_gfx::{Bitmap, Color, Painter, Rect, SharedBuffer};
use canopy_ipc::protocol::Message;

use crate::server::{Client, ClientId, ServerError, Window, WindowId};

pub struct Manager {
    screen: Bitmap,
    clients: HashMap<ClientId, Client>,
    /// Paint order, bottom to top
    windows: Vec<Window>,
}

impl Manager {
    pub fn new(width: i32, height: i32, background: Color) -> Self {
        let mut screen = Bitmap::new(width, height);
        Painter::new(&mut screen).clear(background);

        Self {
            screen,
            clients: HashMap::new(),
            windows: Vec::new(),
        }
    }

    /// Register a freshly accepted connection
    pub fn accept(&mut self, id: ClientId, outbound: mpsc::UnboundedSender<Vec<u8>>) {
        info!("Client {} connected", id);
        self.clients.insert(id, Client::new(id, outbound));
    }

    /// Dispatch one inbound message. Protocol violations are logged and
    /// the message dropped; they never tear down the client's channel.
    pub fn on_message(&mut self, client: ClientId, message: Message) {
        let result = match message {
            Message::CreateWindow {
                window_id,
                handle,
                bound,
            } => self.create_window(client, window_id, handle, bound),
            Message::DestroyWindow { window_id } => self.destroy_window(client, window_id),
            Message::BlitWindow { window_id, bound } => self.blit_window(client, window_id, bound),
            Message::RaiseWindow { window_id } => self.raise_window(client, window_id),
            Message::WindowEvent { .. } => {
                // Events only flow server -> client
                warn!("Client {} sent a WindowEvent; dropping", client);
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!("Client {}: rejected message: {}", client, err);
        }
    }

    /// Cascading teardown: every window the client owns is destroyed, in
    /// creation order, before the client itself is removed. The screen
    /// area those windows covered is left as-is until somebody blits over
    /// it.
    pub fn on_disconnect(&mut self, client: ClientId) {
        let Some(removed) = self.clients.remove(&client) else {
            return;
        };

        let count = removed.windows.len();
        self.windows.retain(|window| window.client != client);

        info!("Client {} disconnected, destroyed {} windows", client, count);
    }

    /// Deliver an event to the client owning `window_id`. This is the
    /// outbound half of the protocol, driven by input plumbing outside
    /// this core.
    pub fn send_window_event(&self, window_id: WindowId, payload: &[u8]) -> Result<(), ServerError> {
        let window = self
            .windows
            .iter()
            .find(|window| window.id == window_id)
            .ok_or(ServerError::UnknownWindow(window_id))?;

        let client = self
            .clients
            .get(&window.client)
            .ok_or(ServerError::UnknownClient(window.client))?;

        client.send_event(window_id, payload)
    }

    pub fn screen(&self) -> &Bitmap {
        &self.screen
    }

    /// Live window ids, in paint order
    pub fn window_ids(&self) -> Vec<WindowId> {
        self.windows.iter().map(|window| window.id).collect()
    }

    fn create_window(
        &mut self,
        client: ClientId,
        window_id: WindowId,
        handle: canopy_gfx::BufferHandle,
        bound: Rect,
    ) -> Result<(), ServerError> {
        if self.windows.iter().any(|window| window.id == window_id) {
            return Err(ServerError::WindowExists(window_id));
        }

        let owner = self
            .clients
            .get_mut(&client)
            .ok_or(ServerError::UnknownClient(client))?;

        let framebuffer = SharedBuffer::open(handle)?;

        owner.add_window(window_id);
        self.windows
            .push(Window::new(window_id, client, bound, framebuffer));

        info!(
            "Client {} created window {} at {:?}",
            client, window_id, bound
        );
        Ok(())
    }

    fn destroy_window(&mut self, client: ClientId, window_id: WindowId) -> Result<(), ServerError> {
        let index = self.owned_window(client, window_id)?;
        self.windows.remove(index);

        if let Some(owner) = self.clients.get_mut(&client) {
            owner.remove_window(window_id);
        }

        info!("Client {} destroyed window {}", client, window_id);
        Ok(())
    }

    /// Composite the requested region of the window into the screen,
    /// then re-composite anything stacked above it there so paint order
    /// holds.
    fn blit_window(
        &mut self,
        client: ClientId,
        window_id: WindowId,
        bound: Rect,
    ) -> Result<(), ServerError> {
        let index = self.owned_window(client, window_id)?;

        let region = bound
            .intersect(self.windows[index].bound)
            .intersect(self.screen.bound());
        if region.is_empty() {
            debug!("Blit of window {} clipped away entirely", window_id);
            return Ok(());
        }

        self.composite(region, index);
        Ok(())
    }

    /// Move the window to the top of the paint order and repaint its bound
    fn raise_window(&mut self, client: ClientId, window_id: WindowId) -> Result<(), ServerError> {
        let index = self.owned_window(client, window_id)?;

        let window = self.windows.remove(index);
        let region = window.bound.intersect(self.screen.bound());
        self.windows.push(window);

        debug!("Raised window {} to the top", window_id);

        if !region.is_empty() {
            self.composite(region, self.windows.len() - 1);
        }
        Ok(())
    }

    /// Paint `region` of every window from paint-order position `from`
    /// upward into the screen bitmap
    fn composite(&mut self, region: Rect, from: usize) {
        let mut painter = Painter::new(&mut self.screen);

        for window in &self.windows[from..] {
            let overlap = region.intersect(window.bound);
            if overlap.is_empty() {
                continue;
            }

            let source = overlap.offset(-window.bound.position());
            painter.blit_bitmap(window.framebuffer(), source, overlap);
        }
    }

    fn owned_window(&self, client: ClientId, window_id: WindowId) -> Result<usize, ServerError> {
        self.windows
            .iter()
            .position(|window| window.id == window_id && window.client == client)
            .ok_or(ServerError::UnknownWindow(window_id))
    }
}
