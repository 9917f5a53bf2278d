use tokio::sync::mpsc;
use tracing::debug;

use canopy_ipc::protocol::{Message, ProtocolError, MAX_EVENT_PAYLOAD};

use crate::server::{ClientId, ServerError, WindowId};

/// One connected application: its outbound channel and the windows it
/// owns, in creation order.
pub struct Client {
    pub id: ClientId,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pub windows: Vec<WindowId>,
}

impl Client {
    pub fn new(id: ClientId, outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            id,
            outbound,
            windows: Vec::new(),
        }
    }

    pub fn add_window(&mut self, window_id: WindowId) {
        self.windows.push(window_id);
    }

    pub fn remove_window(&mut self, window_id: WindowId) {
        self.windows.retain(|&id| id != window_id);
    }

    /// Queue a `WindowEvent` for delivery. The payload must fit the
    /// channel's message capacity; oversized events are a caller error,
    /// rejected before anything is written.
    pub fn send_event(&self, window_id: WindowId, payload: &[u8]) -> Result<(), ServerError> {
        if payload.len() > MAX_EVENT_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge(payload.len()).into());
        }

        let message = Message::WindowEvent {
            window_id,
            payload: payload.to_vec(),
        };
        let bytes = message.encode()?;

        debug!(
            "Sending {} byte event to window {} of client {}",
            payload.len(),
            window_id,
            self.id
        );

        self.outbound
            .send(bytes)
            .map_err(|_| ServerError::ChannelClosed)
    }
}
