//! Client-side compositor library.
//!
//! Consumed by UI toolkits running in application processes. All
//! connection state lives in an explicit [`Application`] context object
//! constructed at startup and threaded through every call; there are no
//! process-global statics. Drawing into a window's framebuffer happens
//! through `canopy-gfx` (create a [`canopy_gfx::SharedBuffer`], paint into
//! its bitmap, then [`Application::request_blit`]).

use std::io;
use std::path::{Path, PathBuf};

use tokio::net::UnixStream;
use tracing::{debug, warn};

use canopy_gfx::{Rect, SharedBuffer};
use canopy_ipc::protocol::Message;
use canopy_ipc::transport::{read_message, write_message, TransportError};

pub use canopy_ipc::socket_path;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to compositor at {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("window {0} is not owned by this application")]
    UnknownWindow(u32),
}

/// An event delivered to one of the application's windows
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEvent {
    pub window_id: u32,
    pub payload: Vec<u8>,
}

/// One application's connection to the compositor.
///
/// Window ids are allocated client-side from a per-application counter;
/// the server validates them against its registry on every operation.
pub struct Application {
    stream: UnixStream,
    next_window_id: u32,
    windows: Vec<u32>,
}

impl Application {
    /// Connect to the compositor at the default socket path
    pub async fn connect() -> Result<Self, ClientError> {
        Self::connect_to(socket_path()).await
    }

    pub async fn connect_to(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| ClientError::Connect {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("Connected to compositor at {:?}", path);

        Ok(Self {
            stream,
            next_window_id: 1,
            windows: Vec::new(),
        })
    }

    /// Register a window backed by `framebuffer` at `bound` (screen space)
    pub async fn create_window(
        &mut self,
        bound: Rect,
        framebuffer: &SharedBuffer,
    ) -> Result<u32, ClientError> {
        let window_id = self.next_window_id;
        self.next_window_id += 1;

        write_message(
            &mut self.stream,
            &Message::CreateWindow {
                window_id,
                handle: framebuffer.handle(),
                bound,
            },
        )
        .await?;

        self.windows.push(window_id);
        debug!("Created window {} at {:?}", window_id, bound);
        Ok(window_id)
    }

    pub async fn destroy_window(&mut self, window_id: u32) -> Result<(), ClientError> {
        let index = self
            .windows
            .iter()
            .position(|&id| id == window_id)
            .ok_or(ClientError::UnknownWindow(window_id))?;

        write_message(&mut self.stream, &Message::DestroyWindow { window_id }).await?;
        self.windows.remove(index);
        Ok(())
    }

    /// Ask the server to composite `bound` (screen space) of the window
    pub async fn request_blit(&mut self, window_id: u32, bound: Rect) -> Result<(), ClientError> {
        self.check_owned(window_id)?;
        write_message(&mut self.stream, &Message::BlitWindow { window_id, bound }).await?;
        Ok(())
    }

    pub async fn raise_window(&mut self, window_id: u32) -> Result<(), ClientError> {
        self.check_owned(window_id)?;
        write_message(&mut self.stream, &Message::RaiseWindow { window_id }).await?;
        Ok(())
    }

    /// Window ids currently registered by this application
    pub fn windows(&self) -> &[u32] {
        &self.windows
    }

    /// Wait for the next window event. Returns `None` when the compositor
    /// closes the connection. Messages that fail to decode or are not
    /// events are logged and skipped.
    pub async fn next_event(&mut self) -> Result<Option<WindowEvent>, ClientError> {
        loop {
            match read_message(&mut self.stream).await? {
                None => return Ok(None),
                Some(Ok(Message::WindowEvent { window_id, payload })) => {
                    return Ok(Some(WindowEvent { window_id, payload }));
                }
                Some(Ok(other)) => {
                    warn!("Got an invalid message from compositor: {:?}", other);
                }
                Some(Err(err)) => {
                    warn!("Dropping malformed message from compositor: {}", err);
                }
            }
        }
    }

    /// Dispatch events to `handler` until the compositor disconnects
    pub async fn run<F>(&mut self, mut handler: F) -> Result<(), ClientError>
    where
        F: FnMut(&WindowEvent),
    {
        while let Some(event) = self.next_event().await? {
            handler(&event);
        }
        Ok(())
    }

    fn check_owned(&self, window_id: u32) -> Result<(), ClientError> {
        if self.windows.contains(&window_id) {
            Ok(())
        } else {
            Err(ClientError::UnknownWindow(window_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    fn test_socket(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("canopy-client-test-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn create_window_reaches_the_server() {
        let path = test_socket("create");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let mut app = Application::connect_to(&path).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let buffer = SharedBuffer::create(16, 16).unwrap();
        let bound = Rect::new(10, 20, 16, 16);
        let id = app.create_window(bound, &buffer).await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(app.windows(), &[1]);

        let message = read_message(&mut server).await.unwrap().unwrap().unwrap();
        assert_eq!(
            message,
            Message::CreateWindow {
                window_id: 1,
                handle: buffer.handle(),
                bound,
            }
        );

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn operations_on_unknown_windows_fail_locally() {
        let path = test_socket("unknown");
        let _ = std::fs::remove_file(&path);
        let _listener = UnixListener::bind(&path).unwrap();

        let mut app = Application::connect_to(&path).await.unwrap();

        assert!(matches!(
            app.destroy_window(5).await,
            Err(ClientError::UnknownWindow(5))
        ));
        assert!(matches!(
            app.request_blit(5, Rect::new(0, 0, 1, 1)).await,
            Err(ClientError::UnknownWindow(5))
        ));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn events_are_delivered_and_non_events_skipped() {
        let path = test_socket("events");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let mut app = Application::connect_to(&path).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        // A non-event message should be skipped, then the real event seen
        write_message(&mut server, &Message::DestroyWindow { window_id: 1 })
            .await
            .unwrap();
        write_message(
            &mut server,
            &Message::WindowEvent {
                window_id: 3,
                payload: vec![1, 2, 3],
            },
        )
        .await
        .unwrap();

        let event = app.next_event().await.unwrap().unwrap();
        assert_eq!(event.window_id, 3);
        assert_eq!(event.payload, vec![1, 2, 3]);

        drop(server);
        assert!(app.next_event().await.unwrap().is_none());

        let _ = std::fs::remove_file(&path);
    }
}
