//! Canopy IPC Protocol
//!
//! Wire protocol between client applications and the compositor server:
//! message types, binary encode/decode, and async framing over a Unix
//! domain socket.

pub mod protocol;
pub mod transport;

pub use protocol::{
    Message, ProtocolError, HEADER_SIZE, MAX_EVENT_PAYLOAD, MAX_MESSAGE_SIZE,
};
pub use transport::{read_frame, read_message, write_message, TransportError};

/// Socket path for compositor IPC
pub fn socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    std::path::PathBuf::from(runtime_dir).join("canopy.sock")
}
