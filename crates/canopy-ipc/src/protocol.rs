//! Low-level binary protocol between clients and the compositor.
//!
//! Every message is a fixed 8-byte header — `type` tag and payload `size`,
//! both little-endian u32 — followed by a type-specific payload. The only
//! variable-length payload is `WindowEvent`, whose event bytes fill the
//! remainder of the declared size. Total message size is capped at
//! [`MAX_MESSAGE_SIZE`], the transport's message capacity.

use canopy_gfx::geometry::Rect;
use canopy_gfx::shared::BufferHandle;
use thiserror::Error;

/// Maximum total message size (header + payload), a transport constant
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Fixed header: type tag (u32) + payload size (u32)
pub const HEADER_SIZE: usize = 8;

/// Largest event payload a `WindowEvent` message can carry
/// (window id takes 4 bytes of the payload budget)
pub const MAX_EVENT_PAYLOAD: usize = MAX_MESSAGE_SIZE - HEADER_SIZE - 4;

const TAG_CREATE_WINDOW: u32 = 0;
const TAG_DESTROY_WINDOW: u32 = 1;
const TAG_BLIT_WINDOW: u32 = 2;
const TAG_RAISE_WINDOW: u32 = 3;
const TAG_WINDOW_EVENT: u32 = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("message truncated: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unknown message type tag {0}")]
    UnknownType(u32),

    #[error("declared payload size {declared} exceeds available {available} bytes")]
    BadSize { declared: usize, available: usize },

    #[error("invalid {kind} payload of {size} bytes")]
    InvalidPayload { kind: &'static str, size: usize },

    #[error("event payload of {0} bytes exceeds message capacity")]
    PayloadTooLarge(usize),
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client -> server: register a window backed by a shared framebuffer
    CreateWindow {
        window_id: u32,
        handle: BufferHandle,
        bound: Rect,
    },
    /// Client -> server: remove a window
    DestroyWindow { window_id: u32 },
    /// Client -> server: composite a region of the window to the screen
    BlitWindow { window_id: u32, bound: Rect },
    /// Client -> server: move a window to the top of the paint order
    RaiseWindow { window_id: u32 },
    /// Server -> client: an event addressed to one window
    WindowEvent { window_id: u32, payload: Vec<u8> },
}

impl Message {
    fn tag(&self) -> u32 {
        match self {
            Message::CreateWindow { .. } => TAG_CREATE_WINDOW,
            Message::DestroyWindow { .. } => TAG_DESTROY_WINDOW,
            Message::BlitWindow { .. } => TAG_BLIT_WINDOW,
            Message::RaiseWindow { .. } => TAG_RAISE_WINDOW,
            Message::WindowEvent { .. } => TAG_WINDOW_EVENT,
        }
    }

    /// Encode as header + payload bytes
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Vec::new();

        match self {
            Message::CreateWindow {
                window_id,
                handle,
                bound,
            } => {
                put_u32(&mut payload, *window_id);
                put_u64(&mut payload, handle.key);
                put_u32(&mut payload, handle.width);
                put_u32(&mut payload, handle.height);
                put_rect(&mut payload, *bound);
            }
            Message::DestroyWindow { window_id } | Message::RaiseWindow { window_id } => {
                put_u32(&mut payload, *window_id);
            }
            Message::BlitWindow { window_id, bound } => {
                put_u32(&mut payload, *window_id);
                put_rect(&mut payload, *bound);
            }
            Message::WindowEvent { window_id, payload: event } => {
                if event.len() > MAX_EVENT_PAYLOAD {
                    return Err(ProtocolError::PayloadTooLarge(event.len()));
                }
                put_u32(&mut payload, *window_id);
                payload.extend_from_slice(event);
            }
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        put_u32(&mut bytes, self.tag());
        put_u32(&mut bytes, payload.len() as u32);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode a complete message (header + payload) from `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let mut reader = Reader::new(bytes);
        let tag = reader.u32()?;
        let size = reader.u32()? as usize;

        if size > bytes.len() - HEADER_SIZE || size > MAX_MESSAGE_SIZE - HEADER_SIZE {
            return Err(ProtocolError::BadSize {
                declared: size,
                available: bytes.len() - HEADER_SIZE,
            });
        }

        match tag {
            TAG_CREATE_WINDOW => {
                if size != 4 + 16 + 16 {
                    return Err(ProtocolError::InvalidPayload {
                        kind: "CreateWindow",
                        size,
                    });
                }
                let window_id = reader.u32()?;
                let handle = BufferHandle {
                    key: reader.u64()?,
                    width: reader.u32()?,
                    height: reader.u32()?,
                };
                let bound = reader.rect()?;
                Ok(Message::CreateWindow {
                    window_id,
                    handle,
                    bound,
                })
            }
            TAG_DESTROY_WINDOW | TAG_RAISE_WINDOW => {
                if size != 4 {
                    let kind = if tag == TAG_DESTROY_WINDOW {
                        "DestroyWindow"
                    } else {
                        "RaiseWindow"
                    };
                    return Err(ProtocolError::InvalidPayload { kind, size });
                }
                let window_id = reader.u32()?;
                if tag == TAG_DESTROY_WINDOW {
                    Ok(Message::DestroyWindow { window_id })
                } else {
                    Ok(Message::RaiseWindow { window_id })
                }
            }
            TAG_BLIT_WINDOW => {
                if size != 4 + 16 {
                    return Err(ProtocolError::InvalidPayload {
                        kind: "BlitWindow",
                        size,
                    });
                }
                let window_id = reader.u32()?;
                let bound = reader.rect()?;
                Ok(Message::BlitWindow { window_id, bound })
            }
            TAG_WINDOW_EVENT => {
                if size < 4 {
                    return Err(ProtocolError::InvalidPayload {
                        kind: "WindowEvent",
                        size,
                    });
                }
                let window_id = reader.u32()?;
                let payload = reader.bytes(size - 4)?.to_vec();
                Ok(Message::WindowEvent { window_id, payload })
            }
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_rect(buf: &mut Vec<u8>, rect: Rect) {
    put_i32(buf, rect.x);
    put_i32(buf, rect.y);
    put_i32(buf, rect.width);
    put_i32(buf, rect.height);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.pos + len > self.buf.len() {
            return Err(ProtocolError::Truncated {
                needed: self.pos + len,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, ProtocolError> {
        let bytes = self.bytes(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        let bytes = self.bytes(4)?;
        Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn rect(&mut self) -> Result<Rect, ProtocolError> {
        Ok(Rect::new(self.i32()?, self.i32()?, self.i32()?, self.i32()?))
    }
}
