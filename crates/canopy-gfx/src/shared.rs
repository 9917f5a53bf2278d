//! Shared-memory framebuffers.
//!
//! A window's framebuffer lives in a POSIX shared-memory object so the
//! client can draw into it while the server composites from it without a
//! copy. The owning client maps it read-write; the server maps it
//! read-only. There is no synchronization barrier between the two, so the
//! server may observe a frame mid-draw; compositing is best-effort
//! real-time display and accepts that tearing.

use std::ffi::CString;
use std::io;
use std::process;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::bitmap::Bitmap;
use crate::geometry::Rect;

/// Upper bound on framebuffer width and height, in pixels. Handles
/// arrive off the wire, so dimensions are validated before any size
/// arithmetic or mapping happens.
pub const MAX_BUFFER_DIM: u32 = 16_384;

/// Wire-level capability naming a shared framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle {
    pub key: u64,
    pub width: u32,
    pub height: u32,
}

impl BufferHandle {
    /// Name of the backing shm object, e.g. `/canopy-00000001a2b3c4d5`
    pub fn shm_name(&self) -> String {
        format!("/canopy-{:016x}", self.key)
    }
}

/// A mapped shared-memory region holding `len` packed pixels
pub(crate) struct Mapping {
    ptr: *mut u32,
    len: usize,
    writable: bool,
}

// The mapping is plain memory; the raw pointer is only non-Send by default.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    pub(crate) fn as_slice(&self) -> &[u32] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> Option<&mut [u32]> {
        if !self.writable {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) })
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.cast(), self.len * 4);
        }
    }
}

/// A framebuffer backed by a named shared-memory object.
///
/// The side that called [`SharedBuffer::create`] owns the name and unlinks
/// it on drop; [`SharedBuffer::open`] borrows an existing object.
pub struct SharedBuffer {
    handle: BufferHandle,
    bitmap: Bitmap,
    owned: bool,
}

impl SharedBuffer {
    /// Create a new framebuffer and map it read-write (client side)
    pub fn create(width: i32, height: i32) -> io::Result<Self> {
        assert!(width > 0 && height > 0, "buffer dimensions must be positive");
        assert!(
            width as u32 <= MAX_BUFFER_DIM && height as u32 <= MAX_BUFFER_DIM,
            "buffer dimensions exceed {MAX_BUFFER_DIM}"
        );

        let handle = BufferHandle {
            key: next_key(),
            width: width as u32,
            height: height as u32,
        };
        let name = cstring(&handle.shm_name())?;
        let len = width as usize * height as usize;

        let fd = unsafe {
            libc::shm_open(
                name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        if unsafe { libc::ftruncate(fd, (len * 4) as libc::off_t) } < 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(name.as_ptr());
            }
            return Err(err);
        }

        let mapping = match map(fd, len, true) {
            Ok(mapping) => mapping,
            Err(err) => {
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(name.as_ptr());
                }
                return Err(err);
            }
        };
        unsafe { libc::close(fd) };

        debug!("Created shared framebuffer {} ({}x{})", handle.shm_name(), width, height);

        Ok(Self {
            handle,
            bitmap: Bitmap::from_mapping(width, height, mapping),
            owned: true,
        })
    }

    /// Map an existing framebuffer read-only (server side)
    pub fn open(handle: BufferHandle) -> io::Result<Self> {
        if handle.width == 0
            || handle.height == 0
            || handle.width > MAX_BUFFER_DIM
            || handle.height > MAX_BUFFER_DIM
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "framebuffer dimensions out of range",
            ));
        }

        let name = cstring(&handle.shm_name())?;
        let len = handle.width as usize * handle.height as usize;

        let fd = unsafe { libc::shm_open(name.as_ptr(), libc::O_RDONLY, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mapping = match map(fd, len, false) {
            Ok(mapping) => mapping,
            Err(err) => {
                unsafe { libc::close(fd) };
                return Err(err);
            }
        };
        unsafe { libc::close(fd) };

        debug!("Mapped shared framebuffer {} read-only", handle.shm_name());

        Ok(Self {
            handle,
            bitmap: Bitmap::from_mapping(handle.width as i32, handle.height as i32, mapping),
            owned: false,
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn bound(&self) -> Rect {
        self.bitmap.bound()
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Mutable view for client-side drawing; a read-only mapping still
    /// hands out the bitmap, whose pixel writes are then no-ops.
    pub fn bitmap_mut(&mut self) -> &mut Bitmap {
        &mut self.bitmap
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        if self.owned {
            if let Ok(name) = cstring(&self.handle.shm_name()) {
                unsafe { libc::shm_unlink(name.as_ptr()) };
            }
        }
    }
}

fn map(fd: libc::c_int, len: usize, writable: bool) -> io::Result<Mapping> {
    let prot = if writable {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_READ
    };

    let ptr = unsafe { libc::mmap(ptr::null_mut(), len * 4, prot, libc::MAP_SHARED, fd, 0) };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    Ok(Mapping {
        ptr: ptr.cast(),
        len,
        writable,
    })
}

fn cstring(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad shm name"))
}

/// Process-unique buffer keys: pid in the high bits, time-seeded counter low
fn next_key() -> u64 {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let serial = COUNTER.fetch_add(1, Ordering::Relaxed);

    ((process::id() as u64) << 32) | ((seed.wrapping_add(serial.wrapping_mul(0x9e37))) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Color, Point};

    #[test]
    fn create_write_then_read_through_second_mapping() {
        let mut writer = SharedBuffer::create(4, 4).unwrap();
        writer.bitmap_mut().fill(Color::RED);
        writer.bitmap_mut().set_pixel(Point::new(2, 1), Color::BLUE);

        let reader = SharedBuffer::open(writer.handle()).unwrap();
        assert_eq!(reader.bitmap().get_pixel(Point::new(0, 0)), Color::RED);
        assert_eq!(reader.bitmap().get_pixel(Point::new(2, 1)), Color::BLUE);
    }

    #[test]
    fn readonly_mapping_rejects_writes() {
        let mut writer = SharedBuffer::create(2, 2).unwrap();
        writer.bitmap_mut().fill(Color::GREEN);

        let mut reader = SharedBuffer::open(writer.handle()).unwrap();
        reader.bitmap_mut().set_pixel(Point::new(0, 0), Color::BLACK);
        assert_eq!(reader.bitmap().get_pixel(Point::new(0, 0)), Color::GREEN);
    }

    #[test]
    fn open_unknown_handle_fails() {
        let handle = BufferHandle {
            key: 0xdead_beef_dead_beef,
            width: 4,
            height: 4,
        };
        assert!(SharedBuffer::open(handle).is_err());
    }

    #[test]
    fn open_rejects_out_of_range_dimensions() {
        // Large enough that width * height overflows u32
        let huge = BufferHandle {
            key: 1,
            width: 0x1_0000,
            height: 0x1_0000,
        };
        assert!(SharedBuffer::open(huge).is_err());

        let zero = BufferHandle {
            key: 1,
            width: 0,
            height: 4,
        };
        assert!(SharedBuffer::open(zero).is_err());
    }

    #[test]
    fn keys_are_unique() {
        let a = SharedBuffer::create(1, 1).unwrap();
        let b = SharedBuffer::create(1, 1).unwrap();
        assert_ne!(a.handle().key, b.handle().key);
    }
}
