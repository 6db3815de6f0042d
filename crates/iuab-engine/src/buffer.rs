//! Growable byte buffers for compiled programs.
//!
//! Two concrete buffer types sit behind one trait: [`Buffer`] holds
//! ordinary heap memory and grows in place, [`ExecBuffer`] holds an
//! anonymous read/write/execute mapping and grows by mapping a new
//! region, copying, and releasing the old one (in-place resizing of
//! executable mappings is not assumed available). Which growth strategy
//! applies is selected by type, not by a runtime flag.

use crate::errors::Error;

/// Initial capacity for freshly created buffers.
const BASE_CAP: usize = 64;

/// Append-only byte storage used as the destination of both compilers.
///
/// `as_mut_slice` exposes already-written bytes for jump patching; it
/// never changes the length. A buffer that fails to grow reports
/// [`Error::Memory`] and is left unchanged.
pub trait CodeBuffer {
    /// Number of bytes written so far.
    fn len(&self) -> usize;

    /// True if nothing has been written yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes written so far.
    fn as_slice(&self) -> &[u8];

    /// The bytes written so far, mutably (for patching reserved operands).
    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Appends one byte.
    fn push(&mut self, byte: u8) -> Result<(), Error>;

    /// Appends a run of bytes.
    fn extend(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Shrinks the allocated capacity down to the current length.
    fn trim(&mut self) -> Result<(), Error>;
}

/// A plain heap-allocated code buffer.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// Creates an empty buffer with a small initial capacity.
    pub fn new() -> Result<Self, Error> {
        let mut data = Vec::new();
        data.try_reserve(BASE_CAP).map_err(|_| Error::Memory)?;
        Ok(Buffer { data })
    }

    /// Consumes the buffer, returning the written bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl CodeBuffer for Buffer {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn push(&mut self, byte: u8) -> Result<(), Error> {
        self.data.try_reserve(1).map_err(|_| Error::Memory)?;
        self.data.push(byte);
        Ok(())
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.data.try_reserve(bytes.len()).map_err(|_| Error::Memory)?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn trim(&mut self) -> Result<(), Error> {
        self.data.shrink_to_fit();
        Ok(())
    }
}

/// A code buffer backed by an anonymous read/write/execute mapping.
///
/// Once [`freeze`](ExecBuffer::freeze) drops write permission, the
/// buffer only serves reads and execution; further appends are an
/// internal error.
#[cfg(unix)]
#[derive(Debug)]
pub struct ExecBuffer {
    ptr: *mut u8,
    len: usize,
    cap: usize,
    frozen: bool,
}

#[cfg(unix)]
impl ExecBuffer {
    /// Creates an empty executable buffer.
    pub fn new() -> Result<Self, Error> {
        let cap = page_size();
        let ptr = map_rwx(cap)?;
        Ok(ExecBuffer {
            ptr,
            len: 0,
            cap,
            frozen: false,
        })
    }

    /// Pointer to the start of the mapped code.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Makes the mapping read/execute only. Appends fail afterwards.
    pub fn freeze(&mut self) -> Result<(), Error> {
        let rc = unsafe {
            libc::mprotect(
                self.ptr.cast(),
                self.cap,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if rc != 0 {
            return Err(Error::Memory);
        }
        self.frozen = true;
        Ok(())
    }

    fn grow(&mut self, min_cap: usize) -> Result<(), Error> {
        let new_cap = self.cap.checked_mul(2).ok_or(Error::Memory)?.max(min_cap);
        let new_ptr = map_rwx(new_cap)?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr, new_ptr, self.len);
            libc::munmap(self.ptr.cast(), self.cap);
        }
        self.ptr = new_ptr;
        self.cap = new_cap;
        Ok(())
    }
}

#[cfg(unix)]
impl CodeBuffer for ExecBuffer {
    fn len(&self) -> usize {
        self.len
    }

    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    fn push(&mut self, byte: u8) -> Result<(), Error> {
        self.extend(&[byte])
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.frozen {
            return Err(Error::Internal);
        }
        let new_len = self.len.checked_add(bytes.len()).ok_or(Error::Memory)?;
        if new_len > self.cap {
            self.grow(new_len)?;
        }
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(self.len), bytes.len());
        }
        self.len = new_len;
        Ok(())
    }

    fn trim(&mut self) -> Result<(), Error> {
        // Mappings are page-granular; trimming below one page gains nothing.
        let target = self.len.max(page_size());
        if target >= self.cap {
            return Ok(());
        }
        let new_ptr = map_rwx(target)?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr, new_ptr, self.len);
            libc::munmap(self.ptr.cast(), self.cap);
        }
        self.ptr = new_ptr;
        self.cap = target;
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for ExecBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.cast(), self.cap);
        }
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

#[cfg(unix)]
fn map_rwx(len: usize) -> Result<*mut u8, Error> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_ANON | libc::MAP_PRIVATE,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(Error::Memory);
    }
    Ok(ptr.cast())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_buffer_appends_and_trims() {
        let mut buf = Buffer::new().unwrap();
        for i in 0..200u8 {
            buf.push(i).unwrap();
        }
        buf.extend(&[1, 2, 3]).unwrap();
        assert_eq!(buf.len(), 203);
        assert_eq!(buf.as_slice()[0], 0);
        assert_eq!(&buf.as_slice()[200..], &[1, 2, 3]);
        buf.trim().unwrap();
        assert_eq!(buf.len(), 203);
    }

    #[test]
    fn plain_buffer_patching() {
        let mut buf = Buffer::new().unwrap();
        buf.extend(&[0; 4]).unwrap();
        buf.as_mut_slice()[2] = 0xFF;
        assert_eq!(buf.as_slice(), &[0, 0, 0xFF, 0]);
    }

    #[cfg(unix)]
    #[test]
    fn exec_buffer_grows_across_pages() {
        let mut buf = ExecBuffer::new().unwrap();
        let chunk = [0x90u8; 1024]; // nop sled
        for _ in 0..8 {
            buf.extend(&chunk).unwrap();
        }
        assert_eq!(buf.len(), 8 * 1024);
        assert!(buf.as_slice().iter().all(|&b| b == 0x90));
        buf.trim().unwrap();
        assert_eq!(buf.len(), 8 * 1024);
    }

    #[cfg(unix)]
    #[test]
    fn exec_buffer_rejects_writes_after_freeze() {
        let mut buf = ExecBuffer::new().unwrap();
        buf.push(0xC3).unwrap();
        buf.freeze().unwrap();
        assert_eq!(buf.push(0x90), Err(Error::Internal));
    }
}
