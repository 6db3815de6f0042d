//! Shared execution state for both execution engines.

use std::io::{self, Read, Write};
use std::marker::PhantomData;

use crate::errors::Error;

/// Size of the working memory region of a [`Context`].
pub const MEMORY_SIZE: usize = 1 << 16;

/// Debug-event handler invoked by the `gentoo` operation.
///
/// Called with the live context; it may inspect and mutate memory and
/// the data pointer but owns no control flow. The ABI is `extern "C"`
/// because JIT-compiled code calls it through a plain function pointer.
pub type DebugHandler = for<'p> extern "C" fn(&mut Context<'p>);

/// A debug handler that does nothing.
pub extern "C" fn noop_debug_handler(_: &mut Context<'_>) {}

/// Full runtime state of one program execution.
///
/// The layout is `#[repr(C)]` because JIT-compiled code addresses the
/// leading fields by their byte offsets. During native execution the
/// `ip` and `dp` fields are stale: registers are authoritative, and the
/// fields are refreshed only around debug-handler calls and on
/// termination. The bytecode VM maintains the same contract.
///
/// One context serves exactly one run; it borrows the program for `'p`
/// and is not reused.
#[repr(C)]
pub struct Context<'p> {
    pub(crate) ip: *const u8,
    pub(crate) dp: *mut u8,
    pub(crate) program: *const u8,
    pub(crate) debug_handler: DebugHandler,
    input: Box<dyn Read>,
    output: Box<dyn Write>,
    program_len: usize,
    _program: PhantomData<&'p [u8]>,
    pub(crate) memory: [u8; MEMORY_SIZE],
}

impl<'p> Context<'p> {
    /// Creates a context for one run of `program`.
    ///
    /// Boxed because the context embeds the full 64 KiB memory region
    /// and the data pointer must stay valid for the whole run.
    pub fn new(
        program: &'p [u8],
        input: Box<dyn Read>,
        output: Box<dyn Write>,
        debug_handler: DebugHandler,
    ) -> Box<Self> {
        let mut ctx = Box::new(Context {
            ip: program.as_ptr(),
            dp: std::ptr::null_mut(),
            program: program.as_ptr(),
            debug_handler,
            input,
            output,
            program_len: program.len(),
            _program: PhantomData,
            memory: [0; MEMORY_SIZE],
        });
        ctx.dp = ctx.memory.as_mut_ptr();
        ctx
    }

    /// Byte offset of the instruction pointer from the program base.
    pub fn ip_offset(&self) -> usize {
        self.ip as usize - self.program as usize
    }

    /// Raw instruction pointer.
    pub fn ip(&self) -> *const u8 {
        self.ip
    }

    /// Byte offset of the data pointer into the memory region.
    pub fn dp_offset(&self) -> usize {
        self.dp as usize - self.memory.as_ptr() as usize
    }

    /// Raw data pointer.
    pub fn dp(&self) -> *const u8 {
        self.dp
    }

    /// The byte currently addressed by the data pointer.
    pub fn current_byte(&self) -> u8 {
        self.memory[self.dp_offset()]
    }

    /// The working memory region.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// The working memory region, mutably.
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    pub(crate) fn set_ip_offset(&mut self, offset: usize) {
        debug_assert!(offset <= self.program_len);
        self.ip = unsafe { self.program.add(offset) };
    }

    pub(crate) fn set_dp_offset(&mut self, offset: usize) {
        debug_assert!(offset < MEMORY_SIZE);
        self.dp = unsafe { self.memory.as_mut_ptr().add(offset) };
    }

    /// Reads one byte from the input channel.
    ///
    /// `Ok(None)` is end of input; an I/O failure is a distinct
    /// [`Error::Io`].
    pub(crate) fn read_input_byte(&mut self) -> Result<Option<u8>, Error> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(Error::Io),
            }
        }
    }

    /// Writes one byte to the output channel.
    pub(crate) fn write_output_byte(&mut self, byte: u8) -> Result<(), Error> {
        self.output.write_all(&[byte]).map_err(|_| Error::Io)
    }

    /// Flushes the output channel.
    pub fn flush_output(&mut self) -> Result<(), Error> {
        self.output.flush().map_err(|_| Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_points_at_memory_start() {
        let program = [0u8];
        let ctx = Context::new(
            &program,
            Box::new(io::empty()),
            Box::new(io::sink()),
            noop_debug_handler,
        );
        assert_eq!(ctx.ip_offset(), 0);
        assert_eq!(ctx.dp_offset(), 0);
        assert!(ctx.memory().iter().all(|&b| b == 0));
    }

    #[test]
    fn offsets_track_pointer_moves() {
        let program = [0u8; 16];
        let mut ctx = Context::new(
            &program,
            Box::new(io::empty()),
            Box::new(io::sink()),
            noop_debug_handler,
        );
        ctx.set_ip_offset(7);
        ctx.set_dp_offset(1234);
        assert_eq!(ctx.ip_offset(), 7);
        assert_eq!(ctx.dp_offset(), 1234);
    }

    #[test]
    fn io_channels_move_single_bytes() {
        let program = [0u8];
        let mut ctx = Context::new(
            &program,
            Box::new(&b"ab"[..]),
            Box::new(io::sink()),
            noop_debug_handler,
        );
        assert_eq!(ctx.read_input_byte().unwrap(), Some(b'a'));
        assert_eq!(ctx.read_input_byte().unwrap(), Some(b'b'));
        assert_eq!(ctx.read_input_byte().unwrap(), None);
    }
}
