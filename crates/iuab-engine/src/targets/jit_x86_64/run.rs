//! Native program entry and the I/O helpers it calls back into.

use crate::buffer::{CodeBuffer, ExecBuffer};
use crate::context::Context;
use crate::errors::Error;

/// Reads one byte from the context's input channel.
///
/// Returns the byte, `-1` at end of input, or `-2` on failure. Called
/// from generated code with the context in `rdi`.
pub(crate) extern "C" fn read_byte_raw(ctx: &mut Context<'_>) -> i32 {
    match ctx.read_input_byte() {
        Ok(Some(byte)) => byte as i32,
        Ok(None) => -1,
        Err(_) => -2,
    }
}

/// Writes one byte to the context's output channel.
///
/// Returns `0` on success and `-1` on failure. Called from generated
/// code with the context in `rdi` and the byte in `esi`.
pub(crate) extern "C" fn write_byte_raw(ctx: &mut Context<'_>, byte: u32) -> i32 {
    match ctx.write_output_byte(byte as u8) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

type Entry = unsafe extern "C" fn(*mut Context<'static>) -> u32;

/// Runs a compiled native program over the given context.
///
/// The program reports failures through its return value, which is an
/// [`Error`] discriminant or zero for success.
pub(crate) fn run(code: &ExecBuffer, ctx: &mut Context<'_>) -> Result<(), Error> {
    if code.is_empty() {
        return Err(Error::InvalidOp);
    }

    // SAFETY: the buffer was produced by the compiler in this module
    // tree and frozen, so it holds a complete program starting at its
    // base address, mapped readable and executable. The program only
    // dereferences the context passed to it.
    let status = unsafe {
        let entry: Entry = std::mem::transmute(code.as_ptr());
        entry((ctx as *mut Context<'_>).cast())
    };
    Error::from_code(status)
}
