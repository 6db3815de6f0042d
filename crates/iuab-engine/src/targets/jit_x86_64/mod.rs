//! The x86-64 native code target.
//!
//! Compiled programs follow the System V calling convention. Register
//! plan, fixed for the whole program:
//!
//! - `rbx`  — context pointer
//! - `r12`  — address of the input helper
//! - `r13`  — address of the output helper
//! - `r14`  — data pointer
//! - `r15`  — base address of the context's memory
//!
//! `r14` is the only live copy of the data pointer while native code
//! runs; it is spilled to the context around debug-handler calls.

mod compile;
mod run;

pub(crate) use compile::compile;
pub(crate) use run::run;

use crate::errors::Error;

/// Out-of-line code a forward jump may land on. Each variant is
/// materialized at most once, after the program footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpTarget {
    /// Set `eax` to the out-of-bounds code and leave.
    DpOutOfBounds,
    /// Set `eax` to the I/O code and leave.
    IoError,
    /// Map the input helper's negative return to an error code and
    /// leave.
    ReadFailure,
    /// Spill state, call the debug handler, reload, resume.
    DebugCall,
}

/// A jump whose displacement cannot be computed until its target is
/// materialized. `from` is the offset just past the 4-byte
/// displacement field.
#[derive(Debug, Clone, Copy)]
struct Jump {
    from: usize,
    target: JumpTarget,
}

/// Backfills the `rel32` field ending at `from` to reach `to`.
fn patch_rel32(code: &mut [u8], from: usize, to: usize) -> Result<(), Error> {
    let rel = to as i64 - from as i64;
    let rel = i32::try_from(rel).map_err(|_| Error::JumpTooLarge)?;
    code[from - 4..from].copy_from_slice(&rel.to_le_bytes());
    Ok(())
}

/// Backfills the `rel8` field ending at `from` to reach `to`.
fn patch_rel8(code: &mut [u8], from: usize, to: usize) -> Result<(), Error> {
    let rel = to as i64 - from as i64;
    let rel = i8::try_from(rel).map_err(|_| Error::JumpTooLarge)?;
    code[from - 1] = rel as u8;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rel32_patches_both_directions() {
        let mut code = [0u8; 16];
        patch_rel32(&mut code, 8, 12).unwrap();
        assert_eq!(&code[4..8], &4i32.to_le_bytes());
        patch_rel32(&mut code, 8, 2).unwrap();
        assert_eq!(&code[4..8], &(-6i32).to_le_bytes());
    }

    #[test]
    fn rel8_rejects_distant_targets() {
        let mut code = [0u8; 4];
        assert_eq!(patch_rel8(&mut code, 2, 1000), Err(Error::JumpTooLarge));
        patch_rel8(&mut code, 2, 0).unwrap();
        assert_eq!(code[1], (-2i8) as u8);
    }
}
