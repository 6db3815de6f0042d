//! Token-driven x86-64 machine code emitter.
//!
//! Instructions are emitted as literal byte sequences; each run of
//! bytes carries its mnemonic. Forward jumps into out-of-line code are
//! recorded as [`Jump`]s and patched once the trampolines exist.

use std::io::Read;
use std::mem::offset_of;

use super::{patch_rel32, patch_rel8, run, Jump, JumpTarget};
use crate::buffer::{CodeBuffer, ExecBuffer};
use crate::context::{Context, MEMORY_SIZE};
use crate::errors::{CompileError, Error};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

struct Compiler<R: Read> {
    lexer: Lexer<R>,
    token: Token,
    loop_stack: Vec<usize>,
    jumps: Vec<Jump>,
    code: ExecBuffer,
}

impl<R: Read> Compiler<R> {
    fn new(src: R) -> Result<Self, CompileError> {
        let start = Token::start();
        let mut lexer = Lexer::new(src).map_err(|kind| CompileError { kind, token: start })?;
        let token = lexer
            .next_token()
            .map_err(|kind| CompileError { kind, token: start })?;
        let code = ExecBuffer::new().map_err(|kind| CompileError { kind, token })?;
        Ok(Compiler {
            lexer,
            token,
            loop_stack: Vec::new(),
            jumps: Vec::new(),
            code,
        })
    }

    fn fail(&self, kind: Error) -> CompileError {
        CompileError {
            kind,
            token: self.token,
        }
    }

    fn advance(&mut self) -> Result<(), CompileError> {
        self.token = self.lexer.next_token().map_err(|kind| self.fail(kind))?;
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), CompileError> {
        self.code.extend(bytes).map_err(|kind| self.fail(kind))
    }

    /// Emits a jump opcode with a zeroed `rel32` field and records it
    /// for patching.
    fn emit_jump(&mut self, opcode: &[u8], target: JumpTarget) -> Result<(), CompileError> {
        self.emit(opcode)?;
        self.emit(&[0; 4])?;
        self.jumps.push(Jump {
            from: self.code.len(),
            target,
        });
        Ok(())
    }

    /// Loads the calling convention's `rdi` argument into the fixed
    /// registers the rest of the program assumes.
    fn emit_prologue(&mut self) -> Result<(), CompileError> {
        let read_fn: extern "C" fn(&mut Context<'_>) -> i32 = run::read_byte_raw;
        let write_fn: extern "C" fn(&mut Context<'_>, u32) -> i32 = run::write_byte_raw;

        // push rbx; push r12; push r13; push r14; push r15
        self.emit(&[0x53, 0x41, 0x54, 0x41, 0x55, 0x41, 0x56, 0x41, 0x57])?;
        // mov rbx, rdi
        self.emit(&[0x48, 0x89, 0xFB])?;
        // movabs r12, <input helper>
        self.emit(&[0x49, 0xBC])?;
        self.emit(&(read_fn as usize as u64).to_le_bytes())?;
        // movabs r13, <output helper>
        self.emit(&[0x49, 0xBD])?;
        self.emit(&(write_fn as usize as u64).to_le_bytes())?;
        // mov r14, [rdi + <dp>]
        self.emit(&[0x4C, 0x8B, 0xB7])?;
        self.emit(&(offset_of!(Context<'static>, dp) as i32).to_le_bytes())?;
        // lea r15, [rdi + <memory>]
        self.emit(&[0x4C, 0x8D, 0xBF])?;
        self.emit(&(offset_of!(Context<'static>, memory) as i32).to_le_bytes())
    }

    /// Emits a bounds-checked pointer move for a maximal run of
    /// identical tokens. Run length limits match the bytecode backend.
    fn emit_pointer_run(&mut self) -> Result<(), CompileError> {
        let kind = self.token.kind;
        if !matches!(kind, TokenKind::I | TokenKind::Use) {
            return Err(self.fail(Error::Internal));
        }

        let mut count: u16 = 1;
        loop {
            let next = self.lexer.next_token().map_err(|kind| self.fail(kind))?;
            self.token = next;
            if next.kind != kind {
                break;
            }
            count = count
                .checked_add(1)
                .ok_or_else(|| self.fail(Error::DeltaOutOfRange))?;
        }
        let n = count as u32;

        // mov rax, r14; sub rax, r15
        self.emit(&[0x4C, 0x89, 0xF0, 0x4C, 0x29, 0xF8])?;
        if kind == TokenKind::I {
            // cmp rax, MEMORY_SIZE - n
            self.emit(&[0x48, 0x3D])?;
            self.emit(&(MEMORY_SIZE as u32 - n).to_le_bytes())?;
            // jae <dp out of bounds>
            self.emit_jump(&[0x0F, 0x83], JumpTarget::DpOutOfBounds)?;
            // add r14, n
            self.emit(&[0x49, 0x81, 0xC6])?;
        } else {
            // cmp rax, n
            self.emit(&[0x48, 0x3D])?;
            self.emit(&n.to_le_bytes())?;
            // jb <dp out of bounds>
            self.emit_jump(&[0x0F, 0x82], JumpTarget::DpOutOfBounds)?;
            // sub r14, n
            self.emit(&[0x49, 0x81, 0xEE])?;
        }
        self.emit(&n.to_le_bytes())
    }

    /// Emits a value change for a maximal run of identical tokens. The
    /// run length wraps modulo 256 and a wrapped count of zero emits
    /// nothing.
    fn emit_value_run(&mut self) -> Result<(), CompileError> {
        let kind = self.token.kind;
        let modrm = match kind {
            // add byte [r14], n
            TokenKind::Arch => 0x06,
            // sub byte [r14], n
            TokenKind::Linux => 0x2E,
            _ => return Err(self.fail(Error::Internal)),
        };

        let mut count: u8 = 1;
        loop {
            let next = self.lexer.next_token().map_err(|kind| self.fail(kind))?;
            self.token = next;
            if next.kind != kind {
                break;
            }
            count = count.wrapping_add(1);
        }

        if count == 0 {
            return Ok(());
        }
        self.emit(&[0x41, 0x80, modrm, count])
    }

    fn emit_write(&mut self) -> Result<(), CompileError> {
        // mov rdi, rbx; movzx esi, byte [r14]; call r13
        self.emit(&[0x48, 0x89, 0xDF, 0x41, 0x0F, 0xB6, 0x36, 0x41, 0xFF, 0xD5])?;
        // cmp eax, -1
        self.emit(&[0x3D, 0xFF, 0xFF, 0xFF, 0xFF])?;
        // je <io error>
        self.emit_jump(&[0x0F, 0x84], JumpTarget::IoError)
    }

    fn emit_read(&mut self) -> Result<(), CompileError> {
        // mov rdi, rbx; call r12
        self.emit(&[0x48, 0x89, 0xDF, 0x41, 0xFF, 0xD4])?;
        // test eax, eax; js <read failure>
        self.emit(&[0x85, 0xC0])?;
        self.emit_jump(&[0x0F, 0x88], JumpTarget::ReadFailure)?;
        // mov [r14], al
        self.emit(&[0x41, 0x88, 0x06])
    }

    fn emit_debug(&mut self) -> Result<(), CompileError> {
        // call <debug trampoline>
        self.emit_jump(&[0xE8], JumpTarget::DebugCall)
    }

    /// Emits the loop head's exit test with a zeroed displacement and
    /// remembers where the body starts.
    fn begin_loop(&mut self) -> Result<(), CompileError> {
        // cmp byte [r14], 0; je <loop exit>
        self.emit(&[0x41, 0x80, 0x3E, 0x00, 0x0F, 0x84, 0, 0, 0, 0])?;
        self.loop_stack.push(self.code.len());
        Ok(())
    }

    /// Emits the backward branch and backfills the loop head's exit
    /// displacement.
    fn end_loop(&mut self) -> Result<(), CompileError> {
        let loop_start = self
            .loop_stack
            .pop()
            .ok_or_else(|| self.fail(Error::UnexpectedLoopEnd))?;

        // cmp byte [r14], 0; jne <loop start>
        self.emit(&[0x41, 0x80, 0x3E, 0x00, 0x0F, 0x85, 0, 0, 0, 0])?;
        let loop_end = self.code.len();
        patch_rel32(self.code.as_mut_slice(), loop_end, loop_start)
            .map_err(|kind| self.fail(kind))?;
        patch_rel32(self.code.as_mut_slice(), loop_start, loop_end)
            .map_err(|kind| self.fail(kind))
    }

    fn emit_token(&mut self) -> Result<(), CompileError> {
        match self.token.kind {
            TokenKind::I | TokenKind::Use => self.emit_pointer_run(),
            TokenKind::Arch | TokenKind::Linux => self.emit_value_run(),
            TokenKind::Btw => {
                self.emit_write()?;
                self.advance()
            }
            TokenKind::By => {
                self.emit_read()?;
                self.advance()
            }
            TokenKind::Gentoo => {
                self.emit_debug()?;
                self.advance()
            }
            TokenKind::The => {
                self.begin_loop()?;
                self.advance()
            }
            TokenKind::Way => {
                self.end_loop()?;
                self.advance()
            }
            TokenKind::Eof | TokenKind::Invalid => Err(self.fail(Error::InvalidToken)),
        }
    }

    /// Emits the success epilogue, then the trampolines, and resolves
    /// every recorded jump.
    fn finish(&mut self) -> Result<(), CompileError> {
        // xor eax, eax
        self.emit(&[0x31, 0xC0])?;
        let exit = self.code.len();
        // pop r15; pop r14; pop r13; pop r12; pop rbx; ret
        self.emit(&[0x41, 0x5F, 0x41, 0x5E, 0x41, 0x5D, 0x41, 0x5C, 0x5B, 0xC3])?;

        let mut trampolines: [Option<usize>; 4] = [None; 4];
        let jumps = std::mem::take(&mut self.jumps);
        for jump in jumps {
            let slot = jump.target as usize;
            let to = match trampolines[slot] {
                Some(to) => to,
                None => {
                    let to = self.emit_trampoline(jump.target, exit)?;
                    trampolines[slot] = Some(to);
                    to
                }
            };
            patch_rel32(self.code.as_mut_slice(), jump.from, to)
                .map_err(|kind| self.fail(kind))?;
        }
        Ok(())
    }

    /// Sets `eax` to the error's code and branches to the epilogue.
    fn emit_error_exit(&mut self, kind: Error, exit: usize) -> Result<(), CompileError> {
        // mov eax, <code>
        self.emit(&[0xB8])?;
        self.emit(&kind.code().to_le_bytes())?;
        // jmp <exit>
        self.emit(&[0xEB, 0x00])?;
        let from = self.code.len();
        patch_rel8(self.code.as_mut_slice(), from, exit).map_err(|kind| self.fail(kind))
    }

    fn emit_trampoline(&mut self, target: JumpTarget, exit: usize) -> Result<usize, CompileError> {
        let start = self.code.len();
        match target {
            JumpTarget::DpOutOfBounds => self.emit_error_exit(Error::DpOutOfBounds, exit)?,
            JumpTarget::IoError => self.emit_error_exit(Error::Io, exit)?,
            JumpTarget::ReadFailure => {
                // The input helper returns -1 at end of input and -2 on
                // failure. The mov below leaves the flags intact.

                // cmp eax, -1
                self.emit(&[0x3D, 0xFF, 0xFF, 0xFF, 0xFF])?;
                // mov eax, <end of input>
                self.emit(&[0xB8])?;
                self.emit(&Error::EndOfInput.code().to_le_bytes())?;
                // je <exit>
                self.emit(&[0x74, 0x00])?;
                let from = self.code.len();
                patch_rel8(self.code.as_mut_slice(), from, exit)
                    .map_err(|kind| self.fail(kind))?;
                self.emit_error_exit(Error::Io, exit)?;
            }
            JumpTarget::DebugCall => {
                let ip_off = (offset_of!(Context<'static>, ip) as i32).to_le_bytes();
                let dp_off = (offset_of!(Context<'static>, dp) as i32).to_le_bytes();
                let handler_off =
                    (offset_of!(Context<'static>, debug_handler) as i32).to_le_bytes();

                // Spill the return address and data pointer so the
                // handler observes a coherent context, then reload the
                // data pointer in case the handler moved it.

                // pop qword [rbx + <ip>]
                self.emit(&[0x8F, 0x83])?;
                self.emit(&ip_off)?;
                // mov [rbx + <dp>], r14
                self.emit(&[0x4C, 0x89, 0xB3])?;
                self.emit(&dp_off)?;
                // mov rdi, rbx; call qword [rbx + <debug handler>]
                self.emit(&[0x48, 0x89, 0xDF, 0xFF, 0x93])?;
                self.emit(&handler_off)?;
                // mov r14, [rbx + <dp>]
                self.emit(&[0x4C, 0x8B, 0xB3])?;
                self.emit(&dp_off)?;
                // jmp qword [rbx + <ip>]
                self.emit(&[0xFF, 0xA3])?;
                self.emit(&ip_off)?;
            }
        }
        Ok(start)
    }
}

/// Compiles a source stream to native x86-64 code, returning a frozen
/// executable buffer.
pub(crate) fn compile<R: Read>(src: R) -> Result<ExecBuffer, CompileError> {
    let mut compiler = Compiler::new(src)?;
    compiler.emit_prologue()?;

    while compiler.token.kind != TokenKind::Eof {
        compiler.emit_token()?;
    }

    if !compiler.loop_stack.is_empty() {
        return Err(compiler.fail(Error::UnclosedLoops));
    }

    compiler.finish()?;
    compiler.code.trim().map_err(|kind| compiler.fail(kind))?;
    compiler.code.freeze().map_err(|kind| compiler.fail(kind))?;
    Ok(compiler.code)
}
