//! Token-driven bytecode emitter.

use std::io::Read;

use super::{Opcode, JUMP_INSTR_SIZE};
use crate::buffer::{Buffer, CodeBuffer};
use crate::errors::{CompileError, Error};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

struct Compiler<R: Read> {
    lexer: Lexer<R>,
    token: Token,
    loop_stack: Vec<usize>,
    code: Buffer,
}

impl<R: Read> Compiler<R> {
    fn new(src: R) -> Result<Self, CompileError> {
        let start = Token::start();
        let mut lexer = Lexer::new(src).map_err(|kind| CompileError { kind, token: start })?;
        let token = lexer
            .next_token()
            .map_err(|kind| CompileError { kind, token: start })?;
        let code = Buffer::new().map_err(|kind| CompileError { kind, token })?;
        Ok(Compiler {
            lexer,
            token,
            loop_stack: Vec::new(),
            code,
        })
    }

    /// Wraps a buffer or lexer error with the current token's position.
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

    /// Emits a pointer move for a maximal run of identical tokens.
    ///
    /// The run length is a `u16`; one more repetition than 65535 is a
    /// fatal error reported at the token that pushed it over.
    fn emit_pointer_run(&mut self) -> Result<(), CompileError> {
        let kind = self.token.kind;
        let op = match kind {
            TokenKind::I => Opcode::AddP,
            TokenKind::Use => Opcode::SubP,
            _ => return Err(self.fail(Error::Internal)),
        };

        let mut count: u16 = 1;
        loop {
            let next = self.lexer.next_token().map_err(|kind| self.fail(kind))?;
            self.token = next;
            if next.kind != kind {
                break;
            }
            count = count.checked_add(1).ok_or_else(|| self.fail(Error::DeltaOutOfRange))?;
        }

        self.code.push(op as u8).map_err(|kind| self.fail(kind))?;
        self.code
            .extend(&count.to_le_bytes())
            .map_err(|kind| self.fail(kind))
    }

    /// Emits a value change for a maximal run of identical tokens.
    ///
    /// The run length wraps modulo 256; a wrapped count of zero emits
    /// nothing.
    fn emit_value_run(&mut self) -> Result<(), CompileError> {
        let kind = self.token.kind;
        let op = match kind {
            TokenKind::Arch => Opcode::AddV,
            TokenKind::Linux => Opcode::SubV,
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

        self.code
            .extend(&[op as u8, count])
            .map_err(|kind| self.fail(kind))
    }

    fn emit_simple(&mut self) -> Result<(), CompileError> {
        let op = match self.token.kind {
            TokenKind::Btw => Opcode::Write,
            TokenKind::By => Opcode::Read,
            TokenKind::Gentoo => Opcode::Debug,
            _ => return Err(self.fail(Error::Internal)),
        };
        self.code.push(op as u8).map_err(|kind| self.fail(kind))
    }

    /// Reserves space for the loop's forward jump and remembers where.
    fn begin_loop(&mut self) -> Result<(), CompileError> {
        self.code
            .extend(&[0; JUMP_INSTR_SIZE])
            .map_err(|kind| self.fail(kind))?;
        self.loop_stack.push(self.code.len());
        Ok(())
    }

    /// Emits the backward jump and backfills the reserved forward jump.
    fn end_loop(&mut self) -> Result<(), CompileError> {
        let loop_start = self
            .loop_stack
            .pop()
            .ok_or_else(|| self.fail(Error::UnexpectedLoopEnd))?;

        self.code
            .push(Opcode::Jmpnz as u8)
            .map_err(|kind| self.fail(kind))?;
        self.code
            .extend(&(loop_start as u64).to_le_bytes())
            .map_err(|kind| self.fail(kind))?;

        let loop_end = self.code.len() as u64;
        let reserved = loop_start - JUMP_INSTR_SIZE;
        let slot = &mut self.code.as_mut_slice()[reserved..loop_start];
        slot[0] = Opcode::Jmpz as u8;
        slot[1..].copy_from_slice(&loop_end.to_le_bytes());
        Ok(())
    }

    fn emit(&mut self) -> Result<(), CompileError> {
        match self.token.kind {
            TokenKind::I | TokenKind::Use => self.emit_pointer_run(),
            TokenKind::Arch | TokenKind::Linux => self.emit_value_run(),
            TokenKind::Btw | TokenKind::By | TokenKind::Gentoo => {
                self.emit_simple()?;
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
}

/// Compiles a source stream to bytecode.
pub(crate) fn compile<R: Read>(src: R) -> Result<Buffer, CompileError> {
    let mut compiler = Compiler::new(src)?;

    while compiler.token.kind != TokenKind::Eof {
        compiler.emit()?;
    }

    if !compiler.loop_stack.is_empty() {
        return Err(compiler.fail(Error::UnclosedLoops));
    }

    compiler
        .code
        .push(Opcode::Ret as u8)
        .map_err(|kind| compiler.fail(kind))?;
    compiler.code.trim().map_err(|kind| compiler.fail(kind))?;
    Ok(compiler.code)
}
