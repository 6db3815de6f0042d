//! Bytecode virtual machine.

use super::Opcode;
use crate::context::{Context, MEMORY_SIZE};
use crate::errors::Error;

/// Fetch/decode/execute loop state.
///
/// `pc` and `dp` are bounds-checked indices; the context's raw `ip` and
/// `dp` fields are refreshed only around debug-handler calls and on
/// termination, mirroring the staleness contract of the native backend.
struct Vm<'a, 'p> {
    program: &'a [u8],
    ctx: &'a mut Context<'p>,
    pc: usize,
    dp: usize,
}

impl<'a, 'p> Vm<'a, 'p> {
    fn fetch_byte(&mut self) -> Result<u8, Error> {
        let byte = *self.program.get(self.pc).ok_or(Error::InvalidOp)?;
        self.pc += 1;
        Ok(byte)
    }

    fn fetch_u16(&mut self) -> Result<u16, Error> {
        let end = self.pc + 2;
        let bytes = self.program.get(self.pc..end).ok_or(Error::InvalidOp)?;
        self.pc = end;
        Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn fetch_u64(&mut self) -> Result<u64, Error> {
        let end = self.pc + 8;
        let bytes = self.program.get(self.pc..end).ok_or(Error::InvalidOp)?;
        self.pc = end;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Publishes `pc`/`dp` into the context, then invokes the handler
    /// and reloads `dp` (the handler may have moved it).
    fn call_debug_handler(&mut self) {
        self.ctx.set_ip_offset(self.pc);
        self.ctx.set_dp_offset(self.dp);
        (self.ctx.debug_handler)(self.ctx);
        self.dp = self.ctx.dp_offset();
    }

    /// Records the failing opcode's position in the context and stops.
    fn fail(&mut self, kind: Error, op_pos: usize) -> Result<(), Error> {
        self.ctx.set_ip_offset(op_pos);
        self.ctx.set_dp_offset(self.dp.min(MEMORY_SIZE - 1));
        Err(kind)
    }

    fn run(&mut self) -> Result<(), Error> {
        loop {
            let op_pos = self.pc;
            let byte = match self.fetch_byte() {
                Ok(byte) => byte,
                Err(kind) => return self.fail(kind, op_pos),
            };
            let op = match Opcode::from_byte(byte) {
                Some(op) => op,
                None => return self.fail(Error::InvalidOp, op_pos),
            };

            let result = match op {
                Opcode::Ret => {
                    self.ctx.set_ip_offset(self.pc);
                    self.ctx.set_dp_offset(self.dp);
                    return Ok(());
                }
                Opcode::AddP => self.op_addp(),
                Opcode::SubP => self.op_subp(),
                Opcode::AddV => self.op_addv(),
                Opcode::SubV => self.op_subv(),
                Opcode::Write => self.op_write(),
                Opcode::Read => self.op_read(),
                Opcode::Jmpz => self.op_jmp(true),
                Opcode::Jmpnz => self.op_jmp(false),
                Opcode::Debug => {
                    self.call_debug_handler();
                    Ok(())
                }
            };

            if let Err(kind) = result {
                return self.fail(kind, op_pos);
            }
        }
    }

    fn op_addp(&mut self) -> Result<(), Error> {
        let delta = self.fetch_u16()? as usize;
        if self.dp >= MEMORY_SIZE - delta {
            return Err(Error::DpOutOfBounds);
        }
        self.dp += delta;
        Ok(())
    }

    fn op_subp(&mut self) -> Result<(), Error> {
        let delta = self.fetch_u16()? as usize;
        if self.dp < delta {
            return Err(Error::DpOutOfBounds);
        }
        self.dp -= delta;
        Ok(())
    }

    fn op_addv(&mut self) -> Result<(), Error> {
        let delta = self.fetch_byte()?;
        let cell = &mut self.ctx.memory[self.dp];
        *cell = cell.wrapping_add(delta);
        Ok(())
    }

    fn op_subv(&mut self) -> Result<(), Error> {
        let delta = self.fetch_byte()?;
        let cell = &mut self.ctx.memory[self.dp];
        *cell = cell.wrapping_sub(delta);
        Ok(())
    }

    fn op_write(&mut self) -> Result<(), Error> {
        let byte = self.ctx.memory[self.dp];
        self.ctx.write_output_byte(byte)
    }

    fn op_read(&mut self) -> Result<(), Error> {
        match self.ctx.read_input_byte()? {
            Some(byte) => {
                self.ctx.memory[self.dp] = byte;
                Ok(())
            }
            None => Err(Error::EndOfInput),
        }
    }

    /// Absolute jump, taken on zero (`jmpz`) or nonzero (`jmpnz`).
    fn op_jmp(&mut self, on_zero: bool) -> Result<(), Error> {
        let target = self.fetch_u64()? as usize;
        if (self.ctx.memory[self.dp] == 0) == on_zero {
            if target > self.program.len() {
                return Err(Error::InvalidOp);
            }
            self.pc = target;
        }
        Ok(())
    }
}

/// Runs a bytecode program over the given context.
pub(crate) fn run(program: &[u8], ctx: &mut Context<'_>) -> Result<(), Error> {
    let mut vm = Vm {
        program,
        ctx,
        pc: 0,
        dp: 0,
    };
    vm.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::noop_debug_handler;
    use std::io;

    // Malformed programs cannot come out of the compiler, so they are
    // fed to the interpreter directly.
    fn run_raw(program: &[u8]) -> (Result<(), Error>, usize) {
        let mut ctx = Context::new(
            program,
            Box::new(io::empty()),
            Box::new(io::sink()),
            noop_debug_handler,
        );
        let result = run(program, &mut ctx);
        (result, ctx.ip_offset())
    }

    #[test]
    fn unknown_opcode_reports_its_offset() {
        let program = [Opcode::AddV as u8, 1, 0xAA, Opcode::Ret as u8];
        let (result, ip) = run_raw(&program);
        assert_eq!(result, Err(Error::InvalidOp));
        assert_eq!(ip, 2);
    }

    #[test]
    fn truncated_operand_is_invalid() {
        let program = [Opcode::AddP as u8, 1];
        let (result, ip) = run_raw(&program);
        assert_eq!(result, Err(Error::InvalidOp));
        assert_eq!(ip, 0);
    }

    #[test]
    fn running_off_the_end_is_invalid() {
        let program = [Opcode::AddV as u8, 1];
        let (result, ip) = run_raw(&program);
        assert_eq!(result, Err(Error::InvalidOp));
        assert_eq!(ip, 2);
    }

    #[test]
    fn jump_target_past_program_end_is_invalid() {
        let mut program = vec![Opcode::Jmpz as u8];
        program.extend_from_slice(&99u64.to_le_bytes());
        program.push(Opcode::Ret as u8);
        let (result, ip) = run_raw(&program);
        assert_eq!(result, Err(Error::InvalidOp));
        assert_eq!(ip, 0);
    }
}
