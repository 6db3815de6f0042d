//! The portable bytecode target.

mod compile;
mod run;

pub(crate) use compile::compile;
pub(crate) use run::run;

/// Size in bytes of a jump instruction: opcode plus a `u64` absolute
/// program offset.
pub(crate) const JUMP_INSTR_SIZE: usize = 1 + std::mem::size_of::<u64>();

/// Bytecode opcodes.
///
/// All opcodes are a single byte; operands follow the opcode in the
/// instruction stream, little-endian.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Halt the program.
    Ret = 0,
    /// Add the following `u16` to the data pointer.
    AddP = 1,
    /// Subtract the following `u16` from the data pointer.
    SubP = 2,
    /// Add the following `u8` to the byte at the data pointer, wrapping.
    AddV = 3,
    /// Subtract the following `u8` from the byte at the data pointer, wrapping.
    SubV = 4,
    /// Write the byte at the data pointer to the output channel.
    Write = 5,
    /// Read one byte from the input channel into the data pointer.
    Read = 6,
    /// Jump to the following `u64` program offset if the byte at the
    /// data pointer is zero.
    Jmpz = 7,
    /// Jump to the following `u64` program offset if the byte at the
    /// data pointer is not zero.
    Jmpnz = 8,
    /// Invoke the debug handler.
    Debug = 9,
}

impl Opcode {
    /// Decodes an opcode byte.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        match byte {
            0 => Some(Opcode::Ret),
            1 => Some(Opcode::AddP),
            2 => Some(Opcode::SubP),
            3 => Some(Opcode::AddV),
            4 => Some(Opcode::SubV),
            5 => Some(Opcode::Write),
            6 => Some(Opcode::Read),
            7 => Some(Opcode::Jmpz),
            8 => Some(Opcode::Jmpnz),
            9 => Some(Opcode::Debug),
            _ => None,
        }
    }

    /// The opcode's mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Ret => "ret",
            Opcode::AddP => "addp",
            Opcode::SubP => "subp",
            Opcode::AddV => "addv",
            Opcode::SubV => "subv",
            Opcode::Write => "write",
            Opcode::Read => "read",
            Opcode::Jmpz => "jmpz",
            Opcode::Jmpnz => "jmpnz",
            Opcode::Debug => "debug",
        }
    }
}
