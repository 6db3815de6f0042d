//! Error codes shared across the compilers, the VM, and JIT-compiled code.

use crate::token::Token;

/// Errors produced by the library.
///
/// One flat, payload-free enum is used for every subsystem so that the
/// target dispatcher and the embedding host deal with a single type. The
/// discriminants are stable: JIT-compiled programs return them in `eax`
/// (with `0` meaning success), so they must never be reordered.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Memory allocation failure.
    #[error("memory allocation failure")]
    Memory = 1,
    /// I/O failure on an input or output channel.
    #[error("I/O error")]
    Io = 2,
    /// Unknown or unsupported compilation target.
    #[error("invalid target")]
    InvalidTarget = 3,
    /// The lexer produced a token no rule accepts.
    #[error("invalid token")]
    InvalidToken = 4,
    /// A loop terminator with no matching loop beginning.
    #[error("unexpected loop end")]
    UnexpectedLoopEnd = 5,
    /// One or more loops left open at end of input.
    #[error("unclosed loops")]
    UnclosedLoops = 6,
    /// Internal compiler inconsistency.
    #[error("internal compiler error")]
    Internal = 7,
    /// A pointer-move run longer than the 16-bit operand can encode.
    #[error("pointer delta out of range")]
    DeltaOutOfRange = 8,
    /// A branch displacement that does not fit its encoding.
    #[error("jump too large")]
    JumpTooLarge = 9,
    /// Unrecognized bytecode operation.
    #[error("invalid operation")]
    InvalidOp = 10,
    /// Data pointer moved outside the working memory region.
    #[error("data pointer out of bounds")]
    DpOutOfBounds = 11,
    /// Read attempted past the end of the input channel.
    #[error("end of input file")]
    EndOfInput = 12,
}

impl Error {
    /// The numeric code JIT-compiled programs return for this error.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Maps a code returned by JIT-compiled code back to a result.
    ///
    /// `0` is success. Codes outside the known range indicate corrupted
    /// generated code and are reported as [`Error::Internal`].
    pub fn from_code(code: u32) -> Result<(), Error> {
        match code {
            0 => Ok(()),
            1 => Err(Error::Memory),
            2 => Err(Error::Io),
            3 => Err(Error::InvalidTarget),
            4 => Err(Error::InvalidToken),
            5 => Err(Error::UnexpectedLoopEnd),
            6 => Err(Error::UnclosedLoops),
            7 => Err(Error::Internal),
            8 => Err(Error::DeltaOutOfRange),
            9 => Err(Error::JumpTooLarge),
            10 => Err(Error::InvalidOp),
            11 => Err(Error::DpOutOfBounds),
            12 => Err(Error::EndOfInput),
            _ => Err(Error::Internal),
        }
    }
}

/// A compile-time error together with the token that triggered it.
///
/// For [`Error::UnclosedLoops`] the token is the end-of-file token, which
/// still carries the position the input ended at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, col {}", .token.line, .token.col)]
pub struct CompileError {
    /// What went wrong.
    pub kind: Error,
    /// The token being processed when it went wrong.
    pub token: Token,
}
