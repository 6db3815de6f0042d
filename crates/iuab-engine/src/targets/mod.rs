//! Compilation targets and the compile/run dispatchers.

pub mod bytecode;
#[cfg(all(unix, target_arch = "x86_64"))]
pub mod jit_x86_64;

use std::fmt;
use std::io::Read;

use crate::buffer::Buffer;
#[cfg(all(unix, target_arch = "x86_64"))]
use crate::buffer::ExecBuffer;
use crate::context::Context;
use crate::errors::{CompileError, Error};
#[cfg(not(all(unix, target_arch = "x86_64")))]
use crate::token::Token;

/// The available compilation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Target {
    /// Portable bytecode, interpreted by a virtual machine.
    Bytecode,
    /// Native x86-64 machine code, run directly on the host. Only
    /// available on unix x86-64 hosts.
    JitX86_64,
}

impl Target {
    /// The target's human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Target::Bytecode => "bytecode",
            Target::JitX86_64 => "JIT x86-64",
        }
    }

    /// Whether this target can be compiled for and run on the host.
    pub fn is_supported(self) -> bool {
        match self {
            Target::Bytecode => true,
            Target::JitX86_64 => cfg!(all(unix, target_arch = "x86_64")),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
enum Code {
    Bytecode(Buffer),
    #[cfg(all(unix, target_arch = "x86_64"))]
    JitX86_64(ExecBuffer),
}

/// A compiled program, ready to run.
#[derive(Debug)]
pub struct Program {
    code: Code,
}

impl Program {
    /// The target this program was compiled for.
    pub fn target(&self) -> Target {
        match self.code {
            Code::Bytecode(_) => Target::Bytecode,
            #[cfg(all(unix, target_arch = "x86_64"))]
            Code::JitX86_64(_) => Target::JitX86_64,
        }
    }

    /// The compiled code bytes.
    pub fn as_bytes(&self) -> &[u8] {
        use crate::buffer::CodeBuffer;
        match &self.code {
            Code::Bytecode(buffer) => buffer.as_slice(),
            #[cfg(all(unix, target_arch = "x86_64"))]
            Code::JitX86_64(buffer) => buffer.as_slice(),
        }
    }

    /// Executes the program over the given context.
    ///
    /// On error, the context's instruction pointer addresses the
    /// faulting instruction for the bytecode target; the native target
    /// reports no position.
    pub fn run(&self, ctx: &mut Context<'_>) -> Result<(), Error> {
        match &self.code {
            Code::Bytecode(buffer) => {
                use crate::buffer::CodeBuffer;
                bytecode::run(buffer.as_slice(), ctx)
            }
            #[cfg(all(unix, target_arch = "x86_64"))]
            Code::JitX86_64(buffer) => jit_x86_64::run(buffer, ctx),
        }
    }
}

/// Compiles a source program for the given target.
pub fn compile<R: Read>(target: Target, src: R) -> Result<Program, CompileError> {
    let code = match target {
        Target::Bytecode => Code::Bytecode(bytecode::compile(src)?),
        #[cfg(all(unix, target_arch = "x86_64"))]
        Target::JitX86_64 => Code::JitX86_64(jit_x86_64::compile(src)?),
        #[cfg(not(all(unix, target_arch = "x86_64")))]
        Target::JitX86_64 => {
            return Err(CompileError {
                kind: Error::InvalidTarget,
                token: Token::start(),
            })
        }
    };
    Ok(Program { code })
}
