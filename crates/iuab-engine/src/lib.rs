//! Compiler toolchain for the "I use Arch btw" programming language
//!
//! This crate provides the whole pipeline:
//! - Lexer for the nine-keyword source language
//! - Portable bytecode compiler and virtual machine
//! - x86-64 native code compiler and runner (unix hosts)
//! - Execution context shared by both backends
//!
//! Programs are compiled for a [`Target`] and run over a [`Context`],
//! which owns the 64 KiB data memory and the I/O channels.

#![warn(rust_2018_idioms)]

pub mod buffer;
pub mod context;
pub mod errors;
pub mod lexer;
pub mod targets;
pub mod token;

pub use buffer::{Buffer, CodeBuffer};
#[cfg(unix)]
pub use buffer::ExecBuffer;
pub use context::{noop_debug_handler, Context, DebugHandler, MEMORY_SIZE};
pub use errors::{CompileError, Error};
pub use lexer::Lexer;
pub use targets::{compile, Program, Target};
pub use token::{Token, TokenKind};
