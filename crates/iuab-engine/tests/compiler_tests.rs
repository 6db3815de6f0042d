//! Compiler integration tests
//!
//! Tests cover:
//! - Bytecode encoding of each operation
//! - Run-length folding and its limits
//! - Loop jump backfilling
//! - Compile error positions

use iuab_engine::targets::bytecode::Opcode;
use iuab_engine::{compile, Error, Target, TokenKind};

fn bytecode(src: &str) -> Vec<u8> {
    compile(Target::Bytecode, src.as_bytes())
        .unwrap()
        .as_bytes()
        .to_vec()
}

#[test]
fn test_empty_program_is_a_single_ret() {
    assert_eq!(bytecode(""), vec![Opcode::Ret as u8]);
}

#[test]
fn test_pointer_runs_fold_into_one_instruction() {
    assert_eq!(
        bytecode("i i i"),
        vec![Opcode::AddP as u8, 3, 0, Opcode::Ret as u8]
    );
    assert_eq!(
        bytecode("i use use"),
        vec![
            Opcode::AddP as u8,
            1,
            0,
            Opcode::SubP as u8,
            2,
            0,
            Opcode::Ret as u8
        ]
    );
}

#[test]
fn test_value_runs_fold_with_wrapping() {
    assert_eq!(
        bytecode("arch arch"),
        vec![Opcode::AddV as u8, 2, Opcode::Ret as u8]
    );
    // 256 repetitions wrap to zero and emit nothing.
    let src = "linux ".repeat(256);
    assert_eq!(bytecode(&src), vec![Opcode::Ret as u8]);
    // 257 wrap to one.
    let src = "arch ".repeat(257);
    assert_eq!(bytecode(&src), vec![Opcode::AddV as u8, 1, Opcode::Ret as u8]);
}

#[test]
fn test_io_and_debug_encode_as_single_bytes() {
    assert_eq!(
        bytecode("btw by gentoo"),
        vec![
            Opcode::Write as u8,
            Opcode::Read as u8,
            Opcode::Debug as u8,
            Opcode::Ret as u8
        ]
    );
}

#[test]
fn test_empty_loop_jumps() {
    let mut expected = vec![Opcode::Jmpz as u8];
    expected.extend_from_slice(&18u64.to_le_bytes());
    expected.push(Opcode::Jmpnz as u8);
    expected.extend_from_slice(&9u64.to_le_bytes());
    expected.push(Opcode::Ret as u8);
    assert_eq!(bytecode("the way"), expected);
}

#[test]
fn test_nested_loops_backfill_their_own_headers() {
    let code = bytecode("the the way way");
    // Outer jmpz targets the end of the outer jmpnz, inner likewise.
    assert_eq!(code[0], Opcode::Jmpz as u8);
    let outer_exit = u64::from_le_bytes(code[1..9].try_into().unwrap());
    assert_eq!(outer_exit as usize, code.len() - 1);
    assert_eq!(code[9], Opcode::Jmpz as u8);
    let inner_exit = u64::from_le_bytes(code[10..18].try_into().unwrap());
    assert_eq!(inner_exit as usize, 27);
    assert_eq!(code[18], Opcode::Jmpnz as u8);
    assert_eq!(code[27], Opcode::Jmpnz as u8);
    assert_eq!(*code.last().unwrap(), Opcode::Ret as u8);
}

#[test]
fn test_pointer_run_longer_than_u16_is_rejected() {
    let src = "i\n".repeat(65536);
    let err = compile(Target::Bytecode, src.as_bytes()).unwrap_err();
    assert_eq!(err.kind, Error::DeltaOutOfRange);
    // Reported at the repetition that pushed the run over the limit.
    assert_eq!(err.token.line, 65536);
    assert_eq!(err.token.col, 1);
}

#[test]
fn test_unexpected_loop_end() {
    let err = compile(Target::Bytecode, "arch way".as_bytes()).unwrap_err();
    assert_eq!(err.kind, Error::UnexpectedLoopEnd);
    assert_eq!(err.token.kind, TokenKind::Way);
    assert_eq!((err.token.line, err.token.col), (1, 6));
}

#[test]
fn test_unclosed_loops_reported_at_eof() {
    let err = compile(Target::Bytecode, "the the way".as_bytes()).unwrap_err();
    assert_eq!(err.kind, Error::UnclosedLoops);
    assert_eq!(err.token.kind, TokenKind::Eof);
}

#[test]
fn test_invalid_token_position() {
    let err = compile(Target::Bytecode, "arch\n  debian".as_bytes()).unwrap_err();
    assert_eq!(err.kind, Error::InvalidToken);
    assert_eq!(err.token.kind, TokenKind::Invalid);
    assert_eq!((err.token.line, err.token.col), (2, 3));
}

#[test]
fn test_comments_do_not_affect_code() {
    let plain = bytecode("arch arch btw");
    let commented = bytecode("; header\narch ; one\narch; two\nbtw ; done");
    assert_eq!(plain, commented);
}

#[test]
fn test_compile_error_display() {
    let err = compile(Target::Bytecode, "way".as_bytes()).unwrap_err();
    assert_eq!(err.to_string(), "unexpected loop end at line 1, col 1");
}
