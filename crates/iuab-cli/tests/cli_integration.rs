//! Integration tests for the CLI execution pipeline.
//!
//! Exercises the engine API that powers the `iuab` binary against the
//! fixture programs shipped with the tests.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use iuab_engine::{compile, noop_debug_handler, Context, Error, Target};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[derive(Clone, Default)]
struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run_fixture(name: &str, target: Target, input: &[u8]) -> Vec<u8> {
    let file = File::open(fixtures_dir().join(name)).expect("fixture missing");
    let program = compile(target, file).expect("fixture failed to compile");

    let output = SharedOutput::default();
    let mut ctx = Context::new(
        program.as_bytes(),
        Box::new(io::Cursor::new(input.to_vec())),
        Box::new(output.clone()),
        noop_debug_handler,
    );
    program.run(&mut ctx).expect("fixture failed to run");
    let bytes = output.0.borrow().clone();
    bytes
}

#[test]
fn test_run_bang_fixture() {
    assert_eq!(run_fixture("bang.iuab", Target::Bytecode, b""), b"!");
}

#[test]
fn test_run_cat_fixture() {
    assert_eq!(run_fixture("cat2.iuab", Target::Bytecode, b"ok"), b"ok");
}

#[cfg(all(unix, target_arch = "x86_64"))]
#[test]
fn test_run_bang_fixture_native() {
    assert_eq!(run_fixture("bang.iuab", Target::JitX86_64, b""), b"!");
}

#[test]
fn test_bad_fixture_reports_position() {
    let file = File::open(fixtures_dir().join("bad.iuab")).unwrap();
    let err = compile(Target::Bytecode, file).unwrap_err();
    assert_eq!(err.kind, Error::InvalidToken);
    assert_eq!((err.token.line, err.token.col), (3, 1));
}
