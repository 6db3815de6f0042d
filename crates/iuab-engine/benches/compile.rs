use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use iuab_engine::{compile, Target};

fn synthetic_source(loops: usize) -> String {
    let mut src = String::new();
    for _ in 0..loops {
        src.push_str("arch arch arch the linux i arch arch use way ");
    }
    src.push_str("i btw\n");
    src
}

fn bench_lex_keywords(c: &mut Criterion) {
    let source = "i use arch linux btw by the way gentoo ".repeat(128);

    c.bench_function("lex_keywords", |b| {
        b.iter(|| {
            let mut lexer = iuab_engine::Lexer::new(black_box(source.as_bytes())).unwrap();
            loop {
                let token = lexer.next_token().unwrap();
                if token.kind == iuab_engine::TokenKind::Eof {
                    break;
                }
            }
        });
    });
}

fn bench_compile_bytecode(c: &mut Criterion) {
    let source = synthetic_source(256);

    let mut group = c.benchmark_group("compile_bytecode");
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("loops", |b| {
        b.iter(|| compile(Target::Bytecode, black_box(source.as_bytes())).unwrap());
    });
    group.finish();
}

#[cfg(all(unix, target_arch = "x86_64"))]
fn bench_compile_native(c: &mut Criterion) {
    let source = synthetic_source(256);

    let mut group = c.benchmark_group("compile_native");
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("loops", |b| {
        b.iter(|| compile(Target::JitX86_64, black_box(source.as_bytes())).unwrap());
    });
    group.finish();
}

#[cfg(not(all(unix, target_arch = "x86_64")))]
fn bench_compile_native(_: &mut Criterion) {}

criterion_group!(
    benches,
    bench_lex_keywords,
    bench_compile_bytecode,
    bench_compile_native
);
criterion_main!(benches);
