//! Property: stack safety. A program built from a long chain of sequential `flat_map`s finishes
//! without growing the native call stack, because the kernel trampolines `Bind` into `Kont` frames
//! instead of recursing (`vm/mod.rs`'s `run` loop, `vm/kont.rs`'s `Kont`).
//!
//! A CI-practical count stands in for the full soak-test scale; the mechanism (heap-allocated
//! `Kont` frames, no native recursion per `Bind`) is count-independent, so this exercises the same
//! code path a much larger chain would.

use super::*;
use assert2::let_assert;

fn inc(v: Value) -> Program {
    match v {
        Value::Int(i) => pure(i + 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn long_flat_map_chain_completes_without_overflowing_the_native_stack() {
    const CHAIN_LEN: i64 = 100_000;
    let mut program = pure(0i64);
    for _ in 0..CHAIN_LEN {
        program = flat_map(program, inc);
    }
    let result = run_bare(program);
    let_assert!(Ok(Value::Int(n)) = result.value);
    assert!(n == CHAIN_LEN);
}

/// The same shape, built with `sequence` rather than raw `flat_map` chaining, since `sequence`
/// folds its own `Bind` chain up front (`program::sequence`'s doc comment) — worth exercising
/// separately since the fold direction there is right-to-left, not left-to-right.
#[test]
fn sequence_of_many_pure_programs_completes() {
    const LEN: usize = 20_000;
    let programs: Vec<Program> = (0..LEN as i64).map(|i| pure(i)).collect();
    let result = run_bare(sequence(programs));
    let_assert!(Ok(Value::List(items)) = result.value);
    assert!(items.len() == LEN);
}
