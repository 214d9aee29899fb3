//! Expression fuzz target: parse arbitrary text as a calibration expression and evaluate
//! whatever parses. Parsing and evaluation must not panic.
//! Build with: cargo fuzz run expression_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }
    let (head, tail) = data.split_at(8);
    let mut raw = [0u8; 8];
    raw.copy_from_slice(head);
    let raw = f64::from_le_bytes(raw);
    let s = match std::str::from_utf8(tail) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(expr) = satframe::Expression::parse(s) {
        let _ = expr.evaluate(raw);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run expression_fuzz");
}
