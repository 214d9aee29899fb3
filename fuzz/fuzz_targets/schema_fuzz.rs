//! Schema fuzz target: feed arbitrary text to both schema parsers and the validator.
//! Neither may panic; both return Ok or a SchemaError / ConfigError.
//! Build with: cargo fuzz run schema_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(def) = satframe::parse(s) {
        let _ = satframe::Schema::resolve(def);
    }
    if let Ok(def) = satframe::xml::parse(s) {
        let _ = satframe::Schema::resolve(def);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run schema_fuzz");
}
