//! Analysis error taxonomy.
//!
//! Every Structural and Semantic error from the contract gets its own
//! variant so callers can match on kind instead of string-sniffing a
//! message. Soundness warnings are not errors at all — see [`crate::Warning`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("malformed symbol table line {line}: {text:?}")]
    MalformedSymbolLine { line: usize, text: String },

    #[error("exception table is empty: could not find exception table")]
    EmptyExceptionTable,

    #[error("reset vector is null")]
    NullResetVector,

    #[error("gap in assembly within function {function} at 0x{addr:08x}: expected next instruction at 0x{expected:08x}, found 0x{found:08x}")]
    AssemblyGap {
        function: String,
        addr: u32,
        expected: u32,
        found: u32,
    },

    #[error("unknown stack-pointer manipulation at 0x{addr:08x} in {function}: `{mnemonic} {operands}`")]
    UnknownStackManipulation {
        function: String,
        addr: u32,
        mnemonic: String,
        operands: String,
    },

    #[error("non-immediate `sub sp, ...` at 0x{addr:08x} in {function}")]
    NonImmediateSubSp { function: String, addr: u32 },

    #[error("`add sp, {register}` at 0x{addr:08x} in {function} does not match the pending literal-load register")]
    MismatchedAddSpRegister {
        function: String,
        addr: u32,
        register: String,
    },

    #[error("recursion detected: {caller} (0x{caller_addr:08x}) calls {callee} (0x{callee_addr:08x}) which is already being analyzed, via `bl` at 0x{call_site:08x}")]
    Recursion {
        caller: String,
        caller_addr: u32,
        callee: String,
        callee_addr: u32,
        call_site: u32,
    },

    #[error("function {name} (start 0x{start:08x}) has no instructions in its declared range")]
    EmptyFunctionRange { name: String, start: u32 },
}
