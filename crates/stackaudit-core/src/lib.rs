//! Static worst-case stack-depth analyzer for linked ARM Cortex-M firmware.
//!
//! Given a symbol table, a disassembly instruction stream, and the raw
//! bytes of the exception (vector) table, this crate computes the maximum
//! stack consumption reachable from any interrupt service routine without
//! executing the program. It never touches the filesystem or a process —
//! those concerns belong to the `stackaudit` binary crate's toolchain
//! bridge.

pub mod aggregator;
pub mod analyzer;
pub mod callgraph;
pub mod error;
pub mod exception;
pub mod instruction;
pub mod symbol;

pub use aggregator::{worst_case, ResourceSummary, ResourceUsage, Severity, WorstCase};
pub use analyzer::{Warning, Warnings};
pub use callgraph::{resolve as resolve_call_graph, CallGraph, Function};
pub use error::AnalysisError;
pub use exception::ExceptionTable;
pub use instruction::{Instruction, InstructionStream, Operand};
pub use symbol::{Symbol, SymbolIndex};

/// Runs the core pipeline end to end: resolve the exception table's reset,
/// hardfault, and other-handler entries into a call graph, then aggregate
/// the worst-case nesting depth. Does not touch resource budgets — that's
/// the caller's job once it has read the linker symbols (§4.8).
#[derive(serde::Serialize)]
pub struct StackReport {
    pub graph: CallGraph,
    pub exception_table: ExceptionTable,
    pub worst_case: WorstCase,
    pub warnings: Vec<Warning>,
}

pub fn analyze(
    symbols: &SymbolIndex,
    instructions: &InstructionStream,
    vector_bytes: &[u8],
) -> Result<StackReport, AnalysisError> {
    let exception_table = ExceptionTable::parse(vector_bytes, symbols)?;
    let mut graph = CallGraph::default();
    let mut warnings = Warnings::default();

    callgraph::resolve(
        exception_table.reset,
        symbols,
        instructions,
        &mut warnings,
        &mut graph,
    )?;
    for &addr in &exception_table.others {
        callgraph::resolve(addr, symbols, instructions, &mut warnings, &mut graph)?;
    }
    if let Some(hf) = exception_table.hardfault {
        callgraph::resolve(hf, symbols, instructions, &mut warnings, &mut graph)?;
    }

    let worst_case = aggregator::worst_case(&graph, &exception_table)
        .expect("every exception-table entry was just resolved above");

    Ok(StackReport {
        graph,
        exception_table,
        worst_case,
        warnings: warnings.items().to_vec(),
    })
}
