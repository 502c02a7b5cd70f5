//! Call-graph builder.
//!
//! Recursively resolves callees into [`Function`] records, memoized by
//! start address. Uses an explicit work stack (§5/§9: "a non-recursive
//! traversal ... is recommended to avoid host stack overflow on deep
//! graphs") instead of native recursion, so the host call stack is never a
//! limiting factor regardless of the target firmware's call depth.

use crate::analyzer::{analyze_function, Warnings};
use crate::error::AnalysisError;
use crate::symbol::SymbolIndex;
use crate::instruction::InstructionStream;
use std::collections::{BTreeMap, BTreeSet};

/// A fully resolved function record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Function {
    pub start: u32,
    pub end: u32,
    pub name: String,
    pub own_stack: u32,
    pub callees: BTreeSet<u32>,
    pub critical_path: Option<u32>,
    pub total_stack: u32,
}

enum Slot {
    Wip,
    Done(Function),
}

/// The memoized set of resolved functions, keyed by start address.
#[derive(Debug, Default, serde::Serialize)]
pub struct CallGraph {
    table: BTreeMap<u32, Function>,
}

impl CallGraph {
    pub fn get(&self, addr: u32) -> Option<&Function> {
        self.table.get(&addr)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.table.values()
    }
}

struct Frame {
    addr: u32,
    end: u32,
    name: String,
    own_stack: u32,
    callees: Vec<u32>,
    call_sites: BTreeMap<u32, u32>,
    next_idx: usize,
}

/// Resolve `root` (and everything transitively reachable from it via `bl`)
/// into `graph`, reusing any entries already resolved from a previous call.
pub fn resolve(
    root: u32,
    symbols: &SymbolIndex,
    instructions: &InstructionStream,
    warnings: &mut Warnings,
    graph: &mut CallGraph,
) -> Result<(), AnalysisError> {
    if graph.table.contains_key(&root) {
        return Ok(());
    }

    let mut slots: BTreeMap<u32, Slot> = BTreeMap::new();
    let mut stack: Vec<Frame> = vec![start_frame(root, symbols, instructions, warnings)?];
    slots.insert(root, Slot::Wip);

    while let Some(frame) = stack.last_mut() {
        if frame.next_idx < frame.callees.len() {
            let callee = frame.callees[frame.next_idx];
            frame.next_idx += 1;

            if graph.table.contains_key(&callee) {
                continue;
            }
            match slots.get(&callee) {
                Some(Slot::Done(_)) => continue,
                Some(Slot::Wip) => {
                    let callee_name = symbols
                        .function_at_start(callee)
                        .map(|s| s.name.clone())
                        .unwrap_or_default();
                    let call_site = *frame.call_sites.get(&callee).unwrap_or(&frame.addr);
                    return Err(AnalysisError::Recursion {
                        caller: frame.name.clone(),
                        caller_addr: frame.addr,
                        callee: callee_name,
                        callee_addr: callee,
                        call_site,
                    });
                }
                None => {
                    let next_frame = start_frame(callee, symbols, instructions, warnings)?;
                    slots.insert(callee, Slot::Wip);
                    stack.push(next_frame);
                }
            }
        } else {
            let frame = stack.pop().unwrap();
            let mut critical: Option<(u32, u32)> = None;
            for &callee in &frame.callees {
                let total = match slots.get(&callee) {
                    Some(Slot::Done(f)) => f.total_stack,
                    _ => match graph.table.get(&callee) {
                        Some(f) => f.total_stack,
                        None => continue,
                    },
                };
                // `frame.callees` is built from a BTreeSet, so it is
                // already address-ascending: keeping the *first* strictly
                // greater total_stack makes ties resolve to the lowest
                // start address (spec.md §9's explicit tie-break rule).
                let better = match critical {
                    None => true,
                    Some((_, best)) => total > best,
                };
                if better {
                    critical = Some((callee, total));
                }
            }

            let total_stack = frame.own_stack + critical.map(|(_, t)| t).unwrap_or(0);
            let resolved = Function {
                start: frame.addr,
                end: frame.end,
                name: frame.name.clone(),
                own_stack: frame.own_stack,
                callees: frame.callees.iter().copied().collect(),
                critical_path: critical.map(|(c, _)| c),
                total_stack,
            };

            slots.insert(frame.addr, Slot::Done(resolved.clone()));
            graph.table.insert(frame.addr, resolved);
        }
    }

    Ok(())
}

fn start_frame(
    addr: u32,
    symbols: &SymbolIndex,
    instructions: &InstructionStream,
    warnings: &mut Warnings,
) -> Result<Frame, AnalysisError> {
    // Only text (function) symbols participate in function lookups
    // (spec.md §4.1): a zero-length linker tag sharing this start address
    // must not shadow the real function here.
    let sym = symbols
        .function_at_start(addr)
        .ok_or_else(|| AnalysisError::EmptyFunctionRange {
            name: format!("0x{addr:08x}"),
            start: addr,
        })?;
    let analysis = analyze_function(sym, symbols, instructions, warnings)?;
    Ok(Frame {
        addr: sym.start,
        end: sym.end,
        name: sym.name.clone(),
        own_stack: analysis.own_stack,
        callees: analysis.callees.into_iter().collect(),
        call_sites: analysis.call_sites,
        next_idx: 0,
    })
}
