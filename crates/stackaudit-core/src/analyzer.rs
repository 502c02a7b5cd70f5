//! Function analyzer.
//!
//! Walks a single function's instruction range, classifying each
//! instruction as stack-adjusting, a direct/indirect call, or irrelevant.
//! Produces the function's fixed (non-callee) stack consumption and its
//! set of direct `bl` callees; the call-graph builder does the recursion.

use crate::error::AnalysisError;
use crate::instruction::{Instruction, InstructionStream, Operand};
use crate::symbol::{Symbol, SymbolIndex};
use std::collections::BTreeSet;

/// A soundness warning: something the analyzer could not resolve, but which
/// does not halt analysis. See `spec.md` §7.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Warning {
    /// `blx` (indirect call) encountered.
    IndirectCall { function: String, addr: u32 },
    /// `bl` to an address that is neither in the symbol index nor inside
    /// the calling function's own range.
    UnresolvedCall {
        function: String,
        addr: u32,
        target: u32,
    },
    /// Emitted once, after the second `blx` warning, per spec's cap.
    BlxSummaryCollapsed,
}

/// Accumulates warnings, enforcing the two-verbatim-then-collapse cap on
/// `blx` warnings (spec.md §7: "the first two are reported in full while
/// subsequent blx warnings are collapsed to one summary line").
#[derive(Debug, Default)]
pub struct Warnings {
    items: Vec<Warning>,
    blx_count: usize,
}

impl Warnings {
    pub fn push_indirect_call(&mut self, function: &str, addr: u32) {
        self.blx_count += 1;
        if self.blx_count <= 2 {
            self.items.push(Warning::IndirectCall {
                function: function.to_string(),
                addr,
            });
        } else if self.blx_count == 3 {
            self.items.push(Warning::BlxSummaryCollapsed);
        }
    }

    pub fn push_unresolved_call(&mut self, function: &str, addr: u32, target: u32) {
        self.items.push(Warning::UnresolvedCall {
            function: function.to_string(),
            addr,
            target,
        });
    }

    pub fn items(&self) -> &[Warning] {
        &self.items
    }
}

/// Result of walking a single function's instructions.
#[derive(Debug, Clone, Default)]
pub struct FunctionAnalysis {
    pub own_stack: u32,
    pub callees: BTreeSet<u32>,
    /// Address of the first `bl` instruction found for each callee, used to
    /// name the instruction address in a recursion diagnostic.
    pub call_sites: std::collections::BTreeMap<u32, u32>,
}

/// Pending PC-relative literal load: `(register, raw instruction encoding)`.
#[derive(Debug, Clone, Copy)]
struct PendingLoad {
    register: String,
    encoding: u32,
}

pub fn analyze_function(
    sym: &Symbol,
    symbols: &SymbolIndex,
    instructions: &InstructionStream,
    warnings: &mut Warnings,
) -> Result<FunctionAnalysis, AnalysisError> {
    let mut result = FunctionAnalysis::default();
    let mut pending_load: Option<PendingLoad> = None;

    let Some(mut idx) = instructions.index_at_or_after(sym.start) else {
        return Err(AnalysisError::EmptyFunctionRange {
            name: sym.name.clone(),
            start: sym.start,
        });
    };

    let mut pc = sym.start;
    while pc < sym.end {
        let Some(instr) = instructions.get(idx) else {
            return Err(AnalysisError::EmptyFunctionRange {
                name: sym.name.clone(),
                start: sym.start,
            });
        };
        if instr.addr != pc {
            return Err(AnalysisError::AssemblyGap {
                function: sym.name.clone(),
                addr: pc,
                expected: pc,
                found: instr.addr,
            });
        }

        let next_mnemonic = instructions.get(idx + 1).map(|i| i.mnemonic.as_str());
        let next_addr = classify(
            sym,
            instr,
            next_mnemonic,
            symbols,
            &mut result,
            &mut pending_load,
            warnings,
        )?;

        if instr.repeated {
            // Advance pc by instruction length and re-process the same
            // instruction until pc reaches the next listed address.
            let next_listed = instructions.get(idx + 1).map(|i| i.addr);
            pc = next_addr;
            if let Some(next_listed) = next_listed {
                while pc < next_listed {
                    classify(
                        sym,
                        instr,
                        next_mnemonic,
                        symbols,
                        &mut result,
                        &mut pending_load,
                        warnings,
                    )?;
                    pc += instr.byte_len as u32;
                }
            }
            idx += 1;
        } else {
            pc = next_addr;
            idx += 1;
        }
    }

    Ok(result)
}

/// Classify a single instruction, mutating `analysis`/`pending_load`/
/// `warnings` as needed. Returns the address immediately following this
/// instruction.
fn classify(
    sym: &Symbol,
    instr: &Instruction,
    next_mnemonic: Option<&str>,
    symbols: &SymbolIndex,
    analysis: &mut FunctionAnalysis,
    pending_load: &mut Option<PendingLoad>,
    warnings: &mut Warnings,
) -> Result<u32, AnalysisError> {
    let next = instr.addr + instr.byte_len as u32;
    let mnemonic = instr.mnemonic.to_ascii_lowercase();

    match mnemonic.as_str() {
        "push" => {
            let count = reglist_len(&instr.arg0);
            analysis.own_stack += 4 * count;
        }
        "pop" => {
            // Epilogue; no stack accounting needed.
        }
        "sub" if writes_sp(instr) => {
            match sub_sp_immediate(instr) {
                Some(imm) => analysis.own_stack += imm,
                None => {
                    return Err(AnalysisError::NonImmediateSubSp {
                        function: sym.name.clone(),
                        addr: instr.addr,
                    })
                }
            }
        }
        "ldr" if is_pc_relative_load(instr) => {
            if let Some(reg) = instr.arg0.as_register() {
                *pending_load = Some(PendingLoad {
                    register: reg.to_string(),
                    encoding: instr.encoding,
                });
            }
        }
        "add" if writes_sp(instr) => {
            if let Some(reg) = add_sp_register_operand(instr) {
                match pending_load {
                    Some(load) if load.register.eq_ignore_ascii_case(reg) => {
                        analysis.own_stack += load.encoding;
                        *pending_load = None;
                    }
                    _ => {
                        return Err(AnalysisError::MismatchedAddSpRegister {
                            function: sym.name.clone(),
                            addr: instr.addr,
                            register: reg.to_string(),
                        })
                    }
                }
            }
            // `add sp, #imm` (positive adjustment) is ignored.
        }
        "bl" => {
            if let Some(target) = instr.arg0.as_branch_target() {
                if symbols.is_function_start(target) {
                    analysis.callees.insert(target);
                    analysis.call_sites.entry(target).or_insert(instr.addr);
                } else if target > sym.start && target <= sym.end {
                    // Internal branch-and-link, not a real call.
                } else {
                    warnings.push_unresolved_call(&sym.name, instr.addr, target);
                }
            }
        }
        "blx" => {
            warnings.push_indirect_call(&sym.name, instr.addr);
        }
        _ if writes_sp(instr) && !mnemonic.starts_with('b') => {
            let next_is_pop = next_mnemonic
                .map(|m| m.eq_ignore_ascii_case("pop"))
                .unwrap_or(false);
            if !next_is_pop {
                return Err(AnalysisError::UnknownStackManipulation {
                    function: sym.name.clone(),
                    addr: instr.addr,
                    mnemonic: instr.mnemonic.clone(),
                    operands: format_operands(instr),
                });
            }
        }
        _ => {
            // Non-linking branches and everything else: no stack effect.
        }
    }

    Ok(next)
}

fn writes_sp(instr: &Instruction) -> bool {
    matches!(instr.arg0.as_register(), Some(r) if r.eq_ignore_ascii_case("sp"))
}

fn sub_sp_immediate(instr: &Instruction) -> Option<u32> {
    instr.arg1.as_immediate().map(|v| v as u32)
}

fn add_sp_register_operand<'a>(instr: &'a Instruction) -> Option<&'a str> {
    instr.arg1.as_register()
}

fn is_pc_relative_load(instr: &Instruction) -> bool {
    match &instr.arg1 {
        Operand::Token(t) => {
            let lower = t.to_ascii_lowercase();
            lower.starts_with('[') && lower.contains("pc")
        }
        _ => false,
    }
}

fn reglist_len(operand: &Operand) -> u32 {
    let Some(token) = operand.as_token() else {
        return 0;
    };
    let inner = token.trim_start_matches('{').trim_end_matches('}');
    let mut count = 0u32;
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            if let (Some(lo), Some(hi)) = (register_number(lo.trim()), register_number(hi.trim()))
            {
                if hi >= lo {
                    count += hi - lo + 1;
                    continue;
                }
            }
        }
        count += 1;
    }
    count
}

fn register_number(reg: &str) -> Option<u32> {
    let lower = reg.to_ascii_lowercase();
    lower.strip_prefix('r').and_then(|n| n.parse().ok())
}

fn format_operands(instr: &Instruction) -> String {
    let parts: Vec<String> = [&instr.arg0, &instr.arg1, &instr.arg2]
        .into_iter()
        .filter(|op| **op != Operand::Absent)
        .map(|op| match op {
            Operand::Register(r) => r.clone(),
            Operand::Immediate(v) => format!("#{v}"),
            Operand::Token(t) => t.clone(),
            Operand::Absent => String::new(),
        })
        .collect();
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolIndex;

    fn build(sym_text: &str, asm_text: &str) -> (SymbolIndex, InstructionStream) {
        (
            SymbolIndex::parse(sym_text).unwrap(),
            InstructionStream::parse(asm_text).unwrap(),
        )
    }

    #[test]
    fn s1_leaf_function() {
        let (symbols, instrs) = build(
            "00001000 00000008 t f\n",
            "1000:\tb5 10\tpush\t{r4, lr}\n1002:\tbd 10\tpop\t{r4, pc}\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let analysis = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        assert_eq!(analysis.own_stack, 8);
        assert!(analysis.callees.is_empty());
    }

    #[test]
    fn push_counts_registers_regardless_of_names() {
        let (symbols, instrs) = build(
            "00001000 00000002 t f\n",
            "1000:\t00 00\tpush\t{r0, r1, r2, r7}\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let analysis = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        assert_eq!(analysis.own_stack, 16);
    }

    #[test]
    fn sub_sp_immediate_contributes_raw_value() {
        let (symbols, instrs) = build(
            "00001000 00000002 t h\n",
            "1000:\t85 b0\tsub\tsp, #0x20\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let analysis = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        assert_eq!(analysis.own_stack, 32);
    }

    #[test]
    fn s4_literal_pool_adjustment() {
        // ldr r6, [pc, #0x19c] with raw bytes chosen so the decoded
        // encoding equals 0x1fc (508), as spec.md §8 S4 specifies.
        let (symbols, instrs) = build(
            "00001000 00000008 t f\n",
            "1000:\t00 b5\tpush\t{r7, lr}\n\
             1002:\tfc 01 00 00\tldr\tr6, [pc, #0x19c]\n\
             1006:\t85 44\tadd\tsp, r6\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let analysis = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        assert_eq!(analysis.own_stack, 8 + 508);
    }

    #[test]
    fn bl_to_known_symbol_becomes_callee() {
        // objdump prints branch targets as bare hex, never `0x`-prefixed.
        let (symbols, instrs) = build(
            "00001000 00000004 t f\n00001004 00000002 t g\n",
            "1000:\t00 f0 00 f8\tbl\t1004\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let analysis = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        assert_eq!(analysis.callees, [0x1004u32].into_iter().collect());
    }

    #[test]
    fn bl_target_with_hex_letter_and_symbol_annotation_resolves() {
        // Realistic objdump output: a target containing a hex letter
        // (so it never round-trips through the decimal-immediate parse)
        // and a trailing `<symbol>` annotation.
        let (symbols, instrs) = build(
            "00001000 00000004 t f\n0000100c 00000002 t g\n",
            "1000:\t00 f0 00 f8\tbl\t100c <g>\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let analysis = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        assert_eq!(analysis.callees, [0x100cu32].into_iter().collect());
    }

    #[test]
    fn bl_to_internal_branch_is_ignored() {
        let (symbols, instrs) = build(
            "00001000 00000008 t f\n",
            "1000:\t00 f0 00 f8\tbl\t1004\n1004:\t00 bf\tnop\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let analysis = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        assert!(analysis.callees.is_empty());
    }

    #[test]
    fn bl_to_unresolved_address_warns() {
        let (symbols, instrs) = build(
            "00001000 00000004 t f\n",
            "1000:\t00 f0 00 f8\tbl\t9000\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let analysis = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        assert!(analysis.callees.is_empty());
        assert_eq!(warnings.items().len(), 1);
    }

    #[test]
    fn blx_warnings_cap_at_two_plus_summary() {
        let (symbols, instrs) = build(
            "00001000 00000008 t f\n",
            "1000:\t00 47\tblx\tr0\n1002:\t00 47\tblx\tr0\n1004:\t00 47\tblx\tr0\n1006:\t00 47\tblx\tr0\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let _ = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        // Two verbatim + one collapsed summary, regardless of 4 occurrences.
        assert_eq!(warnings.items().len(), 3);
        assert_eq!(warnings.items()[2], Warning::BlxSummaryCollapsed);
    }

    #[test]
    fn gap_in_assembly_is_fatal() {
        let (symbols, instrs) = build(
            "00001000 00000008 t f\n",
            "1000:\t00 bf\tnop\n1004:\t00 bf\tnop\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let err = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap_err();
        assert!(matches!(err, AnalysisError::AssemblyGap { .. }));
    }

    #[test]
    fn sp_restore_before_pop_is_tolerated() {
        let (symbols, instrs) = build(
            "00001000 00000006 t f\n",
            "1000:\t00 00\tmov\tsp, r4\n1002:\tbd 10\tpop\t{r4, pc}\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let analysis = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap();
        assert_eq!(analysis.own_stack, 0);
    }

    #[test]
    fn unexplained_sp_write_is_fatal() {
        let (symbols, instrs) = build(
            "00001000 00000004 t f\n",
            "1000:\t00 00\tmov\tsp, r4\n1002:\t00 bf\tnop\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let err = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownStackManipulation { .. }));
    }

    #[test]
    fn non_immediate_sub_sp_is_fatal() {
        let (symbols, instrs) = build(
            "00001000 00000002 t f\n",
            "1000:\t00 00\tsub\tsp, r4\n",
        );
        let f = symbols.by_start(0x1000).unwrap();
        let mut warnings = Warnings::default();
        let err = analyze_function(f, &symbols, &instrs, &mut warnings).unwrap_err();
        assert!(matches!(err, AnalysisError::NonImmediateSubSp { .. }));
    }
}
