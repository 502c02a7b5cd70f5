//! Aggregator: worst-case interrupt-nesting depth and resource budgets.

use crate::callgraph::CallGraph;
use crate::exception::ExceptionTable;

/// The eight Cortex-M core registers automatically pushed on exception
/// entry (spec.md §4.6 / GLOSSARY "Interrupt frame").
pub const INTERRUPT_FRAME: u32 = 32;

/// One resolved handler on the critical aggregation path.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HandlerStack {
    pub start: u32,
    pub name: String,
    pub total_stack: u32,
}

/// Worst-case nested stack depth reachable from the vector table.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorstCase {
    pub reset: HandlerStack,
    pub other: Option<HandlerStack>,
    pub hardfault: Option<HandlerStack>,
    pub worst: u32,
}

/// Compute the worst-case nesting depth:
/// `reset + (32 + max_other) + (32 + hardfault)`, each bracketed term
/// present only if the corresponding handler set is nonempty/present.
///
/// Every address the exception table names must already be resolved in
/// `graph` (the binary resolves reset, the other handlers, and hardfault
/// before calling this).
pub fn worst_case(graph: &CallGraph, table: &ExceptionTable) -> Option<WorstCase> {
    let reset_fn = graph.get(table.reset)?;
    let reset = HandlerStack {
        start: reset_fn.start,
        name: reset_fn.name.clone(),
        total_stack: reset_fn.total_stack,
    };

    let other = table
        .others
        .iter()
        .filter_map(|&addr| graph.get(addr))
        .max_by_key(|f| f.total_stack)
        .map(|f| HandlerStack {
            start: f.start,
            name: f.name.clone(),
            total_stack: f.total_stack,
        });

    let hardfault = table
        .hardfault
        .and_then(|addr| graph.get(addr))
        .map(|f| HandlerStack {
            start: f.start,
            name: f.name.clone(),
            total_stack: f.total_stack,
        });

    let mut worst = reset.total_stack;
    if let Some(o) = &other {
        worst += INTERRUPT_FRAME + o.total_stack;
    }
    if let Some(h) = &hardfault {
        worst += INTERRUPT_FRAME + h.total_stack;
    }

    Some(WorstCase {
        reset,
        other,
        hardfault,
        worst,
    })
}

/// Severity of a single resource's usage against its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Severity {
    Ok,
    Warn,
    Error,
}

impl Severity {
    /// `< ok_threshold` ok; `<= 1.0` warn; `> 1.0` error.
    pub fn from_ratio(ratio: f64, ok_threshold: f64) -> Self {
        if ratio > 1.0 {
            Severity::Error
        } else if ratio < ok_threshold {
            Severity::Ok
        } else {
            Severity::Warn
        }
    }
}

/// One resource's used/total figures plus derived severity.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceUsage {
    pub used: u32,
    pub total: u32,
    pub severity: Severity,
}

impl ResourceUsage {
    pub fn new(used: u32, total: u32, ok_threshold: f64) -> Self {
        let ratio = if total == 0 {
            f64::INFINITY
        } else {
            used as f64 / total as f64
        };
        Self {
            used,
            total,
            severity: Severity::from_ratio(ratio, ok_threshold),
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            f64::INFINITY
        } else {
            self.used as f64 / self.total as f64 * 100.0
        }
    }
}

/// Flash/RAM/stack resource summary. Any field may be absent if its
/// required linker symbols were missing (spec.md §7 "partial success").
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ResourceSummary {
    pub flash: Option<ResourceUsage>,
    pub sram: Option<ResourceUsage>,
    pub stack: Option<ResourceUsage>,
}

impl ResourceSummary {
    /// `true` iff every present resource is within budget. A resource that
    /// is absent (missing linker symbols) does not by itself fail this
    /// check; the binary separately requires all linker symbols to exist.
    pub fn all_within_budget(&self) -> bool {
        [&self.flash, &self.sram, &self.stack]
            .into_iter()
            .flatten()
            .all(|r| r.severity != Severity::Error)
    }
}
