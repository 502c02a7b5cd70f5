//! Report formatting: per-function tables, critical-path traces, and the
//! three-line resource summary spec.md §6 requires in the report file.
//! Pure string formatting — the binary's [`crate::reporter::Reporter`]
//! decides where these lines go (file-only vs. file+stdout, colored or
//! not).

use stackaudit_core::callgraph::CallGraph;
use stackaudit_core::aggregator::{ResourceSummary, Severity, WorstCase};

pub fn function_table(graph: &CallGraph) -> Vec<String> {
    let mut lines = vec!["-- function stack table --".to_string()];
    for f in graph.functions() {
        let critical = f
            .critical_path
            .and_then(|addr| graph.get(addr))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "  0x{:08x} {:<32} own={:<6} total={:<6} critical_path->{}",
            f.start, f.name, f.own_stack, f.total_stack, critical
        ));
    }
    lines
}

pub fn critical_path_trace(graph: &CallGraph, root: u32, label: &str) -> Vec<String> {
    let mut lines = vec![format!("-- critical path from {label} --")];
    let mut cursor = Some(root);
    let mut running_total = 0u32;
    while let Some(addr) = cursor {
        let Some(f) = graph.get(addr) else {
            break;
        };
        lines.push(format!(
            "  0x{:08x} {:<32} own={}",
            f.start, f.name, f.own_stack
        ));
        running_total += f.own_stack;
        cursor = f.critical_path;
    }
    lines.push(format!("  sum of own_stack along path: {running_total}"));
    lines
}

pub fn worst_case_summary(wc: &WorstCase) -> Vec<String> {
    let mut lines = vec![format!(
        "reset {} (0x{:08x}): total_stack={}",
        wc.reset.name, wc.reset.start, wc.reset.total_stack
    )];
    if let Some(o) = &wc.other {
        lines.push(format!(
            "worst other handler {} (0x{:08x}): total_stack={}",
            o.name, o.start, o.total_stack
        ));
    }
    if let Some(h) = &wc.hardfault {
        lines.push(format!(
            "hardfault {} (0x{:08x}): total_stack={}",
            h.name, h.start, h.total_stack
        ));
    }
    lines.push(format!("worst-case stack depth: {} bytes", wc.worst));
    lines
}

fn severity_tag(s: Severity) -> &'static str {
    match s {
        Severity::Ok => "OK",
        Severity::Warn => "WARN",
        Severity::Error => "ERROR",
    }
}

/// The three-line resource summary the report-file contract (spec.md §6)
/// requires, in flash/sram/stack order.
pub fn resource_summary_lines(summary: &ResourceSummary) -> Vec<String> {
    let line = |label: &str, usage: &Option<stackaudit_core::aggregator::ResourceUsage>| match usage
    {
        Some(u) => format!(
            "{label}: {}/{} bytes ({:.1}%) [{}]",
            u.used,
            u.total,
            u.percent(),
            severity_tag(u.severity)
        ),
        None => format!("{label}: unavailable (missing linker symbols)"),
    };
    vec![
        line("flash", &summary.flash),
        line("sram", &summary.sram),
        line("stack", &summary.stack),
    ]
}
