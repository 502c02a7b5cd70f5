mod cli;
mod error;
mod linker_symbols;
mod report;
mod reporter;
mod toolchain;

use error::BinError;
use linker_symbols::LinkerSymbols;
use reporter::Reporter;
use stackaudit_core::aggregator::{ResourceSummary, ResourceUsage};
use stackaudit_core::{InstructionStream, SymbolIndex};
use std::fs::File;
use std::process::ExitCode;

const FLASH_OK_THRESHOLD: f64 = 0.8;
const SRAM_OK_THRESHOLD: f64 = 0.8;
const STACK_OK_THRESHOLD: f64 = 0.5;

fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn main() -> ExitCode {
    setup_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match cli::parse(args) {
        Ok(cli::ParsedCli::Help) => {
            cli::print_usage();
            ExitCode::SUCCESS
        }
        Ok(cli::ParsedCli::Run(args)) => run(args),
        Err(usage) => {
            eprintln!("{usage}");
            ExitCode::from(cli::USAGE_EXIT_CODE as u8)
        }
    }
}

fn run(args: cli::Args) -> ExitCode {
    match run_inner(&args) {
        Ok(within_budget) => {
            if within_budget {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_inner(args: &cli::Args) -> Result<bool, BinError> {
    let report_file = File::create(&args.report_path)?;
    let mut reporter = Reporter::new(report_file);
    reporter.info(&format!(
        "stackaudit report generated {}",
        chrono::Utc::now().to_rfc3339()
    ))?;

    let symbol_text = toolchain::symbol_table(&args.elf_path)?;
    reporter.debug(&format!("-- raw symbol table --\n{symbol_text}"))?;
    let symbols = SymbolIndex::parse(&symbol_text)?;

    let disasm_text = toolchain::disassembly(&args.elf_path)?;
    reporter.debug(&format!("-- raw disassembly --\n{disasm_text}"))?;
    let instructions = InstructionStream::parse(&disasm_text)?;

    let linker = LinkerSymbols::read(&symbols);
    let missing = linker.missing();
    for name in &missing {
        log::error!("missing required linker symbol: {name}");
    }

    let vector_bytes = toolchain::vector_bytes(&args.elf_path, &symbols)?;
    let stack_analysis = stackaudit_core::analyze(&symbols, &instructions, &vector_bytes);

    match &stack_analysis {
        Ok(stack_report) => {
            match serde_json::to_string_pretty(stack_report) {
                Ok(json) => reporter.debug(&format!("-- stack report (json) --\n{json}"))?,
                Err(e) => log::warn!("failed to serialize stack report for debug dump: {e}"),
            }
            for line in report::function_table(&stack_report.graph) {
                reporter.info(&line)?;
            }
            for line in report::critical_path_trace(
                &stack_report.graph,
                stack_report.worst_case.reset.start,
                "reset",
            ) {
                reporter.info(&line)?;
            }
            if let Some(other) = &stack_report.worst_case.other {
                for line in report::critical_path_trace(
                    &stack_report.graph,
                    other.start,
                    "Interrupt(32) + worst other handler",
                ) {
                    reporter.info(&line)?;
                }
            }
            if let Some(hardfault) = &stack_report.worst_case.hardfault {
                for line in report::critical_path_trace(
                    &stack_report.graph,
                    hardfault.start,
                    "Interrupt(32) + hardfault",
                ) {
                    reporter.info(&line)?;
                }
            }
            for line in report::worst_case_summary(&stack_report.worst_case) {
                reporter.info(&line)?;
            }
            for warning in &stack_report.warnings {
                reporter.warn(&format!("{warning:?}"))?;
            }
        }
        Err(e) => {
            reporter.error(&format!("stack analysis failed: {e}"))?;
        }
    }

    let stack_used = stack_analysis.as_ref().ok().map(|r| r.worst_case.worst);
    let stack_usage = match (stack_used, linker.stack_total()) {
        (Some(used), Some(total)) => Some(ResourceUsage::new(used, total, STACK_OK_THRESHOLD)),
        _ => None,
    };

    let flash_usage = linker
        .flash()
        .map(|(used, total)| ResourceUsage::new(used, total, FLASH_OK_THRESHOLD));
    let sram_usage = linker
        .sram()
        .map(|(used, total)| ResourceUsage::new(used, total, SRAM_OK_THRESHOLD));

    let summary = ResourceSummary {
        flash: flash_usage,
        sram: sram_usage,
        stack: stack_usage,
    };

    for line in report::resource_summary_lines(&summary) {
        reporter.info(&line)?;
    }
    reporter.flush()?;

    let resources_ok = summary.all_within_budget();
    let symbols_ok = missing.is_empty();
    let analysis_ok = stack_analysis.is_ok();

    Ok(resources_ok && symbols_ok && analysis_ok)
}
