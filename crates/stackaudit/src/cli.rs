//! CLI surface: `stackaudit <elf-path> <report-path>`.

use std::path::PathBuf;

const USAGE: &str = "usage: stackaudit <elf-path> <report-path>";

pub struct Args {
    pub elf_path: PathBuf,
    pub report_path: PathBuf,
}

/// Exit code used for "invoked wrong" (distinct from `1`, used for
/// budget/analysis failure, so CI can tell the two apart).
pub const USAGE_EXIT_CODE: i32 = 2;

pub enum ParsedCli {
    Run(Args),
    Help,
}

pub fn parse<I: IntoIterator<Item = String>>(argv: I) -> Result<ParsedCli, String> {
    let args: Vec<String> = argv.into_iter().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Ok(ParsedCli::Help);
    }

    match args.as_slice() {
        [elf, report] => Ok(ParsedCli::Run(Args {
            elf_path: PathBuf::from(elf),
            report_path: PathBuf::from(report),
        })),
        _ => Err(USAGE.to_string()),
    }
}

pub fn print_usage() {
    println!("{USAGE}");
}
