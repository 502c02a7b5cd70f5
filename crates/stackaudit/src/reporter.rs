//! Reporter: the `{info, warn, error}` capability set injected into the
//! aggregator (spec.md §9's design note on colored output). Core analysis
//! never writes to stdout directly — only this module does, and it always
//! mirrors every line into the report file uncolored.

use colored::Colorize;
use std::fs::File;
use std::io::{self, Write};

pub struct Reporter {
    file: File,
}

impl Reporter {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Colored on stdout (at `debug` verbosity, so a normal run stays
    /// quiet), always mirrored uncolored into the report file.
    pub fn debug(&mut self, line: &str) -> io::Result<()> {
        log::debug!("{line}");
        writeln!(self.file, "{line}")
    }

    pub fn info(&mut self, line: &str) -> io::Result<()> {
        println!("{line}");
        writeln!(self.file, "{line}")
    }

    pub fn warn(&mut self, line: &str) -> io::Result<()> {
        println!("{}", line.yellow());
        writeln!(self.file, "WARN: {line}")
    }

    pub fn error(&mut self, line: &str) -> io::Result<()> {
        eprintln!("{}", line.red().bold());
        writeln!(self.file, "ERROR: {line}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
