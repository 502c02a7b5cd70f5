//! Toolchain bridge.
//!
//! Shells out to the `arm-none-eabi-*` binaries to produce the three raw
//! inputs the core crate consumes. Binary names are overridable via
//! `ARM_NM` / `ARM_OBJDUMP` / `ARM_OBJCOPY` so integration tests can point
//! at fixture scripts instead of a real toolchain install.

use crate::error::ToolchainError;
use stackaudit_core::SymbolIndex;
use std::path::Path;
use std::process::Command;

fn binary_name(env_var: &str, default: &str) -> String {
    std::env::var(env_var).unwrap_or_else(|_| default.to_string())
}

fn run(binary: &str, env_var: &str, args: &[&str]) -> Result<Vec<u8>, ToolchainError> {
    log::debug!("running: {binary} {}", args.join(" "));
    let output = Command::new(binary)
        .args(args)
        .output()
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ToolchainError::BinaryNotFound {
                    binary: binary.to_string(),
                    env_var: env_var.to_string(),
                }
            } else {
                ToolchainError::Spawn {
                    binary: binary.to_string(),
                    source,
                }
            }
        })?;

    if !output.status.success() {
        return Err(ToolchainError::NonZeroExit {
            binary: binary.to_string(),
            args: args.join(" "),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

fn run_text(binary: &str, env_var: &str, args: &[&str]) -> Result<String, ToolchainError> {
    let bytes = run(binary, env_var, args)?;
    String::from_utf8(bytes).map_err(|_| ToolchainError::NonUtf8Output {
        binary: binary.to_string(),
    })
}

/// `nm -n --print-size --special-syms <elf>`.
pub fn symbol_table(elf: &Path) -> Result<String, ToolchainError> {
    let nm = binary_name("ARM_NM", "arm-none-eabi-nm");
    let elf_str = elf.to_string_lossy();
    run_text(
        &nm,
        "ARM_NM",
        &["-n", "--print-size", "--special-syms", &elf_str],
    )
}

/// `objdump --disassemble --section=.text --section=.relocate <elf>`.
///
/// A missing section name is silently skipped by `objdump` itself; the
/// `.relocate` section is included because some firmware runs functions
/// out of RAM (GLOSSARY "Relocate section").
pub fn disassembly(elf: &Path) -> Result<String, ToolchainError> {
    let objdump = binary_name("ARM_OBJDUMP", "arm-none-eabi-objdump");
    let elf_str = elf.to_string_lossy();
    run_text(
        &objdump,
        "ARM_OBJDUMP",
        &[
            "--disassemble",
            "--section=.text",
            "--section=.relocate",
            &elf_str,
        ],
    )
}

/// Raw bytes of the vector table: prefer the dedicated `.vectors` section,
/// captured straight off `objcopy`'s stdout. Some `objcopy` builds can't
/// pipe binary output, so if that capture comes back empty *and* `nm`
/// already proved the section has real content (a nonzero-length
/// `exception_table` symbol), retry once through a temp file before
/// concluding the section itself is empty. Only after both attempts come
/// up empty do we fall back to the head of the whole image (spec.md §4.5
/// policy 2).
pub fn vector_bytes(elf: &Path, symbols: &SymbolIndex) -> Result<Vec<u8>, ToolchainError> {
    let objcopy = binary_name("ARM_OBJCOPY", "arm-none-eabi-objcopy");
    let elf_str = elf.to_string_lossy();

    let section_bytes = run(
        &objcopy,
        "ARM_OBJCOPY",
        &["-O", "binary", "--only-section=.vectors", &elf_str, "-"],
    )?;
    if !section_bytes.is_empty() {
        return Ok(section_bytes);
    }

    let section_known_nonempty = symbols
        .by_name("exception_table")
        .map(|s| s.end > s.start)
        .unwrap_or(false);

    if section_known_nonempty {
        log::debug!(
            "stdout capture of .vectors came back empty but nm reports a nonzero \
             exception_table; retrying via temp file before assuming the section is absent"
        );
        if let Some(bytes) = vector_bytes_via_temp_file(&objcopy, &elf_str)? {
            return Ok(bytes);
        }
    }

    log::debug!(".vectors section empty or absent, falling back to whole-image head");
    run(&objcopy, "ARM_OBJCOPY", &["-O", "binary", &elf_str, "-"])
}

/// Writes `--only-section=.vectors` output to a temp file instead of
/// stdout, for toolchains whose `objcopy` can't write binary data to a
/// pipe. Returns `Ok(None)` (rather than erroring) if the temp file still
/// comes back empty, so the caller can fall through to the whole-image
/// read.
fn vector_bytes_via_temp_file(
    objcopy: &str,
    elf_str: &str,
) -> Result<Option<Vec<u8>>, ToolchainError> {
    let tmp = tempfile::NamedTempFile::new().map_err(|source| ToolchainError::TempFile {
        binary: objcopy.to_string(),
        source,
    })?;
    let tmp_path = tmp.path().to_string_lossy().to_string();

    run(
        objcopy,
        "ARM_OBJCOPY",
        &["-O", "binary", "--only-section=.vectors", elf_str, &tmp_path],
    )?;

    let bytes = std::fs::read(tmp.path()).map_err(|source| ToolchainError::TempFile {
        binary: objcopy.to_string(),
        source,
    })?;

    Ok(if bytes.is_empty() { None } else { Some(bytes) })
}
