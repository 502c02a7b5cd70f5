//! Linker Symbol Reader.
//!
//! A thin accessor over the already-parsed `SymbolIndex` (no extra
//! toolchain call — `nm` already emits these) that looks up the budget
//! symbols spec.md §6 names by name, reporting each absence individually
//! so the aggregator can still print the sums it can (§7 "partial success").

use stackaudit_core::SymbolIndex;

const REQUIRED: &[&str] = &[
    "ROM_LENGTH",
    "RAM_LENGTH",
    "_srom",
    "_erom",
    "_sram",
    "_eram",
    "_sstack",
    "_estack",
];

/// The eight required budget symbols, each individually `Option` so a
/// single missing one doesn't block reading the rest.
#[derive(Debug, Clone, Default)]
pub struct LinkerSymbols {
    pub rom_length: Option<u32>,
    pub ram_length: Option<u32>,
    pub srom: Option<u32>,
    pub erom: Option<u32>,
    pub sram: Option<u32>,
    pub eram: Option<u32>,
    pub sstack: Option<u32>,
    pub estack: Option<u32>,
}

impl LinkerSymbols {
    pub fn read(symbols: &SymbolIndex) -> Self {
        let addr = |name: &str| symbols.by_name(name).map(|s| s.start);
        Self {
            rom_length: addr("ROM_LENGTH"),
            ram_length: addr("RAM_LENGTH"),
            srom: addr("_srom"),
            erom: addr("_erom"),
            sram: addr("_sram"),
            eram: addr("_eram"),
            sstack: addr("_sstack"),
            estack: addr("_estack"),
        }
    }

    /// Names of every required symbol that was not found.
    pub fn missing(&self) -> Vec<&'static str> {
        let present = [
            self.rom_length.is_some(),
            self.ram_length.is_some(),
            self.srom.is_some(),
            self.erom.is_some(),
            self.sram.is_some(),
            self.eram.is_some(),
            self.sstack.is_some(),
            self.estack.is_some(),
        ];
        REQUIRED
            .iter()
            .zip(present)
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Used flash, total flash budget.
    pub fn flash(&self) -> Option<(u32, u32)> {
        Some((self.erom? - self.srom?, self.rom_length?))
    }

    /// `stack_total = _estack - _sstack`.
    pub fn stack_total(&self) -> Option<u32> {
        Some(self.estack? - self.sstack?)
    }

    /// Used RAM (excluding the stack region), total RAM budget (excluding
    /// the stack region).
    pub fn sram(&self) -> Option<(u32, u32)> {
        let stack_region = self.stack_total()?;
        let used = (self.eram? - self.sram?) - stack_region;
        let total = self.ram_length? - stack_region;
        Some((used, total))
    }
}
