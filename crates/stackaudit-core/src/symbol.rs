//! Symbol table model.
//!
//! Parses the `nm -n --print-size --special-syms` style listing into a
//! canonical set of `(start, end, name)` records, applies the zero-length
//! tag overwrite policy, and trims function extents so that embedded
//! literal pools (`$d` markers) are excluded from the instruction range a
//! caller will walk.

use std::collections::BTreeMap;

/// A single resolved symbol-table entry.
///
/// `end >= start` always holds once construction is complete; names
/// beginning with `$d` denote the start of an embedded literal pool and are
/// never treated as callable functions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Symbol {
    pub start: u32,
    pub end: u32,
    pub name: String,
    pub kind: SymbolKind,
}

/// The single-letter `nm` type column, narrowed to the distinction the
/// analyzer actually cares about: is this text (code) or something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SymbolKind {
    Text,
    Other(char),
}

impl SymbolKind {
    fn from_char(c: char) -> Self {
        match c {
            't' | 'T' => SymbolKind::Text,
            other => SymbolKind::Other(other),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, SymbolKind::Text)
    }
}

fn is_data_marker(name: &str) -> bool {
    name.starts_with("$d")
}

/// A name/address/size record exposed by [`SymbolIndex::by_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedSymbol {
    pub start: u32,
    pub end: u32,
}

/// The canonical view over a parsed symbol table: lookup by start address
/// (function resolution) and lookup by name (linker budget symbols).
#[derive(Debug, Default)]
pub struct SymbolIndex {
    by_start: BTreeMap<u32, Symbol>,
    by_start_fn: BTreeMap<u32, Symbol>,
    by_name: BTreeMap<String, NamedSymbol>,
}

impl SymbolIndex {
    /// Parse an `nm`-style text listing.
    ///
    /// Each line is `<hex_addr> <hex_size> <type_letter> <name>`; lines
    /// missing the size field (GNU `nm` omits it for zero-size linker
    /// symbols) are normalized to size `0` before parsing. Malformed lines
    /// fail fast.
    pub fn parse(text: &str) -> Result<Self, crate::error::AnalysisError> {
        let mut symbols = Vec::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let raw_fields: Vec<&str> = line.split_whitespace().collect();
            // Missing size column: `<addr> <type> <name...>` -> insert "0".
            let fields: Vec<&str> = if raw_fields.len() >= 4 {
                raw_fields
            } else if raw_fields.len() == 3 {
                vec![raw_fields[0], "0", raw_fields[1], raw_fields[2]]
            } else {
                return Err(crate::error::AnalysisError::MalformedSymbolLine {
                    line: lineno + 1,
                    text: raw.to_string(),
                });
            };

            let addr = u32::from_str_radix(fields[0], 16).map_err(|_| {
                crate::error::AnalysisError::MalformedSymbolLine {
                    line: lineno + 1,
                    text: raw.to_string(),
                }
            })?;
            let size = u32::from_str_radix(fields[1], 16).map_err(|_| {
                crate::error::AnalysisError::MalformedSymbolLine {
                    line: lineno + 1,
                    text: raw.to_string(),
                }
            })?;
            let type_char = fields[2].chars().next().ok_or_else(|| {
                crate::error::AnalysisError::MalformedSymbolLine {
                    line: lineno + 1,
                    text: raw.to_string(),
                }
            })?;
            let name = fields[3..].join(" ");

            symbols.push(Symbol {
                start: addr,
                end: addr + size,
                name,
                kind: SymbolKind::from_char(type_char),
            });
        }

        Ok(Self::from_symbols(symbols))
    }

    fn from_symbols(mut symbols: Vec<Symbol>) -> Self {
        // Data-section trimming: for every `$d` marker, shorten the
        // enclosing function symbol so instructions at or beyond the
        // marker are not considered part of it. Must run before indexing.
        let markers: Vec<u32> = symbols
            .iter()
            .filter(|s| is_data_marker(&s.name))
            .map(|s| s.start)
            .collect();

        for marker in markers {
            for sym in symbols.iter_mut() {
                if sym.kind.is_text()
                    && !is_data_marker(&sym.name)
                    && sym.start <= marker
                    && marker < sym.end
                {
                    sym.end = marker;
                }
            }
        }

        let mut by_start: BTreeMap<u32, Symbol> = BTreeMap::new();
        let mut by_start_fn: BTreeMap<u32, Symbol> = BTreeMap::new();
        let mut by_name: BTreeMap<String, NamedSymbol> = BTreeMap::new();

        for sym in symbols {
            by_name.insert(
                sym.name.clone(),
                NamedSymbol {
                    start: sym.start,
                    end: sym.end,
                },
            );

            // The function-lookup index (§4.1 "only entries with type = t
            // participate in function lookups") is built from text symbols
            // only, independent of the overwrite policy below: a
            // coincidentally-zero-length linker tag must never make a real
            // function unreachable by address.
            if sym.kind.is_text() {
                by_start_fn.entry(sym.start).or_insert_with(|| sym.clone());
            }

            // Zero-length tag policy: when two symbols share a start
            // address and one has zero length, the zero-length tag wins
            // the start-address index slot.
            match by_start.get(&sym.start) {
                Some(existing) if existing.end > existing.start && sym.end == sym.start => {
                    by_start.insert(sym.start, sym);
                }
                Some(existing) if existing.end == existing.start && sym.end > sym.start => {
                    // existing zero-length tag keeps precedence; skip.
                    let _ = existing;
                }
                _ => {
                    by_start.insert(sym.start, sym);
                }
            }
        }

        Self {
            by_start,
            by_start_fn,
            by_name,
        }
    }

    /// Look up the symbol whose start address equals `addr`, whatever its
    /// kind. This is the raw overwrite-policy index (§4.1): a zero-length
    /// linker tag sharing a start address with a real function occupies
    /// this slot in preference to the function.
    pub fn by_start(&self, addr: u32) -> Option<&Symbol> {
        self.by_start.get(&addr)
    }

    /// Look up the *function* whose start address equals `addr`. Unlike
    /// [`Self::by_start`], this never returns, nor is shadowed by, a
    /// non-text symbol: spec.md §4.1 "only entries with type = t (text)
    /// participate in function lookups", so a zero-length linker tag
    /// occupying the same start address as a real function (§4.1's
    /// `_srom`/first-function overlap case) must not make that function
    /// unreachable by address here.
    pub fn function_at_start(&self, addr: u32) -> Option<&Symbol> {
        self.by_start_fn.get(&addr)
    }

    /// Look up a symbol (function or linker tag) by name.
    pub fn by_name(&self, name: &str) -> Option<NamedSymbol> {
        self.by_name.get(name).copied()
    }

    /// All text (function) symbols, ordered by start address.
    pub fn functions(&self) -> impl Iterator<Item = &Symbol> {
        self.by_start_fn.values()
    }

    /// `true` iff a *function* (text symbol) starts at `addr` — see
    /// [`Self::function_at_start`].
    pub fn is_function_start(&self, addr: u32) -> bool {
        self.function_at_start(addr).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_listing() {
        let text = "\
00001000 00000008 t f
00001008 00000010 t g
";
        let idx = SymbolIndex::parse(text).unwrap();
        let f = idx.by_start(0x1000).unwrap();
        assert_eq!(f.name, "f");
        assert_eq!(f.end, 0x1008);
        let g = idx.by_start(0x1008).unwrap();
        assert_eq!(g.end, 0x1018);
    }

    #[test]
    fn normalizes_missing_size_field() {
        let text = "00002000 t ROM_LENGTH\n";
        let idx = SymbolIndex::parse(text).unwrap();
        let sym = idx.by_name("ROM_LENGTH").unwrap();
        assert_eq!(sym.start, 0x2000);
        assert_eq!(sym.end, 0x2000);
    }

    #[test]
    fn zero_length_tag_wins_start_index() {
        // _srom (zero length) at the same address as the first real
        // function: the zero-length tag should occupy the start index.
        let text = "\
00001000 00000000 t _srom
00001000 00000010 t first_fn
";
        let idx = SymbolIndex::parse(text).unwrap();
        let at_start = idx.by_start(0x1000).unwrap();
        assert_eq!(at_start.name, "_srom");
        // Both names remain reachable via the name index.
        assert_eq!(idx.by_name("first_fn").unwrap().start, 0x1000);
    }

    #[test]
    fn non_text_tag_does_not_shadow_function_lookup() {
        // A linker symbol of non-text type (the usual `nm` type for a
        // `.` assignment like `_srom = .;`) shares a start address with a
        // real function. `by_start` (the raw overwrite-policy index) picks
        // the zero-length tag, but `function_at_start` must still resolve
        // to the actual function: spec.md §4.1 "only entries with type = t
        // (text) participate in function lookups".
        let text = "\
00001000 00000000 A _srom
00001000 00000010 t first_fn
";
        let idx = SymbolIndex::parse(text).unwrap();
        assert_eq!(idx.by_start(0x1000).unwrap().name, "_srom");
        let f = idx.function_at_start(0x1000).unwrap();
        assert_eq!(f.name, "first_fn");
        assert!(idx.is_function_start(0x1000));
    }

    #[test]
    fn data_marker_trims_enclosing_function() {
        let text = "\
00001000 00000020 t f
00001010 00000000 t $d
";
        let idx = SymbolIndex::parse(text).unwrap();
        let f = idx.by_start(0x1000).unwrap();
        assert_eq!(f.end, 0x1010);
    }

    #[test]
    fn data_marker_at_function_start_trims_to_zero_width() {
        // The interval is half-open [start, end): a marker sitting exactly
        // at a function's own start address is still within it, so the
        // function must trim to zero width rather than keep its declared
        // size.
        let text = "\
00001000 00000010 t f
00001000 00000000 t $d
";
        let idx = SymbolIndex::parse(text).unwrap();
        let f = idx.function_at_start(0x1000).unwrap();
        assert_eq!(f.end, 0x1000);
    }

    #[test]
    fn malformed_line_fails_fast() {
        let text = "not a valid line at all\n";
        assert!(SymbolIndex::parse(text).is_err());
    }
}
