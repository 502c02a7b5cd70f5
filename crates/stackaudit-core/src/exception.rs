//! Exception (vector) table resolver.
//!
//! Extracts handler addresses from the raw bytes of the Cortex-M vector
//! table, masks the Thumb bit out of each, drops nulls, and classifies
//! entries as reset / hardfault / other.

use crate::error::AnalysisError;
use crate::symbol::SymbolIndex;

const DEFAULT_ENTRY_COUNT: usize = 47;

/// Resolved exception-table entries (Thumb bit already cleared).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExceptionTable {
    pub reset: u32,
    pub hardfault: Option<u32>,
    pub others: Vec<u32>,
}

impl ExceptionTable {
    /// Parse the raw vector-table bytes. `exception_table_len` is the
    /// declared byte length of the `exception_table` linker symbol, if one
    /// was present in the symbol table (spec.md §4.5 policy 1); otherwise
    /// the table is truncated to `47 * 4` bytes (policy 2). A *declared*
    /// length of zero is not "absent" — it truncates the blob to nothing,
    /// which then fails the empty-table check below exactly as an empty
    /// `objcopy` capture would.
    pub fn parse(bytes: &[u8], symbols: &SymbolIndex) -> Result<Self, AnalysisError> {
        if bytes.is_empty() {
            return Err(AnalysisError::EmptyExceptionTable);
        }

        let byte_len = symbols
            .by_name("exception_table")
            .map(|s| (s.end - s.start) as usize)
            .unwrap_or(DEFAULT_ENTRY_COUNT * 4);

        let truncated = &bytes[..bytes.len().min(byte_len)];
        let words: Vec<u32> = truncated
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) & !1)
            .collect();

        if words.len() < 2 {
            return Err(AnalysisError::EmptyExceptionTable);
        }

        let reset = words[1];
        if reset == 0 {
            return Err(AnalysisError::NullResetVector);
        }

        let hardfault = words.get(3).copied().filter(|&v| v != 0);

        let mut others: Vec<u32> = Vec::new();
        if let Some(&nmi) = words.get(2) {
            if nmi != 0 {
                others.push(nmi);
            }
        }
        others.extend(words.iter().skip(4).copied().filter(|&v| v != 0));

        Ok(ExceptionTable {
            reset,
            hardfault,
            others,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn extracts_reset_hardfault_and_others() {
        let symbols = SymbolIndex::parse("").unwrap();
        let mut words = vec![0x2000_0000u32, 0x1001, 0x0, 0x1041, 0x1081, 0x0, 0x10c1];
        words.resize(47, 0);
        let bytes = words_to_bytes(&words);
        let table = ExceptionTable::parse(&bytes, &symbols).unwrap();
        assert_eq!(table.reset, 0x1000);
        assert_eq!(table.hardfault, Some(0x1040));
        assert_eq!(table.others, vec![0x1080, 0x10c0]);
    }

    #[test]
    fn masks_thumb_bit() {
        let symbols = SymbolIndex::parse("").unwrap();
        let mut words = vec![0u32, 0x1235, 0, 0];
        words.resize(47, 0);
        let bytes = words_to_bytes(&words);
        let table = ExceptionTable::parse(&bytes, &symbols).unwrap();
        assert_eq!(table.reset, 0x1234);
    }

    #[test]
    fn empty_bytes_is_fatal() {
        let symbols = SymbolIndex::parse("").unwrap();
        let err = ExceptionTable::parse(&[], &symbols).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyExceptionTable));
    }

    #[test]
    fn zero_reset_vector_is_fatal() {
        let symbols = SymbolIndex::parse("").unwrap();
        let mut words = vec![0u32, 0, 0, 0];
        words.resize(47, 0);
        let bytes = words_to_bytes(&words);
        let err = ExceptionTable::parse(&bytes, &symbols).unwrap_err();
        assert!(matches!(err, AnalysisError::NullResetVector));
    }

    #[test]
    fn truncates_to_declared_exception_table_symbol_length() {
        let symbols_text = "00001000 00000010 t exception_table\n";
        let symbols = SymbolIndex::parse(symbols_text).unwrap();
        // Declared length is 16 bytes (4 words); extra words beyond that
        // must be ignored even though they're present in the byte blob.
        let mut words = vec![0u32, 0x1001, 0x1041, 0x1081];
        words.push(0xdead_beef); // must be dropped
        let bytes = words_to_bytes(&words);
        let table = ExceptionTable::parse(&bytes, &symbols).unwrap();
        assert_eq!(table.reset, 0x1000);
        assert_eq!(table.hardfault, Some(0x1080));
        // NMI (index 2) is nonzero and counts as an "other" handler; the
        // 5th word (0xdeadbeef) was truncated away by the declared length.
        assert_eq!(table.others, vec![0x1040]);
    }

    #[test]
    fn zero_length_exception_table_symbol_is_fatal() {
        // A declared length of 0 is not the same as "no symbol at all": it
        // truncates the blob to nothing, which must fail the same way an
        // empty `objcopy` capture would, not silently fall back to the
        // default 47-entry count.
        let symbols_text = "00001000 00000000 t exception_table\n";
        let symbols = SymbolIndex::parse(symbols_text).unwrap();
        let mut words = vec![0u32, 0x1001, 0x1041, 0x1081];
        words.resize(47, 0);
        let bytes = words_to_bytes(&words);
        let err = ExceptionTable::parse(&bytes, &symbols).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyExceptionTable));
    }
}
