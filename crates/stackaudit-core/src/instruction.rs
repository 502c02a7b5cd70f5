//! Instruction stream.
//!
//! Parses `objdump --disassemble` text into a sorted array of
//! [`Instruction`] records. The disassembler emits one line per decoded
//! instruction, plus an occasional bare `...` line meaning "the previous
//! instruction repeats at every address up to the next listed one" — a
//! compact representation of padding fills the analyzer must expand.

/// A decoded operand. Anything that parses as an integer (any base,
/// including `0x...`) is stored as [`Operand::Immediate`]; everything else
/// is a bare token. Register operands are distinguished syntactically by
/// the caller that consumes them (the analyzer), not by this parser.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Operand {
    Register(String),
    Immediate(i64),
    Token(String),
    Absent,
}

impl Operand {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_end_matches(',');
        if trimmed.is_empty() {
            return Operand::Absent;
        }
        // Immediates are written `#<value>` in ARM/Thumb disassembly.
        if let Some(imm) = trimmed.strip_prefix('#') {
            if let Some(value) = parse_int(imm) {
                return Operand::Immediate(value);
            }
        }
        if let Some(value) = parse_int(trimmed) {
            return Operand::Immediate(value);
        }
        if is_register_name(trimmed) {
            return Operand::Register(trimmed.to_string());
        }
        Operand::Token(trimmed.to_string())
    }

    pub fn as_register(&self) -> Option<&str> {
        match self {
            Operand::Register(r) => Some(r.as_str()),
            _ => None,
        }
    }

    pub fn as_immediate(&self) -> Option<i64> {
        match self {
            Operand::Immediate(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_token(&self) -> Option<&str> {
        match self {
            Operand::Token(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Reinterprets this operand as a `bl`/`blx` branch target: objdump
    /// always prints these as bare hex (never `0x`-prefixed), often with a
    /// trailing `<symbol>` annotation (`100c <g>`), so the operand's
    /// generic immediate/token classification above cannot be trusted —
    /// a target with no hex letters parses as a base-10 `Immediate` and
    /// one with a letter parses as a `Token`. This mirrors the original
    /// script's explicit re-read of the branch operand as hex regardless
    /// of how it was generically typed (`int(str(inst.arg0), 16)`).
    pub fn as_branch_target(&self) -> Option<u32> {
        match self {
            Operand::Immediate(v) => u32::from_str_radix(&v.to_string(), 16).ok(),
            Operand::Token(t) => {
                let first = t.split_whitespace().next()?;
                let first = first
                    .strip_prefix("0x")
                    .or_else(|| first.strip_prefix("0X"))
                    .unwrap_or(first);
                u32::from_str_radix(first, 16).ok()
            }
            _ => None,
        }
    }
}

fn is_register_name(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    matches!(
        lower.as_str(),
        "r0" | "r1"
            | "r2"
            | "r3"
            | "r4"
            | "r5"
            | "r6"
            | "r7"
            | "r8"
            | "r9"
            | "r10"
            | "r11"
            | "r12"
            | "sp"
            | "lr"
            | "pc"
    )
}

static INT_TOKEN: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"^(-)?(0[xX][0-9a-fA-F]+|[0-9]+)$").unwrap());

fn parse_int(token: &str) -> Option<i64> {
    let caps = INT_TOKEN.captures(token)?;
    let neg = caps.get(1).is_some();
    let body = caps.get(2).unwrap().as_str();
    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        body.parse::<i64>().ok()?
    };
    Some(if neg { -value } else { value })
}

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Instruction {
    pub addr: u32,
    pub byte_len: u8,
    pub encoding: u32,
    pub mnemonic: String,
    pub arg0: Operand,
    pub arg1: Operand,
    pub arg2: Operand,
    pub repeated: bool,
}

impl Instruction {
    pub fn operand(&self, index: usize) -> &Operand {
        match index {
            0 => &self.arg0,
            1 => &self.arg1,
            2 => &self.arg2,
            _ => &Operand::Absent,
        }
    }
}

/// Parsed, address-sorted disassembly, with binary-search lookup.
#[derive(Debug, Default)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
}

impl InstructionStream {
    /// Parse `objdump --disassemble` text.
    ///
    /// Accepted line shape (whitespace-tolerant):
    /// `<addr>:\t<hex bytes>\t<mnemonic> <operands...>`
    /// A line consisting solely of `...` marks the previous instruction as
    /// `repeated`.
    pub fn parse(text: &str) -> Result<Self, crate::error::AnalysisError> {
        let mut instructions: Vec<Instruction> = Vec::new();

        for raw in text.lines() {
            let line = raw.trim_end();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "..." {
                if let Some(last) = instructions.last_mut() {
                    last.repeated = true;
                }
                continue;
            }

            let Some(colon_idx) = line.find(':') else {
                continue;
            };
            let addr_field = line[..colon_idx].trim();
            let Ok(addr) = u32::from_str_radix(addr_field.trim_start_matches("0x"), 16) else {
                continue;
            };

            let rest = line[colon_idx + 1..].trim_start();
            let mut parts = rest.splitn(2, '\t');
            let hex_bytes = parts.next().unwrap_or("").trim();
            let asm = parts.next().unwrap_or("").trim();
            if hex_bytes.is_empty() {
                continue;
            }

            let byte_tokens: Vec<&str> = hex_bytes.split_whitespace().collect();
            let byte_len = byte_tokens.len() as u8;
            if byte_len == 0 {
                continue;
            }
            let encoding = decode_little_endian(&byte_tokens);

            let mut asm_parts = asm.splitn(2, char::is_whitespace);
            let mnemonic = asm_parts.next().unwrap_or("").trim().to_string();
            let operand_str = asm_parts.next().unwrap_or("").trim();
            // Strip a trailing `; <comment>` (objdump annotates PC-relative
            // loads and branch targets this way); operands themselves never
            // contain `;`.
            let operand_str = operand_str.split(';').next().unwrap_or("").trim();

            let mut operands = split_operands(operand_str)
                .into_iter()
                .map(|s| Operand::parse(&s));

            let arg0 = operands.next().unwrap_or(Operand::Absent);
            let arg1 = operands.next().unwrap_or(Operand::Absent);
            let arg2 = operands.next().unwrap_or(Operand::Absent);

            instructions.push(Instruction {
                addr,
                byte_len,
                encoding,
                mnemonic,
                arg0,
                arg1,
                arg2,
                repeated: false,
            });
        }

        instructions.sort_by_key(|i| i.addr);
        Ok(Self { instructions })
    }

    /// Binary search for the first instruction at or after `addr`.
    pub fn index_at_or_after(&self, addr: u32) -> Option<usize> {
        match self.instructions.binary_search_by_key(&addr, |i| i.addr) {
            Ok(idx) => Some(idx),
            Err(idx) if idx < self.instructions.len() => Some(idx),
            Err(_) => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.instructions
    }
}

/// Split an operand string on top-level commas, treating `{...}` register
/// lists (as used by `push`/`pop`/`ldm`/`stm`) as a single operand.
fn split_operands(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '{' | '[' => {
                depth += 1;
                current.push(c);
            }
            '}' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                let trimmed = current.trim().to_string();
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        parts.push(trimmed);
    }
    parts
}

fn decode_little_endian(byte_tokens: &[&str]) -> u32 {
    let mut value: u32 = 0;
    for (i, tok) in byte_tokens.iter().enumerate().take(4) {
        if let Ok(b) = u8::from_str_radix(tok, 16) {
            value |= (b as u32) << (8 * i);
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_push_instruction() {
        let text = "1000:\tb5 10 \tpush\t{r4, lr}\n";
        let stream = InstructionStream::parse(text).unwrap();
        assert_eq!(stream.len(), 1);
        let ins = stream.get(0).unwrap();
        assert_eq!(ins.addr, 0x1000);
        assert_eq!(ins.byte_len, 2);
        assert_eq!(ins.mnemonic, "push");
        assert_eq!(ins.arg0, Operand::Token("{r4, lr}".to_string()));
        assert_eq!(ins.arg1, Operand::Absent);
    }

    #[test]
    fn push_register_list_stays_one_operand() {
        let text = "1000:\t00 00 00 00\tpush\t{r4, r5, r6, r7, lr}\n";
        let stream = InstructionStream::parse(text).unwrap();
        let ins = stream.get(0).unwrap();
        assert_eq!(ins.arg0, Operand::Token("{r4, r5, r6, r7, lr}".to_string()));
        assert_eq!(ins.arg1, Operand::Absent);
    }

    #[test]
    fn parses_sub_sp_immediate() {
        let text = "1002:\t85 b0\tsub\tsp, #0x14\n";
        let stream = InstructionStream::parse(text).unwrap();
        let ins = stream.get(0).unwrap();
        assert_eq!(ins.mnemonic, "sub");
        assert_eq!(ins.arg0, Operand::Register("sp".to_string()));
        assert_eq!(ins.arg1, Operand::Immediate(0x14));
    }

    #[test]
    fn repeated_marker_attaches_to_previous() {
        let text = "1000:\t00 bf\tnop\n...\n1010:\t00 bf\tnop\n";
        let stream = InstructionStream::parse(text).unwrap();
        assert_eq!(stream.len(), 2);
        assert!(stream.get(0).unwrap().repeated);
        assert!(!stream.get(1).unwrap().repeated);
    }

    #[test]
    fn encoding_is_byte_reversed() {
        let text = "2000:\t01 02 03 04\tnop\n";
        let stream = InstructionStream::parse(text).unwrap();
        assert_eq!(stream.get(0).unwrap().encoding, 0x0403_0201);
    }

    #[test]
    fn index_at_or_after_binary_searches() {
        let text = "1000:\t00 bf\tnop\n1010:\t00 bf\tnop\n1020:\t00 bf\tnop\n";
        let stream = InstructionStream::parse(text).unwrap();
        assert_eq!(stream.index_at_or_after(0x1000), Some(0));
        assert_eq!(stream.index_at_or_after(0x1005), Some(1));
        assert_eq!(stream.index_at_or_after(0x1020), Some(2));
        assert_eq!(stream.index_at_or_after(0x2000), None);
    }
}
