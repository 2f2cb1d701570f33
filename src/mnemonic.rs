//! A single architectural instruction: its source byte range, opcode text,
//! operand formatting, operand values and lifted IL body.

use std::fmt;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::instruction::Instruction;
use crate::value::Value;

/// One token of a mnemonic's textual format string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormatToken {
    /// Literal text, reproduced verbatim.
    Literal(String),
    /// A placeholder standing in for one of the mnemonic's `operands`, with
    /// an optional explicit width/signedness/alias used when rendering.
    Placeholder {
        /// Index into the mnemonic's `operands` list.
        index: usize,
        /// Bit width to render the operand at, if different from the
        /// operand's own width.
        width: Option<u16>,
        /// Render as a signed quantity.
        signed: bool,
        /// Alternate name to print instead of the operand's own value
        /// (e.g. a register alias).
        alias: Option<String>,
    },
}

/// One architectural instruction.
///
/// `area` must be non-empty and lie inside the source region. `instructions`
/// is the IL body produced by lifting this mnemonic; it may be empty for a
/// mnemonic with no observable effect (e.g. a target-specific `nop`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mnemonic {
    /// Byte range `[lo, hi)` in the source region this mnemonic decodes.
    pub area: Range<u64>,
    /// Opcode mnemonic text, e.g. `"add"`.
    pub opcode: String,
    /// Format string, interleaving literal text with operand placeholders.
    pub format: Vec<FormatToken>,
    /// Operand values, in the order referenced by `format`.
    pub operands: Vec<Value>,
    /// The IL instructions this mnemonic lifts to.
    pub instructions: Vec<Instruction>,
}

impl Mnemonic {
    /// Construct a mnemonic, validating that `area` is non-empty.
    ///
    /// # Errors
    /// Returns [`Error::Value`] if `area` is empty (`lo >= hi`).
    pub fn new(
        area: Range<u64>,
        opcode: impl Into<String>,
        format: Vec<FormatToken>,
        operands: Vec<Value>,
        instructions: Vec<Instruction>,
    ) -> Result<Mnemonic> {
        if area.start >= area.end {
            return Err(Error::Value(format!(
                "mnemonic area {:?} must be non-empty",
                area
            )));
        }
        Ok(Mnemonic {
            area,
            opcode: opcode.into(),
            format,
            operands,
            instructions,
        })
    }

    /// A synthetic mnemonic holding only φ-instructions, inserted at the
    /// head of a basic block by SSA construction. Its `area` collapses to
    /// the block's starting address (zero-width internally, but recorded
    /// here as a one-unit span so the non-empty-area invariant still holds
    /// for bookkeeping purposes such as reverse post-order display).
    pub fn internal_phis(at: u64, instructions: Vec<Instruction>) -> Mnemonic {
        Mnemonic {
            area: at..(at + 1),
            opcode: "internal-phis".to_string(),
            format: vec![],
            operands: vec![],
            instructions,
        }
    }

    /// `true` if this is a synthetic φ-holding mnemonic.
    pub fn is_internal_phis(&self) -> bool {
        self.opcode == "internal-phis"
    }

    /// `true` if any IL instruction in this mnemonic computes a `Call`.
    pub fn is_call(&self) -> bool {
        self.instructions
            .iter()
            .any(|i| matches!(i.op, crate::operator::Operator::Call(_)))
    }

    /// Render `format` against `operands` into display text, substituting
    /// each placeholder for its operand (or alias, if set).
    pub fn display_text(&self) -> String {
        let mut out = String::new();
        for token in &self.format {
            match token {
                FormatToken::Literal(text) => out.push_str(text),
                FormatToken::Placeholder {
                    index,
                    alias,
                    signed,
                    width,
                } => {
                    if let Some(alias) = alias {
                        out.push_str(alias);
                        continue;
                    }
                    match self.operands.get(*index) {
                        Some(Value::Constant { content, .. }) => {
                            let rendered = if *signed {
                                let w = width.unwrap_or(64).min(64);
                                let shift = 64 - w as u32;
                                let signed_val =
                                    ((*content << shift) as i64) >> shift;
                                format!("{}", signed_val)
                            } else {
                                format!("{:#x}", content)
                            };
                            out.push_str(&rendered);
                        }
                        Some(other) => out.push_str(&other.to_string()),
                        None => out.push_str("?"),
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {}", self.area.start, self.display_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_area() {
        assert!(Mnemonic::new(4..4, "nop", vec![], vec![], vec![]).is_err());
    }

    #[test]
    fn display_text_substitutes_operand() {
        let operand = Value::constant(0x10, 16).unwrap();
        let m = Mnemonic::new(
            0..2,
            "li",
            vec![
                FormatToken::Literal("li r0, ".to_string()),
                FormatToken::Placeholder {
                    index: 0,
                    width: None,
                    signed: false,
                    alias: None,
                },
            ],
            vec![operand],
            vec![],
        )
        .unwrap();
        assert_eq!(m.display_text(), "li r0, 0x10");
    }

    #[test]
    fn internal_phis_recognized() {
        let m = Mnemonic::internal_phis(0x10, vec![]);
        assert!(m.is_internal_phis());
    }
}
