use loda_common::{LodaError, LodaResult, Location};
use loda_core::operand::{Operand, OperandType};
use loda_core::operation::{metadata_by_short_name, Operation};
use loda_core::program::Program;
use loda_number::Number;

/// Parses LODA assembly source into a [`Program`].
///
/// The grammar is one instruction per line: a mnemonic, an optional
/// comma-separated operand list, and an optional `; comment` trailing the
/// line. A comment-only line is skipped rather than producing a `nop` —
/// write an explicit `nop` if a no-op instruction is intended. A truly
/// blank line (no body, no comment) terminates the program, per spec: any
/// source after it is ignored.
pub struct Parser<'a> {
    source: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    pub fn parse(self) -> LodaResult<Program> {
        let mut program = Program::new();
        for (i, raw_line) in self.source.lines().enumerate() {
            if raw_line.trim().is_empty() {
                break;
            }
            let line_no = (i + 1) as u32;
            if let Some(op) = parse_line(raw_line, line_no)? {
                program.push(op);
            }
        }
        program.check_well_formed()?;
        Ok(program)
    }
}

/// Convenience entry point equivalent to `Parser::new(source).parse()`.
pub fn parse_program(source: &str) -> LodaResult<Program> {
    Parser::new(source).parse()
}

fn parse_line(raw_line: &str, line_no: u32) -> LodaResult<Option<Operation>> {
    let (body, comment) = split_comment(raw_line);
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }

    let mut parts = body.splitn(2, char::is_whitespace);
    let mnemonic = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim();

    let meta = metadata_by_short_name(mnemonic).ok_or_else(|| LodaError::ParseError {
        message: format!("unknown instruction '{mnemonic}'"),
        location: Location::new(line_no),
    })?;

    let operands: Vec<&str> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(',').map(str::trim).collect()
    };

    // `lpb` is the one mnemonic with an optional second operand: `lpb $t`
    // defaults the window length `k` to 1, per spec §6.
    let arity_ok = if meta.op_type == loda_core::operation::OperationType::Lpb {
        operands.len() == 1 || operands.len() == 2
    } else {
        operands.len() == meta.num_operands as usize
    };
    if !arity_ok {
        return Err(LodaError::ParseError {
            message: format!(
                "'{mnemonic}' takes {} operand(s), found {}",
                meta.num_operands,
                operands.len()
            ),
            location: Location::new(line_no),
        });
    }

    let target = operands
        .first()
        .map(|&text| parse_operand(text, line_no))
        .transpose()?
        .unwrap_or_default();
    let source = match operands.get(1) {
        Some(&text) => parse_operand(text, line_no)?,
        None if meta.op_type == loda_core::operation::OperationType::Lpb => Operand::constant(1),
        None => Operand::default(),
    };

    let mut op = Operation::new(meta.op_type, target, source);
    if let Some(comment) = comment {
        op = op.with_comment(comment);
    }
    Ok(Some(op))
}

fn split_comment(line: &str) -> (&str, Option<String>) {
    match line.split_once(';') {
        Some((body, comment)) => (body, Some(comment.trim().to_string())),
        None => (line, None),
    }
}

fn parse_operand(text: &str, line_no: u32) -> LodaResult<Operand> {
    let bad = |message: String| LodaError::ParseError {
        message,
        location: Location::new(line_no),
    };

    if let Some(rest) = text.strip_prefix("$$") {
        let value: Number = rest
            .parse()
            .map_err(|_| bad(format!("invalid indirect cell index '{text}'")))?;
        return Ok(Operand {
            op_type: OperandType::Indirect,
            value,
        });
    }
    if let Some(rest) = text.strip_prefix('$') {
        let value: Number = rest
            .parse()
            .map_err(|_| bad(format!("invalid direct cell index '{text}'")))?;
        return Ok(Operand {
            op_type: OperandType::Direct,
            value,
        });
    }
    let value: Number = text
        .parse()
        .map_err(|_| bad(format!("invalid constant '{text}'")))?;
    Ok(Operand::constant(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loda_core::operation::OperationType;

    #[test]
    fn test_parses_identity_program() {
        let program = parse_program("mov $1,$0\n").unwrap();
        assert_eq!(program.len(), 1);
        assert_eq!(program.ops[0].op_type, OperationType::Mov);
    }

    #[test]
    fn test_skips_comment_only_lines() {
        let program = parse_program("; a header comment\nmov $1,$0\n").unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn test_blank_line_terminates_program() {
        let program = parse_program("mov $1,$0\n\nadd $1,1\n").unwrap();
        assert_eq!(program.len(), 1);
        assert_eq!(program.ops[0].op_type, OperationType::Mov);
    }

    #[test]
    fn test_trailing_comment_is_kept() {
        let program = parse_program("mov $1,$0 ; copy input to output\n").unwrap();
        assert_eq!(program.ops[0].comment, "copy input to output");
    }

    #[test]
    fn test_rejects_unknown_mnemonic() {
        assert!(parse_program("frobnicate $0,$1\n").is_err());
    }

    #[test]
    fn test_rejects_wrong_arity() {
        assert!(parse_program("mov $1\n").is_err());
    }

    #[test]
    fn test_rejects_unbalanced_loop() {
        assert!(parse_program("lpb $0,1\nadd $1,1\n").is_err());
    }

    #[test]
    fn test_parses_loop_and_indirect_and_constant() {
        let program = parse_program("lpb $0,1\nmov $$1,5\nsub $0,1\nlpe\n").unwrap();
        assert_eq!(program.len(), 4);
        assert_eq!(program.ops[1].op_type, OperationType::Mov);
        assert!(program.ops[1].target.is_indirect());
    }

    #[test]
    fn test_lpb_without_explicit_window_defaults_to_one() {
        let program = parse_program("lpb $0\nsub $0,1\nlpe\n").unwrap();
        assert_eq!(program.ops[0].source, Operand::constant(1));
    }
}
