use loda_core::program::Program;

/// Renders a [`Program`] back to LODA assembly text.
///
/// This is the parser's collaborator on the other side of the round-trip:
/// `parse_program(&print_program(&p, opts)) == p` holds whenever `opts`
/// keeps comments (operation equality ignores them anyway, see
/// `Operation::eq`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintOptions {
    pub include_comments: bool,
}

pub fn print_program(program: &Program, opts: PrintOptions) -> String {
    let mut out = String::new();
    for op in &program.ops {
        if opts.include_comments {
            out.push_str(&op.to_string());
        } else {
            let meta = op.metadata();
            match meta.num_operands {
                0 => out.push_str(meta.short_name),
                1 => out.push_str(&format!("{} {}", meta.short_name, op.target)),
                _ => out.push_str(&format!("{} {},{}", meta.short_name, op.target, op.source)),
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    #[test]
    fn test_roundtrip_ignores_comments() {
        let source = "mov $1,$0 ; copy input\nlpb $0,1\nsub $0,1\nlpe\n";
        let program = parse_program(source).unwrap();
        let printed = print_program(&program, PrintOptions { include_comments: false });
        let reparsed = parse_program(&printed).unwrap();
        assert_eq!(program, reparsed);
    }

    #[test]
    fn test_with_comments_preserves_text() {
        let program = parse_program("mov $1,$0 ; copy\n").unwrap();
        let printed = print_program(&program, PrintOptions { include_comments: true });
        assert!(printed.contains("; copy"));
    }
}
