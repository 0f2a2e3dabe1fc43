use crate::operand::Operand;

/// The instruction set. `Fac` has no entry in spec §6's table — it is
/// carried over from the original arithmetic core (see `program.hpp`) and
/// accepted by the parser/printer/interpreter, but the formula generator has
/// no rewrite rule for it and always treats it as a rejection point, exactly
/// like the original's `update()` switch falling through to its default case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OperationType {
    Nop,
    Mov,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Fac,
    Gcd,
    Bin,
    Min,
    Max,
    Trn,
    Seq,
    Lpb,
    Lpe,
    Clr,
    Dbg,
}

impl OperationType {
    pub const ALL: &'static [OperationType] = &[
        OperationType::Nop,
        OperationType::Mov,
        OperationType::Add,
        OperationType::Sub,
        OperationType::Mul,
        OperationType::Div,
        OperationType::Mod,
        OperationType::Pow,
        OperationType::Fac,
        OperationType::Gcd,
        OperationType::Bin,
        OperationType::Min,
        OperationType::Max,
        OperationType::Trn,
        OperationType::Seq,
        OperationType::Lpb,
        OperationType::Lpe,
        OperationType::Clr,
        OperationType::Dbg,
    ];

    pub fn metadata(self) -> &'static Metadata {
        metadata_for(self)
    }

    pub fn short_name(self) -> &'static str {
        self.metadata().short_name
    }
}

/// Per-operation facts consumed by the parser (short name -> type), the
/// printer (type -> short name), the interpreter (arity / does-it-read-its-
/// target), and ultimately the external program generator (`is_public`,
/// `rate`, neither consulted anywhere in this crate). Modeled directly on
/// `Operation::Metadata` in `program.hpp`.
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    pub op_type: OperationType,
    pub short_name: &'static str,
    pub num_operands: u8,
    /// Whether the generator may emit this operation on its own. `Lpe` is
    /// excluded: it is always inserted automatically as `Lpb`'s partner,
    /// never chosen independently.
    pub is_public: bool,
    /// Whether evaluating the operation reads the current value of its
    /// target cell before overwriting it (e.g. `add $t,$s` computes
    /// `$t + $s`, so it reads `$t` first; `mov $t,$s` does not).
    pub reads_target_before_write: bool,
    /// Relative emission frequency used by the external generator; unused
    /// by anything in this crate.
    pub rate: f64,
}

macro_rules! meta {
    ($op:ident, $short:literal, $arity:literal, $public:literal, $reads:literal, $rate:literal) => {
        Metadata {
            op_type: OperationType::$op,
            short_name: $short,
            num_operands: $arity,
            is_public: $public,
            reads_target_before_write: $reads,
            rate: $rate,
        }
    };
}

const TABLE: &[Metadata] = &[
    meta!(Nop, "nop", 0, true, false, 1.0),
    meta!(Mov, "mov", 2, true, false, 60.0),
    meta!(Add, "add", 2, true, true, 40.0),
    meta!(Sub, "sub", 2, true, true, 20.0),
    meta!(Mul, "mul", 2, true, true, 20.0),
    meta!(Div, "div", 2, true, true, 10.0),
    meta!(Mod, "mod", 2, true, true, 5.0),
    meta!(Pow, "pow", 2, true, true, 5.0),
    meta!(Fac, "fac", 1, true, true, 2.0),
    meta!(Gcd, "gcd", 2, true, true, 3.0),
    meta!(Bin, "bin", 2, true, true, 3.0),
    meta!(Min, "min", 2, true, true, 3.0),
    meta!(Max, "max", 2, true, true, 3.0),
    meta!(Trn, "trn", 2, true, true, 3.0),
    meta!(Seq, "seq", 2, true, true, 2.0),
    meta!(Lpb, "lpb", 2, true, true, 10.0),
    meta!(Lpe, "lpe", 0, false, false, 0.0),
    meta!(Clr, "clr", 2, true, false, 3.0),
    meta!(Dbg, "dbg", 0, true, false, 1.0),
];

fn metadata_for(op_type: OperationType) -> &'static Metadata {
    TABLE
        .iter()
        .find(|m| m.op_type == op_type)
        .expect("every OperationType has a table entry")
}

pub fn metadata_by_short_name(name: &str) -> Option<&'static Metadata> {
    TABLE.iter().find(|m| m.short_name == name)
}

/// One instruction: an operation type plus its target/source operands.
///
/// Equality deliberately ignores `comment`, mirroring the original's
/// `Operation::operator==`, so that e.g. parsing two programs that differ
/// only in inline commentary still compares equal.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Operation {
    pub op_type: OperationType,
    pub target: Operand,
    pub source: Operand,
    pub comment: String,
}

impl Operation {
    pub fn new(op_type: OperationType, target: Operand, source: Operand) -> Self {
        Self {
            op_type,
            target,
            source,
            comment: String::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn metadata(&self) -> &'static Metadata {
        metadata_for(self.op_type)
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.op_type == other.op_type && self.target == other.target && self.source == other.source
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meta = self.metadata();
        match meta.num_operands {
            0 => write!(f, "{}", meta.short_name)?,
            1 => write!(f, "{} {}", meta.short_name, self.target)?,
            _ => write!(f, "{} {},{}", meta.short_name, self.target, self.source)?,
        }
        if !self.comment.is_empty() {
            write!(f, " ; {}", self.comment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_metadata() {
        for op_type in OperationType::ALL {
            assert_eq!(op_type.metadata().op_type, *op_type);
        }
    }

    #[test]
    fn test_lookup_by_short_name() {
        assert_eq!(metadata_by_short_name("lpb").unwrap().op_type, OperationType::Lpb);
        assert!(metadata_by_short_name("nope").is_none());
    }

    #[test]
    fn test_equality_ignores_comment() {
        let a = Operation::new(OperationType::Mov, Operand::direct(1), Operand::direct(0));
        let b = a.clone().with_comment("copy input");
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_arity() {
        let nop = Operation::new(OperationType::Nop, Operand::default(), Operand::default());
        assert_eq!(nop.to_string(), "nop");
        let fac = Operation::new(OperationType::Fac, Operand::direct(0), Operand::default());
        assert_eq!(fac.to_string(), "fac $0");
        let add = Operation::new(OperationType::Add, Operand::direct(1), Operand::constant(2));
        assert_eq!(add.to_string(), "add $1,2");
    }
}
