use loda_number::Number;

/// The three addressing modes an operand can take, per the instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OperandType {
    /// A literal value, used as-is.
    Constant,
    /// `$i` — the value stored in cell `i`.
    Direct,
    /// `$$i` — the value stored in the cell whose index is stored in cell `i`.
    Indirect,
}

/// One operand of an operation: its addressing mode plus a payload.
///
/// For `Direct`/`Indirect` the payload is a (non-negative) cell index; for
/// `Constant` it is the literal value itself. Both share the same `Number`
/// representation so a program can embed arbitrarily large literals (e.g. an
/// OEIS id passed to `seq`) without a separate index type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Operand {
    pub op_type: OperandType,
    pub value: Number,
}

impl Operand {
    pub fn constant<N: Into<Number>>(value: N) -> Self {
        Self {
            op_type: OperandType::Constant,
            value: value.into(),
        }
    }

    pub fn direct(cell: i64) -> Self {
        Self {
            op_type: OperandType::Direct,
            value: Number::from_i64(cell),
        }
    }

    pub fn indirect(cell: i64) -> Self {
        Self {
            op_type: OperandType::Indirect,
            value: Number::from_i64(cell),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.op_type == OperandType::Constant
    }

    pub fn is_indirect(&self) -> bool {
        self.op_type == OperandType::Indirect
    }
}

impl Default for Operand {
    /// The default operand, used for the unused slot of 0- and 1-arity
    /// operations (e.g. `nop`, `lpe`'s source).
    fn default() -> Self {
        Operand::constant(0)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.op_type {
            OperandType::Constant => write!(f, "{}", self.value),
            OperandType::Direct => write!(f, "${}", self.value),
            OperandType::Indirect => write!(f, "$${}", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Operand::constant(5).to_string(), "5");
        assert_eq!(Operand::direct(2).to_string(), "$2");
        assert_eq!(Operand::indirect(3).to_string(), "$$3");
    }
}
