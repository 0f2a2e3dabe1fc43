use crate::operand::{Operand, OperandType};
use crate::operation::{Operation, OperationType};
use loda_common::{LodaError, LodaResult};

/// Conventional cell holding the sequence argument `n` on entry.
pub const INPUT_CELL: i64 = 0;
/// Conventional cell read for the result on exit.
pub const OUTPUT_CELL: i64 = 1;

/// An ordered list of operations.
///
/// A `Program` makes no claim about where it came from (parsed text,
/// constructed by hand, returned by a collaborator) — it only owns the
/// operation sequence and the structural queries the interpreter and
/// formula generator need: loop nesting, operand-kind counts, and which
/// cells are mentioned at all.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    pub ops: Vec<Operation>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Counts operations, optionally excluding `nop`s (which the interpreter
    /// and generator both treat as absent).
    pub fn num_ops(&self, with_nops: bool) -> usize {
        if with_nops {
            self.ops.len()
        } else {
            self.ops
                .iter()
                .filter(|op| op.op_type != OperationType::Nop)
                .count()
        }
    }

    /// Deletes every operation of the given type in place, returning how
    /// many were removed.
    pub fn remove_ops(&mut self, op_type: OperationType) -> usize {
        let before = self.ops.len();
        self.ops.retain(|op| op.op_type != op_type);
        before - self.ops.len()
    }

    /// Checks that every `lpb` has a matching `lpe` and loops are properly
    /// nested (no `lpe` without an open `lpb`, none left open at the end).
    pub fn check_well_formed(&self) -> LodaResult<()> {
        let mut depth: i64 = 0;
        for op in &self.ops {
            match op.op_type {
                OperationType::Lpb => depth += 1,
                OperationType::Lpe => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(LodaError::ParseError {
                            message: "lpe without matching lpb".to_string(),
                            location: loda_common::Location::default(),
                        });
                    }
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(LodaError::ParseError {
                message: "lpb without matching lpe".to_string(),
                location: loda_common::Location::default(),
            });
        }
        Ok(())
    }

    /// Whether any operand (of either kind) addresses a cell indirectly.
    pub fn has_indirect_operand(&self) -> bool {
        self.ops.iter().any(|op| op.target.is_indirect() || op.source.is_indirect())
    }

    /// The largest direct cell index mentioned anywhere in the program, or
    /// `None` for an empty program. Used to size dense memory up front.
    pub fn largest_direct_cell(&self) -> Option<i64> {
        let mut largest: Option<i64> = None;
        for op in &self.ops {
            for operand in [&op.target, &op.source] {
                if operand.op_type == OperandType::Direct {
                    if let Ok(index) = operand.value.as_int() {
                        largest = Some(largest.map_or(index, |l: i64| l.max(index)));
                    }
                }
            }
        }
        largest
    }

    /// Returns the index, within `ops`, of the `lpe` that closes the `lpb`
    /// at `lpb_index`.
    pub fn matching_lpe(&self, lpb_index: usize) -> Option<usize> {
        let mut depth = 0i64;
        for (i, op) in self.ops.iter().enumerate().skip(lpb_index) {
            match op.op_type {
                OperationType::Lpb => depth += 1,
                OperationType::Lpe => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for op in &self.ops {
            writeln!(f, "{op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(t: OperationType, target: i64, source: i64) -> Operation {
        Operation::new(t, Operand::direct(target), Operand::constant(source))
    }

    #[test]
    fn test_well_formed_accepts_balanced_loop() {
        let mut p = Program::new();
        p.push(op(OperationType::Lpb, 0, 1));
        p.push(op(OperationType::Sub, 0, 1));
        p.push(Operation::new(OperationType::Lpe, Operand::default(), Operand::default()));
        assert!(p.check_well_formed().is_ok());
    }

    #[test]
    fn test_well_formed_rejects_unbalanced() {
        let mut p = Program::new();
        p.push(op(OperationType::Lpb, 0, 1));
        assert!(p.check_well_formed().is_err());
    }

    #[test]
    fn test_num_ops_excludes_nops() {
        let mut p = Program::new();
        p.push(op(OperationType::Mov, 1, 0));
        p.push(Operation::new(OperationType::Nop, Operand::default(), Operand::default()));
        assert_eq!(p.num_ops(true), 2);
        assert_eq!(p.num_ops(false), 1);
    }

    #[test]
    fn test_largest_direct_cell() {
        let mut p = Program::new();
        p.push(Operation::new(OperationType::Mov, Operand::direct(3), Operand::direct(1)));
        assert_eq!(p.largest_direct_cell(), Some(3));
    }

    #[test]
    fn test_matching_lpe_nested() {
        let mut p = Program::new();
        p.push(op(OperationType::Lpb, 0, 1)); // 0
        p.push(op(OperationType::Lpb, 1, 1)); // 1
        p.push(Operation::new(OperationType::Lpe, Operand::default(), Operand::default())); // 2
        p.push(Operation::new(OperationType::Lpe, Operand::default(), Operand::default())); // 3
        assert_eq!(p.matching_lpe(0), Some(3));
        assert_eq!(p.matching_lpe(1), Some(2));
    }
}
