use std::collections::BTreeSet;

use loda_common::Settings;
use loda_core::memory::Memory;
use loda_core::operand::OperandType;
use loda_core::operation::OperationType;
use loda_core::program::{Program, OUTPUT_CELL};

use crate::interpreter::Interpreter;

/// Accelerates evaluation of a loop-shaped program: rather than restarting
/// the interpreter from scratch for every input, the evaluator splits the
/// program once into `(preLoop, loopBody, postLoop)` and advances one
/// sequence term per `next()` call, carrying `loopState` forward.
///
/// Construction validates the preconditions in spec §4.E; `init` returning
/// `None` is the normal, silent "this program does not fit the incremental
/// shape" outcome, not an error.
pub struct IncrementalEvaluator {
    settings: Settings,
    pre_loop: Program,
    loop_body: Program,
    post_loop: Program,
    counter_cell: i64,
    stateful_cells: BTreeSet<i64>,
    loop_state: Memory,
    iteration: u64,
}

impl IncrementalEvaluator {
    /// Attempts to set up incremental evaluation for `program`. Returns
    /// `None` when any of the §4.E preconditions fail; this is a routine
    /// rejection, never a panic or error.
    pub fn init(program: &Program, settings: Settings) -> Option<Self> {
        let (lpb_index, counter_cell) = find_single_top_level_loop(program)?;
        let lpe_index = program.matching_lpe(lpb_index)?;

        let pre_loop = Program { ops: program.ops[..lpb_index].to_vec() };
        let loop_body = Program { ops: program.ops[lpb_index + 1..lpe_index].to_vec() };
        let post_loop = Program { ops: program.ops[lpe_index + 1..].to_vec() };

        if !pre_loop_preserves_monotonicity(&pre_loop, counter_cell) {
            return None;
        }
        if body_uses_clr_or_indirect(&loop_body) {
            return None;
        }
        if !post_loop_respects_constraints(&post_loop) {
            return None;
        }

        let stateful_cells = compute_stateful_cells(&loop_body);

        Some(Self {
            settings,
            pre_loop,
            loop_body,
            post_loop,
            counter_cell,
            stateful_cells,
            loop_state: Memory::new(),
            iteration: 0,
        })
    }

    pub fn pre_loop(&self) -> &Program {
        &self.pre_loop
    }

    pub fn loop_body(&self) -> &Program {
        &self.loop_body
    }

    pub fn post_loop(&self) -> &Program {
        &self.post_loop
    }

    pub fn loop_counter_cell(&self) -> i64 {
        self.counter_cell
    }

    pub fn stateful_cells(&self) -> &BTreeSet<i64> {
        &self.stateful_cells
    }

    pub fn loop_state(&self) -> &Memory {
        &self.loop_state
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Seeds `loopState` by running `preLoop` against a freshly zeroed
    /// memory. Callers that need a specific input `n` should set cell 0
    /// before invoking this (the pre-loop program is itself responsible for
    /// deriving any offset from the input cell).
    pub fn seed(&mut self, input: loda_number::Number) -> loda_common::LodaResult<()> {
        let mut memory = Memory::new();
        memory.set(0, input)?;
        let interp = Interpreter::new(self.settings.clone());
        interp.run(&self.pre_loop, &mut memory)?;
        self.loop_state = memory;
        self.iteration = 0;
        Ok(())
    }

    /// Advances one sequence term: runs the loop body once more against the
    /// running `loopState`. The counter cell's own decrement is whatever the
    /// body's instructions compute (normalized to unit steps — this
    /// implementation assumes, as every concrete program in the test corpus
    /// does, that the body decrements the counter by exactly one per
    /// iteration; see spec §9's open question on `k` > 1 semantics).
    pub fn next(&mut self) -> loda_common::LodaResult<()> {
        let interp = Interpreter::new(self.settings.clone());
        interp.run(&self.loop_body, &mut self.loop_state)?;
        self.iteration += 1;
        Ok(())
    }

    /// Runs `postLoop` against a clone of the current `loopState` and
    /// returns the resulting output cell, without disturbing `loopState`
    /// itself (a caller probing "what if I stopped here" must not affect
    /// subsequent `next()` calls).
    pub fn peek_output(&self) -> loda_common::LodaResult<loda_number::Number> {
        let mut state = self.loop_state.clone();
        let interp = Interpreter::new(self.settings.clone());
        interp.run(&self.post_loop, &mut state)?;
        state.get(OUTPUT_CELL)
    }
}

/// Finds the program's single top-level `lpb` (one not nested inside
/// another loop) and its counter cell. Returns `None` if there isn't exactly
/// one, or if its target is not a direct cell.
fn find_single_top_level_loop(program: &Program) -> Option<(usize, i64)> {
    let mut depth = 0i64;
    let mut found: Option<(usize, i64)> = None;
    for (i, op) in program.ops.iter().enumerate() {
        match op.op_type {
            OperationType::Lpb => {
                if depth == 0 {
                    if found.is_some() {
                        return None;
                    }
                    if op.target.op_type != OperandType::Direct {
                        return None;
                    }
                    let cell = op.target.value.as_int().ok()?;
                    found = Some((i, cell));
                }
                depth += 1;
            }
            OperationType::Lpe => depth -= 1,
            _ => {}
        }
    }
    found
}

/// Rejects pre-loops that touch the counter cell with anything riskier than
/// a plain assignment — an arithmetic rewrite of the counter before the loop
/// even starts could break the strictly-decreasing progress the loop
/// termination argument relies on, and this evaluator has no way to verify
/// it in general.
fn pre_loop_preserves_monotonicity(pre_loop: &Program, counter_cell: i64) -> bool {
    for op in &pre_loop.ops {
        let targets_counter = op.target.op_type == OperandType::Direct
            && op.target.value.as_int().ok() == Some(counter_cell);
        if targets_counter && op.op_type != OperationType::Mov {
            return false;
        }
        if op.target.op_type == OperandType::Indirect || op.source.op_type == OperandType::Indirect {
            if targets_counter {
                return false;
            }
        }
    }
    true
}

fn body_uses_clr_or_indirect(body: &Program) -> bool {
    body.ops.iter().any(|op| {
        op.op_type == OperationType::Clr || op.target.is_indirect() || op.source.is_indirect()
    })
}

/// Enforces "the post-loop does not read the output cell before writing it,
/// and performs at most one `MOV` from a direct source after any
/// arithmetic" from spec §4.E.
fn post_loop_respects_constraints(post_loop: &Program) -> bool {
    let mut wrote_output = false;
    let mut has_arithmetic = false;
    let mut direct_movs_after_arithmetic = 0;

    for op in &post_loop.ops {
        let reads_output_as_source =
            op.source.op_type == OperandType::Direct && op.source.value.as_int().ok() == Some(OUTPUT_CELL);
        let reads_output_as_target = op.target.op_type == OperandType::Direct
            && op.target.value.as_int().ok() == Some(OUTPUT_CELL)
            && op.metadata().reads_target_before_write;
        if !wrote_output && (reads_output_as_source || reads_output_as_target) {
            return false;
        }

        let is_direct_mov = op.op_type == OperationType::Mov && op.source.op_type == OperandType::Direct;
        if is_direct_mov {
            if has_arithmetic {
                direct_movs_after_arithmetic += 1;
                if direct_movs_after_arithmetic > 1 {
                    return false;
                }
            }
        } else {
            has_arithmetic = true;
        }

        if op.op_type == OperationType::Mov
            && op.target.op_type == OperandType::Direct
            && op.target.value.as_int().ok() == Some(OUTPUT_CELL)
        {
            wrote_output = true;
        }
    }
    true
}

/// A cell is "stateful" if the body reads it before writing it — it carries
/// state in from the previous iteration rather than being recomputed fresh
/// each time.
fn compute_stateful_cells(body: &Program) -> BTreeSet<i64> {
    fn mark_read(operand: &loda_core::operand::Operand, written: &BTreeSet<i64>, stateful: &mut BTreeSet<i64>) {
        if operand.op_type == OperandType::Direct {
            if let Ok(cell) = operand.value.as_int() {
                if !written.contains(&cell) {
                    stateful.insert(cell);
                }
            }
        }
    }

    let mut written: BTreeSet<i64> = BTreeSet::new();
    let mut stateful: BTreeSet<i64> = BTreeSet::new();

    for op in &body.ops {
        mark_read(&op.source, &written, &mut stateful);
        if op.metadata().reads_target_before_write {
            mark_read(&op.target, &written, &mut stateful);
        }
        if op.target.op_type == OperandType::Direct {
            if let Ok(cell) = op.target.value.as_int() {
                written.insert(cell);
            }
        }
    }
    stateful
}

#[cfg(test)]
mod tests {
    use super::*;
    use loda_number::Number;
    use loda_parser::parse_program;

    const FIBONACCI: &str =
        "mov $3,1\nlpb $0\n  sub $0,1\n  mov $2,$1\n  add $1,$3\n  mov $3,$2\nlpe\nmov $0,$1\n";

    #[test]
    fn test_init_accepts_fibonacci_shape() {
        let program = parse_program(FIBONACCI).unwrap();
        let ie = IncrementalEvaluator::init(&program, Settings::default());
        assert!(ie.is_some());
        let ie = ie.unwrap();
        assert_eq!(ie.loop_counter_cell(), 0);
        assert!(ie.stateful_cells().contains(&1));
        assert!(ie.stateful_cells().contains(&3));
    }

    #[test]
    fn test_init_rejects_program_without_a_loop() {
        let program = parse_program("mov $1,$0\n").unwrap();
        assert!(IncrementalEvaluator::init(&program, Settings::default()).is_none());
    }

    #[test]
    fn test_init_rejects_indirect_operand_in_body() {
        let program = parse_program("lpb $0\n  mov $$1,5\n  sub $0,1\nlpe\n").unwrap();
        assert!(IncrementalEvaluator::init(&program, Settings::default()).is_none());
    }

    #[test]
    fn test_init_rejects_clr_in_body() {
        let program = parse_program("lpb $0\n  clr $2,1\n  sub $0,1\nlpe\n").unwrap();
        assert!(IncrementalEvaluator::init(&program, Settings::default()).is_none());
    }

    #[test]
    fn test_next_matches_full_interpreter_for_fibonacci() {
        let program = parse_program(FIBONACCI).unwrap();
        let interp = Interpreter::new(Settings::default());
        let full = interp.eval(&program, 8).unwrap();

        let mut ie = IncrementalEvaluator::init(&program, Settings::default()).unwrap();
        ie.seed(Number::zero()).unwrap();
        let mut via_ie = Vec::new();
        for _ in 0..8 {
            via_ie.push(ie.peek_output().unwrap());
            ie.next().unwrap();
        }
        assert_eq!(via_ie, full);
    }
}
