use loda_common::{LodaError, LodaResult, Settings};
use loda_core::memory::Memory;
use loda_core::operand::{Operand, OperandType};
use loda_core::operation::OperationType;
use loda_core::program::{Program, INPUT_CELL, OUTPUT_CELL};
use loda_number::Number;

/// Resolves the program referenced by a `seq t,s` operand (cell `s` holds an
/// OEIS-style numeric id). This is the sequence-store collaborator named in
/// spec §6; the interpreter never reads a catalog or touches disk itself.
pub trait SequenceResolver {
    fn resolve(&self, id: i64) -> LodaResult<Program>;
}

/// A resolver that always fails, the default when a caller has no sequence
/// store to offer. Programs that never use `seq` never notice.
pub struct NoSequenceResolver;

impl SequenceResolver for NoSequenceResolver {
    fn resolve(&self, id: i64) -> LodaResult<Program> {
        Err(LodaError::UnsupportedOperand(format!(
            "seq referencing A{id} requires a configured sequence resolver"
        )))
    }
}

/// Per-term step accounting, mirroring `steps_t` in the original evaluator:
/// a multi-term `eval` naturally wants to report how cheap or expensive each
/// term was, useful for an external collaborator ranking candidate programs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Steps {
    pub min: u64,
    pub max: u64,
    pub total: u64,
    pub runs: u64,
}

impl Steps {
    fn record(&mut self, cycles: u64) {
        self.min = if self.runs == 0 { cycles } else { self.min.min(cycles) };
        self.max = self.max.max(cycles);
        self.total += cycles;
        self.runs += 1;
    }
}

/// Outcome of comparing a program's output against a known-good sequence,
/// mirroring `status_t` in the original evaluator (catalog lookups stay
/// external; this only reports the comparison itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

/// Executes [`Program`]s over [`Memory`] under cycle and memory ceilings
/// (spec §4.D). One `Interpreter` owns no mutable state of its own beyond its
/// `Settings`; concurrent callers each need their own instance only because
/// `SequenceResolver` implementations might not be `Sync`, not because this
/// struct carries any.
pub struct Interpreter<R: SequenceResolver = NoSequenceResolver> {
    settings: Settings,
    resolver: R,
}

impl Interpreter<NoSequenceResolver> {
    pub fn new(settings: Settings) -> Self {
        Self { settings, resolver: NoSequenceResolver }
    }
}

impl<R: SequenceResolver> Interpreter<R> {
    pub fn with_resolver(settings: Settings, resolver: R) -> Self {
        Self { settings, resolver }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs `program` against `memory` in place, returning the number of
    /// cycles consumed. Fails with `CyclesExceeded` or `MemoryExceeded` when
    /// a configured ceiling is hit.
    pub fn run(&self, program: &Program, memory: &mut Memory) -> LodaResult<u64> {
        let mut pc: usize = 0;
        let mut cycles: u64 = 0;
        let mut loop_stack: Vec<usize> = Vec::new();

        while pc < program.ops.len() {
            let op = &program.ops[pc];

            cycles += 1;
            if cycles > self.settings.max_cycles {
                tracing::warn!(limit = self.settings.max_cycles, "cycle ceiling exceeded");
                return Err(LodaError::CyclesExceeded { limit: self.settings.max_cycles });
            }
            tracing::trace!(op = op.metadata().short_name, pc, "executing instruction");

            match op.op_type {
                OperationType::Lpb => {
                    let cell = self.direct_cell(&op.target)?;
                    let window = self.loop_window(memory, &op.source)?;
                    if !self.loop_counter_still_positive(memory, cell, window)? {
                        // Counter fragment already at or past the zero floor (or
                        // infinite): skip straight past the body. Re-evaluated
                        // every time control reaches this `lpb`, whether on
                        // first entry or jumping back from `lpe`, so this is
                        // the sole repeat/termination gate (spec §4.D).
                        pc = program.matching_lpe(pc).ok_or_else(|| {
                            LodaError::Internal("lpb without a matching lpe".to_string())
                        })? + 1;
                        continue;
                    }
                    loop_stack.push(pc);
                    pc += 1;
                }
                OperationType::Lpe => {
                    let lpb_pc = loop_stack.pop().ok_or_else(|| {
                        LodaError::Internal("lpe without a matching lpb".to_string())
                    })?;
                    // Jump back to the `lpb` itself so its counter check runs
                    // again before any further iteration of the body.
                    pc = lpb_pc;
                }
                OperationType::Nop | OperationType::Dbg => {
                    pc += 1;
                }
                OperationType::Clr => {
                    let start = self.direct_cell(&op.target)?;
                    let len = self.operand_value(memory, &op.source)?.as_int()?;
                    if len > 0 {
                        self.check_memory_ceiling(start + len - 1)?;
                    }
                    memory.clear(start, len)?;
                    pc += 1;
                }
                OperationType::Seq => {
                    let id = match op.source.op_type {
                        OperandType::Constant => op.source.value.as_int()?,
                        _ => self.operand_value(memory, &op.source)?.as_int()?,
                    };
                    let input = self.operand_value(memory, &op.target)?;
                    let sub_program = self.resolver.resolve(id)?;
                    let mut sub_memory = Memory::new();
                    sub_memory.set(INPUT_CELL, input)?;
                    let sub_cycles = self.run(&sub_program, &mut sub_memory)?;
                    cycles += sub_cycles;
                    if cycles > self.settings.max_cycles {
                        return Err(LodaError::CyclesExceeded { limit: self.settings.max_cycles });
                    }
                    let result = sub_memory.get(OUTPUT_CELL)?;
                    self.set_target(memory, &op.target, result)?;
                    pc += 1;
                }
                _ => {
                    let result = self.eval_arithmetic(op.op_type, memory, op)?;
                    self.set_target(memory, &op.target, result)?;
                    pc += 1;
                }
            }
        }

        Ok(cycles)
    }

    /// Runs `program` with input cell `0, 1, 2, ...` and collects the output
    /// cell after each run. The per-term cycle budget is independent: each
    /// term gets a fresh `Memory` and its own cycle counter.
    pub fn eval(&self, program: &Program, num_terms: usize) -> LodaResult<Vec<Number>> {
        let mut terms = Vec::with_capacity(num_terms);
        for n in 0..num_terms {
            let mut memory = Memory::new();
            memory.set(INPUT_CELL, Number::from_i64(n as i64))?;
            self.run(program, &mut memory)?;
            terms.push(memory.get(OUTPUT_CELL)?);
        }
        Ok(terms)
    }

    /// Evaluates `program` term by term against `expected`, reporting both a
    /// pass/fail verdict and step-count statistics across the terms actually
    /// run (stopping at the first raised error, e.g. `CyclesExceeded`).
    pub fn eval_sequence(
        &self,
        program: &Program,
        expected: &[Number],
    ) -> LodaResult<(CheckStatus, Steps)> {
        let mut steps = Steps::default();
        let mut status = CheckStatus::Ok;
        for (n, expected_value) in expected.iter().enumerate() {
            let mut memory = Memory::new();
            memory.set(INPUT_CELL, Number::from_i64(n as i64))?;
            let cycles = self.run(program, &mut memory)?;
            steps.record(cycles);
            let got = memory.get(OUTPUT_CELL)?;
            if &got != expected_value {
                status = CheckStatus::Error;
            }
        }
        Ok((status, steps))
    }

    fn loop_window(&self, memory: &Memory, source: &Operand) -> LodaResult<i64> {
        // `lpb t[,k]`: the parser fills in a constant 1 when `k` is omitted,
        // but a generated program may also compute it, so resolve generally.
        let k = self.operand_value(memory, source)?.as_int()?;
        if k < 1 {
            return Err(LodaError::OutOfRange(format!("lpb window must be >= 1, got {k}")));
        }
        Ok(k)
    }

    /// Whether `[cell, cell+window)` is still lexicographically greater than
    /// the all-zero fragment (most significant cell first) — i.e. the counter
    /// has not yet reached the well-founded order's floor and the loop has
    /// another iteration left. An infinite cell anywhere in the window ends
    /// the loop immediately, matching `asInt`'s refusal to ever compare
    /// against infinity.
    fn loop_counter_still_positive(&self, memory: &Memory, cell: i64, window: i64) -> LodaResult<bool> {
        for offset in 0..window {
            if memory.get(cell + offset)?.is_infinite() {
                return Ok(false);
            }
        }
        Memory::new().is_less(memory, cell, window)
    }

    fn eval_arithmetic(
        &self,
        op_type: OperationType,
        memory: &Memory,
        op: &loda_core::operation::Operation,
    ) -> LodaResult<Number> {
        let source = self.operand_value(memory, &op.source)?;
        let prev_target = if op.metadata().reads_target_before_write {
            self.operand_value(memory, &op.target)?
        } else {
            Number::zero()
        };
        let result = match op_type {
            OperationType::Mov => source,
            OperationType::Add => prev_target.add(&source),
            OperationType::Sub => prev_target.sub(&source),
            OperationType::Mul => prev_target.mul(&source),
            OperationType::Div => prev_target.div(&source),
            OperationType::Mod => prev_target.rem(&source),
            OperationType::Pow => prev_target.pow(&source),
            OperationType::Fac => prev_target.factorial(),
            OperationType::Gcd => prev_target.gcd(&source),
            OperationType::Bin => prev_target.binomial(&source),
            OperationType::Min => prev_target.min(&source),
            OperationType::Max => prev_target.max(&source),
            OperationType::Trn => prev_target.trn(&source),
            other => {
                return Err(LodaError::Internal(format!(
                    "{other:?} has no arithmetic mapping; handled elsewhere"
                )))
            }
        };
        Ok(result)
    }

    fn operand_value(&self, memory: &Memory, operand: &Operand) -> LodaResult<Number> {
        match operand.op_type {
            OperandType::Constant => Ok(operand.value.clone()),
            OperandType::Direct => memory.get(operand.value.as_int()?),
            OperandType::Indirect => {
                let cell = operand.value.as_int()?;
                let addr = memory.get(cell)?.as_int()?;
                memory.get(addr)
            }
        }
    }

    fn direct_cell(&self, operand: &Operand) -> LodaResult<i64> {
        if operand.op_type != OperandType::Direct {
            return Err(LodaError::UnsupportedOperand(
                "expected a direct cell operand".to_string(),
            ));
        }
        operand.value.as_int()
    }

    fn set_target(&self, memory: &mut Memory, operand: &Operand, value: Number) -> LodaResult<()> {
        let index = match operand.op_type {
            OperandType::Direct => operand.value.as_int()?,
            OperandType::Indirect => {
                let cell = operand.value.as_int()?;
                memory.get(cell)?.as_int()?
            }
            OperandType::Constant => {
                return Err(LodaError::Internal("operation target cannot be a constant".to_string()))
            }
        };
        self.check_memory_ceiling(index)?;
        memory.set(index, value)
    }

    fn check_memory_ceiling(&self, index: i64) -> LodaResult<()> {
        if index < 0 {
            return Err(LodaError::OutOfRange(format!("negative cell index {index}")));
        }
        if index as u64 > self.settings.max_memory {
            return Err(LodaError::MemoryExceeded { index: index as u64, limit: self.settings.max_memory });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loda_parser::parse_program;

    fn run_terms(source: &str, num_terms: usize) -> Vec<Number> {
        let program = parse_program(source).unwrap();
        let interp = Interpreter::new(Settings::default());
        interp.eval(&program, num_terms).unwrap()
    }

    #[test]
    fn test_identity() {
        let terms = run_terms("mov $1,$0\n", 8);
        let expected: Vec<Number> = (0..8).map(Number::from_i64).collect();
        assert_eq!(terms, expected);
    }

    #[test]
    fn test_squares() {
        let terms = run_terms("mul $0,$0\nmov $1,$0\n", 8);
        let expected: Vec<Number> = (0..8i64).map(|n| Number::from_i64(n * n)).collect();
        assert_eq!(terms, expected);
    }

    #[test]
    fn test_fibonacci_via_full_interpreter() {
        let source = "mov $3,1\nlpb $0\n  sub $0,1\n  mov $2,$1\n  add $1,$3\n  mov $3,$2\nlpe\nmov $0,$1\n";
        let terms = run_terms(source, 8);
        let expected = [0, 1, 1, 2, 3, 5, 8, 13].map(Number::from_i64);
        assert_eq!(terms, expected.to_vec());
    }

    #[test]
    fn test_division_by_zero_saturates_to_infinity() {
        let program = parse_program("div $0,0\nmov $1,$0\n").unwrap();
        let mut memory = Memory::new();
        memory.set(INPUT_CELL, Number::from_i64(5)).unwrap();
        let interp = Interpreter::new(Settings::default());
        interp.run(&program, &mut memory).unwrap();
        assert_eq!(memory.get(OUTPUT_CELL).unwrap(), Number::Infinity);
    }

    #[test]
    fn test_non_progressing_loop_hits_cycle_ceiling() {
        let program = parse_program("lpb $0\n  mov $2,$2\nlpe\n").unwrap();
        let mut settings = Settings::default();
        settings.max_cycles = 1000;
        let mut memory = Memory::new();
        memory.set(INPUT_CELL, Number::from_i64(1)).unwrap();
        let interp = Interpreter::new(settings);
        let err = interp.run(&program, &mut memory).unwrap_err();
        assert!(matches!(err, LodaError::CyclesExceeded { .. }));
    }

    #[test]
    fn test_write_beyond_memory_ceiling_fails() {
        let program = parse_program("mov $500,1\n").unwrap();
        let mut settings = Settings::default();
        settings.max_memory = 10;
        let mut memory = Memory::new();
        let interp = Interpreter::new(settings);
        let err = interp.run(&program, &mut memory).unwrap_err();
        assert!(matches!(err, LodaError::MemoryExceeded { .. }));
    }

    #[test]
    fn test_lpb_skips_body_when_counter_is_infinite() {
        let program = parse_program("div $0,0\nlpb $0\n  mov $1,1\nlpe\n").unwrap();
        let mut memory = Memory::new();
        memory.set(INPUT_CELL, Number::from_i64(5)).unwrap();
        let interp = Interpreter::new(Settings::default());
        interp.run(&program, &mut memory).unwrap();
        assert!(memory.get(OUTPUT_CELL).unwrap().is_zero());
    }

    #[test]
    fn test_seq_without_resolver_fails() {
        let program = parse_program("seq $0,45\n").unwrap();
        let mut memory = Memory::new();
        let interp = Interpreter::new(Settings::default());
        assert!(interp.run(&program, &mut memory).is_err());
    }
}
