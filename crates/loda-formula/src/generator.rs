use std::collections::{BTreeSet, HashMap};

use loda_common::{oeis::oeis_id_str, LodaError, LodaResult, Settings};
use loda_core::memory::Memory;
use loda_core::operand::{Operand, OperandType};
use loda_core::operation::{Operation, OperationType};
use loda_core::program::{Program, INPUT_CELL, OUTPUT_CELL};
use loda_expr::expression::Expression;
use loda_expr::formula::Formula;
use loda_interp::{IncrementalEvaluator, Interpreter, SequenceResolver};

/// Cells `0..=5` get single-letter names `a..f`; beyond that the letter `f`
/// is kept and the overflow is appended as a number (`f1`, `f2`, ...), so
/// names stay short without colliding once a program uses more than six
/// cells.
const MAX_CHAR: i64 = 5;

fn param() -> Expression {
    Expression::parameter("n")
}

fn function_name(e: &Expression) -> Option<String> {
    match e {
        Expression::Function(name, _) => Some(name.clone()),
        _ => None,
    }
}

/// A call pattern with exactly one argument that is itself the bare
/// parameter, e.g. `a(n)` — as opposed to a literal-argument special case
/// like `a(3)`, or a call nested inside a larger expression.
fn is_simple_function(e: &Expression) -> bool {
    matches!(e, Expression::Function(_, args) if matches!(args.as_slice(), [Expression::Parameter(_)]))
}

/// Maps a memory cell index to the function name that stands for it in a
/// generated formula.
pub fn memory_cell_to_name(cell: i64) -> LodaResult<String> {
    if cell < 0 {
        return Err(LodaError::OutOfRange(format!("negative memory cell index {cell}")));
    }
    if cell > MAX_CHAR {
        let base = (b'a' + MAX_CHAR as u8) as char;
        Ok(format!("{base}{}", cell - MAX_CHAR))
    } else {
        Ok(((b'a' + cell as u8) as char).to_string())
    }
}

fn make_fraction(num: Expression, den: Expression, pari_mode: bool) -> Expression {
    let frac = Expression::fraction(num.clone(), den.clone());
    if pari_mode {
        let func = if num.can_be_negative() || den.can_be_negative() { "truncate" } else { "floor" };
        Expression::call(func, vec![frac])
    } else {
        frac
    }
}

/// Compiles register-machine programs into closed-form (or recursive)
/// [`Expression`] formulas keyed by memory cell.
///
/// Mirrors the structure of the interpreter one level up: instead of
/// executing a program term by term, `update` rewrites an algebraic
/// description of each cell's contents, one instruction at a time. A
/// generator instance accumulates no state across [`Self::generate_single`]
/// calls beyond `pari_mode`; `cell_names` and `formula` are reset at the
/// start of every call.
pub struct FormulaGenerator {
    pari_mode: bool,
    cell_names: HashMap<i64, String>,
    formula: Formula,
}

impl FormulaGenerator {
    pub fn new(pari_mode: bool) -> Self {
        Self { pari_mode, cell_names: HashMap::new(), formula: Formula::new() }
    }

    pub fn pari_mode(&self) -> bool {
        self.pari_mode
    }

    /// The formula built by the most recent [`Self::generate_single`] call.
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    fn cell_name(&self, cell: i64) -> LodaResult<String> {
        self.cell_names
            .get(&cell)
            .cloned()
            .ok_or_else(|| LodaError::Internal(format!("no name registered for cell ${cell}")))
    }

    fn operand_to_expression(&self, op: &Operand) -> LodaResult<Expression> {
        match op.op_type {
            OperandType::Constant => Ok(Expression::constant(op.value.clone())),
            OperandType::Direct => {
                let cell = op.value.as_int()?;
                Ok(Expression::call(self.cell_name(cell)?, vec![param()]))
            }
            OperandType::Indirect => {
                Err(LodaError::UnsupportedOperand("indirect operand not supported by formula generation".to_string()))
            }
        }
    }

    fn init_formula(&mut self, num_cells: i64, use_ie: bool) -> LodaResult<()> {
        self.formula = Formula::new();
        for cell in 0..num_cells {
            let key = self.operand_to_expression(&Operand::direct(cell))?;
            let value = if cell == 0 {
                param()
            } else if use_ie {
                key.substitute("n", &Expression::difference(param(), Expression::constant(1)))
            } else {
                Expression::constant(0)
            };
            self.formula.insert(key, value);
        }
        Ok(())
    }

    /// Rewrites the formula entry for `op.target` per `op`'s operation type.
    /// Returns `Ok(false)` — never an error — for an operation this
    /// algebra has no rewrite rule for (`lpb`/`lpe`/`clr`/`dbg`/`fac`, or a
    /// PARI-dialect-unsafe `bin`/`seq`): that is a routine "not expressible
    /// this way" outcome the caller gives up on, not a bug.
    fn update_op(&mut self, op: &Operation) -> LodaResult<bool> {
        let mut source = self.operand_to_expression(&op.source)?;
        let target = self.operand_to_expression(&op.target)?;
        if matches!(source, Expression::Function(..)) {
            source = self.formula.get(&source).cloned().unwrap_or(source);
        }
        let prev_target = self.formula.get(&target).cloned().unwrap_or_else(|| target.clone());

        let result = match op.op_type {
            OperationType::Nop => return Ok(true),
            OperationType::Mov => source,
            OperationType::Add => Expression::sum(vec![prev_target, source]),
            OperationType::Sub => Expression::difference(prev_target, source),
            OperationType::Mul => Expression::product(vec![prev_target, source]),
            OperationType::Div => make_fraction(prev_target, source, self.pari_mode),
            OperationType::Pow => {
                let pow = Expression::power(prev_target, source.clone());
                if self.pari_mode && source.can_be_negative() {
                    Expression::call("truncate", vec![pow])
                } else {
                    pow
                }
            }
            OperationType::Mod => {
                if self.pari_mode && (prev_target.can_be_negative() || source.can_be_negative()) {
                    let frac = make_fraction(prev_target.clone(), source.clone(), self.pari_mode);
                    Expression::difference(prev_target, Expression::product(vec![source, frac]))
                } else {
                    Expression::modulus(prev_target, source)
                }
            }
            OperationType::Bin => {
                if self.pari_mode && source.can_be_negative() {
                    return Ok(false);
                }
                Expression::call("binomial", vec![prev_target, source])
            }
            OperationType::Gcd => Expression::call("gcd", vec![prev_target, source]),
            OperationType::Min => Expression::call("min", vec![prev_target, source]),
            OperationType::Max => Expression::call("max", vec![prev_target, source]),
            OperationType::Seq => {
                if op.source.op_type != OperandType::Constant {
                    return Ok(false);
                }
                let id = op.source.value.as_int()?;
                Expression::call(oeis_id_str(id), vec![prev_target])
            }
            OperationType::Trn => Expression::call(
                "max",
                vec![Expression::difference(prev_target, source), Expression::constant(0)],
            ),
            OperationType::Fac
            | OperationType::Lpb
            | OperationType::Lpe
            | OperationType::Clr
            | OperationType::Dbg => return Ok(false),
        };

        self.formula.insert(target, result.normalize());
        Ok(true)
    }

    fn update_program(&mut self, program: &Program) -> LodaResult<bool> {
        for op in &program.ops {
            if !self.update_op(op)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Substitutes every non-self function call reachable from each entry's
    /// body with that function's current general definition, using a
    /// pre-substitution snapshot so each call is expanded exactly once per
    /// pass (chained substitution happens across repeated `update`/`resolve`
    /// cycles, never within a single one).
    fn resolve_references(&mut self) {
        let snapshot = self.formula.clone();
        let mut resolved = Formula::new();
        for (key, body) in self.formula.entries() {
            let self_name = function_name(key);
            let mut new_body = body.clone();
            for name in snapshot.defined_names() {
                if Some(name.as_str()) != self_name.as_deref() {
                    new_body = snapshot.resolve_into(&name, &new_body);
                }
            }
            resolved.insert(key.clone(), new_body.normalize());
        }
        self.formula = resolved;
    }

    /// Folds post-loop direct `mov`s straight into the formula and runs
    /// everything else through [`Self::update_op`], rejecting the shapes
    /// spec §4.E doesn't cover: reading the output cell before writing it,
    /// or more than one direct-source `mov` after any arithmetic.
    fn apply_post_loop(&mut self, post_loop: &Program) -> LodaResult<bool> {
        let mut has_arithmetic = false;
        let mut wrote_out = false;
        let out = Operand::direct(OUTPUT_CELL);

        for op in &post_loop.ops {
            let reads_out_as_source = op.source == out;
            let reads_out_as_target = op.target == out && op.metadata().reads_target_before_write;
            if !wrote_out && (reads_out_as_source || reads_out_as_target) {
                return Ok(false);
            }

            if op.op_type == OperationType::Mov && op.source.op_type == OperandType::Direct {
                if has_arithmetic {
                    return Ok(false);
                }
                if op.target == out {
                    wrote_out = true;
                }
                let t = self.operand_to_expression(&op.target)?;
                let s = self.operand_to_expression(&op.source)?;
                self.formula.insert(t, s);
            } else {
                if !self.update_op(op)? {
                    return Ok(false);
                }
                has_arithmetic = true;
            }
        }
        Ok(true)
    }

    fn convert_initial_terms_to_if(&mut self) {
        let snapshot = self.formula.entries().to_vec();
        for (key, value) in snapshot {
            let (name, arg) = match &key {
                Expression::Function(name, args) => match args.as_slice() {
                    [literal @ Expression::Constant(_)] => (name.clone(), literal.clone()),
                    _ => continue,
                },
                _ => continue,
            };
            let general_key = Expression::call(name, vec![param()]);
            if let Some(general_value) = self.formula.get(&general_key).cloned() {
                let folded = Expression::If {
                    param: Box::new(param()),
                    literal: Box::new(arg),
                    then_branch: Box::new(value),
                    else_branch: Box::new(general_value),
                };
                self.formula.insert(general_key, folded);
                self.formula.remove(&key);
            }
        }
    }

    /// Attempts to compile a single program into `self.formula`. Returns
    /// `Ok(false)` for any shape the algebra can't express — the routine,
    /// expected outcome for most programs, not a sign of a bug. A later call
    /// overwrites whatever `self.formula`/`self.cell_names` held before.
    pub fn generate_single(&mut self, program: &Program, settings: &Settings) -> LodaResult<bool> {
        if program.has_indirect_operand() {
            tracing::debug!("rejecting program: indirect operand");
            return Ok(false);
        }
        let num_cells = program.largest_direct_cell().unwrap_or(0) + 1;
        tracing::trace!(num_cells, "starting formula generation");

        let interpreter = Interpreter::new(settings.clone());
        let ie = IncrementalEvaluator::init(program, settings.clone());
        tracing::trace!(has_loop = ie.is_some(), "incremental evaluator setup");

        if let Some(ie) = &ie {
            if ie.loop_counter_cell() != 0 {
                tracing::debug!("rejecting program: loop counter is not cell 0");
                return Ok(false);
            }
            for op in &ie.pre_loop().ops {
                if op.op_type == OperationType::Mul || op.op_type == OperationType::Div {
                    tracing::debug!("rejecting program: pre-loop performs mul/div");
                    return Ok(false);
                }
            }
        }

        self.cell_names.clear();
        for cell in 0..num_cells {
            self.cell_names.insert(cell, memory_cell_to_name(cell)?);
        }

        self.init_formula(num_cells, false)?;

        if let Some(ie) = &ie {
            if !self.update_program(ie.pre_loop())? {
                return Ok(false);
            }
            let input_key = self.operand_to_expression(&Operand::direct(INPUT_CELL))?;
            let saved = self.formula.get(&input_key).cloned();
            self.init_formula(num_cells, true)?;
            if let Some(saved) = saved {
                self.formula.insert(input_key, saved);
            }
        }

        let main = match &ie {
            Some(ie) => ie.loop_body().clone(),
            None => program.clone(),
        };
        if !self.update_program(&main)? {
            tracing::debug!("rejecting program: main body not expressible");
            return Ok(false);
        }

        if let Some(ie) = &ie {
            self.resolve_references();
            if !self.apply_post_loop(ie.post_loop())? {
                tracing::debug!("rejecting program: post-loop not expressible");
                return Ok(false);
            }
        }

        let output_name = self.cell_name(OUTPUT_CELL)?;
        self.formula = self.formula.collect_entries(&output_name);
        tracing::trace!(entries = self.formula.entries().len(), "collected formula entries after main pass");

        if let Some(mut ie) = ie {
            // Seed the running loop state with pre-loop's effect for n=0 before
            // collecting initial terms; otherwise next() would advance from an
            // all-zero state that never saw the pre-loop's assignments.
            ie.seed(loda_number::Number::zero())?;
            let mut num_terms = vec![0i64; num_cells as usize];
            for cell in 0..num_cells {
                let name = self.cell_name(cell)?;
                num_terms[cell as usize] =
                    get_num_initial_terms_needed(cell, &name, &self.formula, &ie, &interpreter, settings)?;
            }

            for offset in 0..num_cells {
                let mut state = ie.loop_state().clone();
                interpreter.run(ie.post_loop(), &mut state)?;
                for cell in 0..num_cells {
                    if offset < num_terms[cell as usize] {
                        let name = self.cell_name(cell)?;
                        let func = Expression::call(name, vec![Expression::constant(offset)]);
                        let val = Expression::constant(state.get(cell)?);
                        self.formula.insert(func, val);
                    }
                }
                ie.next()?;
            }

            let snapshot = self.formula.entries().to_vec();
            for (key, value) in snapshot {
                if is_simple_function(&key) && is_simple_function(&value) {
                    if let (Some(key_name), Some(value_name)) = (function_name(&key), function_name(&value)) {
                        self.formula.remove(&key);
                        self.formula.rename(&value_name, &key_name);
                    }
                }
            }

            self.formula = self.formula.collect_entries(&output_name);
        }

        if !self.is_formula_feasible() {
            tracing::debug!("rejecting program: formula not feasible (too many helper functions)");
            return Ok(false);
        }

        self.close_naming_gaps(num_cells)?;

        if self.pari_mode {
            self.convert_initial_terms_to_if();
        }

        tracing::debug!(entries = self.formula.entries().len(), "formula generation succeeded");
        Ok(true)
    }

    /// Rejects formulas with more than two distinct helper functions, or
    /// with more than one recursive function, or where a recursive function
    /// depends on anything besides itself — the generator has no rewrite
    /// rule for resolving mutually-entangled recursions into a single
    /// closed form.
    fn is_formula_feasible(&self) -> bool {
        let deps = self.formula.function_deps(true);
        let keys: BTreeSet<String> =
            self.formula.entries().iter().filter_map(|(k, _)| function_name(k)).collect();
        if keys.len() > 2 {
            return false;
        }
        let recursive: BTreeSet<&String> = deps.iter().filter(|(a, b)| a == b).map(|(a, _)| a).collect();
        if recursive.len() > 1 {
            return false;
        }
        for r in &recursive {
            if deps.iter().filter(|(a, _)| a == *r).count() > 1 {
                return false;
            }
        }
        true
    }

    /// Renames helper functions downward to close gaps left by cells the
    /// formula ended up not using, e.g. a formula using only `a` and `c`
    /// becomes `a` and `b`.
    fn close_naming_gaps(&mut self, num_cells: i64) -> LodaResult<()> {
        let mut changed = true;
        while changed {
            changed = false;
            for cell in 1..num_cells {
                let from = memory_cell_to_name(cell)?;
                let to = memory_cell_to_name(cell - 1)?;
                if self.formula.contains_function_def(&from) && !self.formula.contains_function_def(&to) {
                    self.formula.rename(&from, &to);
                    changed = true;
                }
            }
        }
        Ok(())
    }

    /// Generates a formula for `program`, optionally following its `seq`
    /// dependencies (resolved through `resolver`) and splicing each
    /// dependency's formula in under its own OEIS-id name. `Ok(None)` means
    /// the program (or one of its dependencies) isn't expressible as a
    /// formula — the routine negative outcome, not an error.
    pub fn generate<R: SequenceResolver>(
        &mut self,
        program: &Program,
        settings: &Settings,
        resolver: &R,
        with_deps: bool,
    ) -> LodaResult<Option<Formula>> {
        if !self.generate_single(program, settings)? {
            return Ok(None);
        }
        let mut result = self.formula.clone();
        if with_deps {
            let mut ids = BTreeSet::new();
            match add_program_ids(program, resolver, &mut ids)? {
                true => {}
                false => return Ok(None),
            }
            for id in ids {
                let dependency = match resolver.resolve(id) {
                    Ok(p) => p,
                    Err(_) => return Ok(None),
                };
                if !self.generate_single(&dependency, settings)? {
                    return Ok(None);
                }
                let from = self.cell_name(INPUT_CELL)?;
                let to = oeis_id_str(id);
                self.formula.rename(&from, &to);
                add_formula(&mut result, self.formula.clone());
            }
        }
        Ok(Some(result))
    }
}

/// The number of leading terms `func_name` needs spelled out as literal
/// base cases, beyond whatever the formula-substitution machinery already
/// implies: the larger of however many literal calls already reference it
/// and, for a recursive function, how far its own loop runs before the
/// counter cell goes negative plus how many cells the loop body carries
/// state in (each such cell needs its own starting value fixed).
fn get_num_initial_terms_needed(
    cell: i64,
    func_name: &str,
    formula: &Formula,
    ie: &IncrementalEvaluator,
    interpreter: &Interpreter,
    settings: &Settings,
) -> LodaResult<i64> {
    let _ = settings;
    let mut mem = Memory::new();
    interpreter.run(ie.pre_loop(), &mut mem)?;
    let counter_value = mem.get(ie.loop_counter_cell())?.as_int()?;
    let loop_counter_offset = (-counter_value).max(0);
    let num_stateful = ie.stateful_cells().len() as i64;
    let global_num_terms = loop_counter_offset + num_stateful;
    let mut local_num_terms = formula.get_num_initial_terms_needed(func_name);

    for op in &ie.loop_body().ops {
        if op.op_type == OperationType::Mov
            && op.target.op_type == OperandType::Direct
            && op.target.value.as_int().ok() == Some(cell)
            && op.source.op_type == OperandType::Constant
        {
            local_num_terms = local_num_terms.max(1);
            break;
        }
    }

    if formula.is_recursive(func_name) {
        Ok(local_num_terms.max(global_num_terms))
    } else {
        Ok(local_num_terms)
    }
}

/// Collects every `seq` target reachable from `program`, following
/// dependencies transitively through `resolver`. `Ok(false)` means a
/// dependency couldn't be resolved or uses a non-literal sequence id.
fn add_program_ids<R: SequenceResolver>(program: &Program, resolver: &R, ids: &mut BTreeSet<i64>) -> LodaResult<bool> {
    for op in &program.ops {
        if op.op_type == OperationType::Seq {
            if op.source.op_type != OperandType::Constant {
                return Ok(false);
            }
            let id = op.source.value.as_int()?;
            if ids.insert(id) {
                match resolver.resolve(id) {
                    Ok(sub) => {
                        if !add_program_ids(&sub, resolver, ids)? {
                            return Ok(false);
                        }
                    }
                    Err(_) => return Ok(false),
                }
            }
        }
    }
    Ok(true)
}

/// Merges `extension` into `main`, renaming any helper function name that
/// collides between the two onto a fresh free name first.
fn add_formula(main: &mut Formula, mut extension: Formula) {
    let num_cells = main.len() as i64 + extension.len() as i64 + 1;
    for i in 0..num_cells {
        let from = match memory_cell_to_name(i) {
            Ok(name) => name,
            Err(_) => continue,
        };
        if main.contains_function_def(&from) && extension.contains_function_def(&from) {
            for j in 1..num_cells {
                let to = match memory_cell_to_name(j) {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                if !main.contains_function_def(&to) && !extension.contains_function_def(&to) {
                    extension.rename(&from, &to);
                    break;
                }
            }
        }
    }
    for (k, v) in extension.entries() {
        main.insert(k.clone(), v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loda_parser::parse_program;

    fn call(name: &str, arg: Expression) -> Expression {
        Expression::call(name, vec![arg])
    }

    #[test]
    fn test_memory_cell_to_name() {
        assert_eq!(memory_cell_to_name(0).unwrap(), "a");
        assert_eq!(memory_cell_to_name(5).unwrap(), "f");
        assert_eq!(memory_cell_to_name(6).unwrap(), "f1");
        assert_eq!(memory_cell_to_name(7).unwrap(), "f2");
        assert!(memory_cell_to_name(-1).is_err());
    }

    #[test]
    fn test_identity_program() {
        let program = parse_program("mov $1,$0\n").unwrap();
        let mut gen = FormulaGenerator::new(false);
        assert!(gen.generate_single(&program, &Settings::default()).unwrap());
        let f = gen.formula();
        assert_eq!(f.get(&call("a", param())), Some(&param()));
    }

    #[test]
    fn test_squares_program() {
        let program = parse_program("mov $1,$0\nmul $1,$0\n").unwrap();
        let mut gen = FormulaGenerator::new(false);
        assert!(gen.generate_single(&program, &Settings::default()).unwrap());
        let f = gen.formula();
        assert_eq!(f.get(&call("a", param())), Some(&Expression::product(vec![param(), param()])));
    }

    #[test]
    fn test_factorial_injects_correct_base_cases() {
        let program = parse_program("mov $1,1\nlpb $0\n  mul $1,$0\n  sub $0,1\nlpe\n").unwrap();
        let mut gen = FormulaGenerator::new(false);
        assert!(gen.generate_single(&program, &Settings::default()).unwrap());
        let f = gen.formula();
        // The loop carries two stateful cells, so the generator must fix two
        // literal base cases before the recursive step takes over; both are
        // 1 (0! = 1! = 1), not offset by the one-iteration bug this guards.
        assert_eq!(f.get(&call("b", Expression::constant(0))), Some(&Expression::constant(1)));
        assert_eq!(f.get(&call("b", Expression::constant(1))), Some(&Expression::constant(1)));
    }

    #[test]
    fn test_division_produces_floor_fraction() {
        let program = parse_program("mov $1,$0\ndiv $1,2\n").unwrap();
        let mut gen = FormulaGenerator::new(false);
        assert!(gen.generate_single(&program, &Settings::default()).unwrap());
        let f = gen.formula();
        assert_eq!(
            f.get(&call("a", param())),
            Some(&Expression::fraction(param(), Expression::constant(2)))
        );
    }

    #[test]
    fn test_pari_mode_wraps_inexact_division_in_floor() {
        let program = parse_program("mov $1,$0\ndiv $1,2\n").unwrap();
        let mut gen = FormulaGenerator::new(true);
        assert!(gen.generate_single(&program, &Settings::default()).unwrap());
        let f = gen.formula();
        assert_eq!(
            f.get(&call("a", param())),
            Some(&Expression::call("floor", vec![Expression::fraction(param(), Expression::constant(2))]))
        );
    }

    #[test]
    fn test_rejects_indirect_operands() {
        let program = parse_program("lpb $0,1\nmov $$1,5\nsub $0,1\nlpe\n").unwrap();
        let mut gen = FormulaGenerator::new(false);
        assert!(!gen.generate_single(&program, &Settings::default()).unwrap());
    }

    #[test]
    fn test_fibonacci_via_incremental_evaluator() {
        let program = parse_program(
            "mov $3,1\nlpb $0\n  sub $0,1\n  mov $2,$1\n  add $1,$3\n  mov $3,$2\nlpe\nmov $0,$1\n",
        )
        .unwrap();
        let mut gen = FormulaGenerator::new(false);
        assert!(gen.generate_single(&program, &Settings::default()).unwrap());
        let f = gen.formula();
        assert!(!f.is_empty());
        // the general entry for the output cell's name should reference
        // itself at a shifted argument, i.e. stay recursive
        let output_name = gen.cell_name(OUTPUT_CELL).unwrap();
        assert!(f.is_recursive(&output_name));
    }
}
