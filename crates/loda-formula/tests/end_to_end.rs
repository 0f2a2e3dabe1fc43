//! End-to-end scenarios exercising parsing, interpretation and formula
//! generation together, one assembly program at a time.

use loda_common::Settings;
use loda_expr::expression::Expression;
use loda_formula::FormulaGenerator;
use loda_interp::Interpreter;
use loda_number::Number;
use loda_parser::{parse_program, print_program, PrintOptions};

fn terms_i64(values: &[i64]) -> Vec<Number> {
    values.iter().map(|&v| Number::from_i64(v)).collect()
}

fn call(name: &str, arg: Expression) -> Expression {
    Expression::call(name, vec![arg])
}

fn param() -> Expression {
    Expression::parameter("n")
}

#[test]
fn identity_evaluates_and_is_expressible() {
    let program = parse_program("mov $1,$0\n").unwrap();

    let interp = Interpreter::new(Settings::default());
    let out = interp.eval(&program, 8).unwrap();
    assert_eq!(out, terms_i64(&[0, 1, 2, 3, 4, 5, 6, 7]));

    let mut gen = FormulaGenerator::new(false);
    assert!(gen.generate_single(&program, &Settings::default()).unwrap());
    assert_eq!(gen.formula().get(&call("a", param())), Some(&param()));
}

#[test]
fn squares_evaluates_and_is_expressible() {
    let program = parse_program("mul $0,$0\nmov $1,$0\n").unwrap();

    let interp = Interpreter::new(Settings::default());
    let out = interp.eval(&program, 8).unwrap();
    assert_eq!(out, terms_i64(&[0, 1, 4, 9, 16, 25, 36, 49]));

    let mut gen = FormulaGenerator::new(false);
    assert!(gen.generate_single(&program, &Settings::default()).unwrap());
    assert_eq!(
        gen.formula().get(&call("a", param())),
        Some(&Expression::product(vec![param(), param()]))
    );
}

#[test]
fn fibonacci_evaluates_via_full_interpreter_and_is_expressible() {
    let program = parse_program(
        "mov $3,1\nlpb $0\n  sub $0,1\n  mov $2,$1\n  add $1,$3\n  mov $3,$2\nlpe\nmov $0,$1\n",
    )
    .unwrap();

    let interp = Interpreter::new(Settings::default());
    let out = interp.eval(&program, 8).unwrap();
    assert_eq!(out, terms_i64(&[0, 1, 1, 2, 3, 5, 8, 13]));

    let mut gen = FormulaGenerator::new(false);
    assert!(gen.generate_single(&program, &Settings::default()).unwrap());
    assert!(!gen.formula().is_empty());
}

#[test]
fn factorial_evaluates_via_full_interpreter() {
    let program = parse_program("mov $1,1\nlpb $0\n  mul $1,$0\n  sub $0,1\nlpe\n").unwrap();

    let interp = Interpreter::new(Settings::default());
    let out = interp.eval(&program, 8).unwrap();
    assert_eq!(out, terms_i64(&[1, 1, 2, 6, 24, 120, 720, 5040]));
}

#[test]
fn division_by_zero_saturates_to_infinity() {
    let program = parse_program("div $0,0\n").unwrap();

    let mut memory = loda_core::memory::Memory::new();
    memory.set(0, Number::from_i64(5)).unwrap();
    let interp = Interpreter::new(Settings::default());
    interp.run(&program, &mut memory).unwrap();
    assert!(memory.get(1).unwrap().is_infinite());
}

#[test]
fn non_progressing_loop_hits_the_cycle_ceiling() {
    let program = parse_program("lpb $0\n  mov $2,$2\nlpe\n").unwrap();

    let mut memory = loda_core::memory::Memory::new();
    memory.set(0, Number::from_i64(1)).unwrap();
    let settings = Settings { max_cycles: 1000, ..Settings::default() };
    let interp = Interpreter::new(settings);
    let result = interp.run(&program, &mut memory);
    assert!(matches!(result, Err(loda_common::LodaError::CyclesExceeded { limit: 1000 })));
}

#[test]
fn parse_print_round_trip_ignores_comments() {
    let source = "mov $3,1 ; carry\nlpb $0\n  sub $0,1\n  mov $2,$1\n  add $1,$3\n  mov $3,$2\nlpe\nmov $0,$1\n";
    let program = parse_program(source).unwrap();
    let printed = print_program(&program, PrintOptions { include_comments: false });
    let reparsed = parse_program(&printed).unwrap();
    assert_eq!(program, reparsed);
}

#[test]
fn normalize_is_idempotent_on_a_generated_formula_body() {
    let program = parse_program("mul $0,$0\nmov $1,$0\n").unwrap();
    let mut gen = FormulaGenerator::new(false);
    assert!(gen.generate_single(&program, &Settings::default()).unwrap());
    let body = gen.formula().get(&call("a", param())).unwrap().clone();
    assert_eq!(body.normalize(), body.normalize().normalize());
}
