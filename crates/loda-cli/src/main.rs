use std::env;
use std::process;

use loda_common::{LodaResult, Settings};
use loda_formula::FormulaGenerator;
use loda_interp::{Interpreter, NoSequenceResolver};
use loda_parser::{parse_program, print_program, PrintOptions};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "eval" => {
            if args.len() < 3 {
                eprintln!("Usage: loda eval <file.asm> [num_terms]");
                process::exit(1);
            }
            let num_terms = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(10);
            cmd_eval(&args[2], num_terms);
        }
        "formula" => {
            if args.len() < 3 {
                eprintln!("Usage: loda formula <file.asm> [--pari]");
                process::exit(1);
            }
            let pari_mode = args.iter().any(|a| a == "--pari");
            cmd_formula(&args[2], pari_mode);
        }
        "print" => {
            if args.len() < 3 {
                eprintln!("Usage: loda print <file.asm>");
                process::exit(1);
            }
            cmd_print(&args[2]);
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        "version" | "--version" | "-V" => {
            println!("loda {}", env!("CARGO_PKG_VERSION"));
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("loda - register-machine toolchain for integer sequences");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  loda eval <file.asm> [num_terms]   Evaluate a program, printing its terms");
    eprintln!("  loda formula <file.asm> [--pari]   Derive a closed-form formula, if expressible");
    eprintln!("  loda print <file.asm>              Parse and re-print a program (drops comments)");
    eprintln!("  loda version                       Show version");
    eprintln!("  loda help                          Show this help");
}

fn read_program_from_file(path: &str) -> LodaResult<loda_core::Program> {
    let source = std::fs::read_to_string(path)?;
    parse_program(&source)
}

fn read_program(path: &str) -> loda_core::Program {
    match read_program_from_file(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error reading '{}': {}", path, e);
            process::exit(1);
        }
    }
}

/// Evaluates a program term-by-term via the full interpreter and prints the
/// resulting sequence, one value per line.
fn cmd_eval(path: &str, num_terms: usize) {
    let program = read_program(path);
    let interp = Interpreter::new(Settings::default());
    match interp.eval(&program, num_terms) {
        Ok(terms) => {
            for term in terms {
                println!("{}", term);
            }
        }
        Err(e) => {
            eprintln!("Evaluation error: {}", e);
            process::exit(1);
        }
    }
}

/// Attempts to derive a closed-form formula for a program. A program that
/// isn't expressible is reported plainly, not as an error.
fn cmd_formula(path: &str, pari_mode: bool) {
    let program = read_program(path);
    let settings = Settings::default();
    let mut generator = FormulaGenerator::new(pari_mode);
    match generator.generate(&program, &settings, &NoSequenceResolver, false) {
        Ok(Some(formula)) => {
            for (pattern, body) in formula.entries().iter() {
                println!("{} = {};", pattern, body);
            }
        }
        Ok(None) => {
            println!("not expressible as a formula");
        }
        Err(e) => {
            eprintln!("Generation error: {}", e);
            process::exit(1);
        }
    }
}

fn cmd_print(path: &str) {
    let program = read_program(path);
    print!("{}", print_program(&program, PrintOptions { include_comments: false }));
}
