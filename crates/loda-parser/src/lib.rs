pub mod parser;
pub mod printer;

pub use parser::{parse_program, Parser};
pub use printer::{print_program, PrintOptions};
