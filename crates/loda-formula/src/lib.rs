pub mod generator;

pub use generator::{memory_cell_to_name, FormulaGenerator};
