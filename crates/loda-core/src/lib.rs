pub mod memory;
pub mod operand;
pub mod operation;
pub mod program;

pub use memory::Memory;
pub use operand::{Operand, OperandType};
pub use operation::{metadata_by_short_name, Metadata, Operation, OperationType};
pub use program::{Program, INPUT_CELL, OUTPUT_CELL};
