pub mod incremental;
pub mod interpreter;

pub use incremental::IncrementalEvaluator;
pub use interpreter::{CheckStatus, Interpreter, NoSequenceResolver, SequenceResolver, Steps};
