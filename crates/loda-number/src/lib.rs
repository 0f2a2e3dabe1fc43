pub mod number;

pub use number::{Number, INFINITY_TOKEN};
