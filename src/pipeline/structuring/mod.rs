pub mod types;
pub mod rules;
pub mod parser;
pub mod validation;

pub use types::*;
pub use rules::*;
pub use parser::*;
pub use validation::*;
