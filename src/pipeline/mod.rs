pub mod extraction;
pub mod structuring;
pub mod processor;
