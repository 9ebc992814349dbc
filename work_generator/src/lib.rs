pub mod directives;
pub mod error;
pub mod generator;
pub mod tools;

pub use generator::WorkGenerator;
