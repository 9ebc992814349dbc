pub mod archive;
pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod env;
pub mod error;
pub mod gpf;
pub mod schema;
pub mod scoring;

pub use config::Config;
pub use schema::SchemaFlavor;
pub use scoring::{Scoring, WeightSet, Weights};
