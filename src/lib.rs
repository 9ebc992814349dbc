pub mod docking;
pub mod progress;
pub mod runner;
pub mod vina_cli;
