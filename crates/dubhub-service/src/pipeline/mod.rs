//! Media pipeline implementations.

pub mod command;

pub use command::CommandPipeline;
