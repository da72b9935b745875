pub mod spec;
pub use spec::*;

pub mod strategy;
pub use strategy::*;

pub mod build;
pub use build::*;
