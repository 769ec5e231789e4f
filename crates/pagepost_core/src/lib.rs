pub mod config;
pub mod error;
pub mod format;
pub mod interact;
pub mod location;
pub mod merge;
pub mod publish;
pub mod remote;
pub mod report;
pub mod runtime;
pub mod wizard;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{PostError, Result};
