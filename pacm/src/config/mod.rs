//! Manager configuration: defaults and settings structs.

pub mod defaults;
mod options;

pub use options::{InstallOptions, ManagerOptions};
