//! Handlers 模块

pub mod diagnostics;
pub mod health;
pub mod ingest;
pub mod memory;

pub use diagnostics::*;
pub use health::*;
pub use ingest::*;
pub use memory::*;
