//! Modbus 内存领域模型：寄存器存储、状态封存闸门、内存注册表。

pub mod data;
mod error;
mod registry;
mod store;

pub use data::{Area, AreaValues, MemoryLayout, RegisterSnapshot, RunState, UnknownArea};
pub use error::RegisterError;
pub use registry::{MemoryRegistry, RegistryError};
pub use store::RegisterStore;
