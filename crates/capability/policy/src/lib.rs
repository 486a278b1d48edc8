//! Modbus 端口策略与路由解析。
//!
//! 路由表决定 unit-id 指向哪块内存，端口策略决定该端口上谁能以哪些功能码访问。

mod policy;
mod resolver;

pub use policy::{
    AccessMode, FunctionCodeAcl, MemorySelector, PortPolicy, READ_FUNCTION_CODES, UnitIdSelector,
};
pub use resolver::{PolicyDenial, PolicyResolver, RoutingTable};
