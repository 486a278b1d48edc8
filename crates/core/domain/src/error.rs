use crate::data::Area;

/// 寄存器访问错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("out of range: {area} address={address} count={count} size={size}")]
    OutOfRange {
        area: Area,
        address: u16,
        count: usize,
        size: usize,
    },
    #[error("value kind does not match area {0}")]
    AreaMismatch(Area),
    #[error("area {0} is sealed after run")]
    Sealed(Area),
}
