//! 协议错误类型定义

/// 协议层错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 监听失败
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 配置错误
    #[error("config error: {0}")]
    Config(String),

    /// 帧格式错误（关闭当前连接）
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

/// Raw Ingest 拒绝原因。
///
/// 对端只会收到一个拒绝字节，原因仅用于日志。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid area {0}")]
    InvalidArea(u8),
    #[error("zero count")]
    ZeroCount,
    #[error("frame of {0} bytes exceeds max packet size")]
    FrameTooLarge(usize),
    #[error("truncated frame")]
    Truncated,
    #[error("read timeout")]
    Timeout,
    #[error("unknown memory id {0}")]
    UnknownMemory(u16),
    #[error("payload misaligned")]
    Misaligned,
    #[error("memory write failed")]
    WriteFailed,
}
