//! 统一错误类型定义.
//!
//! 所有 m4vpack crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// m4vpack 统一错误类型
#[derive(Debug, Error)]
pub enum M4vError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 编解码器错误 (码流无法按要求构造)
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 两个 I/P 帧之间的连续 B 帧超过上限, 无法重建 PTS
    #[error("连续 B 帧数量超过上限 {0}")]
    TooManyBFrames(usize),
}

impl M4vError {
    /// 是否为流级致命错误
    ///
    /// 致命错误之后滤镜拒绝继续处理, 直到 flush/reset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, M4vError::TooManyBFrames(_) | M4vError::Codec(_))
    }
}

/// m4vpack 统一 Result 类型
pub type M4vResult<T> = Result<T, M4vError>;
