//! # 签名历史错误模型
//!
//! 列表 / 上传 / 删除 / 设为当前 四类远程调用共用一个错误枚举。
//! 这些错误不会自动重试，由调用方转成用户可见的提示。

/// 签名历史统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// 连接失败、超时、请求构建失败等传输层问题。
    #[error("网络错误：{0}")]
    Transport(String),

    /// 服务端返回非 2xx。
    #[error("服务端返回 HTTP {code}：{message}")]
    Status { code: u16, message: String },

    /// 服务端明确返回 `success: false`。
    #[error("服务端拒绝请求：{0}")]
    Rejected(String),

    #[error("响应解析失败：{0}")]
    Decode(String),

    #[error("参数无效：{0}")]
    InvalidInput(String),
}

impl HistoryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_HISTORY_TRANSPORT",
            Self::Status { .. } => "E_HISTORY_STATUS",
            Self::Rejected(_) => "E_HISTORY_REJECTED",
            Self::Decode(_) => "E_HISTORY_DECODE",
            Self::InvalidInput(_) => "E_HISTORY_INPUT",
        }
    }
}
