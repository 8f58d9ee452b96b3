//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)`、`expect()` 等不一致模式。
//!
//! CLI 的每个子命令统一返回 `Result<T, AppError>`，
//! `--json` 模式下通过 `Serialize` 输出结构化的错误信息。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError` / `HistoryError` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串。

use serde::Serialize;

use crate::history::HistoryError;
use crate::image_handler::ImageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 签名图片流水线错误（加载 / 解码 / 裁剪 / 透明化）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 签名历史远程调用失败
    #[error("{0}")]
    History(#[from] HistoryError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 输出目录不可用
    #[error("存储目录不可用: {0}")]
    Storage(String),

    /// 设置文件读写失败
    #[error("设置错误: {0}")]
    Settings(String),
}

impl AppError {
    /// 稳定错误码，`--json` 输出使用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Image(err) => err.code(),
            Self::History(err) => err.code(),
            Self::Io(_) => "E_IO",
            Self::Storage(_) => "E_STORAGE",
            Self::Settings(_) => "E_SETTINGS",
        }
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
