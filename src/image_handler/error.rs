//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载签名图片链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 注意：流水线对外的两个“字符串契约”入口（`apply_crop` / `make_transparent`）
//! 不会把这些错误抛给调用方，而是降级为空串 / 原图 / 占位图；
//! 只有带类型的变体（`crop_image` / `make_transparent_image`）才会返回 `ImageError`。

/// 图片处理统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("已取消：{0}")]
    Cancelled(String),
}

impl ImageError {
    /// 稳定错误码，供 CLI `--json` 输出与前端提示复用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Cancelled(_) => "E_CANCELLED",
        }
    }

    /// 错误所属阶段（load / decode / pipeline）。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::FileSystem(_) => "load",
            Self::Decode(_) | Self::InvalidFormat(_) => "decode",
            Self::ResourceLimit(_) | Self::Cancelled(_) => "pipeline",
        }
    }
}

impl From<ImageError> for String {
    fn from(error: ImageError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_stages_are_stable() {
        let err = ImageError::Timeout("下载首包超时".to_string());
        assert_eq!(err.code(), "E_TIMEOUT");
        assert_eq!(err.stage(), "load");

        let err = ImageError::Cancelled("裁剪已取消".to_string());
        assert_eq!(err.code(), "E_CANCELLED");
        assert_eq!(err.stage(), "pipeline");
    }
}
