//! 设置文件模块
//!
//! # 设计思路
//!
//! 只有一个显式的 JSON 设置文件，记住：
//! - 上一次使用的透明化阈值
//! - 签名历史接口配置
//! - 图片性能档位、代理地址与凭据
//!
//! # 实现思路
//!
//! - 路径优先级：`--settings` 参数 > `TTD_SETTINGS` 环境变量 > `./ttd-settings.json`。
//! - 文件不存在时返回默认设置；内容损坏时报错，避免静默覆盖用户文件。
//! - 字段缺失时按默认值补齐（`#[serde(default)]`）。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::history::HistoryEndpoints;
use crate::image_handler::{ImageConfig, ImagePerformanceProfile, TransparencySettings};

pub const SETTINGS_ENV: &str = "TTD_SETTINGS";
const DEFAULT_SETTINGS_FILE: &str = "ttd-settings.json";

/// 图片相关的可持久化选项。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    /// `quality` / `balanced` / `speed`
    pub profile: String,
    pub proxy_url: Option<String>,
    pub bearer_token: Option<String>,
    /// 自定义输出目录。
    pub output_dir: Option<String>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            profile: ImagePerformanceProfile::Quality.as_str().to_string(),
            proxy_url: None,
            bearer_token: None,
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub transparency: TransparencySettings,
    pub history: HistoryEndpoints,
    pub image: ImageOptions,
}

impl AppSettings {
    /// 按优先级解析设置文件路径。
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var_os(SETTINGS_ENV) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => PathBuf::from(DEFAULT_SETTINGS_FILE),
        }
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            log::debug!("⚙️ 设置文件不存在，使用默认设置 - 路径: {}", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::Settings(format!("解析设置文件 '{}' 失败: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 由设置生成图片流水线配置。
    pub fn image_config(&self) -> Result<ImageConfig, AppError> {
        let profile = ImagePerformanceProfile::from_str(&self.image.profile)?;

        let mut config = ImageConfig::default();
        config.apply_performance_profile(profile);
        config.image_proxy_url = self.image.proxy_url.clone().filter(|url| !url.trim().is_empty());
        config.bearer_token = self.image.bearer_token.clone().filter(|token| !token.is_empty());
        Ok(config)
    }
}
