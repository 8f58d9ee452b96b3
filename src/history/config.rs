//! # 签名历史接口配置
//!
//! 接口地址与凭据以 JSON 保存；文件缺失或损坏时回退默认值，不阻断启动。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::HistoryError;

/// 签名历史相关的远程接口。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryEndpoints {
    /// 后端代理根地址，例如 `https://intranet.example/api`。
    pub base_url: String,
    pub list_path: String,
    pub upload_path: String,
    pub delete_path: String,
    pub activate_path: String,
    /// 归属人字段名（NPP）。
    pub owner_field: String,
    /// 上传文件的表单字段名。
    pub file_field: String,
    pub bearer_token: Option<String>,
    /// 单次请求总超时（秒）。
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HistoryEndpoints {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            list_path: "/ttd/history".to_string(),
            upload_path: "/ttd/upload".to_string(),
            delete_path: "/ttd/delete".to_string(),
            activate_path: "/ttd/activate".to_string(),
            owner_field: "npp".to_string(),
            file_field: "ttd".to_string(),
            bearer_token: None,
            timeout_secs: 30,
            connect_timeout_secs: 8,
        }
    }
}

impl HistoryEndpoints {
    /// 拼接完整地址，容忍根地址结尾与路径开头的 `/` 重复或缺失。
    pub fn url_for(&self, path: &str) -> Result<reqwest::Url, HistoryError> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        reqwest::Url::parse(&joined)
            .map_err(|e| HistoryError::InvalidInput(format!("接口地址无效 '{}': {}", joined, e)))
    }

    pub fn load_from_path(path: &Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                if let Ok(endpoints) = serde_json::from_str(&content) {
                    return endpoints;
                }
            }
            log::warn!("⚠️ 签名历史接口配置无法解析，使用默认值 - 路径: {}", path.display());
        }
        Self::default()
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), HistoryError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| HistoryError::Decode(format!("序列化接口配置失败: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| HistoryError::InvalidInput(format!("写入接口配置失败: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn unique_temp_dir() -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("ttd-endpoints-test-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = unique_temp_dir();
        let path = dir.join("endpoints.json");
        let endpoints = HistoryEndpoints {
            base_url: "https://intranet.example/api".to_string(),
            bearer_token: Some("t".to_string()),
            ..HistoryEndpoints::default()
        };

        endpoints.save_to_path(&path).expect("save endpoints");
        assert_eq!(HistoryEndpoints::load_from_path(&path), endpoints);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let dir = unique_temp_dir();
        let path = dir.join("endpoints.json");
        std::fs::write(&path, "not-json").expect("write invalid config");

        assert_eq!(HistoryEndpoints::load_from_path(&path), HistoryEndpoints::default());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = unique_temp_dir();
        let path = dir.join("endpoints.json");
        std::fs::write(&path, r#"{"base_url":"https://h.example"}"#).expect("write config");

        let loaded = HistoryEndpoints::load_from_path(&path);
        assert_eq!(loaded.base_url, "https://h.example");
        assert_eq!(loaded.owner_field, "npp");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn url_for_normalises_slashes() {
        let endpoints = HistoryEndpoints {
            base_url: "http://h.example/api/".to_string(),
            ..HistoryEndpoints::default()
        };
        let url = endpoints.url_for("/ttd/history").expect("valid url");
        assert_eq!(url.as_str(), "http://h.example/api/ttd/history");
    }
}
