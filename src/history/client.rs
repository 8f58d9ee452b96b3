//! # 签名历史 HTTP 客户端
//!
//! ## 设计思路
//!
//! 只负责“请求 ↔ 响应”的映射，不持有任何列表状态。
//! 状态与通知由 `cache.rs` 的 `SignatureHistory` 负责。
//!
//! ## 实现思路
//!
//! - 列表：`GET {list_path}?{owner_field}=<owner>` → `HistoryRecord`
//! - 上传：`POST {upload_path}`，multipart（归属人文本字段 + `ttd.png` 文件字段）
//! - 删除 / 设为当前：`POST` JSON `{owner_field: owner, "path": path}`
//! - 非 2xx 与 `success: false` 都是硬失败；不做自动重试。

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{HistoryEndpoints, HistoryError, HistoryRecord};

const UPLOAD_FILE_NAME: &str = "ttd.png";

/// 写操作的通用应答。空响应体视为成功。
#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// 签名历史远程接口客户端。
pub struct HistoryClient {
    http: reqwest::Client,
    endpoints: HistoryEndpoints,
}

impl HistoryClient {
    pub fn new(endpoints: HistoryEndpoints) -> Result<Self, HistoryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoints.timeout_secs))
            .connect_timeout(Duration::from_secs(endpoints.connect_timeout_secs))
            .user_agent("ttd-signature/1.0")
            .build()
            .map_err(|e| HistoryError::Transport(format!("创建 HTTP 客户端失败：{}", e)))?;

        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &HistoryEndpoints {
        &self.endpoints
    }

    /// 拉取归属人的签名记录。
    pub async fn fetch(&self, owner: &str) -> Result<HistoryRecord, HistoryError> {
        let owner = Self::require_owner(owner)?;
        let mut url = self.endpoints.url_for(&self.endpoints.list_path)?;
        url.query_pairs_mut().append_pair(&self.endpoints.owner_field, owner);

        log::debug!("📜 拉取签名历史 - owner: {}", owner);

        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(Self::map_transport)?;
        let body = Self::read_success_body(response).await?;

        let record: HistoryRecord = serde_json::from_slice(&body)
            .map_err(|e| HistoryError::Decode(format!("签名历史响应不是合法 JSON：{}", e)))?;

        if !record.success {
            return Err(HistoryError::Rejected(
                record
                    .message
                    .clone()
                    .unwrap_or_else(|| "获取签名历史失败".to_string()),
            ));
        }

        Ok(record)
    }

    /// 上传已处理的 PNG。
    pub async fn upload(&self, owner: &str, png: Vec<u8>) -> Result<(), HistoryError> {
        let owner = Self::require_owner(owner)?;
        if png.is_empty() {
            return Err(HistoryError::InvalidInput("上传内容为空".to_string()));
        }

        let size = png.len();
        let file = Part::bytes(png)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("image/png")
            .map_err(|e| HistoryError::InvalidInput(format!("构建上传文件失败：{}", e)))?;
        let form = Form::new()
            .text(self.endpoints.owner_field.clone(), owner.to_string())
            .part(self.endpoints.file_field.clone(), file);

        let url = self.endpoints.url_for(&self.endpoints.upload_path)?;
        log::info!("⬆️ 上传签名 - owner: {} 大小: {} bytes", owner, size);

        let response = self
            .authorized(self.http.post(url))
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_transport)?;

        Self::expect_ack(response, "上传签名失败").await
    }

    /// 删除指定签名。
    pub async fn delete(&self, owner: &str, path: &str) -> Result<(), HistoryError> {
        let url = self.endpoints.url_for(&self.endpoints.delete_path)?;
        log::info!("🗑️ 删除签名 - owner: {} path: {}", owner.trim(), path);
        self.post_owner_path(url, owner, path, "删除签名失败").await
    }

    /// 显式设为当前签名。
    pub async fn set_active(&self, owner: &str, path: &str) -> Result<(), HistoryError> {
        let url = self.endpoints.url_for(&self.endpoints.activate_path)?;
        log::info!("📌 设为当前签名 - owner: {} path: {}", owner.trim(), path);
        self.post_owner_path(url, owner, path, "设置当前签名失败").await
    }

    async fn post_owner_path(
        &self,
        url: reqwest::Url,
        owner: &str,
        path: &str,
        failure: &str,
    ) -> Result<(), HistoryError> {
        let owner = Self::require_owner(owner)?;
        if path.trim().is_empty() {
            return Err(HistoryError::InvalidInput("签名路径为空".to_string()));
        }

        let mut payload = serde_json::Map::new();
        payload.insert(self.endpoints.owner_field.clone(), owner.into());
        payload.insert("path".to_string(), path.into());
        let body = serde_json::to_vec(&payload)
            .map_err(|e| HistoryError::Decode(format!("序列化请求失败：{}", e)))?;

        let response = self
            .authorized(self.http.post(url))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        Self::expect_ack(response, failure).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.endpoints.bearer_token.as_deref() {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        }
    }

    fn require_owner(owner: &str) -> Result<&str, HistoryError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(HistoryError::InvalidInput("归属人（NPP）为空".to_string()));
        }
        Ok(owner)
    }

    async fn read_success_body(response: reqwest::Response) -> Result<bytes::Bytes, HistoryError> {
        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status {
                code: status.as_u16(),
                message: status.canonical_reason().unwrap_or("未知状态").to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| HistoryError::Transport(format!("读取响应失败：{}", e)))
    }

    async fn expect_ack(response: reqwest::Response, failure: &str) -> Result<(), HistoryError> {
        let body = Self::read_success_body(response).await?;

        let ack = if body.iter().all(u8::is_ascii_whitespace) {
            Ack { success: true, message: None }
        } else {
            serde_json::from_slice::<Ack>(&body)
                .map_err(|e| HistoryError::Decode(format!("响应不是合法 JSON：{}", e)))?
        };

        if !ack.success {
            return Err(HistoryError::Rejected(
                ack.message.unwrap_or_else(|| failure.to_string()),
            ));
        }
        Ok(())
    }

    fn map_transport(e: reqwest::Error) -> HistoryError {
        if e.is_timeout() {
            HistoryError::Transport(format!("请求超时：{}", e))
        } else if e.is_connect() {
            HistoryError::Transport(format!("连接失败：{}", e))
        } else {
            HistoryError::Transport(e.to_string())
        }
    }
}
