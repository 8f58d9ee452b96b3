//! # 签名历史模块（history）
//!
//! ## 设计思路
//!
//! 维护“某个归属人（NPP）用过哪些签名”的客户端视图。
//! 后端是唯一可信来源：任何写操作成功后都重新拉取列表，而不是在本地猜测“当前签名”是哪一张。
//!
//! - `client`：HTTP 请求映射（列表 / 上传 / 删除 / 设为当前）
//! - `cache`：列表状态、选择标记、通知钩子
//! - `config`：接口地址与凭据
//!
//! ## 不变量
//!
//! 进入历史的图片必须经过透明化处理：上传入口只接受 `ProcessedImage`。

mod cache;
mod client;
mod config;
mod error;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use cache::{LogNotifier, Notice, NoticeLevel, Notifier, SignatureHistory};
pub use client::HistoryClient;
pub use config::HistoryEndpoints;
pub use error::HistoryError;

/// 已保存的签名引用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSignature {
    pub path: String,
    pub owner_identity: String,
    pub is_active: bool,
}

/// 列表接口的原始响应。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub success: bool,
    /// 当前签名路径。
    #[serde(default)]
    pub ttd_path: Option<String>,
    #[serde(default)]
    pub ttd_list: Option<Vec<String>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 合并当前签名与历史数组：当前签名（若有）排第一，其余保持历史顺序并去重。
///
/// ```rust
/// use ttd_signature::history::{HistoryRecord, combine_history};
///
/// let record = HistoryRecord {
///     success: true,
///     ttd_path: Some("a.png".into()),
///     ttd_list: Some(vec!["b.png".into(), "a.png".into()]),
///     message: None,
/// };
/// let paths: Vec<_> = combine_history("123", &record).into_iter().map(|s| s.path).collect();
/// assert_eq!(paths, vec!["a.png", "b.png"]);
/// ```
pub fn combine_history(owner: &str, record: &HistoryRecord) -> Vec<StoredSignature> {
    let active = record
        .ttd_path
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty());

    let mut seen = HashSet::new();
    let mut combined = Vec::new();

    let history = record.ttd_list.iter().flatten().map(|path| path.trim());
    for path in active.into_iter().chain(history) {
        if path.is_empty() || !seen.insert(path) {
            continue;
        }
        combined.push(StoredSignature {
            path: path.to_string(),
            owner_identity: owner.to_string(),
            is_active: Some(path) == active,
        });
    }

    combined
}
