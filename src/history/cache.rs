//! # 签名历史 / 选择缓存
//!
//! ## 设计思路
//!
//! `SignatureHistory` 持有某个归属人的签名列表与本次操作选中的签名。
//! 列表只是远端状态的投影：
//! - 上传 / 设为当前成功后一律重新 `list()`，不做乐观插入
//! - 删除成功后本地移除该项，被删的若是当前签名，则当前标记随之消失
//! - 任一失败：发出通知并返回 `Err`，本地状态保持调用前的样子
//!
//! ## 实现思路
//!
//! 通知通过 `Notifier` 钩子发出，默认实现只写日志；界面层可以替换成 toast。

use std::sync::Arc;

use crate::image_handler::{ImageHandler, ImageSource, ProcessedImage, TransparencySettings};

use super::{HistoryClient, HistoryError, StoredSignature, combine_history};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// 面向用户的一条提示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// 用户提示钩子。
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// 默认通知实现：写入日志。
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => log::info!("✅ {}", notice.message),
            NoticeLevel::Error => log::warn!("⚠️ {}", notice.message),
        }
    }
}

/// 某个归属人的签名历史视图。
pub struct SignatureHistory {
    client: HistoryClient,
    owner: String,
    entries: Vec<StoredSignature>,
    selected: Option<String>,
    notifier: Arc<dyn Notifier>,
}

impl SignatureHistory {
    pub fn new(client: HistoryClient, owner: impl Into<String>) -> Self {
        Self {
            client,
            owner: owner.into().trim().to_string(),
            entries: Vec::new(),
            selected: None,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn entries(&self) -> &[StoredSignature] {
        &self.entries
    }

    pub fn active(&self) -> Option<&StoredSignature> {
        self.entries.iter().find(|entry| entry.is_active)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// 重新拉取列表。
    ///
    /// 选中项若已不在新列表中则清除。
    pub async fn list(&mut self) -> Result<&[StoredSignature], HistoryError> {
        let record = match self.client.fetch(&self.owner).await {
            Ok(record) => record,
            Err(err) => return Err(self.fail("获取签名历史失败", err)),
        };

        self.entries = combine_history(&self.owner, &record);
        if let Some(selected) = self.selected.as_deref() {
            if !self.entries.iter().any(|entry| entry.path == selected) {
                self.selected = None;
            }
        }

        log::debug!("📜 签名历史已刷新 - owner: {} 条数: {}", self.owner, self.entries.len());
        Ok(&self.entries)
    }

    /// 标记本次操作使用的签名，不访问网络。
    pub fn select(&mut self, path: &str) -> Result<(), HistoryError> {
        if !self.entries.iter().any(|entry| entry.path == path) {
            return Err(HistoryError::InvalidInput(format!("签名不在历史列表中：{}", path)));
        }
        self.selected = Some(path.to_string());
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// 删除一条签名。
    pub async fn remove(&mut self, path: &str) -> Result<(), HistoryError> {
        if let Err(err) = self.client.delete(&self.owner, path).await {
            return Err(self.fail("删除签名失败", err));
        }

        let was_active = self
            .entries
            .iter()
            .any(|entry| entry.path == path && entry.is_active);
        self.entries.retain(|entry| entry.path != path);
        if self.selected.as_deref() == Some(path) {
            self.selected = None;
        }
        if was_active {
            log::info!("📌 已删除当前签名，当前标记已清除 - owner: {}", self.owner);
        }

        self.succeed("签名已删除");
        Ok(())
    }

    /// 上传已处理的签名并以服务端列表为准刷新。
    pub async fn add(&mut self, image: &ProcessedImage) -> Result<(), HistoryError> {
        if let Err(err) = self.client.upload(&self.owner, image.png_bytes().to_vec()).await {
            return Err(self.fail("上传签名失败", err));
        }

        self.list().await?;
        self.succeed("签名已保存");
        Ok(())
    }

    /// 上传 Data URL 形式的签名：先做透明化与自动裁边，再走 [`Self::add`]。
    ///
    /// 未经处理的原始图片不会进入历史列表；处理失败时不发起任何请求。
    pub async fn add_data_url(
        &mut self,
        handler: &ImageHandler,
        data_url: &str,
        settings: &TransparencySettings,
    ) -> Result<(), HistoryError> {
        let source = ImageSource::Base64(data_url.trim().to_string());
        let image = match handler.make_transparent_image(&source, settings).await {
            Ok(image) => image,
            Err(err) => {
                return Err(self.fail(
                    "签名图片无效",
                    HistoryError::InvalidInput(err.to_string()),
                ));
            }
        };
        self.add(&image).await
    }

    /// 显式设为当前签名并刷新。
    pub async fn set_active(&mut self, path: &str) -> Result<(), HistoryError> {
        if let Err(err) = self.client.set_active(&self.owner, path).await {
            return Err(self.fail("设置当前签名失败", err));
        }

        self.list().await?;
        self.succeed("已设为当前签名");
        Ok(())
    }

    fn fail(&self, action: &str, err: HistoryError) -> HistoryError {
        self.notifier.notify(Notice {
            level: NoticeLevel::Error,
            message: format!("{}：{}", action, err),
        });
        err
    }

    fn succeed(&self, message: &str) {
        self.notifier.notify(Notice {
            level: NoticeLevel::Success,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryEndpoints;
    use crate::image_handler::ImageConfig;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notice>>);

    impl Notifier for Recorder {
        fn notify(&self, notice: Notice) {
            if let Ok(mut guard) = self.0.lock() {
                guard.push(notice);
            }
        }
    }

    fn offline_history() -> (SignatureHistory, Arc<Recorder>) {
        // 端口 9 没有服务，任何请求都会失败
        let client = HistoryClient::new(HistoryEndpoints {
            base_url: "http://127.0.0.1:9/api".to_string(),
            connect_timeout_secs: 2,
            timeout_secs: 2,
            ..HistoryEndpoints::default()
        })
        .expect("client init failed");
        let recorder = Arc::new(Recorder::default());
        let history = SignatureHistory::new(client, " 42 ").with_notifier(recorder.clone());
        (history, recorder)
    }

    #[test]
    fn owner_is_trimmed() {
        let (history, _) = offline_history();
        assert_eq!(history.owner(), "42");
    }

    #[test]
    fn select_requires_known_entry() {
        let (mut history, _) = offline_history();
        assert!(matches!(history.select("a.png"), Err(HistoryError::InvalidInput(_))));
        assert!(history.selected().is_none());
    }

    #[tokio::test]
    async fn failed_list_notifies_and_keeps_state() {
        let (mut history, recorder) = offline_history();

        assert!(history.list().await.is_err());

        assert!(history.entries().is_empty());
        let notices = recorder.0.lock().expect("lock");
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn add_data_url_rejects_undecodable_image_before_network() {
        let (mut history, recorder) = offline_history();
        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");

        let result = history
            .add_data_url(&handler, "data:image/jpeg;base64,/9j/4AAQ", &TransparencySettings::default())
            .await;

        assert!(matches!(result, Err(HistoryError::InvalidInput(_))));
        assert_eq!(recorder.0.lock().expect("lock").len(), 1);
    }
}
