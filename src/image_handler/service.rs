//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! 使用 `SignatureService` 作为调用方持有的状态，替代全局单例函数。
//! 生命周期由 `main.rs` 统一管理，测试可创建独立实例。
//!
//! ## 实现思路
//!
//! 对外仅暴露少量稳定 API：
//! - `crop` / `make_transparent` / `process`：三种处理入口
//! - `remembered_settings` / `remember_settings`：界面层记住上一次的透明化阈值
//! - `begin` / `cancel`：按请求 id 管理取消标志
//! - `set_performance_profile` / `get_performance_profile`：切换与读取档位

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::source::ProcessedImage;
use super::transform::CropSpec;
use super::transparency::TransparencySettings;
use super::{ImageConfig, ImageError, ImageHandler, ImagePerformanceProfile, ImageSource};

/// 签名处理服务状态。
pub struct SignatureService {
    handler: ImageHandler,
    last_settings: RwLock<TransparencySettings>,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl SignatureService {
    /// 使用默认配置创建服务。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use ttd_signature::image_handler::SignatureService;
    ///
    /// let service = SignatureService::new()?;
    /// # Ok::<(), ttd_signature::image_handler::ImageError>(())
    /// ```
    pub fn new() -> Result<Self, ImageError> {
        Self::with_config(ImageConfig::default())
    }

    /// 使用自定义配置创建服务。
    pub fn with_config(config: ImageConfig) -> Result<Self, ImageError> {
        let handler = ImageHandler::new(config)?;
        Ok(Self {
            handler,
            last_settings: RwLock::new(TransparencySettings::default()),
            cancel_flags: Mutex::new(HashMap::new()),
        })
    }

    pub fn handler(&self) -> &ImageHandler {
        &self.handler
    }

    /// 上一次使用的透明化阈值。
    pub fn remembered_settings(&self) -> Result<TransparencySettings, ImageError> {
        self.last_settings
            .read()
            .map(|settings| *settings)
            .map_err(|_| ImageError::ResourceLimit("透明化设置读取锁已中毒".to_string()))
    }

    pub fn remember_settings(&self, settings: TransparencySettings) -> Result<(), ImageError> {
        let mut guard = self
            .last_settings
            .write()
            .map_err(|_| ImageError::ResourceLimit("透明化设置写入锁已中毒".to_string()))?;
        *guard = settings;
        Ok(())
    }

    /// 几何变换（失败返回空串）。
    pub async fn crop(&self, source: &ImageSource, crop: &CropSpec) -> String {
        self.handler.apply_crop(source, crop).await
    }

    /// 透明化：本次阈值会被记住，供下次打开界面时回填。
    pub async fn make_transparent(&self, input: &str, settings: TransparencySettings) -> String {
        if let Err(err) = self.remember_settings(settings) {
            log::warn!("⚠️ 记录透明化设置失败：{}", err);
        }
        self.handler.make_transparent(input, &settings).await
    }

    /// 执行完整处理流程，期间可通过 `cancel(request_id)` 取消。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use ttd_signature::image_handler::{CropSpec, ImageSource, SignatureService, TransparencySettings};
    ///
    /// # async fn demo() -> Result<(), ttd_signature::image_handler::ImageError> {
    /// let service = SignatureService::new()?;
    /// let processed = service
    ///     .process(
    ///         "req-1",
    ///         &ImageSource::FilePath("scan.png".into()),
    ///         &CropSpec::full(600, 200),
    ///         TransparencySettings::default(),
    ///     )
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn process(
        &self,
        request_id: &str,
        source: &ImageSource,
        crop: &CropSpec,
        settings: TransparencySettings,
    ) -> Result<ProcessedImage, ImageError> {
        let cancel_flag = self.begin(request_id)?;
        self.remember_settings(settings)?;

        let result = self
            .handler
            .process(source, crop, &settings, || cancel_flag.load(Ordering::SeqCst))
            .await;

        self.finish(request_id)?;

        if let Err(err) = &result {
            log::warn!(
                "⚠️ 签名处理失败 - request_id: {} stage: {} code: {} 错误: {}",
                request_id,
                err.stage(),
                err.code(),
                err
            );
        }

        result
    }

    /// 登记一个请求并返回它的取消标志。
    pub fn begin(&self, request_id: &str) -> Result<Arc<AtomicBool>, ImageError> {
        let flag = Arc::new(AtomicBool::new(false));
        let mut guard = self
            .cancel_flags
            .lock()
            .map_err(|_| ImageError::ResourceLimit("取消标志锁已中毒".to_string()))?;
        guard.insert(request_id.to_string(), Arc::clone(&flag));
        Ok(flag)
    }

    fn finish(&self, request_id: &str) -> Result<(), ImageError> {
        let mut guard = self
            .cancel_flags
            .lock()
            .map_err(|_| ImageError::ResourceLimit("取消标志锁已中毒".to_string()))?;
        guard.remove(request_id);
        Ok(())
    }

    /// 取消进行中的请求；请求不存在时返回 `false`。
    pub fn cancel(&self, request_id: &str) -> Result<bool, ImageError> {
        let guard = self
            .cancel_flags
            .lock()
            .map_err(|_| ImageError::ResourceLimit("取消标志锁已中毒".to_string()))?;

        if let Some(flag) = guard.get(request_id) {
            flag.store(true, Ordering::SeqCst);
            log::info!("🛑 已请求取消签名处理 - request_id: {}", request_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// 设置性能档位。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use ttd_signature::image_handler::SignatureService;
    ///
    /// let service = SignatureService::new()?;
    /// service.set_performance_profile("speed")?;
    /// # Ok::<(), ttd_signature::image_handler::ImageError>(())
    /// ```
    pub fn set_performance_profile(&self, profile: &str) -> Result<(), ImageError> {
        let profile = ImagePerformanceProfile::from_str(profile)?;
        self.handler.set_performance_profile(profile)
    }

    /// 获取当前生效性能档位（字符串）。
    pub fn get_performance_profile(&self) -> Result<String, ImageError> {
        let profile = self.handler.get_performance_profile()?;
        Ok(profile.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn service_set_and_get_profile_roundtrip() {
        let service = SignatureService::new().expect("service init failed");

        for profile in ["quality", "balanced", "speed"] {
            service.set_performance_profile(profile).expect("set profile should succeed");
            assert_eq!(service.get_performance_profile().expect("get profile should succeed"), profile);
        }
    }

    #[test]
    fn service_rejects_unknown_profile() {
        let service = SignatureService::new().expect("service init failed");
        assert!(service.set_performance_profile("turbo").is_err());
    }

    #[test]
    fn cancel_marks_registered_request_only() {
        let service = SignatureService::new().expect("service init failed");
        let flag = service.begin("req-1").expect("begin failed");

        assert!(!service.cancel("req-2").expect("cancel failed"));
        assert!(!flag.load(Ordering::SeqCst));

        assert!(service.cancel("req-1").expect("cancel failed"));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn remembered_settings_are_visible_across_threads() {
        let service = Arc::new(SignatureService::new().expect("service init failed"));
        let custom = TransparencySettings { white_threshold: 200, black_threshold: 10, use_advanced_mode: false };

        let writer = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.remember_settings(custom))
        };
        writer.join().expect("thread panicked").expect("remember failed");

        assert_eq!(service.remembered_settings().expect("read failed"), custom);
    }

    #[tokio::test]
    async fn make_transparent_remembers_settings_even_on_fallback() {
        let service = SignatureService::new().expect("service init failed");
        let custom = TransparencySettings { white_threshold: 210, ..TransparencySettings::default() };

        let output = service.make_transparent("ftp://nope/sig.png", custom).await;

        assert_eq!(output, super::super::fallback_placeholder());
        assert_eq!(service.remembered_settings().expect("read failed"), custom);
    }

    #[tokio::test]
    async fn finished_request_can_no_longer_be_cancelled() {
        let service = SignatureService::new().expect("service init failed");

        let result = service
            .process(
                "req-missing",
                &ImageSource::FilePath("/definitely/not/here.png".to_string()),
                &CropSpec::full(10, 10),
                TransparencySettings::default(),
            )
            .await;

        assert!(matches!(result, Err(ImageError::FileSystem(_))));
        assert!(!service.cancel("req-missing").expect("cancel failed"));
    }
}
