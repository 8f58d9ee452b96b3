//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `ImageHandler` 只负责流程编排与配置管理，不关心调用方是哪一个页面。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 按来源加载原始字节并解码
//! 3. 几何变换（裁剪 / 旋转）
//! 4. 透明化与自动裁边
//!
//! 每一次调用各自分配画布，不在并发调用之间共享任何可变图像状态。
//!
//! ## 降级策略
//!
//! - `apply_crop`：任何失败返回空串，调用方必须据此中止流程
//! - `make_transparent`：远程拉取失败返回占位图；解码失败返回原始输入
//! - `crop_image` / `make_transparent_image` / `process`：返回带类型的 `ImageError`
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ImageConfig>>` 支持运行时动态切档。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `load/crop/transparency/total` 阶段耗时，便于性能诊断。

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use image::{Rgba, RgbaImage};
use lru::LruCache;
use once_cell::sync::Lazy;

use super::source::{ProcessedImage, SourceImage};
use super::transform::{self, CropSpec, SafeArea};
use super::transparency::{self, TransparencySettings};
use super::{ImageConfig, ImageError, ImagePerformanceProfile, ImageSource, data_url};

/// 远程签名不可用时返回的占位图：浅灰描边的透明矩形。
static FALLBACK_PLACEHOLDER: Lazy<String> = Lazy::new(|| {
    let (width, height) = (120, 48);
    let border = Rgba([200, 200, 200, 255]);
    let canvas = RgbaImage::from_fn(width, height, |x, y| {
        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
            border
        } else {
            Rgba([0, 0, 0, 0])
        }
    });

    ProcessedImage::encode(&canvas)
        .map(|image| image.to_data_url())
        .unwrap_or_default()
});

/// 固定占位图（Data URL）。
pub fn fallback_placeholder() -> &'static str {
    FALLBACK_PLACEHOLDER.as_str()
}

/// 图片处理器。
///
/// 封装了配置状态与远程图片下载缓存，并编排各子模块实现完整流程。
pub struct ImageHandler {
    pub(super) config: Arc<RwLock<ImageConfig>>,
    pub(super) fetch_cache: Mutex<LruCache<String, CachedFetch>>,
}

pub(super) struct CachedFetch {
    pub(super) created_at: Instant,
    pub(super) bytes: Vec<u8>,
}

impl ImageHandler {
    /// 根据初始配置创建处理器。
    ///
    /// # 示例
    /// ```rust
    /// use ttd_signature::image_handler::{ImageConfig, ImageHandler};
    ///
    /// let handler = ImageHandler::new(ImageConfig::default())?;
    /// # Ok::<(), ttd_signature::image_handler::ImageError>(())
    /// ```
    pub fn new(config: ImageConfig) -> Result<Self, ImageError> {
        let capacity = NonZeroUsize::new(config.fetch_cache_entries).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            fetch_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<ImageConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 原地修改配置（代理地址、凭据等由设置文件注入）。
    pub fn update_config(&self, apply: impl FnOnce(&mut ImageConfig)) -> Result<(), ImageError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        apply(&mut config);
        Ok(())
    }

    /// 设置性能档位。
    pub fn set_performance_profile(&self, profile: ImagePerformanceProfile) -> Result<(), ImageError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_performance_profile(profile);

        log::info!(
            "⚙️ 已切换图片性能档位：{:?}（adaptive_resize={}, target_pixels={}, max_dim={}, filter={:?}）",
            profile,
            config.adaptive_resize,
            config.working_target_pixels,
            config.working_max_dimension,
            config.resize_filter
        );

        Ok(())
    }

    /// 获取当前生效档位。
    pub fn get_performance_profile(&self) -> Result<ImagePerformanceProfile, ImageError> {
        let config = self
            .config
            .read()
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_performance_profile())
    }

    /// 加载并解码任意来源的图片。
    pub async fn load_source(&self, source: &ImageSource) -> Result<SourceImage, ImageError> {
        let config = self.config_snapshot()?;
        self.load_source_with(source, &config).await
    }

    async fn load_source_with(
        &self,
        source: &ImageSource,
        config: &ImageConfig,
    ) -> Result<SourceImage, ImageError> {
        let raw = match source {
            ImageSource::Url(url) => self.load_from_url(url, config).await?,
            ImageSource::Base64(data) => self.load_from_base64(data, config)?,
            ImageSource::FilePath(path) => self.load_from_file(path, config)?,
        };
        self.decode_source(raw, config)
    }

    /// 几何变换阶段（带类型版本）。
    pub async fn crop_image(
        &self,
        source: &ImageSource,
        crop: &CropSpec,
    ) -> Result<ProcessedImage, ImageError> {
        let config = self.config_snapshot()?;
        let image = self.load_source_with(source, &config).await?;
        let canvas = Self::run_crop(&image, crop, &config)?;
        ProcessedImage::encode(&canvas)
    }

    /// 几何变换阶段：返回裁剪结果的 PNG Data URL。
    ///
    /// 失败时返回空串，调用方需据此中止后续处理。
    pub async fn apply_crop(&self, source: &ImageSource, crop: &CropSpec) -> String {
        match self.crop_image(source, crop).await {
            Ok(image) => image.to_data_url(),
            Err(err) => {
                log::warn!("⚠️ 裁剪失败，返回空结果：{}", err);
                String::new()
            }
        }
    }

    /// 透明化阶段（带类型版本）。
    pub async fn make_transparent_image(
        &self,
        source: &ImageSource,
        settings: &TransparencySettings,
    ) -> Result<ProcessedImage, ImageError> {
        let config = self.config_snapshot()?;
        let image = self.load_source_with(source, &config).await?;
        let canvas = self.run_transparency(image.into_pixels(), settings, &config)?;
        ProcessedImage::encode(&canvas)
    }

    /// 透明化阶段：输入 Data URL 或远程 URL，始终返回一个 Data URL。
    ///
    /// - 远程拉取失败 / 非图片 / URL 非法：返回固定占位图
    /// - 解码或处理失败：返回处理前的 Data URL
    pub async fn make_transparent(&self, input: &str, settings: &TransparencySettings) -> String {
        let data_url = if data_url::is_data_url(input) {
            input.trim().to_string()
        } else {
            match self.fetch_as_data_url(input).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    log::warn!(
                        "⚠️ 远程签名拉取失败，使用占位图 - URL: {} 错误: {}",
                        Self::redact_url_for_log(input),
                        err
                    );
                    return fallback_placeholder().to_string();
                }
            }
        };

        match self
            .make_transparent_image(&ImageSource::Base64(data_url.clone()), settings)
            .await
        {
            Ok(image) => image.to_data_url(),
            Err(err) => {
                log::warn!("⚠️ 透明化失败，按原图返回：{}", err);
                data_url
            }
        }
    }

    /// 拉取远程图片并转成 Data URL。
    pub async fn fetch_as_data_url(&self, url: &str) -> Result<String, ImageError> {
        let config = self.config_snapshot()?;
        let raw = self.load_from_url(url.trim(), &config).await?;
        let mime = infer::get(&raw.bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("image/png");
        Ok(data_url::encode(mime, &raw.bytes))
    }

    /// 完整流水线：裁剪 → 透明化。
    ///
    /// 在进入透明化之前检查 `is_cancelled`，对应裁剪弹窗的“取消”。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use ttd_signature::image_handler::{CropSpec, ImageConfig, ImageHandler, ImageSource, TransparencySettings};
    ///
    /// # async fn demo() -> Result<(), ttd_signature::image_handler::ImageError> {
    /// let handler = ImageHandler::new(ImageConfig::default())?;
    /// let processed = handler
    ///     .process(
    ///         &ImageSource::FilePath("scan.jpg".into()),
    ///         &CropSpec::full(800, 400),
    ///         &TransparencySettings::default(),
    ///         || false,
    ///     )
    ///     .await?;
    /// println!("{}", processed.to_data_url());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn process<C>(
        &self,
        source: &ImageSource,
        crop: &CropSpec,
        settings: &TransparencySettings,
        is_cancelled: C,
    ) -> Result<ProcessedImage, ImageError>
    where
        C: Fn() -> bool + Send + Sync,
    {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let load_start = Instant::now();
        let image = self.load_source_with(source, &config).await?;
        let load_elapsed = load_start.elapsed();
        if is_cancelled() {
            return Err(ImageError::Cancelled("裁剪已取消".to_string()));
        }

        let crop_start = Instant::now();
        let cropped = Self::run_crop(&image, crop, &config)?;
        drop(image);
        let crop_elapsed = crop_start.elapsed();
        if is_cancelled() {
            return Err(ImageError::Cancelled("裁剪已取消，跳过透明化".to_string()));
        }

        let transparency_start = Instant::now();
        let canvas = self.run_transparency(cropped, settings, &config)?;
        let processed = ProcessedImage::encode(&canvas)?;
        let transparency_elapsed = transparency_start.elapsed();

        log::info!(
            "✅ 签名处理完成 - load={}ms crop={}ms transparency={}ms total={}ms 输出: {}x{}",
            load_elapsed.as_millis(),
            crop_elapsed.as_millis(),
            transparency_elapsed.as_millis(),
            total_start.elapsed().as_millis(),
            processed.width(),
            processed.height()
        );

        Ok(processed)
    }

    fn run_crop(
        image: &SourceImage,
        crop: &CropSpec,
        config: &ImageConfig,
    ) -> Result<RgbaImage, ImageError> {
        crop.validate()?;
        let safe = SafeArea::for_source(image.width(), image.height());
        Self::validate_memory_limits(config, safe.side, safe.side)?;
        Self::validate_memory_limits(config, crop.width, crop.height)?;

        transform::crop_and_rotate(image, crop)
    }

    fn run_transparency(
        &self,
        canvas: RgbaImage,
        settings: &TransparencySettings,
        config: &ImageConfig,
    ) -> Result<RgbaImage, ImageError> {
        let (width, height) = canvas.dimensions();

        let guided = match self.prepare_working_image(&canvas, config)? {
            Some(mut working) => {
                let hint = transparency::apply_transparency(&mut working, settings).ink_bounds;
                hint.and_then(|hint| {
                    let margin = width
                        .div_ceil(working.width().max(1))
                        .max(height.div_ceil(working.height().max(1)))
                        + 1;
                    let region = hint.scaled_region(working.dimensions(), (width, height), margin);
                    transparency::make_transparent_canvas_within(
                        &canvas,
                        region,
                        settings,
                        config.autocrop_padding,
                    )
                })
            }
            None => None,
        };

        let (output, report) = match guided {
            Some(result) => result,
            None => transparency::make_transparent_canvas(canvas, settings, config.autocrop_padding),
        };

        log::debug!(
            "🫥 透明化：{}x{} -> {}x{}（white={} black={} flat={} soft={} ink={}）",
            width,
            height,
            output.width(),
            output.height(),
            report.above_white,
            report.below_black,
            report.flat_gray,
            report.soft_edge,
            report.ink_bounds.is_some()
        );

        Ok(output)
    }
}
