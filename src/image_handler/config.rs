//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `ImageConfig`，保证运行时行为可观测、可调整、可测试。
//! 性能档位（quality / balanced / speed）作为高层语义，映射到透明化阶段的工作分辨率。
//!
//! 透明化阈值（`TransparencySettings`）不放在这里：它是每次调用显式传入的值对象，
//! 不属于处理器的运行时状态。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置。
//! - `ImagePerformanceProfile` 负责档位字符串解析与反向输出。
//! - `apply_performance_profile` 将档位转换为具体阈值。
//! - `infer_performance_profile` 用于从当前配置反推档位。

use image::imageops::FilterType;

use super::ImageError;

/// 图片处理配置。
///
/// 字段覆盖了加载、解码、透明化工作分辨率与自动裁边四个阶段。
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// 下载/读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 网络下载超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 远程图片代理地址；设置后远程签名通过 `{proxy}?url=<目标>` 拉取。
    pub image_proxy_url: Option<String>,
    /// 访问代理 / 远程图片时附带的 Bearer 凭据。
    pub bearer_token: Option<String>,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码与旋转画布允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 超大图片是否先在降采样副本上定位墨迹区域。
    ///
    /// 透明化与裁边始终在原始分辨率上完成，降采样只用于缩小扫描范围。
    pub adaptive_resize: bool,
    /// 降采样后目标像素上限。
    pub working_target_pixels: u64,
    /// 降采样后宽/高单边最大值。
    pub working_max_dimension: u32,
    /// 降采样滤镜策略。
    pub resize_filter: FilterType,
    /// 自动裁边时在墨迹包围盒四周保留的边距（像素）。
    pub autocrop_padding: u32,
    /// 远程图片下载缓存存活时间（秒）。
    pub fetch_cache_ttl_secs: u64,
    /// 远程图片下载缓存最大条目数。
    pub fetch_cache_entries: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 20 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            image_proxy_url: None,
            bearer_token: None,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 256 * 1024 * 1024,
            adaptive_resize: false,
            working_target_pixels: 40_000_000,
            working_max_dimension: 8192,
            resize_filter: FilterType::CatmullRom,
            autocrop_padding: 10,
            fetch_cache_ttl_secs: 25,
            fetch_cache_entries: 24,
        }
    }
}

/// 图片性能档位（面向产品/用户语义）。
///
/// - `Quality`：透明化按原始分辨率扫描
/// - `Balanced`：质量与耗时平衡
/// - `Speed`：优先扫描速度（手机大图先在降采样副本上定位墨迹）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePerformanceProfile {
    Quality,
    Balanced,
    Speed,
}

impl ImagePerformanceProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use ttd_signature::image_handler::ImagePerformanceProfile;
    ///
    /// let p = ImagePerformanceProfile::from_str("balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), ttd_signature::image_handler::ImageError>(())
    /// ```
    pub fn from_str(profile: &str) -> Result<Self, ImageError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ImageError::InvalidFormat(format!(
                "未知性能档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    /// 将档位输出为稳定字符串，供设置文件持久化。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

impl ImageConfig {
    /// 基于当前参数反推性能档位。
    pub(crate) fn infer_performance_profile(&self) -> ImagePerformanceProfile {
        if !self.adaptive_resize {
            return ImagePerformanceProfile::Quality;
        }

        if self.working_target_pixels <= 2_000_000 || self.working_max_dimension <= 1600 {
            return ImagePerformanceProfile::Speed;
        }

        ImagePerformanceProfile::Balanced
    }

    /// 应用指定性能档位到实际参数。
    pub(crate) fn apply_performance_profile(&mut self, profile: ImagePerformanceProfile) {
        match profile {
            ImagePerformanceProfile::Quality => {
                self.adaptive_resize = false;
                self.working_target_pixels = self.max_decoded_pixels;
                self.working_max_dimension = 8192;
                self.resize_filter = FilterType::CatmullRom;
            }
            ImagePerformanceProfile::Balanced => {
                self.adaptive_resize = true;
                self.working_target_pixels = 6_000_000;
                self.working_max_dimension = 3000;
                self.resize_filter = FilterType::Triangle;
            }
            ImagePerformanceProfile::Speed => {
                self.adaptive_resize = true;
                self.working_target_pixels = 2_000_000;
                self.working_max_dimension = 1600;
                self.resize_filter = FilterType::Nearest;
            }
        }
    }
}
