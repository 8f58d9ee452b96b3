//! # 签名图片处理模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块将“图片来源识别 → 加载校验 → 解码 → 几何变换 → 透明化裁边”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `service`：承载可注入状态（`SignatureService`）
//! - `handler`：编排整条处理流水线与降级策略
//! - `loader`：负责 URL/Base64/文件加载与安全校验
//! - `decode`：负责解码、像素限制、工作分辨率降采样
//! - `transform`：阶段一，旋转安全画布 + 裁剪
//! - `transparency`：阶段二，逐像素 alpha 重分配 + 自动裁边
//! - `config/error/source/data_url`：配置、错误、中间数据模型、Data URL 编解码
//!
//! ## 新同事快速上手
//!
//! ```text
//! 调用方（CLI / 界面）
//!    ↓
//! service.rs（状态持有、取消标志、记住阈值）
//!    ↓
//! handler.rs（统一编排 + 阶段耗时日志 + 降级）
//!    ├─ loader.rs（来源加载 + URL/体积安全校验 + 拉取缓存）
//!    ├─ decode.rs（解码 + 像素限制 + 降采样）
//!    ├─ transform.rs（旋转 + 裁剪）
//!    └─ transparency.rs（透明化 + 自动裁边）
//!    ↓
//! ProcessedImage / Data URL
//! ```
//!
//! ## 分层职责建议
//!
//! - 配置与策略变更优先改 `config.rs`
//! - 业务流程顺序或降级规则变更优先改 `handler.rs`
//! - 单阶段算法优化分别改 `transform/transparency`

mod config;
pub mod data_url;
mod decode;
mod error;
mod handler;
mod loader;
mod service;
mod source;
mod transform;
mod transparency;

pub use config::{ImageConfig, ImagePerformanceProfile};
pub use error::ImageError;
pub use handler::{ImageHandler, fallback_placeholder};
pub use service::SignatureService;
pub use source::{ImageSource, ProcessedImage, SourceImage};
pub use transform::{CropSpec, SafeArea, crop_and_rotate};
pub use transparency::{
    InkBounds, PixelVerdict, ScanReport, TransparencySettings, apply_transparency, classify_pixel,
    make_transparent_canvas,
};
