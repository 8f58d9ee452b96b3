//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示外部来源语义（远程 URL / Data URL / 本地文件）
//! - `RawImageData` 表示已加载但未解码的字节
//! - `SourceImage` 表示某一次流水线调用独占的已解码位图
//! - `ProcessedImage` 表示已编码为 PNG 的输出，可直接展示或上传

use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbaImage};

use super::{ImageError, data_url};

/// 图片输入来源。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 网络地址来源（历史签名 URL 等）。
    Url(String),
    /// Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
    /// 本地文件路径来源（文件选择 / 相机拍摄落盘）。
    FilePath(String),
}

impl ImageSource {
    /// 按字符串形态推断来源：`data:` 前缀为 Base64，`http(s)://` 为 URL，其余视为本地路径。
    pub fn detect(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("data:") {
            Self::Base64(trimmed.to_string())
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::FilePath(trimmed.to_string())
        }
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 已解码的源位图。
///
/// 由单次流水线调用独占，调用结束（或取消）即随所有权一起释放。
#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: RgbaImage,
}

impl SourceImage {
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub(crate) fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

/// PNG 编码后的处理结果（带 alpha 通道）。
///
/// 字段与构造函数均不对外公开：库外只能从流水线拿到它，
/// 历史列表的上传入口因此收不到未经透明化的原始图片。
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    width: u32,
    height: u32,
    png: Bytes,
}

impl ProcessedImage {
    /// 将 RGBA 画布编码为 PNG。
    pub(crate) fn encode(pixels: &RgbaImage) -> Result<Self, ImageError> {
        let (width, height) = pixels.dimensions();
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(pixels.clone())
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| ImageError::Decode(format!("PNG 编码失败：{}", e)))?;

        Ok(Self {
            width,
            height,
            png: Bytes::from(cursor.into_inner()),
        })
    }

    /// 从流水线自己产出的 Data URL 还原（只接受 PNG 负载）。
    pub(crate) fn from_png_data_url(data_url: &str) -> Result<Self, ImageError> {
        let parsed = data_url::parse(data_url)?;
        let format = image::guess_format(&parsed.bytes)
            .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;
        if format != ImageFormat::Png {
            return Err(ImageError::InvalidFormat(format!(
                "处理结果必须为 PNG，实际为：{:?}",
                format
            )));
        }

        let (width, height) = image::ImageReader::with_format(Cursor::new(&parsed.bytes), ImageFormat::Png)
            .into_dimensions()
            .map_err(|e| ImageError::Decode(format!("无法读取 PNG 尺寸：{}", e)))?;

        Ok(Self {
            width,
            height,
            png: Bytes::from(parsed.bytes),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// PNG 字节（上传时直接作为文件内容）。
    pub fn png_bytes(&self) -> &Bytes {
        &self.png
    }

    /// 输出为 `data:image/png;base64,...`。
    pub fn to_data_url(&self) -> String {
        data_url::encode_png(&self.png)
    }

    /// 重新解码为 RGBA 画布。
    pub fn decode_rgba(&self) -> Result<RgbaImage, ImageError> {
        image::load_from_memory_with_format(&self.png, ImageFormat::Png)
            .map(|img| img.to_rgba8())
            .map_err(|e| ImageError::Decode(format!("PNG 解码失败：{}", e)))
    }
}
