//! # 解码与工作分辨率模块
//!
//! ## 设计思路
//!
//! 将“字节 → 位图”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素 / 内存上限快速拒绝
//! 3. 完整解码为 RGBA
//! 4. 透明化阶段按档位决定是否生成降采样副本定位墨迹（输出始终保持原图分辨率）

use fast_image_resize as fr;
use image::{GenericImageView, ImageBuffer, RgbaImage, Rgba};
use std::io::Cursor;

use super::source::{RawImageData, SourceImage};
use super::{ImageConfig, ImageError, ImageHandler};

impl ImageHandler {
    /// 将原始字节解码为源位图。
    pub(crate) fn decode_source(
        &self,
        raw: RawImageData,
        config: &ImageConfig,
    ) -> Result<SourceImage, ImageError> {
        image::guess_format(&raw.bytes)
            .map_err(|e| ImageError::InvalidFormat(format!("不支持的图片格式：{}", e)))?;

        let (header_width, header_height) = Self::inspect_dimensions_from_memory(&raw.bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_memory_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory(&raw.bytes)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        Self::validate_pixel_limits(config, width, height)?;

        log::debug!(
            "✅ 图片解码成功 - 来源: {} 尺寸: {}x{}",
            raw.source_hint,
            width,
            height
        );

        Ok(SourceImage::from_rgba(decoded.to_rgba8()))
    }

    /// 仅通过内存中的图片头信息读取宽高。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| ImageError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(config: &ImageConfig, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    /// 校验 `width x height` 的 RGBA 画布是否在内存预算内。
    ///
    /// 旋转安全画布同样走这里。
    pub(crate) fn validate_memory_limits(
        config: &ImageConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ImageError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit("画布内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "画布预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    /// 按配置为透明化阶段生成降采样扫描副本。
    ///
    /// 手机拍摄的签名照片动辄上千万像素，逐像素扫描会长时间阻塞调用线程。
    /// 返回 `None` 表示无需降采样，直接在原图上扫描。
    pub(crate) fn prepare_working_image(
        &self,
        image: &RgbaImage,
        config: &ImageConfig,
    ) -> Result<Option<RgbaImage>, ImageError> {
        if !config.adaptive_resize {
            return Ok(None);
        }

        let (width, height) = image.dimensions();
        let source_pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

        let over_dimension =
            width > config.working_max_dimension || height > config.working_max_dimension;
        let over_pixels = source_pixels > config.working_target_pixels;

        if !over_dimension && !over_pixels {
            return Ok(None);
        }

        let dimension_scale = (config.working_max_dimension as f64 / width as f64)
            .min(config.working_max_dimension as f64 / height as f64);
        let pixel_scale = (config.working_target_pixels as f64 / source_pixels as f64).sqrt();

        let scale = dimension_scale.min(pixel_scale).min(1.0);

        if scale <= 0.0 {
            return Err(ImageError::ResourceLimit("缩放比例计算异常".to_string()));
        }

        let target_width = ((width as f64 * scale).floor() as u32).max(1);
        let target_height = ((height as f64 * scale).floor() as u32).max(1);

        log::info!(
            "🧩 墨迹定位降采样：{}x{} -> {}x{}（filter={:?}）",
            width,
            height,
            target_width,
            target_height,
            config.resize_filter
        );

        match Self::resize_with_fast_image_resize(image, target_width, target_height, config.resize_filter) {
            Ok(resized) => Ok(Some(resized)),
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 降采样失败，回退 image::imageops::resize：{}", err);
                Ok(Some(image::imageops::resize(
                    image,
                    target_width,
                    target_height,
                    config.resize_filter,
                )))
            }
        }
    }

    fn resize_with_fast_image_resize(
        image: &RgbaImage,
        target_width: u32,
        target_height: u32,
        filter: image::imageops::FilterType,
    ) -> Result<RgbaImage, ImageError> {
        let (src_width, src_height) = image.dimensions();

        let src_image = fr::images::Image::from_vec_u8(
            src_width,
            src_height,
            image.as_raw().clone(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(Self::to_fast_filter(filter)));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
            .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
    }

    fn to_fast_filter(filter: image::imageops::FilterType) -> fr::FilterType {
        match filter {
            image::imageops::FilterType::Nearest => fr::FilterType::Box,
            image::imageops::FilterType::Triangle => fr::FilterType::Bilinear,
            image::imageops::FilterType::CatmullRom => fr::FilterType::CatmullRom,
            image::imageops::FilterType::Gaussian => fr::FilterType::Mitchell,
            image::imageops::FilterType::Lanczos3 => fr::FilterType::Lanczos3,
        }
    }
}
