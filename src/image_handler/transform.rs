//! # 几何变换阶段（裁剪 / 旋转）
//!
//! ## 设计思路
//!
//! 旋转后直接裁剪会把转出原图边界的内容切掉，因此分两遍处理：
//!
//! 1. 先把原图居中绘制到一块透明的正方形“安全画布”上并旋转，
//!    边长 `2 * (max(w, h) / 2) * sqrt(2)`，任意角度旋转都不会越界；
//! 2. 再从安全画布中按裁剪框取出 `crop.width x crop.height` 的区域，
//!    裁剪框坐标以“未旋转原图左上角”为基准，超出安全画布的部分保持透明。
//!
//! `zoom_factor` 只影响交互界面里用户最终框出的区域，这里只做合法性校验，不再二次缩放。
//!
//! ## 实现思路
//!
//! 旋转采用逆向映射 + 双线性采样（目标像素 → 源像素），角度为 0 时直接拷贝，
//! 保证“全图裁剪 + 零旋转”得到与原图逐像素一致的结果。

use std::f64::consts::SQRT_2;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use super::ImageError;
use super::source::SourceImage;

/// 裁剪坐标绝对值上限（像素）。
const MAX_CROP_OFFSET: f64 = u32::MAX as f64;

/// 裁剪参数（原图像素坐标）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropSpec {
    pub x: f64,
    pub y: f64,
    pub width: u32,
    pub height: u32,
    /// 旋转角度，允许任意有限值（按 360° 取模）。
    #[serde(default)]
    pub rotation_degrees: f64,
    /// 交互缩放倍数，仅做校验。
    #[serde(default = "default_zoom")]
    pub zoom_factor: f64,
}

fn default_zoom() -> f64 {
    1.0
}

impl CropSpec {
    /// 覆盖整张图、不旋转的裁剪框。
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            rotation_degrees: 0.0,
            zoom_factor: 1.0,
        }
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    /// 归一化到 `[0, 360)`。
    pub fn normalized_rotation(&self) -> f64 {
        let normalized = self.rotation_degrees.rem_euclid(360.0);
        // rem_euclid 对极小负数可能返回 360.0
        if normalized >= 360.0 { 0.0 } else { normalized }
    }

    pub fn validate(&self) -> Result<(), ImageError> {
        if self.width == 0 || self.height == 0 {
            return Err(ImageError::InvalidFormat(format!(
                "裁剪尺寸无效：{}x{}",
                self.width, self.height
            )));
        }
        if !self.x.is_finite() || !self.y.is_finite() || !self.rotation_degrees.is_finite() {
            return Err(ImageError::InvalidFormat("裁剪坐标或角度不是有限数值".to_string()));
        }
        if self.x.abs() > MAX_CROP_OFFSET || self.y.abs() > MAX_CROP_OFFSET {
            return Err(ImageError::InvalidFormat(format!(
                "裁剪坐标超出范围：({}, {})",
                self.x, self.y
            )));
        }
        if !self.zoom_factor.is_finite() || self.zoom_factor <= 0.0 {
            return Err(ImageError::InvalidFormat(format!(
                "缩放倍数必须大于 0：{}",
                self.zoom_factor
            )));
        }
        Ok(())
    }
}

/// 旋转安全画布的几何参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeArea {
    /// 正方形边长。
    pub side: u32,
    /// 未旋转原图左上角在安全画布中的位置。
    pub origin_x: i64,
    pub origin_y: i64,
}

impl SafeArea {
    pub fn for_source(width: u32, height: u32) -> Self {
        let max_dimension = width.max(height) as f64;
        let side = (2.0 * (max_dimension / 2.0) * SQRT_2).ceil() as u32;
        let side = side.max(width).max(height);

        Self {
            side,
            origin_x: ((side - width) / 2) as i64,
            origin_y: ((side - height) / 2) as i64,
        }
    }
}

/// 对源位图执行“旋转 → 裁剪”，返回恰好为裁剪框尺寸的画布。
pub fn crop_and_rotate(source: &SourceImage, crop: &CropSpec) -> Result<RgbaImage, ImageError> {
    crop.validate()?;

    let safe = SafeArea::for_source(source.width(), source.height());
    let rotated = render_safe_area(source.pixels(), safe, crop.normalized_rotation());
    Ok(extract_crop(&rotated, safe, crop))
}

/// 第一遍：绘制到旋转安全画布。
pub(crate) fn render_safe_area(src: &RgbaImage, safe: SafeArea, degrees: f64) -> RgbaImage {
    let mut canvas = RgbaImage::new(safe.side, safe.side);

    if degrees == 0.0 {
        image::imageops::replace(&mut canvas, src, safe.origin_x, safe.origin_y);
        return canvas;
    }

    let (src_w, src_h) = src.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let center_x = safe.origin_x as f64 + src_w as f64 / 2.0;
    let center_y = safe.origin_y as f64 + src_h as f64 / 2.0;
    let half_w = src_w as f64 / 2.0;
    let half_h = src_h as f64 / 2.0;

    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - center_x;
        let dy = y as f64 + 0.5 - center_y;

        // 屏幕坐标系（y 向下）中顺时针旋转的逆变换
        let sx = cos * dx + sin * dy + half_w - 0.5;
        let sy = -sin * dx + cos * dy + half_h - 0.5;

        if sx <= -1.0 || sy <= -1.0 || sx >= src_w as f64 || sy >= src_h as f64 {
            continue;
        }

        *pixel = sample_bilinear(src, sx, sy);
    }

    canvas
}

/// 双线性采样，越界邻居按全透明处理。
fn sample_bilinear(src: &RgbaImage, sx: f64, sy: f64) -> Rgba<u8> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f64;
    let fy = sy - y0 as f64;

    let sample = |px: i64, py: i64| -> [f64; 4] {
        if px < 0 || py < 0 || px >= w || py >= h {
            [0.0; 4]
        } else {
            let p = src.get_pixel(px as u32, py as u32).0;
            [p[0] as f64, p[1] as f64, p[2] as f64, p[3] as f64]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = tl[c] + (tr[c] - tl[c]) * fx;
        let bottom = bl[c] + (br[c] - bl[c]) * fx;
        out[c] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// 第二遍：从安全画布取出裁剪框区域。
pub(crate) fn extract_crop(rotated: &RgbaImage, safe: SafeArea, crop: &CropSpec) -> RgbaImage {
    let offset_x = safe.origin_x.saturating_add(crop.x.round() as i64);
    let offset_y = safe.origin_y.saturating_add(crop.y.round() as i64);
    let side = safe.side as i64;

    let mut out = RgbaImage::new(crop.width, crop.height);
    for (u, v, pixel) in out.enumerate_pixels_mut() {
        let sx = offset_x.saturating_add(u as i64);
        let sy = offset_y.saturating_add(v as i64);
        if sx >= 0 && sy >= 0 && sx < side && sy < side {
            *pixel = *rotated.get_pixel(sx as u32, sy as u32);
        }
    }
    out
}
