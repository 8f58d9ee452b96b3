//! # 透明化与自动裁边阶段
//!
//! ## 设计思路
//!
//! 签名照片 / 扫描件的背景是纸张白、阴影黑和扫描产生的平坦灰，墨迹则颜色更深或带有色偏。
//! 逐像素按亮度与色差重新分配 alpha，再把画布收紧到墨迹包围盒，
//! 使签名在打印文档里以固定尺寸合成时大小与位置一致。
//!
//! 阈值通过 `TransparencySettings` 显式传入，本阶段是输入的纯函数。
//!
//! ## 规则（高级模式）
//!
//! | 条件 | alpha |
//! |------|-------|
//! | 亮度 > 白阈值 或 亮度 < 黑阈值 | 0 |
//! | 色差 < 15 且 100 < 亮度 < 200 | 0 |
//! | 亮度 > 220 | `max(0, 255 - (亮度 - 220) * 10)` |
//! | 其他 | 保持不变 |
//!
//! 简单模式只保留第一条。

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// 平坦灰判定的色差上限。
const FLAT_GRAY_MAX_VARIANCE: u8 = 15;
const FLAT_GRAY_MIN_BRIGHTNESS: f32 = 100.0;
const FLAT_GRAY_MAX_BRIGHTNESS: f32 = 200.0;
/// 软过渡起点与斜率。
const SOFT_FALLOFF_START: f32 = 220.0;
const SOFT_FALLOFF_SLOPE: f32 = 10.0;

/// 透明化阈值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransparencySettings {
    pub white_threshold: u8,
    pub black_threshold: u8,
    pub use_advanced_mode: bool,
}

impl Default for TransparencySettings {
    fn default() -> Self {
        Self {
            white_threshold: 235,
            black_threshold: 35,
            use_advanced_mode: true,
        }
    }
}

/// 像素被判定为透明的原因，供统计与测试使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelVerdict {
    /// 高于白阈值。
    AboveWhite,
    /// 低于黑阈值。
    BelowBlack,
    /// 平坦灰（扫描噪点）。
    FlatGray,
    /// 近白软过渡，携带新 alpha。
    SoftEdge(u8),
    /// 墨迹，alpha 不变。
    Ink,
}

/// 按设置判定单个像素。
pub fn classify_pixel(r: u8, g: u8, b: u8, settings: &TransparencySettings) -> PixelVerdict {
    let brightness = (r as f32 + g as f32 + b as f32) / 3.0;

    if brightness > settings.white_threshold as f32 {
        return PixelVerdict::AboveWhite;
    }
    if brightness < settings.black_threshold as f32 {
        return PixelVerdict::BelowBlack;
    }
    if !settings.use_advanced_mode {
        return PixelVerdict::Ink;
    }

    let variance = r.max(g).max(b) - r.min(g).min(b);
    if variance < FLAT_GRAY_MAX_VARIANCE
        && brightness > FLAT_GRAY_MIN_BRIGHTNESS
        && brightness < FLAT_GRAY_MAX_BRIGHTNESS
    {
        return PixelVerdict::FlatGray;
    }

    if brightness > SOFT_FALLOFF_START {
        let alpha = (255.0 - (brightness - SOFT_FALLOFF_START) * SOFT_FALLOFF_SLOPE).max(0.0);
        return PixelVerdict::SoftEdge(alpha.round() as u8);
    }

    PixelVerdict::Ink
}

/// 墨迹包围盒（闭区间）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InkBounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl InkBounds {
    fn single(x: u32, y: u32) -> Self {
        Self { min_x: x, min_y: y, max_x: x, max_y: y }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// 四周外扩 `padding` 像素并限制在画布内，返回 `(x, y, width, height)`。
    pub fn padded(&self, padding: u32, canvas_width: u32, canvas_height: u32) -> (u32, u32, u32, u32) {
        let x = self.min_x.saturating_sub(padding);
        let y = self.min_y.saturating_sub(padding);
        let right = self
            .max_x
            .saturating_add(padding)
            .min(canvas_width.saturating_sub(1));
        let bottom = self
            .max_y
            .saturating_add(padding)
            .min(canvas_height.saturating_sub(1));

        (x, y, right - x + 1, bottom - y + 1)
    }

    /// 把 `from` 尺寸画布上的包围盒映射到 `to` 尺寸画布，四周多留 `margin` 像素。
    ///
    /// 返回 `(x, y, width, height)`，已限制在 `to` 画布内。
    pub fn scaled_region(&self, from: (u32, u32), to: (u32, u32), margin: u32) -> (u32, u32, u32, u32) {
        let start = |v: u32, f: u32, t: u32| (v as u64 * t as u64 / f.max(1) as u64) as u32;
        let end = |v: u32, f: u32, t: u32| ((v as u64 + 1) * t as u64).div_ceil(f.max(1) as u64) as u32;

        let x = start(self.min_x, from.0, to.0).saturating_sub(margin).min(to.0.saturating_sub(1));
        let y = start(self.min_y, from.1, to.1).saturating_sub(margin).min(to.1.saturating_sub(1));
        let right = end(self.max_x, from.0, to.0).saturating_add(margin).min(to.0).max(x + 1);
        let bottom = end(self.max_y, from.1, to.1).saturating_add(margin).min(to.1).max(y + 1);

        (x, y, right - x, bottom - y)
    }
}

/// 单次扫描的统计结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub above_white: u64,
    pub below_black: u64,
    pub flat_gray: u64,
    pub soft_edge: u64,
    pub ink_bounds: Option<InkBounds>,
}

/// 就地改写 alpha，并返回墨迹包围盒等统计信息。
///
/// 墨迹 = 最终 alpha 非零的像素。
pub fn apply_transparency(canvas: &mut RgbaImage, settings: &TransparencySettings) -> ScanReport {
    let mut report = ScanReport::default();

    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let [r, g, b, _] = pixel.0;
        match classify_pixel(r, g, b, settings) {
            PixelVerdict::AboveWhite => {
                pixel.0[3] = 0;
                report.above_white += 1;
            }
            PixelVerdict::BelowBlack => {
                pixel.0[3] = 0;
                report.below_black += 1;
            }
            PixelVerdict::FlatGray => {
                pixel.0[3] = 0;
                report.flat_gray += 1;
            }
            PixelVerdict::SoftEdge(alpha) => {
                pixel.0[3] = alpha;
                report.soft_edge += 1;
            }
            PixelVerdict::Ink => {}
        }

        if pixel.0[3] > 0 {
            match report.ink_bounds.as_mut() {
                Some(bounds) => bounds.include(x, y),
                None => report.ink_bounds = Some(InkBounds::single(x, y)),
            }
        }
    }

    report
}

/// 透明化 + 自动裁边。
///
/// 找到墨迹时输出外扩后的包围盒区域，否则原尺寸输出（绝不产生 0 尺寸图片）。
pub fn make_transparent_canvas(
    mut canvas: RgbaImage,
    settings: &TransparencySettings,
    padding: u32,
) -> (RgbaImage, ScanReport) {
    let report = apply_transparency(&mut canvas, settings);

    let Some(bounds) = report.ink_bounds else {
        return (canvas, report);
    };

    let (x, y, width, height) = bounds.padded(padding, canvas.width(), canvas.height());
    let cropped = image::imageops::crop_imm(&canvas, x, y, width, height).to_image();
    (cropped, report)
}

/// 只在 `region` 内定位墨迹，再按原图坐标外扩、裁边并透明化。
///
/// `region` 一般来自降采样副本上的墨迹包围盒，输出与整图扫描一样保持原图分辨率。
/// 区域内找不到墨迹时返回 `None`，调用方应回退到 [`make_transparent_canvas`]。
pub fn make_transparent_canvas_within(
    canvas: &RgbaImage,
    region: (u32, u32, u32, u32),
    settings: &TransparencySettings,
    padding: u32,
) -> Option<(RgbaImage, ScanReport)> {
    let (rx, ry, rw, rh) = region;
    let mut scratch = image::imageops::crop_imm(canvas, rx, ry, rw, rh).to_image();
    let located = apply_transparency(&mut scratch, settings).ink_bounds?;

    let bounds = InkBounds {
        min_x: located.min_x + rx,
        min_y: located.min_y + ry,
        max_x: located.max_x + rx,
        max_y: located.max_y + ry,
    };
    let (x, y, width, height) = bounds.padded(padding, canvas.width(), canvas.height());
    let mut output = image::imageops::crop_imm(canvas, x, y, width, height).to_image();
    let report = apply_transparency(&mut output, settings);

    Some((output, ScanReport { ink_bounds: Some(bounds), ..report }))
}
