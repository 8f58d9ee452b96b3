//! 输出目录管理模块
//!
//! # 设计思路
//!
//! 统一管理处理后签名 PNG 的落盘路径，支持用户自定义目录，
//! 并在目录不存在时自动创建。
//!
//! # 实现思路
//!
//! - 优先使用设置中配置的自定义目录。
//! - 未设置时回退到当前工作目录下的 `ttd-output`。
//! - 文件名为 `ttd_<本地时间戳>.png`，同一毫秒内重复时追加序号。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;
use crate::image_handler::ProcessedImage;

const DEFAULT_OUTPUT_DIR: &str = "ttd-output";

/// 输出目录信息
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub path: String,
    pub total_size: u64,
    pub file_count: u64,
}

/// 获取输出目录
///
/// # 返回
/// - `Ok(PathBuf)`：可用的输出目录
/// - `Err(AppError::Storage)`：无法创建目录
pub fn get_output_dir(custom_dir: Option<&str>) -> Result<PathBuf, AppError> {
    let dir = match custom_dir.map(str::trim).filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(DEFAULT_OUTPUT_DIR),
    };

    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Storage(format!("创建输出目录 '{}' 失败: {}", dir.display(), e))
        })?;
    }
    Ok(dir)
}

/// 将处理结果保存为 `ttd_<时间戳>.png`，返回完整路径。
pub fn save_processed(dir: &Path, image: &ProcessedImage) -> Result<PathBuf, AppError> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();

    let mut path = dir.join(format!("ttd_{}.png", stamp));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!("ttd_{}_{}.png", stamp, suffix));
        suffix += 1;
    }

    fs::write(&path, image.png_bytes())?;
    log::info!(
        "💾 签名已保存 - 路径: {} 尺寸: {}x{}",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(path)
}

/// 直接写到指定文件。
pub fn save_processed_to(path: &Path, image: &ProcessedImage) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, image.png_bytes())?;
    Ok(())
}

/// 获取输出目录信息（路径 + 占用大小 + 文件数）
pub fn get_output_dir_info(custom_dir: Option<&str>) -> Result<StorageInfo, AppError> {
    let dir = get_output_dir(custom_dir)?;
    let mut total_size: u64 = 0;
    let mut file_count: u64 = 0;

    if let Ok(entries) = fs::read_dir(&dir) {
        for entry in entries.flatten() {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    total_size += metadata.len();
                    file_count += 1;
                }
            }
        }
    }

    Ok(StorageInfo {
        path: dir.to_string_lossy().to_string(),
        total_size,
        file_count,
    })
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::image_handler::{TransparencySettings, make_transparent_canvas};

    fn unique_temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        std::env::temp_dir().join(format!("ttd-storage-test-{nanos}"))
    }

    fn processed() -> ProcessedImage {
        let mut canvas = RgbaImage::from_pixel(30, 30, Rgba([255, 255, 255, 255]));
        canvas.put_pixel(15, 15, Rgba([20, 40, 160, 255]));
        let (canvas, _) = make_transparent_canvas(canvas, &TransparencySettings::default(), 10);
        let url = {
            let mut cursor = std::io::Cursor::new(Vec::new());
            image::DynamicImage::ImageRgba8(canvas)
                .write_to(&mut cursor, image::ImageFormat::Png)
                .expect("encode");
            crate::image_handler::data_url::encode_png(&cursor.into_inner())
        };
        ProcessedImage::from_png_data_url(&url).expect("valid png")
    }

    #[test]
    fn custom_dir_is_created_and_reported() {
        let dir = unique_temp_dir();
        let dir_str = dir.to_string_lossy().to_string();

        let resolved = get_output_dir(Some(&dir_str)).expect("create dir");
        assert!(resolved.exists());

        let first = save_processed(&resolved, &processed()).expect("save first");
        let second = save_processed(&resolved, &processed()).expect("save second");
        assert_ne!(first, second);
        assert!(first.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with("ttd_")));

        let info = get_output_dir_info(Some(&dir_str)).expect("dir info");
        assert_eq!(info.file_count, 2);
        assert!(info.total_size > 0);

        let _ = fs::remove_dir_all(dir);
    }
}
