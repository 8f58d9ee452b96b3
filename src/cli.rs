//! # 命令行前端
//!
//! ## 设计思路
//!
//! 不依赖界面也能完成签名的裁剪、透明化与历史管理，方便批量处理和排查线上问题。
//! 命令只负责参数到库 API 的映射，结果统一包装成 `Outcome`，由 `main` 决定输出纯文本还是 JSON。
//!
//! ## 实现思路
//!
//! - clap derive 定义子命令：`crop` / `transparent` / `process` / `history` / `info`
//! - 启动时读取设置文件，构造 `SignatureService` 并载入记住的透明化阈值
//! - 处理结果默认写入输出目录，`--output` 可指定文件
//!
//! ## 用法示例
//!
//! ```text
//! ttd-signature crop --input scan.jpg --x 120 --y 40 --width 600 --height 200 --rotate -3.5
//! ttd-signature transparent --input https://intranet.example/ttd/a.png --output a.png
//! ttd-signature process --input scan.jpg --x 0 --y 0 --width 800 --height 300 --remember
//! ttd-signature history list --owner 12345
//! ttd-signature --json history add --owner 12345 --image ttd-output/ttd_20260101.png
//! ```

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use crate::error::AppError;
use crate::history::{HistoryClient, SignatureHistory, StoredSignature};
use crate::image_handler::{
    CropSpec, ImageError, ImageSource, ProcessedImage, SignatureService, TransparencySettings,
    data_url, fallback_placeholder,
};
use crate::settings::AppSettings;
use crate::storage;

// ============================================================================
// 命令行参数定义（clap Derive）
// ============================================================================

/// TTD signature processor.
///
/// Crop, rotate and make signature scans transparent, and manage the
/// per-owner signature history.
#[derive(Parser, Debug)]
#[command(name = "ttd-signature", version, about = "TTD signature image pipeline")]
pub struct Cli {
    /// Settings file. Falls back to $TTD_SETTINGS, then ./ttd-settings.json.
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print machine-readable JSON instead of plain text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rotate and crop a source image (stage 1).
    Crop(CropArgs),
    /// Make a signature transparent and trim it to the ink (stage 2).
    Transparent(TransparentArgs),
    /// Crop, then make transparent, in one run.
    Process(ProcessArgs),
    /// Manage the remote signature history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show the resolved settings file and output directory.
    Info,
}

#[derive(Args, Debug, Clone)]
pub struct CropRect {
    /// Source image: data URL, http(s) URL or local path.
    #[arg(short, long)]
    pub input: String,
    #[arg(long, allow_hyphen_values = true)]
    pub x: f64,
    #[arg(long, allow_hyphen_values = true)]
    pub y: f64,
    #[arg(long)]
    pub width: u32,
    #[arg(long)]
    pub height: u32,
    /// Rotation in degrees, any finite value.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub rotate: f64,
    #[arg(long, default_value_t = 1.0)]
    pub zoom: f64,
}

impl CropRect {
    fn spec(&self) -> CropSpec {
        CropSpec {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            rotation_degrees: self.rotate,
            zoom_factor: self.zoom,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ThresholdArgs {
    /// Brightness above which a pixel becomes transparent (0-255).
    #[arg(long)]
    pub white: Option<u8>,
    /// Brightness below which a pixel becomes transparent (0-255).
    #[arg(long)]
    pub black: Option<u8>,
    /// Only apply the white/black thresholds.
    #[arg(long)]
    pub simple: bool,
    /// Store the thresholds used in the settings file.
    #[arg(long)]
    pub remember: bool,
}

impl ThresholdArgs {
    fn resolve(&self, remembered: TransparencySettings) -> TransparencySettings {
        TransparencySettings {
            white_threshold: self.white.unwrap_or(remembered.white_threshold),
            black_threshold: self.black.unwrap_or(remembered.black_threshold),
            use_advanced_mode: if self.simple { false } else { remembered.use_advanced_mode },
        }
    }
}

#[derive(Args, Debug)]
pub struct CropArgs {
    #[command(flatten)]
    pub rect: CropRect,
    /// Output PNG file. Defaults to a timestamped file in the output directory.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TransparentArgs {
    /// Data URL, http(s) URL or local path.
    #[arg(short, long)]
    pub input: String,
    #[command(flatten)]
    pub thresholds: ThresholdArgs,
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub rect: CropRect,
    #[command(flatten)]
    pub thresholds: ThresholdArgs,
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Upload the result to this owner's history (NPP).
    #[arg(long, value_name = "NPP")]
    pub upload_to: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List stored signatures, active one first.
    List {
        #[arg(long, value_name = "NPP")]
        owner: String,
    },
    /// Upload a signature image (file path or data URL); it is made transparent first.
    Add {
        #[arg(long, value_name = "NPP")]
        owner: String,
        #[arg(long)]
        image: String,
    },
    /// Delete a stored signature.
    Remove {
        #[arg(long, value_name = "NPP")]
        owner: String,
        #[arg(long)]
        path: String,
    },
    /// Mark a stored signature as the active one.
    Activate {
        #[arg(long, value_name = "NPP")]
        owner: String,
        #[arg(long)]
        path: String,
    },
}

// ============================================================================
// 命令结果
// ============================================================================

/// Result of one CLI command: a human line plus structured data for `--json`.
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub message: String,
    pub data: serde_json::Value,
}

impl Outcome {
    fn saved(action: &str, path: &Path, image: &ProcessedImage) -> Self {
        Self {
            message: format!(
                "{} -> {} ({}x{})",
                action,
                path.display(),
                image.width(),
                image.height()
            ),
            data: json!({
                "path": path.to_string_lossy(),
                "width": image.width(),
                "height": image.height(),
            }),
        }
    }

    fn history(owner: &str, entries: &[StoredSignature], selected: Option<&str>) -> Self {
        let lines: Vec<String> = entries
            .iter()
            .map(|entry| format!("{} {}", if entry.is_active { "*" } else { " " }, entry.path))
            .collect();
        let message = if lines.is_empty() {
            format!("{}: no stored signatures", owner)
        } else {
            lines.join("\n")
        };

        Self {
            message,
            data: json!({ "owner": owner, "entries": entries, "selected": selected }),
        }
    }
}

// ============================================================================
// 命令分发
// ============================================================================

/// Run one CLI command against the resolved settings file.
pub async fn run(cli: &Cli) -> Result<Outcome, AppError> {
    let settings_path = AppSettings::resolve_path(cli.settings.as_deref());
    let mut settings = AppSettings::load(&settings_path)?;

    let service = SignatureService::with_config(settings.image_config()?)?;
    service.remember_settings(settings.transparency)?;

    match &cli.command {
        Command::Crop(args) => {
            let source = ImageSource::detect(&args.rect.input);
            let image = service.handler().crop_image(&source, &args.rect.spec()).await?;
            let path = write_output(&settings, args.output.as_deref(), &image)?;
            Ok(Outcome::saved("cropped", &path, &image))
        }
        Command::Transparent(args) => {
            let thresholds = args.thresholds.resolve(service.remembered_settings()?);
            let image = transparent(&service, &args.input, thresholds).await?;
            remember(&mut settings, &settings_path, &args.thresholds, thresholds)?;
            let path = write_output(&settings, args.output.as_deref(), &image)?;
            Ok(Outcome::saved("transparent", &path, &image))
        }
        Command::Process(args) => {
            let thresholds = args.thresholds.resolve(service.remembered_settings()?);
            let request_id = format!("cli-{}", chrono::Local::now().timestamp_millis());
            let source = ImageSource::detect(&args.rect.input);

            let image = service
                .process(&request_id, &source, &args.rect.spec(), thresholds)
                .await?;
            remember(&mut settings, &settings_path, &args.thresholds, thresholds)?;
            let path = write_output(&settings, args.output.as_deref(), &image)?;

            if let Some(owner) = args.upload_to.as_deref() {
                let mut history = open_history(&settings, owner)?;
                history.add(&image).await?;
            }
            Ok(Outcome::saved("processed", &path, &image))
        }
        Command::History { action } => run_history(&settings, &service, action).await,
        Command::Info => {
            let info = storage::get_output_dir_info(settings.image.output_dir.as_deref())?;
            Ok(Outcome {
                message: format!(
                    "settings: {}\noutput: {} ({} files, {} bytes)\nprofile: {}",
                    settings_path.display(),
                    info.path,
                    info.file_count,
                    info.total_size,
                    service.get_performance_profile()?
                ),
                data: json!({
                    "settings_path": settings_path.to_string_lossy(),
                    "output": info,
                    "profile": service.get_performance_profile()?,
                    "transparency": settings.transparency,
                }),
            })
        }
    }
}

/// Local files go through the typed path; data URLs and remote URLs use the
/// degrading contract (placeholder for fetch failures, original on decode failure).
async fn transparent(
    service: &SignatureService,
    input: &str,
    thresholds: TransparencySettings,
) -> Result<ProcessedImage, AppError> {
    let source = ImageSource::detect(input);
    if let ImageSource::FilePath(_) = source {
        service.remember_settings(thresholds)?;
        return Ok(service.handler().make_transparent_image(&source, &thresholds).await?);
    }

    let output = service.make_transparent(input, thresholds).await;
    if output == fallback_placeholder() {
        log::warn!("⚠️ 远程签名不可用，输出占位图");
    }

    ProcessedImage::from_png_data_url(&output).map_err(|err| {
        AppError::Image(ImageError::Decode(format!("透明化未生效，结果为原始图片：{}", err)))
    })
}

fn remember(
    settings: &mut AppSettings,
    path: &Path,
    args: &ThresholdArgs,
    used: TransparencySettings,
) -> Result<(), AppError> {
    if !args.remember || settings.transparency == used {
        return Ok(());
    }
    settings.transparency = used;
    settings.save(path)?;
    log::info!("⚙️ 已记住透明化设置 - 路径: {}", path.display());
    Ok(())
}

fn write_output(
    settings: &AppSettings,
    output: Option<&Path>,
    image: &ProcessedImage,
) -> Result<PathBuf, AppError> {
    match output {
        Some(path) => {
            storage::save_processed_to(path, image)?;
            Ok(path.to_path_buf())
        }
        None => {
            let dir = storage::get_output_dir(settings.image.output_dir.as_deref())?;
            storage::save_processed(&dir, image)
        }
    }
}

fn open_history(settings: &AppSettings, owner: &str) -> Result<SignatureHistory, AppError> {
    let client = HistoryClient::new(settings.history.clone())?;
    Ok(SignatureHistory::new(client, owner))
}

async fn run_history(
    settings: &AppSettings,
    service: &SignatureService,
    action: &HistoryAction,
) -> Result<Outcome, AppError> {
    match action {
        HistoryAction::List { owner } => {
            let mut history = open_history(settings, owner)?;
            history.list().await?;
            Ok(Outcome::history(history.owner(), history.entries(), history.selected()))
        }
        HistoryAction::Add { owner, image } => {
            let data_url = if data_url::is_data_url(image) {
                image.trim().to_string()
            } else {
                data_url::encode_png(&std::fs::read(image.trim())?)
            };

            let mut history = open_history(settings, owner)?;
            history
                .add_data_url(service.handler(), &data_url, &service.remembered_settings()?)
                .await?;
            Ok(Outcome::history(history.owner(), history.entries(), history.selected()))
        }
        HistoryAction::Remove { owner, path } => {
            let mut history = open_history(settings, owner)?;
            history.list().await?;
            history.remove(path).await?;
            Ok(Outcome::history(history.owner(), history.entries(), history.selected()))
        }
        HistoryAction::Activate { owner, path } => {
            let mut history = open_history(settings, owner)?;
            history.set_active(path).await?;
            Ok(Outcome::history(history.owner(), history.entries(), history.selected()))
        }
    }
}
