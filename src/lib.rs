//! # TTD 签名处理工具：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │          调用方（cli / 表单页面 / 签名图库）              │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError> / Data URL 字符串契约
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕                                                  │
//! │  ┌─ error ────────── AppError (统一错误类型)              │
//! │  │                                                       │
//! │  ├─ image_handler ── 签名图片流水线                       │
//! │  │   ├─ transform      阶段一：旋转安全画布 + 裁剪        │
//! │  │   └─ transparency   阶段二：透明化 + 自动裁边          │
//! │  │                                                       │
//! │  ├─ history ──────── 阶段三：签名历史 / 选择缓存 (HTTP)   │
//! │  ├─ settings          JSON 设置文件                       │
//! │  └─ storage           输出目录 (返回 Result)              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，CLI 所有命令的返回类型 |
//! | [`image_handler`] | 从 URL/Base64/文件加载签名图片，裁剪旋转、透明化裁边 |
//! | [`history`] | 按归属人（NPP）列出、上传、删除、设为当前签名 |
//! | [`settings`] | 记住透明化阈值、接口地址、性能档位 |
//! | [`storage`] | 处理结果输出目录的获取、自动创建与统计 |
//! | [`cli`] | clap 命令行前端 |

pub mod cli;
pub mod error;
pub mod history;
pub mod image_handler;
pub mod settings;
pub mod storage;
