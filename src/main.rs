//! # TTD 签名处理工具：命令行入口
//!
//! 本文件仅负责日志初始化、参数解析与结果输出。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use ttd_signature::cli::{self, Cli};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("❌ 异步运行时初始化失败: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::run(&args)) {
        Ok(outcome) => {
            if args.json {
                println!("{}", json!({ "ok": true, "message": outcome.message, "data": outcome.data }));
            } else {
                println!("{}", outcome.message);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if args.json {
                println!("{}", json!({ "ok": false, "code": err.code(), "error": err }));
            } else {
                eprintln!("error: {err}");
            }
            ExitCode::FAILURE
        }
    }
}
