// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use weizhang::{
  FromUrl,
  detector::ViolationDetector,
  input::FrameSampling,
  model::{ModelOptions, load_model},
  output::OutputWrapper,
  server::{AppState, ServerConfig, create_router},
  storage::{SQLITE_SCHEME, SqliteStore, ViolationStore},
};

fn open_store(database: &str) -> Result<SqliteStore> {
  let store = match Url::parse(database) {
    Ok(url) if url.scheme() == SQLITE_SCHEME => SqliteStore::from_url(&url)?,
    _ => SqliteStore::open(Path::new(database))?,
  };
  Ok(store)
}

#[cfg(feature = "save_image_file")]
fn create_output(args: &args::Args) -> Result<OutputWrapper> {
  use weizhang::output::{SaveImageFileOutput, draw::Draw};

  let draw = match &args.font {
    Some(font) => Draw::with_font_file(font)
      .with_context(|| format!("无法加载字体文件 {}", font.display()))?,
    None => Draw::default(),
  };
  Ok(OutputWrapper::SaveImageFile(SaveImageFileOutput::new(
    &args.results_dir,
    draw,
  )))
}

#[cfg(not(feature = "save_image_file"))]
fn create_output(args: &args::Args) -> Result<OutputWrapper> {
  if args.font.is_some() {
    warn!("未启用 save_image_file 特性, 忽略 --font");
  }
  Ok(OutputWrapper::Discard)
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("收到中断信号，准备退出..."),
    Err(e) => warn!("无法监听中断信号: {}", e),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
    )
    .init();

  let args = args::Args::parse();

  info!("模型: {}", args.model);
  info!("数据库: {}", args.database);
  info!("上传目录: {}", args.upload_dir.display());
  info!("结果目录: {}", args.results_dir.display());

  std::fs::create_dir_all(&args.upload_dir)
    .with_context(|| format!("无法创建上传目录 {}", args.upload_dir.display()))?;
  std::fs::create_dir_all(&args.results_dir)
    .with_context(|| format!("无法创建结果目录 {}", args.results_dir.display()))?;

  let store: Arc<dyn ViolationStore> = Arc::new(open_store(&args.database)?);

  let model = load_model(
    &args.model,
    ModelOptions {
      confidence: args.confidence,
      nms_threshold: args.nms_threshold,
    },
  )?;
  let detector = ViolationDetector::new(model, args.model.to_string())
    .with_output(create_output(&args)?)
    .with_sampling(FrameSampling {
      stride: args.video_stride,
      max_frames: args.video_max_frames,
    })
    .keep_best_per_type(!args.keep_all_video_detections);

  let config = ServerConfig {
    upload_dir: args.upload_dir.clone(),
    results_dir: args.results_dir.clone(),
    max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
  };
  let app = create_router(AppState::new(store, Arc::new(detector), config));

  let address = format!("{}:{}", args.host, args.port);
  let listener = tokio::net::TcpListener::bind(&address)
    .await
    .with_context(|| format!("无法监听 {}", address))?;
  info!("服务已启动: http://{}", address);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("服务已退出");
  Ok(())
}
