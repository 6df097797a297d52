// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Weizhang 违章识别服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, env = "WEIZHANG_HOST", default_value = "0.0.0.0")]
  pub host: String,

  /// 监听端口
  #[arg(long, env = "WEIZHANG_PORT", default_value_t = 5000)]
  pub port: u16,

  /// 上传文件大小上限（MiB）
  #[arg(long, env = "WEIZHANG_MAX_UPLOAD_MB", default_value_t = 100, value_name = "MIB")]
  pub max_upload_mb: usize,

  /// 模型 URI，例如 onnx:///models/yolov8n.onnx?threads=4
  #[arg(
    long,
    env = "WEIZHANG_MODEL",
    default_value = "onnx:///models/yolov8n.onnx",
    value_name = "MODEL"
  )]
  pub model: Url,

  /// 数据库文件路径，也可以写成 sqlite:xxx.db 或 sqlite::memory:
  #[arg(
    long,
    env = "WEIZHANG_DATABASE",
    default_value = "traffic_violations.db",
    value_name = "DATABASE"
  )]
  pub database: String,

  /// 上传文件保存目录
  #[arg(long, env = "WEIZHANG_UPLOAD_DIR", default_value = "uploads", value_name = "DIR")]
  pub upload_dir: PathBuf,

  /// 标注图保存目录，通过 /static/results 提供访问
  #[arg(
    long,
    env = "WEIZHANG_RESULTS_DIR",
    default_value = "static/results",
    value_name = "DIR"
  )]
  pub results_dir: PathBuf,

  /// 模型置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.5, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.45, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 视频抽帧间隔
  #[arg(long, default_value_t = 5, value_name = "FRAMES")]
  pub video_stride: u64,

  /// 视频最多读取的帧数
  #[arg(long, default_value_t = 30, value_name = "FRAMES")]
  pub video_max_frames: u64,

  /// 视频保留每种违章的全部检测结果，而不只是置信度最高的一条
  #[arg(long)]
  pub keep_all_video_detections: bool,

  /// 标注文字使用的 TTF 字体，未指定时尝试系统字体
  #[arg(long, env = "WEIZHANG_FONT", value_name = "FILE")]
  pub font: Option<PathBuf>,
}
