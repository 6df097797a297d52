// 该文件是 Weizhang （违章识别） 项目的一部分。
// tests/report_api.rs - 报表与统计接口测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod common;

use std::collections::BTreeMap;

use axum::http::StatusCode;
use chrono::{Duration, Utc};

use common::*;
use weizhang::{
  storage::{NewViolation, ViolationStore},
  violation::ViolationType,
};

fn seed(app: &TestApp) {
  let now = Utc::now();
  let rows = [
    ("a.jpg", ViolationType::NoHelmet, 0.91, 1),
    ("a.jpg", ViolationType::WrongLane, 0.66, 2),
    ("b.mp4", ViolationType::TripleRiding, 0.85, 30),
    ("c.png", ViolationType::NoHelmet, 0.72, 50),
    ("c.png", ViolationType::RedLightJump, 0.8, 3),
  ];
  for (filename, violation_type, confidence, hours_ago) in rows {
    app
      .store
      .insert(&NewViolation {
        filename: filename.to_string(),
        violation_type,
        confidence,
        timestamp: now - Duration::hours(hours_ago),
        result_image: None,
      })
      .unwrap();
  }
}

#[tokio::test]
async fn stats_match_violation_listing() {
  let app = TestAppBuilder::new(StubModel::nothing()).build();
  seed(&app);

  let violations = body_json(send(&app.router, get("/api/violations")).await).await;
  let violations = violations.as_array().unwrap();
  assert_eq!(violations.len(), 5);

  let mut counted: BTreeMap<String, u64> = BTreeMap::new();
  for record in violations {
    let confidence = record["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    let violation_type = record["violation_type"].as_str().unwrap();
    assert!(violation_type.parse::<ViolationType>().is_ok());
    *counted.entry(violation_type.to_string()).or_default() += 1;
  }

  let stats = body_json(send(&app.router, get("/api/stats")).await).await;
  let by_type: BTreeMap<String, u64> =
    serde_json::from_value(stats["violations_by_type"].clone()).unwrap();
  assert_eq!(by_type, counted);
  assert_eq!(stats["total_violations"], 5);
  assert_eq!(stats["recent_violations"], 3);
  assert_eq!(stats["avg_confidence"], 0.79);
}

#[tokio::test]
async fn violations_are_listed_most_recent_first() {
  let app = TestAppBuilder::new(StubModel::nothing()).build();
  seed(&app);

  let violations = body_json(send(&app.router, get("/api/violations")).await).await;
  let filenames: Vec<&str> = violations
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["filename"].as_str().unwrap())
    .collect();
  assert_eq!(filenames, vec!["a.jpg", "a.jpg", "c.png", "b.mp4", "c.png"]);
}

#[tokio::test]
async fn empty_store_has_zero_stats() {
  let app = TestAppBuilder::new(StubModel::nothing()).build();

  let stats = body_json(send(&app.router, get("/api/stats")).await).await;
  assert_eq!(stats["total_violations"], 0);
  assert_eq!(stats["recent_violations"], 0);
  assert_eq!(stats["avg_confidence"], 0.0);
  assert!(stats["violations_by_type"].as_object().unwrap().is_empty());

  let violations = body_json(send(&app.router, get("/api/violations")).await).await;
  assert!(violations.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn pages_render() {
  let app = TestAppBuilder::new(StubModel::nothing()).build();
  seed(&app);

  let response = send(&app.router, get("/")).await;
  assert_eq!(response.status(), StatusCode::OK);
  let index = body_text(response).await;
  assert!(index.contains("name=\"file\""));
  assert!(index.contains(".mkv"));

  let reports = body_text(send(&app.router, get("/reports")).await).await;
  assert!(reports.contains("Total violations: 5"));
  assert!(reports.contains("href=\"/results/b.mp4\""));

  let dashboard = body_text(send(&app.router, get("/dashboard")).await).await;
  assert!(dashboard.contains("Speeding</td><td>0</td>"));
  assert!(dashboard.contains("No Helmet</td><td>2</td>"));

  let results = body_text(send(&app.router, get("/results/c.png")).await).await;
  assert!(results.contains("2 violation(s) detected."));
  assert!(results.contains("Red Light Jump"));
}

#[tokio::test]
async fn results_page_escapes_filename() {
  let app = TestAppBuilder::new(StubModel::nothing()).build();

  let response = send(&app.router, get("/results/%3Cscript%3E.jpg")).await;
  assert_eq!(response.status(), StatusCode::OK);
  let page = body_text(response).await;
  assert!(page.contains("&lt;script&gt;.jpg"));
  assert!(!page.contains("<script>.jpg"));
}

#[tokio::test]
async fn model_info_reports_detector() {
  let app = TestAppBuilder::new(StubModel::nothing()).build();

  let info = body_json(send(&app.router, get("/api/model")).await).await;
  assert_eq!(info["status"], "loaded");
  assert_eq!(info["model"], "stub://detector");
  let classes: Vec<&str> = info["violation_classes"]
    .as_array()
    .unwrap()
    .iter()
    .map(|c| c.as_str().unwrap())
    .collect();
  assert!(classes.contains(&"no_helmet"));
  assert!(!classes.contains(&"speeding"));
}

#[tokio::test]
async fn missing_result_image_is_not_found() {
  let app = TestAppBuilder::new(StubModel::nothing()).build();

  let response = send(&app.router, get("/static/results/nothing.jpg")).await;
  assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
