// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/server/views.rs - 页面渲染
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


use axum::{
  extract::{Path, State},
  response::Html,
};
use chrono::Utc;

use crate::{
  input::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS},
  server::{ApiError, AppState, run_blocking},
  storage::{ViolationRecord, ViolationStats},
  violation::ViolationType,
};

const NAV: &str = r#"<nav><a href="/">Upload</a> | <a href="/reports">Reports</a> | <a href="/dashboard">Dashboard</a></nav>"#;

const UPLOAD_SCRIPT: &str = r#"<script>
document.getElementById('upload-form').addEventListener('submit', async (event) => {
  event.preventDefault();
  const status = document.getElementById('status');
  status.textContent = 'Processing...';
  const response = await fetch('/upload', { method: 'POST', body: new FormData(event.target) });
  const body = await response.json();
  if (!body.success) {
    status.textContent = 'Error: ' + body.error;
    return;
  }
  status.innerHTML = '';
  const summary = document.createElement('p');
  summary.textContent = body.results.length + ' violation(s) detected. ';
  const link = document.createElement('a');
  link.href = '/results/' + encodeURIComponent(body.filename);
  link.textContent = 'View results';
  summary.appendChild(link);
  status.appendChild(summary);
  if (!body.persisted) {
    const warning = document.createElement('p');
    warning.textContent = 'Warning: ' + body.error;
    status.appendChild(warning);
  }
});
</script>"#;

/// HTML 文本转义
pub(crate) fn escape(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => escaped.push_str("&amp;"),
      '<' => escaped.push_str("&lt;"),
      '>' => escaped.push_str("&gt;"),
      '"' => escaped.push_str("&quot;"),
      '\'' => escaped.push_str("&#39;"),
      c => escaped.push(c),
    }
  }
  escaped
}

fn page(title: &str, body: &str) -> Html<String> {
  Html(format!(
    "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title} - Traffic Violation Detection</title></head>\
     <body>{NAV}<h1>{title}</h1>{body}</body></html>",
    title = escape(title),
  ))
}

fn stats_summary(stats: &ViolationStats) -> String {
  format!(
    "<ul><li>Total violations: {}</li><li>Last 24 hours: {}</li><li>Average confidence: {:.2}</li></ul>",
    stats.total_violations, stats.recent_violations, stats.avg_confidence
  )
}

fn records_table(records: &[ViolationRecord], with_filename: bool) -> String {
  if records.is_empty() {
    return "<p>No violations recorded.</p>".to_string();
  }

  let mut html = String::from("<table><tr><th>ID</th>");
  if with_filename {
    html.push_str("<th>File</th>");
  }
  html.push_str("<th>Violation</th><th>Confidence</th><th>Time</th><th>Image</th></tr>");

  for record in records {
    html.push_str(&format!("<tr><td>{}</td>", record.id));
    if with_filename {
      html.push_str(&format!(
        "<td><a href=\"/results/{}\">{}</a></td>",
        urlencoding::encode(&record.filename),
        escape(&record.filename)
      ));
    }
    let image = match &record.result_image {
      Some(name) => format!(
        "<a href=\"/static/results/{0}\"><img src=\"/static/results/{0}\" alt=\"{1}\" width=\"240\"></a>",
        urlencoding::encode(name),
        escape(name)
      ),
      None => "-".to_string(),
    };
    html.push_str(&format!(
      "<td>{}</td><td>{:.2}</td><td>{}</td><td>{}</td></tr>",
      record.violation_type.title(),
      record.confidence,
      record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
      image
    ));
  }
  html.push_str("</table>");
  html
}

/// `GET /`
pub async fn index() -> Html<String> {
  let accept = IMAGE_EXTENSIONS
    .iter()
    .chain(VIDEO_EXTENSIONS.iter())
    .map(|ext| format!(".{}", ext))
    .collect::<Vec<_>>()
    .join(",");
  let body = format!(
    "<p>Upload an image or video to detect traffic violations.</p>\
     <form id=\"upload-form\" action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\
     <input type=\"file\" name=\"file\" accept=\"{}\" required> <button type=\"submit\">Detect</button>\
     </form><div id=\"status\"></div>{}",
    accept, UPLOAD_SCRIPT
  );
  page("Upload", &body)
}

/// `GET /results/{filename}`
pub async fn results(
  State(state): State<AppState>,
  Path(filename): Path<String>,
) -> Result<Html<String>, ApiError> {
  let store = state.store.clone();
  let lookup = filename.clone();
  let records = run_blocking(move || Ok(store.list_by_filename(&lookup)?)).await?;

  let body = format!(
    "<p>File: <code>{}</code></p><p>{} violation(s) detected.</p>{}",
    escape(&filename),
    records.len(),
    records_table(&records, false)
  );
  Ok(page("Detection Results", &body))
}

/// `GET /reports`
pub async fn reports(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
  let store = state.store.clone();
  let (records, stats) =
    run_blocking(move || Ok((store.list_all()?, store.stats(Utc::now())?))).await?;

  let body = format!(
    "<h2>Summary</h2>{}<h2>All Violations</h2>{}",
    stats_summary(&stats),
    records_table(&records, true)
  );
  Ok(page("Violation Reports", &body))
}

/// `GET /dashboard`
pub async fn dashboard(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
  let store = state.store.clone();
  let stats = run_blocking(move || Ok(store.stats(Utc::now())?)).await?;

  let mut rows = String::new();
  for violation_type in ViolationType::ALL {
    let count = stats
      .violations_by_type
      .get(&violation_type)
      .copied()
      .unwrap_or(0);
    let [r, g, b] = violation_type.color();
    rows.push_str(&format!(
      "<tr><td><span style=\"color: rgb({},{},{})\">&#9632;</span> {}</td><td>{}</td></tr>",
      r,
      g,
      b,
      violation_type.title(),
      count
    ));
  }

  let body = format!(
    "{}<h2>By Type</h2><table><tr><th>Violation</th><th>Count</th></tr>{}</table>",
    stats_summary(&stats),
    rows
  );
  Ok(page("Dashboard", &body))
}
