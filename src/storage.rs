// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/storage.rs - 违章记录存储
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

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::violation::{UnknownViolationType, ViolationType};

mod sqlite;
pub use self::sqlite::{SQLITE_SCHEME, SqliteStore};

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("SQLite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("Invalid confidence {0}: must be a finite value in [0, 1]")]
  InvalidConfidence(f32),
  #[error("Unknown violation type in storage: {0}")]
  UnknownViolationType(#[from] UnknownViolationType),
  #[error("Invalid timestamp in storage: {0}")]
  InvalidTimestamp(#[from] chrono::ParseError),
  #[error("Invalid database location: {0}")]
  InvalidLocation(String),
  #[error("Storage lock poisoned")]
  Poisoned,
}

/// 已保存的违章记录，插入后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationRecord {
  pub id: i64,
  pub filename: String,
  pub violation_type: ViolationType,
  pub confidence: f32,
  pub timestamp: DateTime<Utc>,
  pub result_image: Option<String>,
}

/// 待插入的违章记录
#[derive(Debug, Clone, PartialEq)]
pub struct NewViolation {
  pub filename: String,
  pub violation_type: ViolationType,
  pub confidence: f32,
  pub timestamp: DateTime<Utc>,
  pub result_image: Option<String>,
}

impl NewViolation {
  pub fn validate(&self) -> Result<(), StorageError> {
    if self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence) {
      Ok(())
    } else {
      Err(StorageError::InvalidConfidence(self.confidence))
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationStats {
  pub total_violations: u64,
  pub violations_by_type: BTreeMap<ViolationType, u64>,
  /// 最近 24 小时内的记录数
  pub recent_violations: u64,
  /// 保留两位小数，没有记录时为 0
  pub avg_confidence: f64,
}

/// 违章记录存储，只追加不修改
pub trait ViolationStore: Send + Sync {
  fn insert(&self, record: &NewViolation) -> Result<i64, StorageError>;

  /// 批量插入；默认逐条插入，实现方可以改为事务
  fn insert_all(&self, records: &[NewViolation]) -> Result<Vec<i64>, StorageError> {
    records.iter().map(|record| self.insert(record)).collect()
  }

  /// 按时间倒序
  fn list_all(&self) -> Result<Vec<ViolationRecord>, StorageError>;

  /// 按时间倒序
  fn list_by_filename(&self, filename: &str) -> Result<Vec<ViolationRecord>, StorageError>;

  fn aggregate_counts(&self) -> Result<BTreeMap<ViolationType, u64>, StorageError>;

  fn stats(&self, now: DateTime<Utc>) -> Result<ViolationStats, StorageError>;
}

/// 四舍五入到两位小数
pub(crate) fn round2(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
  use super::*;

  fn new_violation(confidence: f32) -> NewViolation {
    NewViolation {
      filename: "a.jpg".to_string(),
      violation_type: ViolationType::Speeding,
      confidence,
      timestamp: Utc::now(),
      result_image: None,
    }
  }

  #[test]
  fn confidence_must_be_in_unit_range() {
    assert!(new_violation(0.0).validate().is_ok());
    assert!(new_violation(1.0).validate().is_ok());
    assert!(new_violation(1.01).validate().is_err());
    assert!(new_violation(-0.5).validate().is_err());
    assert!(new_violation(f32::NAN).validate().is_err());
    assert!(new_violation(f32::INFINITY).validate().is_err());
  }

  #[test]
  fn rounds_to_two_decimals() {
    assert_eq!(round2(0.8666), 0.87);
    assert_eq!(round2(0.0), 0.0);
  }
}
