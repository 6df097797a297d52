// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/storage/sqlite.rs - SQLite 存储
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

use std::{
  collections::BTreeMap,
  path::Path,
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  storage::{
    NewViolation, StorageError, ViolationRecord, ViolationStats, ViolationStore, round2,
  },
  violation::ViolationType,
};

pub const SQLITE_SCHEME: &str = "sqlite";
const MEMORY_PATH: &str = ":memory:";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS violations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  filename TEXT NOT NULL,
  violation_type TEXT NOT NULL,
  confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
  timestamp TEXT NOT NULL,
  result_image TEXT
);

CREATE INDEX IF NOT EXISTS idx_violation_type ON violations(violation_type);
CREATE INDEX IF NOT EXISTS idx_timestamp ON violations(timestamp);
CREATE INDEX IF NOT EXISTS idx_filename ON violations(filename);
"#;

const SELECT_COLUMNS: &str =
  "SELECT id, filename, violation_type, confidence, timestamp, result_image FROM violations";

/// 时间戳统一保存为定长 RFC 3339 文本，字典序即时间序
fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
  timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(text: &str) -> Result<DateTime<Utc>, StorageError> {
  Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

type RawRecord = (i64, String, String, f64, String, Option<String>);

fn decode_record(raw: RawRecord) -> Result<ViolationRecord, StorageError> {
  let (id, filename, violation_type, confidence, timestamp, result_image) = raw;
  Ok(ViolationRecord {
    id,
    filename,
    violation_type: violation_type.parse()?,
    confidence: confidence as f32,
    timestamp: decode_timestamp(&timestamp)?,
    result_image: result_image.filter(|name| !name.is_empty()),
  })
}

/// 单连接 SQLite 存储
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl FromUrlWithScheme for SqliteStore {
  const SCHEME: &'static str = SQLITE_SCHEME;
}

impl FromUrl for SqliteStore {
  type Error = StorageError;

  /// 支持 `sqlite::memory:`、`sqlite:relative.db` 与 `sqlite:///abs/path.db`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StorageError::InvalidLocation(format!(
        "expected scheme '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    match url.path() {
      "" => Err(StorageError::InvalidLocation(url.to_string())),
      MEMORY_PATH => Self::open_in_memory(),
      path => Self::open(Path::new(path)),
    }
  }
}

impl SqliteStore {
  pub fn open(path: &Path) -> Result<Self, StorageError> {
    info!("打开数据库: {}", path.display());
    let conn = Connection::open(path)?;
    // 文件数据库使用 WAL，读写互不阻塞
    let mode: String =
      conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("journal_mode = {}", mode);
    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self, StorageError> {
    debug!("打开内存数据库");
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StorageError> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
    self.conn.lock().map_err(|_| StorageError::Poisoned)
  }

  fn query_records(
    &self,
    sql: &str,
    params: impl rusqlite::Params,
  ) -> Result<Vec<ViolationRecord>, StorageError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| -> rusqlite::Result<RawRecord> {
      Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
      ))
    })?;

    let mut records = Vec::new();
    for row in rows {
      records.push(decode_record(row?)?);
    }
    Ok(records)
  }
}

fn insert_with(conn: &Connection, record: &NewViolation) -> Result<i64, StorageError> {
  record.validate()?;
  conn.execute(
    "INSERT INTO violations (filename, violation_type, confidence, timestamp, result_image) \
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      record.filename,
      record.violation_type.as_str(),
      record.confidence as f64,
      encode_timestamp(&record.timestamp),
      record.result_image,
    ],
  )?;
  Ok(conn.last_insert_rowid())
}

fn aggregate_counts_with(conn: &Connection) -> Result<BTreeMap<ViolationType, u64>, StorageError> {
  let mut stmt =
    conn.prepare("SELECT violation_type, COUNT(*) FROM violations GROUP BY violation_type")?;
  let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

  let mut counts = BTreeMap::new();
  for row in rows {
    let (violation_type, count) = row?;
    counts.insert(violation_type.parse()?, count.max(0) as u64);
  }
  Ok(counts)
}

impl ViolationStore for SqliteStore {
  fn insert(&self, record: &NewViolation) -> Result<i64, StorageError> {
    let conn = self.lock()?;
    let id = insert_with(&conn, record)?;
    debug!("插入违章记录 {}: {} {}", id, record.filename, record.violation_type);
    Ok(id)
  }

  /// 同一事务内插入，任一失败则全部回滚
  fn insert_all(&self, records: &[NewViolation]) -> Result<Vec<i64>, StorageError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    let ids = records
      .iter()
      .map(|record| insert_with(&tx, record))
      .collect::<Result<Vec<_>, _>>()?;
    tx.commit()?;
    debug!("插入 {} 条违章记录", ids.len());
    Ok(ids)
  }

  fn list_all(&self) -> Result<Vec<ViolationRecord>, StorageError> {
    self.query_records(
      &format!("{} ORDER BY timestamp DESC, id DESC", SELECT_COLUMNS),
      [],
    )
  }

  fn list_by_filename(&self, filename: &str) -> Result<Vec<ViolationRecord>, StorageError> {
    self.query_records(
      &format!(
        "{} WHERE filename = ?1 ORDER BY timestamp DESC, id DESC",
        SELECT_COLUMNS
      ),
      [filename],
    )
  }

  fn aggregate_counts(&self) -> Result<BTreeMap<ViolationType, u64>, StorageError> {
    let conn = self.lock()?;
    aggregate_counts_with(&conn)
  }

  fn stats(&self, now: DateTime<Utc>) -> Result<ViolationStats, StorageError> {
    // 三项统计在同一把锁内读取，保证彼此一致
    let conn = self.lock()?;
    let violations_by_type = aggregate_counts_with(&conn)?;
    let (total, avg): (i64, Option<f64>) = conn.query_row(
      "SELECT COUNT(*), AVG(confidence) FROM violations",
      [],
      |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let since = encode_timestamp(&(now - Duration::hours(24)));
    let recent: i64 = conn.query_row(
      "SELECT COUNT(*) FROM violations WHERE timestamp > ?1",
      [since],
      |row| row.get(0),
    )?;

    Ok(ViolationStats {
      total_violations: total.max(0) as u64,
      violations_by_type,
      recent_violations: recent.max(0) as u64,
      avg_confidence: round2(avg.unwrap_or(0.0)),
    })
  }
}
