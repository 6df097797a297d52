// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/violation.rs - 违章类别与映射表
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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::WithLabel;

/// 违章类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
  RedLightJump,
  NoHelmet,
  TripleRiding,
  WrongLane,
  Speeding,
}

impl ViolationType {
  pub const ALL: [ViolationType; 5] = [
    ViolationType::RedLightJump,
    ViolationType::NoHelmet,
    ViolationType::TripleRiding,
    ViolationType::WrongLane,
    ViolationType::Speeding,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ViolationType::RedLightJump => "red_light_jump",
      ViolationType::NoHelmet => "no_helmet",
      ViolationType::TripleRiding => "triple_riding",
      ViolationType::WrongLane => "wrong_lane",
      ViolationType::Speeding => "speeding",
    }
  }

  /// 页面与标注图中显示的名称
  pub fn title(&self) -> &'static str {
    match self {
      ViolationType::RedLightJump => "Red Light Jump",
      ViolationType::NoHelmet => "No Helmet",
      ViolationType::TripleRiding => "Triple Riding",
      ViolationType::WrongLane => "Wrong Lane",
      ViolationType::Speeding => "Speeding",
    }
  }

  /// 标注颜色 (RGB)
  pub fn color(&self) -> [u8; 3] {
    match self {
      ViolationType::RedLightJump => [255, 0, 0],
      ViolationType::NoHelmet => [255, 165, 0],
      ViolationType::TripleRiding => [0, 0, 255],
      ViolationType::WrongLane => [0, 255, 0],
      ViolationType::Speeding => [255, 255, 0],
    }
  }
}

impl fmt::Display for ViolationType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("未知的违章类别: {0}")]
pub struct UnknownViolationType(pub String);

impl FromStr for ViolationType {
  type Err = UnknownViolationType;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ViolationType::ALL
      .into_iter()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| UnknownViolationType(s.to_string()))
  }
}

/// 一次检测得到的违章
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
  pub violation_type: ViolationType,
  pub confidence: f32,
  pub bbox: [f32; 4],
  pub frame_index: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result_image: Option<String>,
}

/// 映射规则: 模型类别的置信度严格大于 `min_confidence` 时判定为 `violation`
#[derive(Debug, Clone, Copy)]
pub struct ViolationRule {
  pub label: &'static str,
  pub min_confidence: f32,
  pub violation: ViolationType,
}

pub const COCO_RULES: &[ViolationRule] = &[
  ViolationRule {
    label: "person",
    min_confidence: 0.7,
    violation: ViolationType::NoHelmet,
  },
  ViolationRule {
    label: "motorcycle",
    min_confidence: 0.8,
    violation: ViolationType::TripleRiding,
  },
  ViolationRule {
    label: "car",
    min_confidence: 0.6,
    violation: ViolationType::WrongLane,
  },
  ViolationRule {
    label: "bus",
    min_confidence: 0.6,
    violation: ViolationType::WrongLane,
  },
  ViolationRule {
    label: "truck",
    min_confidence: 0.6,
    violation: ViolationType::WrongLane,
  },
  ViolationRule {
    label: "bicycle",
    min_confidence: 0.7,
    violation: ViolationType::RedLightJump,
  },
];

/// 映射结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
  Violation(ViolationType),
  /// 类别有规则，但置信度不足
  BelowThreshold,
  /// 类别不在映射表中
  NoMapping,
  /// 置信度不在 [0, 1] 内
  InvalidScore,
}

/// 模型类别到违章类别的映射表
#[derive(Debug, Clone, Copy)]
pub struct ViolationTable {
  rules: &'static [ViolationRule],
}

impl Default for ViolationTable {
  fn default() -> Self {
    Self::coco()
  }
}

impl ViolationTable {
  pub fn coco() -> Self {
    Self { rules: COCO_RULES }
  }

  pub fn with_rules(rules: &'static [ViolationRule]) -> Self {
    Self { rules }
  }

  pub fn map<T: WithLabel>(&self, kind: &T, score: f32) -> Mapping {
    if !(0.0..=1.0).contains(&score) {
      return Mapping::InvalidScore;
    }

    let label = kind.to_label_str();
    match self.rules.iter().find(|rule| rule.label == label) {
      Some(rule) if score > rule.min_confidence => Mapping::Violation(rule.violation),
      Some(_) => Mapping::BelowThreshold,
      None => Mapping::NoMapping,
    }
  }

  /// 映射表能产生的违章类别（去重，保持类别定义顺序）
  pub fn violation_classes(&self) -> Vec<ViolationType> {
    ViolationType::ALL
      .into_iter()
      .filter(|t| self.rules.iter().any(|rule| rule.violation == *t))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::CocoLabel;

  #[test]
  fn parse_and_display_round_trip() {
    for t in ViolationType::ALL {
      assert_eq!(t.to_string().parse::<ViolationType>(), Ok(t));
    }
    assert_eq!(
      "jaywalking".parse::<ViolationType>(),
      Err(UnknownViolationType("jaywalking".to_string()))
    );
  }

  #[test]
  fn serializes_as_snake_case() {
    let json = serde_json::to_string(&ViolationType::RedLightJump).unwrap();
    assert_eq!(json, "\"red_light_jump\"");
  }

  #[test]
  fn coco_mapping_follows_rules() {
    let table = ViolationTable::coco();
    assert_eq!(
      table.map(&CocoLabel::PERSON, 0.87),
      Mapping::Violation(ViolationType::NoHelmet)
    );
    assert_eq!(table.map(&CocoLabel::PERSON, 0.7), Mapping::BelowThreshold);
    assert_eq!(
      table.map(&CocoLabel::MOTORCYCLE, 0.81),
      Mapping::Violation(ViolationType::TripleRiding)
    );
    assert_eq!(
      table.map(&CocoLabel::BUS, 0.65),
      Mapping::Violation(ViolationType::WrongLane)
    );
    assert_eq!(
      table.map(&CocoLabel::BICYCLE, 0.75),
      Mapping::Violation(ViolationType::RedLightJump)
    );
    assert_eq!(
      table.map(&CocoLabel::from_name("dog").unwrap(), 0.99),
      Mapping::NoMapping
    );
  }

  #[test]
  fn out_of_range_scores_are_rejected() {
    let table = ViolationTable::coco();
    assert_eq!(table.map(&CocoLabel::CAR, 1.5), Mapping::InvalidScore);
    assert_eq!(table.map(&CocoLabel::CAR, f32::NAN), Mapping::InvalidScore);
    assert_eq!(table.map(&CocoLabel::CAR, -0.1), Mapping::InvalidScore);
  }

  #[test]
  fn coco_table_never_yields_speeding() {
    let classes = ViolationTable::coco().violation_classes();
    assert_eq!(classes.len(), 4);
    assert!(!classes.contains(&ViolationType::Speeding));
  }
}
