use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operand name that refers to the element currently being evaluated,
/// e.g. each detection inside a `DetectionsFilter` operation.
pub const CURRENT_OPERAND: &str = "_";

fn current_operand() -> String {
  CURRENT_OPERAND.to_string()
}

/// A boolean expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
  StatementGroup(StatementGroup),
  BinaryStatement(BinaryStatement),
  UnaryStatement(UnaryStatement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
  #[default]
  And,
  Or,
}

/// Statements combined with `and` / `or`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementGroup {
  #[serde(default)]
  pub operator: GroupOperator,
  pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryStatement {
  pub left_operand: Operand,
  pub comparator: Comparator,
  pub right_operand: Operand,
  #[serde(default)]
  pub negate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryStatement {
  pub operand: Operand,
  pub operator: UnaryOperator,
  #[serde(default)]
  pub negate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Comparator {
  #[serde(rename = "==")]
  Equal,
  #[serde(rename = "!=")]
  NotEqual,
  #[serde(rename = "(Number) ==")]
  NumberEqual,
  #[serde(rename = "(Number) !=")]
  NumberNotEqual,
  #[serde(rename = "(Number) >")]
  NumberGreater,
  #[serde(rename = "(Number) >=")]
  NumberGreaterOrEqual,
  #[serde(rename = "(Number) <")]
  NumberLower,
  #[serde(rename = "(Number) <=")]
  NumberLowerOrEqual,
  #[serde(rename = "in (Sequence)")]
  In,
  #[serde(rename = "contains (Sequence)")]
  Contains,
  #[serde(rename = "(String) startsWith")]
  StringStartsWith,
  #[serde(rename = "(String) endsWith")]
  StringEndsWith,
  #[serde(rename = "(String) contains")]
  StringContains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UnaryOperator {
  Exists,
  DoesNotExist,
  #[serde(rename = "(Boolean) is True")]
  IsTrue,
  #[serde(rename = "(Boolean) is False")]
  IsFalse,
  #[serde(rename = "(Sequence) is empty")]
  IsEmpty,
  #[serde(rename = "(Sequence) is not empty")]
  IsNotEmpty,
}

/// A value fed into a statement, optionally transformed by a chain of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operand {
  StaticOperand {
    value: Value,
    #[serde(default)]
    operations: Vec<Operation>,
  },
  DynamicOperand {
    #[serde(default = "current_operand")]
    operand_name: String,
    #[serde(default)]
    operations: Vec<Operation>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionProperty {
  ClassName,
  Confidence,
  XMin,
  YMin,
  XMax,
  YMax,
  ClassId,
  Size,
  Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageProperty {
  Size,
  Height,
  Width,
  AspectRatio,
}

/// A transformation applied to an operand value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
  ExtractDetectionProperty { property_name: DetectionProperty },
  ExtractImageProperty { property_name: ImageProperty },
  SequenceLength,
  Multiply { other: f64 },
  Divide { other: f64 },
  Add { other: f64 },
  Subtract { other: f64 },
  /// Keep the detections for which the statement holds.
  DetectionsFilter { filter_operation: Statement },
  /// Grow every box by the given amounts, keeping its center.
  DetectionsOffset { offset_x: f64, offset_y: f64 },
  ToNumber,
  ToString,
}
