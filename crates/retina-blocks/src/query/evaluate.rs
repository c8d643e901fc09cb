use serde_json::{Map, Value};

use crate::data::{self, Detection, Image, type_name};
use crate::query::error::QueryError;
use crate::query::types::{
  BinaryStatement, CURRENT_OPERAND, Comparator, DetectionProperty, GroupOperator, ImageProperty,
  Operand, Operation, Statement, StatementGroup, UnaryOperator, UnaryStatement,
};

/// Named values a statement can refer to through dynamic operands.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
  parameters: &'a Map<String, Value>,
  current: Option<&'a Value>,
}

impl<'a> Scope<'a> {
  pub fn new(parameters: &'a Map<String, Value>) -> Self {
    Self {
      parameters,
      current: None,
    }
  }

  /// Same parameters, with `_` bound to `current`.
  pub fn with_current(&self, current: &'a Value) -> Self {
    Self {
      parameters: self.parameters,
      current: Some(current),
    }
  }

  fn operand(&self, name: &str) -> Result<&'a Value, QueryError> {
    if name == CURRENT_OPERAND
      && let Some(current) = self.current
    {
      return Ok(current);
    }
    self
      .parameters
      .get(name)
      .ok_or_else(|| QueryError::UnknownOperand {
        name: name.to_string(),
      })
  }
}

impl Statement {
  pub fn evaluate(&self, scope: &Scope<'_>) -> Result<bool, QueryError> {
    match self {
      Statement::StatementGroup(group) => group.evaluate(scope),
      Statement::BinaryStatement(binary) => binary.evaluate(scope),
      Statement::UnaryStatement(unary) => unary.evaluate(scope),
    }
  }
}

impl StatementGroup {
  pub fn evaluate(&self, scope: &Scope<'_>) -> Result<bool, QueryError> {
    match self.operator {
      GroupOperator::And => {
        for statement in &self.statements {
          if !statement.evaluate(scope)? {
            return Ok(false);
          }
        }
        Ok(true)
      }
      GroupOperator::Or => {
        for statement in &self.statements {
          if statement.evaluate(scope)? {
            return Ok(true);
          }
        }
        Ok(false)
      }
    }
  }
}

impl BinaryStatement {
  pub fn evaluate(&self, scope: &Scope<'_>) -> Result<bool, QueryError> {
    let left = self.left_operand.resolve(scope)?;
    let right = self.right_operand.resolve(scope)?;
    Ok(self.comparator.compare(&left, &right)? != self.negate)
  }
}

impl UnaryStatement {
  pub fn evaluate(&self, scope: &Scope<'_>) -> Result<bool, QueryError> {
    let value = self.operand.resolve(scope)?;
    Ok(self.operator.check(&value)? != self.negate)
  }
}

impl Operand {
  /// The operand's value after applying its operations.
  pub fn resolve(&self, scope: &Scope<'_>) -> Result<Value, QueryError> {
    let (value, operations) = match self {
      Operand::StaticOperand { value, operations } => (value.clone(), operations),
      Operand::DynamicOperand {
        operand_name,
        operations,
      } => (scope.operand(operand_name)?.clone(), operations),
    };
    apply_operations(value, operations, scope)
  }
}

/// Run a chain of operations over a value.
pub fn apply_operations(
  value: Value,
  operations: &[Operation],
  scope: &Scope<'_>,
) -> Result<Value, QueryError> {
  operations
    .iter()
    .try_fold(value, |value, operation| operation.apply(value, scope))
}

impl Operation {
  pub fn name(&self) -> &'static str {
    match self {
      Operation::ExtractDetectionProperty { .. } => "ExtractDetectionProperty",
      Operation::ExtractImageProperty { .. } => "ExtractImageProperty",
      Operation::SequenceLength => "SequenceLength",
      Operation::Multiply { .. } => "Multiply",
      Operation::Divide { .. } => "Divide",
      Operation::Add { .. } => "Add",
      Operation::Subtract { .. } => "Subtract",
      Operation::DetectionsFilter { .. } => "DetectionsFilter",
      Operation::DetectionsOffset { .. } => "DetectionsOffset",
      Operation::ToNumber => "ToNumber",
      Operation::ToString => "ToString",
    }
  }

  pub fn apply(&self, value: Value, scope: &Scope<'_>) -> Result<Value, QueryError> {
    let mismatch = |expected: &'static str, value: &Value| QueryError::TypeMismatch {
      context: self.name(),
      expected,
      found: type_name(value),
    };
    let arithmetic = |value: &Value, f: &dyn Fn(f64) -> f64| -> Result<Value, QueryError> {
      let n = value.as_f64().ok_or_else(|| mismatch("number", value))?;
      Ok(data::number(f(n))?)
    };

    match self {
      Operation::ExtractDetectionProperty { property_name } => {
        extract_detection_property(&value, *property_name)
      }
      Operation::ExtractImageProperty { property_name } => {
        extract_image_property(&value, *property_name)
      }
      Operation::SequenceLength => {
        let length = match &value {
          Value::Array(items) => items.len(),
          Value::Object(fields) => fields.len(),
          Value::String(s) => s.chars().count(),
          other => return Err(mismatch("sequence", other)),
        };
        Ok(Value::from(length))
      }
      Operation::Multiply { other } => arithmetic(&value, &|n| n * other),
      Operation::Add { other } => arithmetic(&value, &|n| n + other),
      Operation::Subtract { other } => arithmetic(&value, &|n| n - other),
      Operation::Divide { other } => {
        if *other == 0.0 {
          return Err(QueryError::DivisionByZero);
        }
        arithmetic(&value, &|n| n / other)
      }
      Operation::DetectionsFilter { filter_operation } => {
        let detections = data::as_array(&value, "list of detections")?;
        let mut kept = Vec::with_capacity(detections.len());
        for detection in detections {
          if filter_operation.evaluate(&scope.with_current(detection))? {
            kept.push(detection.clone());
          }
        }
        Ok(Value::Array(kept))
      }
      Operation::DetectionsOffset { offset_x, offset_y } => {
        let detections = data::as_array(&value, "list of detections")?;
        let offset = detections
          .iter()
          .map(|detection| offset_detection(detection, *offset_x, *offset_y))
          .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(offset))
      }
      Operation::ToNumber => match value {
        Value::Number(_) => Ok(value),
        Value::Bool(b) => Ok(Value::from(u8::from(b))),
        Value::String(s) => {
          let parsed: f64 = s
            .trim()
            .parse()
            .map_err(|_| QueryError::Conversion {
              value: s.clone(),
              target: "number",
            })?;
          Ok(data::number(parsed)?)
        }
        other => Err(mismatch("number, boolean or string", &other)),
      },
      Operation::ToString => match value {
        Value::String(_) => Ok(value),
        other => Ok(Value::String(other.to_string())),
      },
    }
  }
}

fn extract_detection_property(
  value: &Value,
  property: DetectionProperty,
) -> Result<Value, QueryError> {
  let detection = Detection::from_value(value)?;
  let value = match property {
    DetectionProperty::ClassName => Value::String(detection.class_name()?.to_string()),
    DetectionProperty::Confidence => data::number(detection.confidence()?)?,
    DetectionProperty::ClassId => data::number(detection.class_id()?)?,
    DetectionProperty::Size => data::number(detection.area()?)?,
    DetectionProperty::XMin => data::number(detection.bounding_box()?.x_min)?,
    DetectionProperty::YMin => data::number(detection.bounding_box()?.y_min)?,
    DetectionProperty::XMax => data::number(detection.bounding_box()?.x_max)?,
    DetectionProperty::YMax => data::number(detection.bounding_box()?.y_max)?,
    DetectionProperty::Center => {
      let (x, y) = detection.center()?;
      Value::Array(vec![data::number(x)?, data::number(y)?])
    }
  };
  Ok(value)
}

fn extract_image_property(value: &Value, property: ImageProperty) -> Result<Value, QueryError> {
  let image = Image::from_value(value)?;
  let value = match property {
    ImageProperty::Width => data::number(image.width()?)?,
    ImageProperty::Height => data::number(image.height()?)?,
    ImageProperty::Size => data::number(image.width()? * image.height()?)?,
    ImageProperty::AspectRatio => {
      let height = image.height()?;
      if height == 0.0 {
        return Err(QueryError::DivisionByZero);
      }
      data::number(image.width()? / height)?
    }
  };
  Ok(value)
}

fn offset_detection(detection: &Value, offset_x: f64, offset_y: f64) -> Result<Value, QueryError> {
  let fields = Detection::from_value(detection)?.fields();
  let width = data::number_field(fields, "width")?;
  let height = data::number_field(fields, "height")?;
  let mut moved = fields.clone();
  moved.insert("width".to_string(), data::number(width + offset_x)?);
  moved.insert("height".to_string(), data::number(height + offset_y)?);
  Ok(Value::Object(moved))
}

/// Equality that treats `1` and `1.0` as the same number.
fn values_equal(left: &Value, right: &Value) -> bool {
  match (left, right) {
    (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
    (Value::Array(a), Value::Array(b)) => {
      a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
    }
    _ => left == right,
  }
}

impl Comparator {
  pub fn name(&self) -> &'static str {
    match self {
      Comparator::Equal => "==",
      Comparator::NotEqual => "!=",
      Comparator::NumberEqual => "(Number) ==",
      Comparator::NumberNotEqual => "(Number) !=",
      Comparator::NumberGreater => "(Number) >",
      Comparator::NumberGreaterOrEqual => "(Number) >=",
      Comparator::NumberLower => "(Number) <",
      Comparator::NumberLowerOrEqual => "(Number) <=",
      Comparator::In => "in (Sequence)",
      Comparator::Contains => "contains (Sequence)",
      Comparator::StringStartsWith => "(String) startsWith",
      Comparator::StringEndsWith => "(String) endsWith",
      Comparator::StringContains => "(String) contains",
    }
  }

  pub fn compare(&self, left: &Value, right: &Value) -> Result<bool, QueryError> {
    let numbers = || -> Result<(f64, f64), QueryError> {
      Ok((self.number(left)?, self.number(right)?))
    };

    let result = match self {
      Comparator::Equal => values_equal(left, right),
      Comparator::NotEqual => !values_equal(left, right),
      Comparator::NumberEqual => {
        let (a, b) = numbers()?;
        a == b
      }
      Comparator::NumberNotEqual => {
        let (a, b) = numbers()?;
        a != b
      }
      Comparator::NumberGreater => {
        let (a, b) = numbers()?;
        a > b
      }
      Comparator::NumberGreaterOrEqual => {
        let (a, b) = numbers()?;
        a >= b
      }
      Comparator::NumberLower => {
        let (a, b) = numbers()?;
        a < b
      }
      Comparator::NumberLowerOrEqual => {
        let (a, b) = numbers()?;
        a <= b
      }
      Comparator::In => {
        let items = right.as_array().ok_or_else(|| self.mismatch("sequence", right))?;
        items.iter().any(|item| values_equal(left, item))
      }
      Comparator::Contains => {
        let items = left.as_array().ok_or_else(|| self.mismatch("sequence", left))?;
        items.iter().any(|item| values_equal(item, right))
      }
      Comparator::StringStartsWith => {
        self.string(left)?.starts_with(self.string(right)?)
      }
      Comparator::StringEndsWith => {
        self.string(left)?.ends_with(self.string(right)?)
      }
      Comparator::StringContains => {
        self.string(left)?.contains(self.string(right)?)
      }
    };
    Ok(result)
  }

  fn mismatch(&self, expected: &'static str, value: &Value) -> QueryError {
    QueryError::TypeMismatch {
      context: self.name(),
      expected,
      found: type_name(value),
    }
  }

  fn number(&self, value: &Value) -> Result<f64, QueryError> {
    value.as_f64().ok_or_else(|| self.mismatch("number", value))
  }

  fn string<'v>(&self, value: &'v Value) -> Result<&'v str, QueryError> {
    value.as_str().ok_or_else(|| self.mismatch("string", value))
  }
}

impl UnaryOperator {
  pub fn check(&self, value: &Value) -> Result<bool, QueryError> {
    let mismatch = |context: &'static str, expected: &'static str| QueryError::TypeMismatch {
      context,
      expected,
      found: type_name(value),
    };
    let is_empty = |context: &'static str| match value {
      Value::Array(items) => Ok(items.is_empty()),
      Value::Object(fields) => Ok(fields.is_empty()),
      Value::String(s) => Ok(s.is_empty()),
      _ => Err(mismatch(context, "sequence")),
    };

    match self {
      UnaryOperator::Exists => Ok(!value.is_null()),
      UnaryOperator::DoesNotExist => Ok(value.is_null()),
      UnaryOperator::IsTrue => value
        .as_bool()
        .ok_or_else(|| mismatch("(Boolean) is True", "boolean")),
      UnaryOperator::IsFalse => value
        .as_bool()
        .map(|b| !b)
        .ok_or_else(|| mismatch("(Boolean) is False", "boolean")),
      UnaryOperator::IsEmpty => is_empty("(Sequence) is empty"),
      UnaryOperator::IsNotEmpty => is_empty("(Sequence) is not empty").map(|empty| !empty),
    }
  }
}
