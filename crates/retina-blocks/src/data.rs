//! Accessors for the JSON shapes built-in blocks exchange.
//!
//! A detection is an object with a center point (`x`, `y`), a box size
//! (`width`, `height`), `confidence`, `class`, `class_id`, `detection_id` and
//! the `parent_id` of the image it was found on. An image is an object with at
//! least `width` and `height`; crops additionally carry `parent_id`,
//! `root_parent_id` and `parent_coordinates`.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
  #[error("expected {expected}, found {found}")]
  UnexpectedShape {
    expected: &'static str,
    found: &'static str,
  },

  #[error("missing field '{field}'")]
  MissingField { field: String },

  #[error("field '{field}' is not a number")]
  NotANumber { field: String },

  #[error("value {value} cannot be represented as a number")]
  NonFinite { value: f64 },
}

/// Short name of a JSON value's type, for error messages.
pub fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

pub fn as_object<'a>(
  value: &'a Value,
  expected: &'static str,
) -> Result<&'a Map<String, Value>, DataError> {
  value.as_object().ok_or(DataError::UnexpectedShape {
    expected,
    found: type_name(value),
  })
}

pub fn as_array<'a>(value: &'a Value, expected: &'static str) -> Result<&'a Vec<Value>, DataError> {
  value.as_array().ok_or(DataError::UnexpectedShape {
    expected,
    found: type_name(value),
  })
}

pub fn number_field(object: &Map<String, Value>, field: &str) -> Result<f64, DataError> {
  let value = object.get(field).ok_or_else(|| DataError::MissingField {
    field: field.to_string(),
  })?;
  value.as_f64().ok_or_else(|| DataError::NotANumber {
    field: field.to_string(),
  })
}

/// Convert a float to a JSON number, keeping integral values integral.
pub fn number(value: f64) -> Result<Value, DataError> {
  if !value.is_finite() {
    return Err(DataError::NonFinite { value });
  }
  if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
    return Ok(Value::from(value as i64));
  }
  serde_json::Number::from_f64(value)
    .map(Value::Number)
    .ok_or(DataError::NonFinite { value })
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub x_min: f64,
  pub y_min: f64,
  pub x_max: f64,
  pub y_max: f64,
}

impl BoundingBox {
  pub fn width(&self) -> f64 {
    self.x_max - self.x_min
  }

  pub fn height(&self) -> f64 {
    self.y_max - self.y_min
  }

  /// Restrict the box to `[0, width] x [0, height]`.
  pub fn clamp(&self, width: f64, height: f64) -> Self {
    Self {
      x_min: self.x_min.clamp(0.0, width),
      y_min: self.y_min.clamp(0.0, height),
      x_max: self.x_max.clamp(0.0, width),
      y_max: self.y_max.clamp(0.0, height),
    }
  }
}

/// Borrowed view over a detection object.
#[derive(Debug, Clone, Copy)]
pub struct Detection<'a> {
  fields: &'a Map<String, Value>,
}

impl<'a> Detection<'a> {
  pub fn from_value(value: &'a Value) -> Result<Self, DataError> {
    Ok(Self {
      fields: as_object(value, "detection object")?,
    })
  }

  pub fn fields(&self) -> &'a Map<String, Value> {
    self.fields
  }

  pub fn center(&self) -> Result<(f64, f64), DataError> {
    Ok((number_field(self.fields, "x")?, number_field(self.fields, "y")?))
  }

  pub fn size(&self) -> Result<(f64, f64), DataError> {
    Ok((
      number_field(self.fields, "width")?,
      number_field(self.fields, "height")?,
    ))
  }

  pub fn bounding_box(&self) -> Result<BoundingBox, DataError> {
    let (x, y) = self.center()?;
    let (width, height) = self.size()?;
    Ok(BoundingBox {
      x_min: x - width / 2.0,
      y_min: y - height / 2.0,
      x_max: x + width / 2.0,
      y_max: y + height / 2.0,
    })
  }

  pub fn area(&self) -> Result<f64, DataError> {
    let (width, height) = self.size()?;
    Ok(width * height)
  }

  pub fn confidence(&self) -> Result<f64, DataError> {
    number_field(self.fields, "confidence")
  }

  pub fn class_name(&self) -> Result<&'a str, DataError> {
    self
      .fields
      .get("class")
      .and_then(Value::as_str)
      .ok_or_else(|| DataError::MissingField {
        field: "class".to_string(),
      })
  }

  pub fn class_id(&self) -> Result<f64, DataError> {
    number_field(self.fields, "class_id")
  }

  pub fn detection_id(&self) -> Option<&'a str> {
    self.fields.get("detection_id").and_then(Value::as_str)
  }
}

/// Borrowed view over an image object.
#[derive(Debug, Clone, Copy)]
pub struct Image<'a> {
  fields: &'a Map<String, Value>,
}

impl<'a> Image<'a> {
  pub fn from_value(value: &'a Value) -> Result<Self, DataError> {
    Ok(Self {
      fields: as_object(value, "image object")?,
    })
  }

  pub fn width(&self) -> Result<f64, DataError> {
    number_field(self.fields, "width")
  }

  pub fn height(&self) -> Result<f64, DataError> {
    number_field(self.fields, "height")
  }

  pub fn parent_id(&self) -> Option<&'a str> {
    self.fields.get("parent_id").and_then(Value::as_str)
  }

  /// Id of the image this one was ultimately derived from.
  pub fn root_parent_id(&self) -> Option<&'a str> {
    self
      .fields
      .get("root_parent_id")
      .and_then(Value::as_str)
      .or_else(|| self.parent_id())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_bounding_box_from_center() {
    let value = json!({"x": 50, "y": 40, "width": 20, "height": 10, "class": "dog"});
    let detection = Detection::from_value(&value).unwrap();
    let bbox = detection.bounding_box().unwrap();
    assert_eq!(bbox.x_min, 40.0);
    assert_eq!(bbox.y_max, 45.0);
    assert_eq!(detection.area().unwrap(), 200.0);
    assert_eq!(detection.class_name().unwrap(), "dog");
  }

  #[test]
  fn test_missing_field_is_reported() {
    let value = json!({"x": 1});
    let err = Detection::from_value(&value).unwrap().center().unwrap_err();
    assert_eq!(
      err,
      DataError::MissingField {
        field: "y".to_string()
      }
    );
  }

  #[test]
  fn test_number_keeps_integers_integral() {
    assert_eq!(number(4.0).unwrap(), json!(4));
    assert_eq!(number(0.5).unwrap(), json!(0.5));
    assert!(number(f64::NAN).is_err());
  }

  #[test]
  fn test_clamp_to_image() {
    let bbox = BoundingBox {
      x_min: -10.0,
      y_min: 5.0,
      x_max: 120.0,
      y_max: 50.0,
    };
    let clamped = bbox.clamp(100.0, 40.0);
    assert_eq!(clamped.x_min, 0.0);
    assert_eq!(clamped.x_max, 100.0);
    assert_eq!(clamped.y_max, 40.0);
    assert_eq!(clamped.width(), 100.0);
  }

  #[test]
  fn test_root_parent_falls_back_to_parent() {
    let value = json!({"width": 1, "height": 1, "parent_id": "img"});
    assert_eq!(Image::from_value(&value).unwrap().root_parent_id(), Some("img"));
  }
}
