//! A small expression language for conditions over workflow data.
//!
//! Statements compare operands; operands name a parameter (or the element
//! under evaluation, `_`) and transform it through a chain of operations.
//! Documents use the same JSON shape as the rest of a workflow definition:
//!
//! ```json
//! {
//!   "type": "BinaryStatement",
//!   "left_operand": {
//!     "type": "DynamicOperand",
//!     "operand_name": "prediction",
//!     "operations": [{"type": "SequenceLength"}]
//!   },
//!   "comparator": {"type": "(Number) >="},
//!   "right_operand": {"type": "StaticOperand", "value": 2}
//! }
//! ```

mod error;
mod evaluate;
mod types;

pub use error::QueryError;
pub use evaluate::{Scope, apply_operations};
pub use types::{
  BinaryStatement, CURRENT_OPERAND, Comparator, DetectionProperty, GroupOperator, ImageProperty,
  Operand, Operation, Statement, StatementGroup, UnaryOperator, UnaryStatement,
};
