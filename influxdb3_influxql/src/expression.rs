//! Types for arithmetic and conditional expressions.

pub use arithmetic::*;
pub use conditional::*;

/// Arithmetic expressions, as found in a projection.
pub mod arithmetic;
/// Conditional expressions, as found in a `WHERE` clause.
pub mod conditional;
/// Provides APIs to traverse an expression tree using closures.
pub mod walk;
