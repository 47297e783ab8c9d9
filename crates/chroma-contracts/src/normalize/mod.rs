//! Recovery of JSON values from free-form model output.
//!
//! [`normalize`] turns raw response text into a JSON value. The reconcile
//! functions then map that value onto the result cardinality each search mode
//! expects.

mod extract;
mod shape;

pub use extract::{normalize, EXCERPT_CHARS};
pub use shape::{reconcile_multi, reconcile_single};
