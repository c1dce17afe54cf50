//! Models module
//!
//! Defines the in-memory shapes rows take between reading and loading.

pub mod batch;
pub mod value;

pub use batch::{Batch, ColumnDef, Schema};
pub use value::{ColumnType, NULL_MARKERS, Value};
