pub mod error;
pub mod value;

pub use error::{CascadeError, Result, serde_to_cascade_error};
pub use value::{FieldValue, Value};
