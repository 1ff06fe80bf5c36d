//! tiera core - request/answer types, templating, and error handling

pub mod error;
pub mod template;
pub mod types;

pub use error::{DatasourceError, Error, Result};
pub use types::*;
