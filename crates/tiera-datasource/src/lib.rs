//! tiera datasources: backend trait, answer channel, registry, builtins
//!
//! Each builtin datasource is a self-contained file in src/datasources/.
//! To add a datasource: create the file, expose a descriptor, register below.

pub mod channel;
pub mod datasources;
pub mod registry;

pub use channel::AnswerChannel;
pub use registry::{
    validators, Constructor, Datasource, DatasourceDescriptor, DatasourceRegistry, OptionSpec,
    Validator,
};

use tiera_core::Result;

/// Create a registry holding every builtin datasource.
pub fn create_default_registry() -> Result<DatasourceRegistry> {
    let mut registry = DatasourceRegistry::new();
    registry.register(datasources::file::descriptor())?;
    registry.register(datasources::memory::descriptor())?;
    Ok(registry)
}
