//! Datasource registry and trait definitions
//!
//! Each datasource is described by a `DatasourceDescriptor`: its id, the
//! options it accepts, and a constructor that turns a validated option bag
//! into a fresh `Datasource` instance. Descriptors are registered once at
//! startup; the engine configures a new instance for every resolution.

use crate::channel::AnswerChannel;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tiera_core::{DatasourceError, Error, OptionBag, RequestContext, Result, Value};

/// The Datasource trait: implement this to add a new backend.
///
/// `lookup` is called once per channel cycle. Instances are never shared
/// between resolutions, so any cursor over remaining candidates can live in
/// `self`.
#[async_trait::async_trait]
pub trait Datasource: Send {
    async fn lookup(
        &mut self,
        request: &RequestContext,
        channel: &mut AnswerChannel,
    ) -> std::result::Result<(), DatasourceError>;
}

/// Checks one option value; `Err` carries the reason shown to the user.
pub type Validator = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// Builds a datasource instance from a validated option bag.
pub type Constructor = Arc<dyn Fn(&OptionBag) -> Result<Box<dyn Datasource>> + Send + Sync>;

// ---------------------------------------------------------------------------
// OptionSpec
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct OptionSpec {
    pub name: String,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
    validator: Option<Validator>,
}

impl OptionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: None,
            description: String::new(),
            validator: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Run the validator, if any.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        match &self.validator {
            Some(v) => v(value),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for OptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionSpec")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DatasourceDescriptor
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DatasourceDescriptor {
    id: String,
    description: String,
    options: Vec<OptionSpec>,
    constructor: Constructor,
}

impl DatasourceDescriptor {
    pub fn new<F>(id: impl Into<String>, description: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&OptionBag) -> Result<Box<dyn Datasource>> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            description: description.into(),
            options: Vec::new(),
            constructor: Arc::new(constructor),
        }
    }

    /// Declare an option.
    pub fn option(mut self, spec: OptionSpec) -> Self {
        self.options.push(spec);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    /// Check a configured option bag and return it completed with defaults.
    ///
    /// Options are checked in declaration order and the first failure is
    /// returned with the offending option named. A `null` value counts as
    /// absent. Options the descriptor does not declare are rejected.
    pub fn validate_options(&self, options: &OptionBag) -> Result<OptionBag> {
        let mut validated = OptionBag::new();

        for spec in &self.options {
            match options.get(&spec.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    spec.check(value)
                        .map_err(|reason| Error::validation(&self.id, &spec.name, reason))?;
                    validated.insert(spec.name.clone(), value.clone());
                }
                None if spec.required => {
                    return Err(Error::validation(
                        &self.id,
                        &spec.name,
                        "required option is missing",
                    ));
                }
                None => {
                    if let Some(default) = &spec.default {
                        validated.insert(spec.name.clone(), default.clone());
                    }
                }
            }
        }

        if let Some(unknown) = options
            .keys()
            .find(|k| !self.options.iter().any(|s| &s.name == *k))
        {
            return Err(Error::validation(&self.id, unknown, "unknown option"));
        }

        Ok(validated)
    }

    /// Construct a datasource instance from an already validated bag.
    pub fn configure(&self, options: &OptionBag) -> Result<Box<dyn Datasource>> {
        (self.constructor)(options)
    }
}

impl fmt::Debug for DatasourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceDescriptor")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DatasourceRegistry {
    datasources: HashMap<String, Arc<DatasourceDescriptor>>,
}

impl DatasourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Ids are unique.
    pub fn register(&mut self, descriptor: DatasourceDescriptor) -> Result<()> {
        if self.datasources.contains_key(descriptor.id()) {
            return Err(Error::DuplicateDatasource(descriptor.id().to_string()));
        }
        tracing::debug!("registered datasource: {}", descriptor.id());
        self.datasources
            .insert(descriptor.id().to_string(), Arc::new(descriptor));
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<DatasourceDescriptor>> {
        self.get(id)
            .ok_or_else(|| Error::UnknownDatasource(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<Arc<DatasourceDescriptor>> {
        self.datasources.get(id).cloned()
    }

    /// Registered ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.datasources.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// All descriptors, sorted by id.
    pub fn descriptors(&self) -> Vec<Arc<DatasourceDescriptor>> {
        let mut all: Vec<_> = self.datasources.values().cloned().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    pub fn len(&self) -> usize {
        self.datasources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasources.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Stock validators
// ---------------------------------------------------------------------------

pub mod validators {
    use tiera_core::Value;

    pub fn is_string(value: &Value) -> Result<(), String> {
        if value.is_string() {
            Ok(())
        } else {
            Err("must be a string".into())
        }
    }

    pub fn is_array(value: &Value) -> Result<(), String> {
        if value.is_array() {
            Ok(())
        } else {
            Err("must be an array".into())
        }
    }

    pub fn is_object(value: &Value) -> Result<(), String> {
        if value.is_object() {
            Ok(())
        } else {
            Err("must be a mapping".into())
        }
    }

    pub fn is_string_array(value: &Value) -> Result<(), String> {
        match value.as_array() {
            Some(items) if items.iter().all(Value::is_string) => Ok(()),
            _ => Err("must be an array of strings".into()),
        }
    }

    /// Accept only one of the listed strings.
    pub fn one_of(
        allowed: &'static [&'static str],
    ) -> impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static {
        move |value: &Value| match value.as_str() {
            Some(s) if allowed.contains(&s) => Ok(()),
            _ => Err(format!("must be one of: {}", allowed.join(", "))),
        }
    }
}
