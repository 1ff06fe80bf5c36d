//! File datasource: look a key up in a list of JSON or YAML documents.
//!
//! Every document has the shape `{ "<namespace>": { "<key>": <value> } }`.
//! Each channel cycle consults the next file in the configured order; once
//! the list is used up the channel is closed. A file that does not exist is
//! skipped quietly; one that cannot be read or parsed is skipped with a
//! warning, and the next cycle moves on to the following file.

use crate::channel::AnswerChannel;
use crate::registry::{validators, Datasource, DatasourceDescriptor, OptionSpec};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tiera_core::{DatasourceError, Error, OptionBag, RequestContext, Result, Value};
use tokio::fs;
use tracing::{debug, warn};

pub const ID: &str = "file";

pub fn descriptor() -> DatasourceDescriptor {
    DatasourceDescriptor::new(
        ID,
        "Looks keys up in JSON or YAML documents shaped as namespace -> key -> value",
        |options: &OptionBag| -> Result<Box<dyn Datasource>> {
            Ok(Box::new(FileDatasource::configure(options)?))
        },
    )
    .option(
        OptionSpec::new("files")
            .required()
            .describe("Documents to search, in order. May reference scope variables as {name}.")
            .validate(validators::is_string_array),
    )
    .option(
        OptionSpec::new("format")
            .default_value("json")
            .describe("Document format: json or yaml")
            .validate(validators::one_of(&["json", "yaml"])),
    )
    .option(
        OptionSpec::new("docroot")
            .describe("Directory that relative file names are resolved against")
            .validate(validators::is_string),
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(format!("unsupported format: {}", other)),
        }
    }
}

impl DocumentFormat {
    fn parse(&self, path: &Path, content: &str) -> std::result::Result<Value, DatasourceError> {
        let display = path.display().to_string();
        match self {
            Self::Json => serde_json::from_str(content).map_err(|e| DatasourceError::parse(display, e)),
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| DatasourceError::parse(display, e)),
        }
    }
}

#[derive(Debug)]
pub struct FileDatasource {
    files: Vec<PathBuf>,
    format: DocumentFormat,
    cursor: usize,
}

impl FileDatasource {
    /// Build from a validated option bag.
    pub fn configure(options: &OptionBag) -> Result<Self> {
        let format = match options.get("format").and_then(Value::as_str) {
            Some(f) => f
                .parse::<DocumentFormat>()
                .map_err(|e| Error::configuration(ID, e))?,
            None => DocumentFormat::Json,
        };
        let docroot = options.get("docroot").and_then(Value::as_str).map(PathBuf::from);

        let files = options
            .get("files")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::configuration(ID, "'files' must be an array of strings"))?
            .iter()
            .map(|f| -> Result<PathBuf> {
                let name = f
                    .as_str()
                    .ok_or_else(|| Error::configuration(ID, "'files' must be an array of strings"))?;
                let path = PathBuf::from(name);
                Ok(match &docroot {
                    Some(root) if path.is_relative() => root.join(path),
                    _ => path,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            files,
            format,
            cursor: 0,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Read and parse one document. `Ok(None)` if the file does not exist.
    async fn load(&self, path: &Path) -> std::result::Result<Option<Value>, DatasourceError> {
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DatasourceError::io(path.display().to_string(), e)),
        };

        match self.format.parse(path, &content)? {
            Value::Null => Ok(None),
            doc @ Value::Object(_) => Ok(Some(doc)),
            _ => Err(DatasourceError::parse(
                path.display().to_string(),
                "document root must map namespaces to keys",
            )),
        }
    }
}

#[async_trait::async_trait]
impl Datasource for FileDatasource {
    async fn lookup(
        &mut self,
        request: &RequestContext,
        channel: &mut AnswerChannel,
    ) -> std::result::Result<(), DatasourceError> {
        let Some(path) = self.files.get(self.cursor).cloned() else {
            channel.close();
            return Ok(());
        };
        self.cursor += 1;

        let doc = match self.load(&path).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!("file: {} not found, skipping", path.display());
                return Ok(());
            }
            Err(e) => {
                warn!(path = %path.display(), request = %request.id(), "file: skipping: {}", e);
                return Ok(());
            }
        };

        if let Some(value) = doc
            .get(request.namespace())
            .and_then(|ns| ns.get(request.key()))
        {
            debug!("file: {} answered {}", path.display(), request);
            channel.submit(value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tiera_core::CascadeMode;

    fn options(v: Value) -> OptionBag {
        let bag: OptionBag = serde_json::from_value(v).unwrap();
        descriptor().validate_options(&bag).unwrap()
    }

    #[test]
    fn docroot_applies_to_relative_files_only() {
        let ds = FileDatasource::configure(&options(json!({
            "files": ["common.json", "/abs/site.json"],
            "docroot": "/var/lib/tiera"
        })))
        .unwrap();
        assert_eq!(
            ds.files(),
            &[PathBuf::from("/var/lib/tiera/common.json"), PathBuf::from("/abs/site.json")]
        );
    }

    #[test]
    fn format_parses_aliases() {
        assert_eq!("yml".parse::<DocumentFormat>().unwrap(), DocumentFormat::Yaml);
        assert!("xml".parse::<DocumentFormat>().is_err());
    }

    #[tokio::test]
    async fn walks_files_one_per_cycle_then_closes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.json"), r#"{"prod": {"color": "blue"}}"#).unwrap();
        std::fs::write(tmp.path().join("b.json"), r#"{"prod": {"color": "red"}}"#).unwrap();

        let mut ds = FileDatasource::configure(&options(json!({
            "files": ["a.json", "missing.json", "b.json"],
            "docroot": tmp.path().to_str().unwrap()
        })))
        .unwrap();
        let req = RequestContext::new("color", "prod");
        let mut ch = AnswerChannel::new(CascadeMode::Merge);

        for _ in 0..3 {
            ch.begin_cycle();
            ds.lookup(&req, &mut ch).await.unwrap();
            assert!(!ch.is_closed());
        }
        ch.begin_cycle();
        ds.lookup(&req, &mut ch).await.unwrap();
        assert!(ch.is_closed());
        assert_eq!(ch.answers(), &[json!("blue"), json!("red")]);
    }

    #[tokio::test]
    async fn load_reports_parse_failures() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.json"), "{ not json").unwrap();

        let ds = FileDatasource::configure(&options(json!({
            "files": ["bad.json"],
            "docroot": tmp.path().to_str().unwrap()
        })))
        .unwrap();
        let err = ds.load(&tmp.path().join("bad.json")).await.unwrap_err();
        assert!(matches!(err, DatasourceError::Parse { .. }));
    }

    #[tokio::test]
    async fn unparsable_file_is_skipped_and_the_next_one_answers() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.json"), "{ not json").unwrap();
        std::fs::write(tmp.path().join("good.json"), r#"{"ns": {"k": "v"}}"#).unwrap();

        let mut ds = FileDatasource::configure(&options(json!({
            "files": ["bad.json", "good.json"],
            "docroot": tmp.path().to_str().unwrap()
        })))
        .unwrap();
        let req = RequestContext::new("k", "ns");
        let mut ch = AnswerChannel::new(CascadeMode::FirstMatch);

        ch.begin_cycle();
        ds.lookup(&req, &mut ch).await.unwrap();
        assert!(ch.answers().is_empty());
        assert!(ch.wants_more());

        ch.begin_cycle();
        ds.lookup(&req, &mut ch).await.unwrap();
        assert_eq!(ch.answers(), &[json!("v")]);
    }

    #[tokio::test]
    async fn reads_yaml_documents() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("common.yaml"), "prod:\n  size: M\n  ports: [80, 443]\n").unwrap();

        let mut ds = FileDatasource::configure(&options(json!({
            "files": ["common.yaml"],
            "format": "yaml",
            "docroot": tmp.path().to_str().unwrap()
        })))
        .unwrap();
        let mut ch = AnswerChannel::new(CascadeMode::FirstMatch);
        ch.begin_cycle();
        ds.lookup(&RequestContext::new("ports", "prod"), &mut ch)
            .await
            .unwrap();
        assert_eq!(ch.answers(), &[json!([80, 443])]);
    }

    #[tokio::test]
    async fn non_mapping_document_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("list.json"), "[1, 2, 3]").unwrap();

        let mut ds = FileDatasource::configure(&options(json!({
            "files": ["list.json"],
            "docroot": tmp.path().to_str().unwrap()
        })))
        .unwrap();
        let err = ds.load(&tmp.path().join("list.json")).await.unwrap_err();
        assert!(matches!(err, DatasourceError::Parse { .. }));

        let mut ch = AnswerChannel::new(CascadeMode::FirstMatch);
        ch.begin_cycle();
        ds.lookup(&RequestContext::new("k", "ns"), &mut ch).await.unwrap();
        assert!(ch.answers().is_empty());
    }
}
