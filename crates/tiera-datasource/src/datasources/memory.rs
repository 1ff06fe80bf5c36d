//! Memory datasource: answers from data inlined in the policy itself.

use crate::channel::AnswerChannel;
use crate::registry::{validators, Datasource, DatasourceDescriptor, OptionSpec};
use tiera_core::{DatasourceError, Error, OptionBag, RequestContext, Result, Value};

pub const ID: &str = "memory";

pub fn descriptor() -> DatasourceDescriptor {
    DatasourceDescriptor::new(
        ID,
        "Answers from a namespace -> key -> value mapping given inline",
        |options: &OptionBag| -> Result<Box<dyn Datasource>> {
            Ok(Box::new(MemoryDatasource::configure(options)?))
        },
    )
    .option(
        OptionSpec::new("data")
            .required()
            .describe("Mapping of namespace -> key -> value")
            .validate(validators::is_object),
    )
}

#[derive(Debug)]
pub struct MemoryDatasource {
    data: Value,
}

impl MemoryDatasource {
    pub fn configure(options: &OptionBag) -> Result<Self> {
        match options.get("data") {
            Some(data @ Value::Object(_)) => Ok(Self { data: data.clone() }),
            _ => Err(Error::configuration(ID, "'data' must be a mapping")),
        }
    }
}

#[async_trait::async_trait]
impl Datasource for MemoryDatasource {
    async fn lookup(
        &mut self,
        request: &RequestContext,
        channel: &mut AnswerChannel,
    ) -> std::result::Result<(), DatasourceError> {
        if let Some(value) = self
            .data
            .get(request.namespace())
            .and_then(|ns| ns.get(request.key()))
        {
            channel.submit(value.clone());
        }
        channel.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tiera_core::CascadeMode;

    #[tokio::test]
    async fn answers_once_and_closes() {
        let options: OptionBag =
            serde_json::from_value(json!({"data": {"prod": {"size": "M"}}})).unwrap();
        let mut ds = MemoryDatasource::configure(&options).unwrap();
        let mut ch = AnswerChannel::new(CascadeMode::Merge);
        ch.begin_cycle();
        ds.lookup(&RequestContext::new("size", "prod"), &mut ch)
            .await
            .unwrap();
        assert!(ch.is_closed());
        assert_eq!(ch.answers(), &[json!("M")]);
    }

    #[test]
    fn rejects_non_mapping_data() {
        let options: OptionBag = serde_json::from_value(json!({"data": [1, 2]})).unwrap();
        assert!(matches!(
            MemoryDatasource::configure(&options),
            Err(Error::Configuration { .. })
        ));
    }
}
