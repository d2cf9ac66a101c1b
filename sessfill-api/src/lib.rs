use anyhow::Context;
use arg::{Arg, Args};
use arrow::array::RecordBatch;
use derive_builder::Builder;
use serde::Serialize;
use std::sync::Arc;

use crate::arg::ArgType;

pub mod arg;

/// A batch-oriented transformation over an event log. `process` receives the
/// input one `RecordBatch` at a time; `finalize` flushes whatever the
/// function held back once the input is exhausted.
pub trait TableFunction {
    fn process(&mut self, input: RecordBatch) -> anyhow::Result<Option<RecordBatch>>;

    fn finalize(&mut self) -> anyhow::Result<Option<RecordBatch>> {
        Ok(None)
    }
}

pub fn create(
    registry: &FunctionRegistry,
    parameters: Option<&str>,
    timezone: &str,
) -> anyhow::Result<Box<dyn TableFunction>> {
    let create_closure = &(registry.init);
    let (arguments, named_arguments) = match parameters {
        Some(raw) => arg::parse_parameters(raw).context("failed to parse function parameters")?,
        None => (None, Vec::new()),
    };
    let ctx = FunctionContext {
        arguments,
        named_arguments,
        timezone: String::from(timezone),
    };
    create_closure(ctx)
}

type TableFunctionInitialize =
    Arc<dyn Fn(FunctionContext) -> anyhow::Result<Box<dyn TableFunction>>>;

#[derive(Builder)]
pub struct FunctionRegistry {
    #[builder(setter(into))]
    name: &'static str,
    init: TableFunctionInitialize,
    #[builder(setter(strip_option, each(name = "signature", into)))]
    signatures: Option<Vec<Signature>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("name", &self.name)
            .field("init", &Arc::as_ptr(&self.init))
            .field("signatures", &self.signatures)
            .finish()
    }
}

impl FunctionRegistry {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn signatures(&self) -> anyhow::Result<String> {
        serde_json::to_string(&self.signatures).context("Failed to get signatures")
    }

    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::default()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Signature {
    pub args: Vec<ArgType>,
}

impl Signature {
    pub fn empty() -> Self {
        Signature { args: Vec::new() }
    }
}

impl From<Vec<ArgType>> for Signature {
    fn from(value: Vec<ArgType>) -> Self {
        Signature { args: value }
    }
}

pub struct FunctionContext {
    pub arguments: Option<Args>,
    pub named_arguments: Vec<(String, Arg)>,
    pub timezone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    impl TableFunction for Passthrough {
        fn process(&mut self, input: RecordBatch) -> anyhow::Result<Option<RecordBatch>> {
            Ok(Some(input))
        }
    }

    fn passthrough_registry() -> FunctionRegistry {
        FunctionRegistry::builder()
            .name("passthrough")
            .init(Arc::new(|_ctx| {
                Ok(Box::new(Passthrough) as Box<dyn TableFunction>)
            }))
            .signature(Signature::empty())
            .build()
            .expect("Failed to build registry")
    }

    #[test]
    fn registry_exposes_name_and_signatures() -> anyhow::Result<()> {
        let registry = passthrough_registry();
        assert_eq!(registry.name(), "passthrough");
        assert_eq!(registry.signatures()?, r#"[{"args":[]}]"#);
        Ok(())
    }

    #[test]
    fn create_with_parameters() -> anyhow::Result<()> {
        let registry = passthrough_registry();
        create(&registry, None, "UTC")?;
        create(
            &registry,
            Some(r#"[{"type":"float","value":15.0},{"name":"session","type":"string","value":"sessionid"}]"#),
            "UTC",
        )?;
        assert!(create(&registry, Some("not json"), "UTC").is_err());
        Ok(())
    }
}
