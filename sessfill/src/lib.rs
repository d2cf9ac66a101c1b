use std::{sync::Arc, vec};

use anyhow::Context;
use sessfill_api::{FunctionRegistry, Signature, TableFunction, arg::ArgType};

use crate::funcs::*;

pub mod csvio;
pub mod error;
pub mod funcs;
mod table;

pub fn get_function_registries() -> anyhow::Result<Vec<FunctionRegistry>> {
    Ok(vec![
        FunctionRegistry::builder()
            .name("impute_session")
            .init(Arc::new(|ctx| {
                SessionImpute::new(ctx.arguments, ctx.named_arguments)
                    .map(|f| Box::new(f) as Box<dyn TableFunction>)
            }))
            .signature(Signature::empty())
            .signature(vec![ArgType::Float])
            .signature(vec![ArgType::Int])
            .build()
            .context("create `impute_session` registry failed")?,
        FunctionRegistry::builder()
            .name("drop_unresolved")
            .init(Arc::new(|ctx| {
                DropUnresolved::new(ctx.arguments).map(|f| Box::new(f) as Box<dyn TableFunction>)
            }))
            .signature(Signature::empty())
            .signature(vec![ArgType::String])
            .build()
            .context("create `drop_unresolved` registry failed")?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{RecordBatch, StringArray, TimestampMicrosecondArray};
    use arrow_schema::{DataType, Field, Schema, TimeUnit};
    use sessfill_api::create;

    fn sample_log() -> RecordBatch {
        let minute = 60_000_000i64;
        let schema = Arc::new(Schema::new(vec![
            Field::new("case", DataType::Utf8, true),
            Field::new("event", DataType::Utf8, true),
            Field::new(
                "startTime",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
            Field::new(
                "completeTime",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
            Field::new("sessionid", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["c1", "c1", "c1"])),
                Arc::new(StringArray::from(vec!["Login", "Browse", "Browse"])),
                Arc::new(TimestampMicrosecondArray::from(vec![
                    0,
                    3 * minute,
                    5 * minute,
                ])),
                Arc::new(TimestampMicrosecondArray::from(vec![
                    minute,
                    4 * minute,
                    6 * minute,
                ])),
                Arc::new(StringArray::from(vec![Some("S1"), None, None])),
            ],
        )
        .expect("Failed to create input RecordBatch")
    }

    #[test]
    fn registries_are_created() -> anyhow::Result<()> {
        let registries = get_function_registries()?;
        let names: Vec<&str> = registries.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["impute_session", "drop_unresolved"]);
        Ok(())
    }

    #[test]
    fn impute_session_created_from_json_parameters() -> anyhow::Result<()> {
        let registries = get_function_registries()?;
        let registry = registries
            .iter()
            .find(|r| r.name() == "impute_session")
            .context("impute_session registry missing")?;

        let mut func = create(
            registry,
            Some(r#"[{"type":"float","value":30.0},{"name":"min_missing","type":"int","value":0}]"#),
            "UTC",
        )?;
        assert!(func.process(sample_log())?.is_none());
        let output = func.finalize()?.context("expected an output batch")?;
        assert_eq!(output.num_rows(), 3);
        // event_time_min is appended to the five input columns.
        assert_eq!(output.num_columns(), 6);
        Ok(())
    }

    #[test]
    fn drop_unresolved_created_without_parameters() -> anyhow::Result<()> {
        let registries = get_function_registries()?;
        let registry = registries
            .iter()
            .find(|r| r.name() == "drop_unresolved")
            .context("drop_unresolved registry missing")?;

        let mut func = create(registry, None, "UTC")?;
        let output = func
            .process(sample_log())?
            .context("expected an output batch")?;
        assert_eq!(output.num_rows(), 1);
        Ok(())
    }
}
