use anyhow::anyhow;
use arrow::{
    array::{Array, RecordBatch},
    compute::{filter_record_batch, is_not_null},
};

use crate::table::column_index;
use sessfill_api::TableFunction;
use sessfill_api::arg::{Arg, Args};

/// Removes rows whose session identifier is still null, producing the
/// "complete" view of an imputed event log. Streaming and stateless: the
/// imputer never drops rows itself.
#[derive(Debug)]
pub struct DropUnresolved {
    session_column: String,
}

impl Default for DropUnresolved {
    fn default() -> Self {
        DropUnresolved {
            session_column: "sessionid".to_string(),
        }
    }
}

impl DropUnresolved {
    pub fn new(params: Option<Args>) -> anyhow::Result<DropUnresolved> {
        let Some(params) = params else {
            return Ok(Self::default());
        };

        let scalars = params
            .into_iter()
            .filter(|p| p.is_scalar())
            .collect::<Vec<_>>();

        match scalars.len() {
            0 => Ok(Self::default()),
            1 => match scalars.into_iter().next() {
                Some(Arg::String(session_column)) => Ok(DropUnresolved { session_column }),
                _ => Err(anyhow!("`session_column` must be a string.")),
            },
            n => Err(anyhow!(
                "Invalid arguments, there is no {n}-args constructor"
            )),
        }
    }
}

impl TableFunction for DropUnresolved {
    fn process(&mut self, input: RecordBatch) -> anyhow::Result<Option<RecordBatch>> {
        let idx = column_index(&input.schema(), &self.session_column)?;
        let col = input.column(idx);
        if col.null_count() == 0 {
            return Ok(Some(input));
        }
        let keep = is_not_null(col.as_ref())?;
        let filtered = filter_record_batch(&input, &keep)?;
        tracing::debug!(
            dropped = input.num_rows() - filtered.num_rows(),
            "removed rows with unresolved sessions"
        );
        Ok(Some(filtered))
    }
}
