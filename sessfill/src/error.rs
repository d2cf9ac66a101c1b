use thiserror::Error;

/// Failure conditions of the event log schema. A malformed record aborts the
/// whole input: silently skipping rows would corrupt the forward-fill chain.
#[derive(Debug, Error)]
pub enum LogSchemaError {
    #[error("missing required column `{0}`")]
    MissingColumn(String),
    #[error("column `{column}` has no well-formed timestamp: {detail}")]
    InvalidTimestamp { column: String, detail: String },
}
