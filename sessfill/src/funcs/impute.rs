use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::{Context, anyhow};
use arrow::{
    array::{Array, ArrayRef, Float64Array, RecordBatch, UInt32Array},
    compute::{concat_batches, take},
};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::table::{column_index, row_labels, timestamps};
use sessfill_api::TableFunction;
use sessfill_api::arg::{Arg, Args};

pub const DEFAULT_GAP_MINUTES: f64 = 15.0;
pub const DEFAULT_CONTINUING_EVENTS: [&str; 3] =
    ["File Complaint", "Question", "Werkmap message"];

/// Derived duration column, (completeTime - startTime) in minutes.
const DURATION_COLUMN: &str = "event_time_min";

#[derive(Debug, Clone)]
pub struct ImputeParams {
    /// Largest idle gap, in minutes, still considered part of the previous
    /// session. `None` means unbounded: always fill forward.
    pub gap_minutes: Option<f64>,
    /// Event types that continue the previous session regardless of the gap.
    pub continuing_events: Vec<String>,
    /// Groups with at most this many missing session values are left alone.
    pub min_missing: usize,
    pub case_column: String,
    pub event_column: String,
    pub start_column: String,
    pub complete_column: String,
    pub session_column: String,
}

impl Default for ImputeParams {
    fn default() -> Self {
        ImputeParams {
            gap_minutes: Some(DEFAULT_GAP_MINUTES),
            continuing_events: DEFAULT_CONTINUING_EVENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_missing: 1,
            case_column: "case".to_string(),
            event_column: "event".to_string(),
            start_column: "startTime".to_string(),
            complete_column: "completeTime".to_string(),
            session_column: "sessionid".to_string(),
        }
    }
}

impl ImputeParams {
    pub fn new(params: Option<Args>, named_arguments: Vec<(String, Arg)>) -> anyhow::Result<Self> {
        let mut parsed = ImputeParams::default();

        if let Some(params) = params {
            let scalars = params
                .into_iter()
                .filter(|p| p.is_scalar())
                .collect::<Vec<_>>();
            match scalars.len() {
                0 => {}
                1 => parsed.gap_minutes = gap_from_arg(&scalars[0])?,
                n => {
                    return Err(anyhow!(
                        "Invalid arguments, there is no {n}-args constructor"
                    ));
                }
            }
        }

        for (name, arg) in named_arguments {
            match name.as_str() {
                "gap_minutes" => parsed.gap_minutes = gap_from_arg(&arg)?,
                "continuing_events" => {
                    let Arg::String(s) = arg else {
                        return Err(anyhow!("Invalid type for {}. Expected string.", name));
                    };
                    parsed.continuing_events = s
                        .split(',')
                        .map(|e| e.trim().to_string())
                        .filter(|e| !e.is_empty())
                        .collect();
                }
                "min_missing" => {
                    let Arg::Int(i) = arg else {
                        return Err(anyhow!("Invalid type for {}. Expected integer.", name));
                    };
                    if i < 0 {
                        return Err(anyhow!("`min_missing` must not be negative"));
                    }
                    parsed.min_missing = i as usize;
                }
                "case" => parsed.case_column = string_arg(&name, arg)?,
                "event" => parsed.event_column = string_arg(&name, arg)?,
                "start_time" => parsed.start_column = string_arg(&name, arg)?,
                "complete_time" => parsed.complete_column = string_arg(&name, arg)?,
                "session" => parsed.session_column = string_arg(&name, arg)?,
                _ => {
                    return Err(anyhow!(
                        "Invalid named parameter for impute_session table function: {}",
                        name
                    ));
                }
            }
        }

        Ok(parsed)
    }

    fn is_continuing(&self, event: Option<&str>) -> bool {
        event.is_some_and(|e| self.continuing_events.iter().any(|c| c == e))
    }
}

fn gap_from_arg(arg: &Arg) -> anyhow::Result<Option<f64>> {
    let minutes = match arg {
        Arg::Float(f) => *f,
        Arg::Int(i) => *i as f64,
        _ => return Err(anyhow!("`gap_minutes` must be numeric.")),
    };
    // A negative value selects the unbounded profile: plain forward fill.
    if minutes < 0.0 {
        Ok(None)
    } else {
        Ok(Some(minutes))
    }
}

fn string_arg(name: &str, arg: Arg) -> anyhow::Result<String> {
    let Arg::String(s) = arg else {
        return Err(anyhow!("Invalid type for {}. Expected string.", name));
    };
    Ok(s)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImputeStats {
    /// Null session cells that received a propagated value.
    pub imputed_rows: u64,
    /// Case groups scanned, whether or not any cell changed.
    pub scanned_cases: u64,
}

fn gap_minutes(complete: DateTime<Utc>, start: DateTime<Utc>) -> f64 {
    let micros = start
        .signed_duration_since(complete)
        .num_microseconds()
        .unwrap_or(i64::MAX);
    micros as f64 / 60_000_000.0
}

/// Imputes missing session identifiers over a whole event log table.
///
/// Rows are partitioned into case groups (first appearance first, original
/// order inside each group) and each group is forward-filled independently: a
/// null session cell inherits the value of the previous row, as already
/// rewritten in this pass, when the idle gap is under the threshold or the
/// event type continues the session. The rebuilt table carries the groups
/// contiguously, with a derived `event_time_min` column appended.
pub fn impute_batch(
    input: &RecordBatch,
    params: &ImputeParams,
) -> anyhow::Result<(RecordBatch, ImputeStats)> {
    let schema = input.schema();
    let case_idx = column_index(&schema, &params.case_column)?;
    let event_idx = column_index(&schema, &params.event_column)?;
    let start_idx = column_index(&schema, &params.start_column)?;
    let complete_idx = column_index(&schema, &params.complete_column)?;
    let session_idx = column_index(&schema, &params.session_column)?;

    let starts = timestamps(input.column(start_idx), &params.start_column)?;
    let completes = timestamps(input.column(complete_idx), &params.complete_column)?;
    let cases = row_labels(input.column(case_idx));
    let events = row_labels(input.column(event_idx));
    let session_col = input.column(session_idx);

    // Partition row indices into case groups, keyed by first appearance.
    let mut group_slots: HashMap<Option<String>, usize, ahash::RandomState> =
        HashMap::with_hasher(ahash::RandomState::new());
    let mut group_rows: Vec<Vec<u32>> = Vec::new();
    for (row, key) in cases.iter().enumerate() {
        let slot = *group_slots.entry(key.clone()).or_insert_with(|| {
            group_rows.push(Vec::new());
            group_rows.len() - 1
        });
        group_rows[slot].push(row as u32);
    }

    let mut stats = ImputeStats {
        imputed_rows: 0,
        scanned_cases: group_rows.len() as u64,
    };

    // Output row permutation (groups contiguous) and, for the session
    // column, the source row each output cell takes its value from.
    let mut perm: Vec<u32> = Vec::with_capacity(input.num_rows());
    let mut session_src: Vec<Option<u32>> = Vec::with_capacity(input.num_rows());

    for rows in &group_rows {
        let missing = rows
            .iter()
            .filter(|&&r| session_col.is_null(r as usize))
            .count();
        if missing <= params.min_missing {
            // Negligible groups are left untouched by design, even when the
            // odd missing value would be trivially fillable.
            for &r in rows {
                perm.push(r);
                session_src.push(session_col.is_valid(r as usize).then_some(r));
            }
            continue;
        }

        let mut prev: Option<u32> = None;
        for (t, &r) in rows.iter().enumerate() {
            let row = r as usize;
            let mut resolved = session_col.is_valid(row).then_some(r);
            if resolved.is_none() && t > 0 {
                let prev_row = rows[t - 1] as usize;
                // Negative gaps (overlapping events) always pass the check.
                let gap_ok = match params.gap_minutes {
                    None => true,
                    Some(limit) => gap_minutes(completes[prev_row], starts[row]) < limit,
                };
                if gap_ok || params.is_continuing(events[row].as_deref()) {
                    // A null at t-1 propagates null: holes in the chain are
                    // never skipped over.
                    resolved = prev;
                    if resolved.is_some() {
                        stats.imputed_rows += 1;
                    }
                }
            }
            perm.push(r);
            session_src.push(resolved);
            prev = resolved;
        }
    }

    let perm_array: ArrayRef = Arc::new(UInt32Array::from(perm.clone()));
    let session_indices: ArrayRef = Arc::new(UInt32Array::from(session_src));

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(input.num_columns() + 1);
    for (idx, col) in input.columns().iter().enumerate() {
        let rebuilt = if idx == session_idx {
            take(session_col.as_ref(), session_indices.as_ref(), None)
                .context("failed to rebuild session column")?
        } else {
            take(col.as_ref(), perm_array.as_ref(), None)
                .context("failed to reorder column by case group")?
        };
        columns.push(rebuilt);
    }

    let durations: Vec<f64> = perm
        .iter()
        .map(|&r| {
            let row = r as usize;
            gap_minutes(starts[row], completes[row])
        })
        .collect();
    let duration_array: ArrayRef = Arc::new(Float64Array::from(durations));

    let mut fields = schema.fields().to_vec();
    match schema.column_with_name(DURATION_COLUMN) {
        // Recomputing over an already-imputed table overwrites in place, so
        // a second pass reproduces its input exactly.
        Some((idx, _)) => columns[idx] = duration_array,
        None => {
            fields.push(Arc::new(Field::new(
                DURATION_COLUMN,
                DataType::Float64,
                false,
            )));
            columns.push(duration_array);
        }
    }

    let out_schema = Arc::new(Schema::new(fields));
    let output = RecordBatch::try_new(out_schema, columns)
        .context("failed to create imputed record batch")?;
    Ok((output, stats))
}

/// Table function wrapper over [`impute_batch`]. The forward-fill chain needs
/// the whole log, so incoming batches are buffered and the rewritten table is
/// emitted on `finalize`.
#[derive(Debug)]
pub struct SessionImpute {
    params: ImputeParams,
    buffered: Vec<RecordBatch>,
    imputed_rows: AtomicU64,
    scanned_cases: AtomicU64,
    mutex: Mutex<()>,
}

impl SessionImpute {
    pub fn new(
        params: Option<Args>,
        named_arguments: Vec<(String, Arg)>,
    ) -> anyhow::Result<SessionImpute> {
        Ok(SessionImpute {
            params: ImputeParams::new(params, named_arguments)?,
            buffered: Vec::new(),
            imputed_rows: 0.into(),
            scanned_cases: 0.into(),
            mutex: Mutex::default(),
        })
    }

    /// Metrics from the last `finalize`. Observability only, never required
    /// for correctness.
    pub fn stats(&self) -> ImputeStats {
        ImputeStats {
            imputed_rows: self.imputed_rows.load(Ordering::Acquire),
            scanned_cases: self.scanned_cases.load(Ordering::Acquire),
        }
    }
}

impl TableFunction for SessionImpute {
    fn process(&mut self, input: RecordBatch) -> anyhow::Result<Option<RecordBatch>> {
        let _lock = self.mutex.lock();
        self.buffered.push(input);
        Ok(None)
    }

    fn finalize(&mut self) -> anyhow::Result<Option<RecordBatch>> {
        let _lock = self.mutex.lock();
        let batches = std::mem::take(&mut self.buffered);
        let Some(first) = batches.first() else {
            return Ok(None);
        };
        let table = concat_batches(&first.schema(), &batches)
            .context("failed to concatenate buffered event log batches")?;
        let (output, stats) = impute_batch(&table, &self.params)?;
        self.imputed_rows.store(stats.imputed_rows, Ordering::Release);
        self.scanned_cases
            .store(stats.scanned_cases, Ordering::Release);
        tracing::debug!(
            imputed_rows = stats.imputed_rows,
            scanned_cases = stats.scanned_cases,
            "session imputation finished"
        );
        Ok(Some(output))
    }
}
