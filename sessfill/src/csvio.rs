use std::{
    fs::File,
    io::{BufWriter, Seek},
    path::Path,
    sync::Arc,
};

use anyhow::Context;
use arrow::{array::RecordBatch, csv::ReaderBuilder};
use arrow_csv::{WriterBuilder, reader::Format};

/// Loads a delimited event log with a header row, inferring the schema so
/// that ISO timestamp columns arrive as Arrow timestamp types. Plain I/O
/// adapter: the imputation core never reads files itself.
pub fn read_event_log(path: impl AsRef<Path>) -> anyhow::Result<Vec<RecordBatch>> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .with_context(|| format!("failed to open event log at: {}", path.display()))?;

    let format = Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(&mut file, None)
        .context("failed to infer event log schema")?;
    file.rewind().context("failed to rewind event log file")?;

    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_format(format)
        .build(file)
        .context("failed to create event log reader")?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.context("failed to read event log batch")?);
    }
    Ok(batches)
}

/// Writes batches as a headered CSV file, overwriting any existing file.
pub fn write_event_log(path: impl AsRef<Path>, batches: &[RecordBatch]) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create output file at: {}", path.display()))?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .build(BufWriter::new(file));
    for batch in batches {
        writer.write(batch).context("failed to write event log batch")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn read_infers_timestamp_columns() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temporary file");
        writeln!(temp_file, "case,event,startTime,completeTime,sessionid").expect("write failed");
        writeln!(
            temp_file,
            "c1,Login,2016-01-01 09:00:00,2016-01-01 09:02:00,S1"
        )
        .expect("write failed");
        writeln!(
            temp_file,
            "c1,Browse,2016-01-01 09:07:00,2016-01-01 09:08:00,S1"
        )
        .expect("write failed");
        temp_file.flush().expect("flush failed");

        let batches = read_event_log(temp_file.path()).expect("Failed to read event log");
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        let schema = batch.schema();
        assert!(matches!(
            schema.field_with_name("startTime").expect("startTime missing").data_type(),
            DataType::Timestamp(_, _)
        ));
        assert_eq!(
            schema.field_with_name("case").expect("case missing").data_type(),
            &DataType::Utf8
        );
    }

    #[test]
    fn write_then_read_round_trips_rows() {
        let temp_in = NamedTempFile::new().expect("Failed to create temporary file");
        let mut file = File::create(temp_in.path()).expect("Failed to open temp file");
        writeln!(file, "case,event,startTime,completeTime,sessionid").expect("write failed");
        writeln!(
            file,
            "c1,Login,2016-01-01 09:00:00,2016-01-01 09:02:00,S1"
        )
        .expect("write failed");
        drop(file);

        let batches = read_event_log(temp_in.path()).expect("Failed to read event log");

        let temp_out = NamedTempFile::new().expect("Failed to create temporary file");
        write_event_log(temp_out.path(), &batches).expect("Failed to write event log");

        let reread = read_event_log(temp_out.path()).expect("Failed to reread event log");
        assert_eq!(reread.len(), 1);
        assert_eq!(reread[0].num_rows(), 1);
    }

    #[test]
    fn read_missing_file_fails_with_path() {
        let err = read_event_log("/nonexistent/log.csv").expect_err("missing file must fail");
        assert!(err.to_string().contains("/nonexistent/log.csv"));
    }
}
