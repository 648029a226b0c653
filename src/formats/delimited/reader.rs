use anyhow::{Context, Result, anyhow};
use csv::{StringRecord, StringRecordsIntoIter};
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::schema::{Column, SchemaInferrer, SqlType, TableSchema};
use crate::formats::coerce::{Value, coerce};
use crate::formats::reader::{Batch, Compression, ReadOptions};
use crate::io::FetchedResource;

/// Splits a CSV stream into typed batches of at most `chunksize` rows
///
/// The reader is lazy and forward-only: each call to `next` parses just
/// enough input for one batch. Once an error is returned the iterator is
/// exhausted.
pub struct ChunkedCsvReader {
    records: StringRecordsIntoIter<Box<dyn Read + Send>>,
    headers: Vec<String>,
    /// Type per column; `None` until inferred from the first batch
    column_types: Vec<Option<SqlType>>,
    schema: Option<Arc<TableSchema>>,
    chunksize: usize,
    next_index: usize,
    finished: bool,
}

impl ChunkedCsvReader {
    /// Create a reader over a fetched resource, decompressing as needed
    pub fn from_resource(
        resource: FetchedResource,
        compression: Compression,
        options: &ReadOptions,
    ) -> Result<Self> {
        Self::new(compression.wrap(resource.file), options)
    }

    /// Create a reader over an already decompressed CSV stream
    pub fn new(input: Box<dyn Read + Send>, options: &ReadOptions) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let headers: Vec<String> = csv_reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect();

        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            anyhow::bail!("No columns to parse from file");
        }

        for date_column in options.date_columns.iter() {
            if !headers.iter().any(|h| h == date_column) {
                anyhow::bail!("Date column '{}' is missing from the file header", date_column);
            }
        }

        let column_types = headers
            .iter()
            .map(|name| {
                if options.date_columns.contains(name) {
                    Some(SqlType::Timestamp)
                } else {
                    options.column_schema.get(name).map(|ty| ty.sql_type())
                }
            })
            .collect();

        debug!(columns = headers.len(), "parsed CSV header");

        Ok(Self {
            records: csv_reader.into_records(),
            headers,
            column_types,
            schema: None,
            chunksize: options.chunksize,
            next_index: 0,
            finished: false,
        })
    }

    /// Column names in source order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Pull up to `chunksize` raw records from the source
    fn read_records(&mut self) -> Result<Vec<StringRecord>> {
        let mut raw = Vec::with_capacity(self.chunksize.min(16 * 1024));

        while raw.len() < self.chunksize {
            match self.records.next() {
                Some(result) => {
                    let record = result.context("Failed to parse CSV record")?;
                    if record.len() > self.headers.len() {
                        return Err(anyhow!(
                            "Expected {} fields on line {}, saw {}",
                            self.headers.len(),
                            line_of(&record),
                            record.len()
                        ));
                    }
                    raw.push(record);
                }
                None => break,
            }
        }

        Ok(raw)
    }

    /// Fix the table schema, inferring undeclared columns from the first records
    fn resolve_schema(&mut self, sample: &[StringRecord]) -> Arc<TableSchema> {
        if let Some(schema) = &self.schema {
            return Arc::clone(schema);
        }

        let mut columns = Vec::with_capacity(self.headers.len());
        for (idx, name) in self.headers.iter().enumerate() {
            let sql_type = match self.column_types[idx] {
                Some(sql_type) => sql_type,
                // Nothing to infer from a header-only source
                None if sample.is_empty() => {
                    self.column_types[idx] = Some(SqlType::Text);
                    SqlType::Text
                }
                None => {
                    let inferred = SchemaInferrer::infer_column_type(
                        sample.iter().map(|record| record.get(idx).unwrap_or("")),
                    );
                    info!(
                        column = %name,
                        sql_type = inferred.to_postgres(),
                        "inferred type for undeclared column"
                    );
                    self.column_types[idx] = Some(inferred);
                    inferred
                }
            };
            columns.push(Column {
                name: name.clone(),
                sql_type,
            });
        }

        let schema = Arc::new(TableSchema { columns });
        self.schema = Some(Arc::clone(&schema));
        schema
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        let raw = self.read_records()?;
        // A header-only source still yields one empty batch so that the
        // destination table is replaced
        if raw.is_empty() && self.next_index > 0 {
            return Ok(None);
        }

        let schema = self.resolve_schema(&raw);

        let mut rows = Vec::with_capacity(raw.len());
        for record in &raw {
            let mut row = Vec::with_capacity(schema.columns.len());
            for (idx, column) in schema.columns.iter().enumerate() {
                // Short rows are padded with NULLs
                let field = record.get(idx).unwrap_or("");
                let value: Value = coerce(field, column.sql_type).with_context(|| {
                    format!(
                        "Type mismatch on line {} in column '{}' ({})",
                        line_of(record),
                        column.name,
                        column.sql_type.to_postgres()
                    )
                })?;
                row.push(value);
            }
            rows.push(row);
        }

        let batch = Batch {
            index: self.next_index,
            schema,
            rows,
        };
        self.next_index += 1;

        Ok(Some(batch))
    }
}

impl Iterator for ChunkedCsvReader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::reader::{ColumnSchema, ColumnType, DateColumns};
    use std::io::Cursor;

    fn reader_for(csv: &str, options: &ReadOptions) -> Result<ChunkedCsvReader> {
        ChunkedCsvReader::new(Box::new(Cursor::new(csv.as_bytes().to_vec())), options)
    }

    fn simple_options(chunksize: usize) -> ReadOptions {
        ReadOptions::new(
            ColumnSchema::new([("id", ColumnType::NullableInt64), ("fare", ColumnType::Float64)]),
            DateColumns::new(["pickup"]),
            chunksize,
        )
        .unwrap()
    }

    const FIVE_ROWS: &str = "id,pickup,fare\n\
        1,2021-01-01 00:00:01,1.5\n\
        2,2021-01-01 00:00:02,2.5\n\
        3,2021-01-01 00:00:03,3.5\n\
        4,2021-01-01 00:00:04,4.5\n\
        5,2021-01-01 00:00:05,5.5\n";

    #[test]
    fn test_batches_follow_chunksize() {
        let reader = reader_for(FIVE_ROWS, &simple_options(2)).unwrap();
        let batches: Vec<Batch> = reader.collect::<Result<_>>().unwrap();

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let indexes: Vec<usize> = batches.iter().map(|b| b.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_batch_count_is_ceiling_and_order_preserved() {
        for chunksize in 1..=7 {
            let reader = reader_for(FIVE_ROWS, &simple_options(chunksize)).unwrap();
            let batches: Vec<Batch> = reader.collect::<Result<_>>().unwrap();
            assert_eq!(batches.len(), 5usize.div_ceil(chunksize));

            let ids: Vec<Value> = batches
                .iter()
                .flat_map(|b| b.rows.iter().map(|r| r[0].clone()))
                .collect();
            let expected: Vec<Value> = (1..=5).map(|i| Value::Int(Some(i))).collect();
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn test_columns_are_typed() {
        let mut reader = reader_for(FIVE_ROWS, &simple_options(10)).unwrap();
        let batch = reader.next().unwrap().unwrap();

        let types: Vec<SqlType> = batch.schema.columns.iter().map(|c| c.sql_type).collect();
        assert_eq!(
            types,
            vec![SqlType::BigInt, SqlType::Timestamp, SqlType::DoublePrecision]
        );
        assert_eq!(batch.schema.column_names(), vec!["id", "pickup", "fare"]);
        assert_eq!(batch.rows[0][2], Value::Float(Some(1.5)));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_all_batches_share_first_schema() {
        let csv = "id,pickup,fare,note\n\
            1,2021-01-01 00:00:01,1.5,7\n\
            2,2021-01-01 00:00:02,2.5,8\n\
            3,2021-01-01 00:00:03,3.5,9\n";
        let batches: Vec<Batch> = reader_for(csv, &simple_options(1))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(batches[0].schema.columns[3].sql_type, SqlType::BigInt);
        for batch in &batches[1..] {
            assert!(Arc::ptr_eq(&batch.schema, &batches[0].schema));
        }
    }

    #[test]
    fn test_inferred_type_is_frozen_after_first_batch() {
        let csv = "id,pickup,fare,note\n\
            1,2021-01-01 00:00:01,1.5,7\n\
            2,2021-01-01 00:00:02,2.5,seven\n";
        let mut reader = reader_for(csv, &simple_options(1)).unwrap();

        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("column 'note'"), "{}", message);
        assert!(message.contains("line 3"), "{}", message);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_coercion_error_fails_batch() {
        let csv = "id,pickup,fare\n1,2021-01-01 00:00:01,cheap\n";
        let mut reader = reader_for(csv, &simple_options(10)).unwrap();
        let err = reader.next().unwrap().unwrap_err();
        assert!(format!("{:#}", err).contains("column 'fare'"));
    }

    #[test]
    fn test_short_rows_padded_long_rows_rejected() {
        let csv = "id,pickup,fare\n1,2021-01-01 00:00:01\n";
        let mut reader = reader_for(csv, &simple_options(10)).unwrap();
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.rows[0][2], Value::Float(None));

        let csv = "id,pickup,fare\n1,2021-01-01 00:00:01,1.0,extra\n";
        let mut reader = reader_for(csv, &simple_options(10)).unwrap();
        let err = reader.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("Expected 3 fields on line 2, saw 4"));
    }

    #[test]
    fn test_header_only_source_yields_one_empty_batch() {
        let mut reader = reader_for("id,pickup,fare,note\n", &simple_options(10)).unwrap();

        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.index, 0);
        assert!(batch.is_empty());
        let types: Vec<SqlType> = batch.schema.columns.iter().map(|c| c.sql_type).collect();
        assert_eq!(
            types,
            vec![
                SqlType::BigInt,
                SqlType::Timestamp,
                SqlType::DoublePrecision,
                SqlType::Text
            ]
        );
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_exact_multiple_of_chunksize_has_no_trailing_empty_batch() {
        let batches: Vec<Batch> = reader_for(FIVE_ROWS, &simple_options(5))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
    }

    #[test]
    fn test_empty_source_is_rejected() {
        assert!(reader_for("", &simple_options(10)).is_err());
    }

    #[test]
    fn test_missing_date_column_is_rejected() {
        let result = reader_for("id,fare\n1,1.0\n", &simple_options(10));
        let err = result.err().unwrap();
        assert!(err.to_string().contains("'pickup'"));
    }

    #[test]
    fn test_declared_columns_absent_from_header_are_ignored() {
        let csv = "pickup,fare\n2021-01-01 00:00:01,1.0\n";
        let mut reader = reader_for(csv, &simple_options(10)).unwrap();
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.schema.column_names(), vec!["pickup", "fare"]);
    }
}
