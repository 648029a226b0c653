use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::io::{BufReader, Read};
use std::sync::Arc;

use super::coerce::Value;
use crate::db::schema::{SqlType, TableSchema};

/// Semantic type declared for a source column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Integer column that may contain missing values
    NullableInt64,
    Float64,
    Text,
}

impl ColumnType {
    pub fn sql_type(self) -> SqlType {
        match self {
            ColumnType::NullableInt64 => SqlType::BigInt,
            ColumnType::Float64 => SqlType::DoublePrecision,
            ColumnType::Text => SqlType::Text,
        }
    }
}

/// Declared column types, keyed by column name
///
/// Columns present in the source but absent here get an inferred type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    entries: Vec<(String, ColumnType)>,
}

impl ColumnSchema {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        }
    }

    /// Column types of the yellow taxi trip records
    pub fn yellow_taxi() -> Self {
        use ColumnType::*;

        Self::new([
            ("VendorID", NullableInt64),
            ("passenger_count", NullableInt64),
            ("trip_distance", Float64),
            ("RatecodeID", NullableInt64),
            ("store_and_fwd_flag", Text),
            ("PULocationID", NullableInt64),
            ("DOLocationID", NullableInt64),
            ("payment_type", NullableInt64),
            ("fare_amount", Float64),
            ("extra", Float64),
            ("mta_tax", Float64),
            ("tip_amount", Float64),
            ("tolls_amount", Float64),
            ("improvement_surcharge", Float64),
            ("total_amount", Float64),
            ("congestion_surcharge", Float64),
        ])
    }

    pub fn get(&self, name: &str) -> Option<ColumnType> {
        self.entries
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, ty)| *ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.entries.iter().map(|(name, ty)| (name.as_str(), *ty))
    }
}

/// Columns whose text is parsed into timestamps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateColumns {
    names: Vec<String>,
}

impl DateColumns {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn yellow_taxi() -> Self {
        Self::new(["tpep_pickup_datetime", "tpep_dropoff_datetime"])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Compression applied to the source payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    /// Infer compression from the source file name
    pub fn infer(file_name: Option<&str>) -> Self {
        match file_name {
            Some(name) if name.to_lowercase().ends_with(".gz") => Compression::Gzip,
            _ => Compression::None,
        }
    }

    /// Wrap a raw byte stream so that reads yield decompressed bytes
    pub fn wrap<R: Read + Send + 'static>(self, reader: R) -> Box<dyn Read + Send> {
        match self {
            Compression::None => Box::new(BufReader::new(reader)),
            Compression::Gzip => Box::new(MultiGzDecoder::new(BufReader::new(reader))),
        }
    }
}

/// Options controlling how the source is split and typed
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub column_schema: ColumnSchema,
    pub date_columns: DateColumns,
    pub chunksize: usize,
}

impl ReadOptions {
    pub fn new(
        column_schema: ColumnSchema,
        date_columns: DateColumns,
        chunksize: usize,
    ) -> Result<Self> {
        if chunksize == 0 {
            anyhow::bail!("chunksize must be a positive number of rows");
        }
        Ok(Self {
            column_schema,
            date_columns,
            chunksize,
        })
    }

    pub fn yellow_taxi(chunksize: usize) -> Result<Self> {
        Self::new(ColumnSchema::yellow_taxi(), DateColumns::yellow_taxi(), chunksize)
            .context("Invalid read options")
    }
}

/// One slice of the source, typed per the resolved table schema
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of the batch in the source, starting at 0
    pub index: usize,
    pub schema: Arc<TableSchema>,
    pub rows: Vec<Vec<Value>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
