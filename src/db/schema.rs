use anyhow::Result;

use crate::config::NA_VALUES;

/// SQL data type of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    BigInt,
    DoublePrecision,
    Text,
    Timestamp,
}

impl SqlType {
    /// Returns the Postgres type name
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::BigInt => "BIGINT",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Timestamp => "TIMESTAMP",
        }
    }

    /// Find the most specific common type that accommodates both types
    fn common_type(&self, other: &SqlType) -> SqlType {
        use SqlType::*;

        match (self, other) {
            (a, b) if a == b => *a,
            (BigInt, DoublePrecision) | (DoublePrecision, BigInt) => DoublePrecision,
            _ => Text,
        }
    }
}

/// A column in a schema
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

/// Column layout of a batch, and therefore of the destination table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Whether a raw field is read as NULL
pub fn is_na(value: &str) -> bool {
    NA_VALUES.contains(&value.trim())
}

/// Infers SQL types for columns the caller did not declare
pub struct SchemaInferrer;

impl SchemaInferrer {
    /// Infer the type of a single value
    fn infer_value_type(value: &str) -> Option<SqlType> {
        if is_na(value) {
            return None;
        }
        let trimmed = value.trim();

        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            return Some(SqlType::Boolean);
        }

        if trimmed.parse::<i64>().is_ok() {
            return Some(SqlType::BigInt);
        }

        if trimmed.parse::<f64>().is_ok() {
            return Some(SqlType::DoublePrecision);
        }

        Some(SqlType::Text)
    }

    /// Infer a column type from its sample values
    ///
    /// Integers cannot hold NULL in an inferred column, so an integer column
    /// with any missing value widens to DOUBLE PRECISION. A column with no
    /// values at all is DOUBLE PRECISION as well.
    pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a str>) -> SqlType {
        let mut inferred_type: Option<SqlType> = None;
        let mut has_nulls = false;

        for value in values {
            match Self::infer_value_type(value) {
                Some(val_type) => {
                    inferred_type = Some(match inferred_type {
                        None => val_type,
                        Some(current) => current.common_type(&val_type),
                    });
                }
                None => {
                    has_nulls = true;
                }
            }
        }

        match inferred_type {
            None => SqlType::DoublePrecision,
            Some(SqlType::BigInt) if has_nulls => SqlType::DoublePrecision,
            Some(sql_type) => sql_type,
        }
    }

    /// Generate the statements that drop and recreate a table
    ///
    /// Every column is nullable and there is no primary key, so appended
    /// rows are never rejected for uniqueness.
    pub fn generate_replace_ddl(table_name: &str, schema: &TableSchema) -> Result<[String; 2]> {
        if schema.columns.is_empty() {
            anyhow::bail!("Cannot create table '{}' without columns", table_name);
        }

        let table = quote_ident(table_name);
        let drop = format!("DROP TABLE IF EXISTS {}", table);

        let column_defs: Vec<String> = schema
            .columns
            .iter()
            .map(|col| format!("  {} {}", quote_ident(&col.name), col.sql_type.to_postgres()))
            .collect();

        let create = format!("CREATE TABLE {} (\n{}\n)", table, column_defs.join(",\n"));

        Ok([drop, create])
    }
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_value_types() {
        assert_eq!(
            SchemaInferrer::infer_value_type("42"),
            Some(SqlType::BigInt)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("9999999999"),
            Some(SqlType::BigInt)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("3.14"),
            Some(SqlType::DoublePrecision)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("1e-3"),
            Some(SqlType::DoublePrecision)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("TRUE"),
            Some(SqlType::Boolean)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("N"),
            Some(SqlType::Text)
        );
        assert_eq!(SchemaInferrer::infer_value_type(""), None);
        assert_eq!(SchemaInferrer::infer_value_type("NaN"), None);
    }

    #[test]
    fn test_type_promotion() {
        assert_eq!(
            SqlType::BigInt.common_type(&SqlType::DoublePrecision),
            SqlType::DoublePrecision
        );
        assert_eq!(SqlType::BigInt.common_type(&SqlType::Text), SqlType::Text);
        assert_eq!(
            SqlType::Boolean.common_type(&SqlType::BigInt),
            SqlType::Text
        );
    }

    #[test]
    fn test_infer_column_type() {
        let test_cases: [(&[&str], SqlType, &str); 7] = [
            (&["1", "2", "3"], SqlType::BigInt, "all integers"),
            (&["1", "", "3"], SqlType::DoublePrecision, "integers with a gap"),
            (&["1", "2.5"], SqlType::DoublePrecision, "mixed numeric"),
            (&["true", "False"], SqlType::Boolean, "booleans"),
            (&["Y", "N", ""], SqlType::Text, "flags"),
            (&["", "NA"], SqlType::DoublePrecision, "only nulls"),
            (&[], SqlType::DoublePrecision, "no values"),
        ];

        for (values, expected, description) in test_cases {
            assert_eq!(
                SchemaInferrer::infer_column_type(values.iter().copied()),
                expected,
                "Failed: {}",
                description
            );
        }
    }

    #[test]
    fn test_generate_replace_ddl() {
        let schema = TableSchema {
            columns: vec![
                Column {
                    name: "VendorID".to_string(),
                    sql_type: SqlType::BigInt,
                },
                Column {
                    name: "tpep_pickup_datetime".to_string(),
                    sql_type: SqlType::Timestamp,
                },
                Column {
                    name: "fare_amount".to_string(),
                    sql_type: SqlType::DoublePrecision,
                },
                Column {
                    name: "store_and_fwd_flag".to_string(),
                    sql_type: SqlType::Text,
                },
            ],
        };

        let [drop, create] =
            SchemaInferrer::generate_replace_ddl("yellow_taxi_data", &schema).unwrap();

        assert_eq!(drop, "DROP TABLE IF EXISTS \"yellow_taxi_data\"");
        assert!(create.starts_with("CREATE TABLE \"yellow_taxi_data\""));
        assert!(create.contains("\"VendorID\" BIGINT"));
        assert!(create.contains("\"tpep_pickup_datetime\" TIMESTAMP"));
        assert!(create.contains("\"fare_amount\" DOUBLE PRECISION"));
        assert!(create.contains("\"store_and_fwd_flag\" TEXT"));
        assert!(!create.contains("NOT NULL"));
        assert!(!create.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_generate_replace_ddl_rejects_empty_schema() {
        let schema = TableSchema { columns: vec![] };
        assert!(SchemaInferrer::generate_replace_ddl("t", &schema).is_err());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
