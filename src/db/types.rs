//! Row decoding into JSON.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! Binary values are always rendered as base64 strings so that results can
//! be handed to the model as plain JSON.

use crate::models::{DatabaseType, FieldInfo};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Uuid,
    /// Text, dates and anything else decoded as a string
    Other,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let name = type_name.to_ascii_lowercase();
    let has = |needle: &str| name.contains(needle);

    match name.as_str() {
        // SQLite's NUMERIC affinity stores floats
        _ if is_decimal_name(&name) && db == DatabaseType::SQLite => TypeCategory::Float,
        _ if is_decimal_name(&name) => TypeCategory::Decimal,
        _ if has("int") || has("serial") || has("tiny") => TypeCategory::Integer,
        "bool" | "boolean" => TypeCategory::Boolean,
        "real" => TypeCategory::Float,
        _ if has("float") || has("double") => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "bytea" => TypeCategory::Binary,
        _ if has("blob") || has("binary") => TypeCategory::Binary,
        _ => TypeCategory::Other,
    }
}

fn is_decimal_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.contains("decimal") || name.contains("numeric")
}

/// Raw DECIMAL/NUMERIC text, preserving the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

macro_rules! raw_decimal {
    ($db:ty, $info:ty, $value:ident) => {
        impl Type<$db> for RawDecimal {
            fn type_info() -> $info {
                <String as Type<$db>>::type_info()
            }

            fn compatible(ty: &$info) -> bool {
                is_decimal_name(ty.name())
            }
        }

        impl<'r> Decode<'r, $db> for RawDecimal {
            fn decode(value: $value<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                <&str as Decode<$db>>::decode(value).map(|text| RawDecimal(text.to_owned()))
            }
        }
    };
}

raw_decimal!(sqlx::MySql, MySqlTypeInfo, MySqlValueRef);
raw_decimal!(sqlx::Postgres, PgTypeInfo, PgValueRef);

/// Base64 text for a binary value.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Conversion of driver rows into JSON objects.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
    fn field_infos(&self) -> Vec<FieldInfo>;
}

macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, $decoder:path) => {
        impl RowToJson for $row {
            fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let type_name = col.type_info().name();
                        let category = categorize_type(type_name, $db);
                        (col.name().to_string(), $decoder(self, idx, category))
                    })
                    .collect()
            }

            fn field_infos(&self) -> Vec<FieldInfo> {
                self.columns()
                    .iter()
                    .map(|col| FieldInfo::new(col.name(), col.type_info().name()))
                    .collect()
            }
        }
    };
}

/// Non-null value of column `idx` as `T`; `None` for NULL or a type mismatch.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

/// Temporal columns rendered as strings (RFC 3339 when zoned); `None` if not temporal.
fn decode_temporal<R>(row: &R, idx: usize) -> Option<JsonValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
{
    let text = get::<_, DateTime<Utc>>(row, idx)
        .map(|v| v.to_rfc3339())
        .or_else(|| get::<_, NaiveDateTime>(row, idx).map(|v| v.to_string()))
        .or_else(|| get::<_, NaiveDate>(row, idx).map(|v| v.to_string()))
        .or_else(|| get::<_, NaiveTime>(row, idx).map(|v| v.to_string()))?;
    Some(JsonValue::String(text))
}

/// Categories MySQL and PostgreSQL decode alike. `None` leaves the column
/// to the engine (text, UUID and temporal values).
macro_rules! decode_typed {
    ($row:expr, $idx:expr, $category:expr, [$($int:ty),+]) => {
        match $category {
            TypeCategory::Decimal => match $row.try_get::<Option<RawDecimal>, _>($idx) {
                Ok(v) => Some(v.map_or(JsonValue::Null, |d| JsonValue::String(d.0))),
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to decode decimal column");
                    Some(JsonValue::Null)
                }
            },
            TypeCategory::Integer => Some(
                None::<JsonValue>
                    $(.or_else(|| get::<_, $int>($row, $idx).map(|v| JsonValue::Number(v.into()))))+
                    .unwrap_or(JsonValue::Null),
            ),
            TypeCategory::Boolean => Some(get::<_, bool>($row, $idx).map_or(JsonValue::Null, JsonValue::Bool)),
            TypeCategory::Float => Some(
                get::<_, f64>($row, $idx)
                    .or_else(|| get::<_, f32>($row, $idx).map(f64::from))
                    .map_or(JsonValue::Null, float_value),
            ),
            TypeCategory::Binary => Some(
                get::<_, Vec<u8>>($row, $idx).map_or(JsonValue::Null, |v| encode_binary(&v)),
            ),
            TypeCategory::Json => Some(get::<_, JsonValue>($row, $idx).unwrap_or(JsonValue::Null)),
            TypeCategory::Uuid | TypeCategory::Other => None,
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, mysql::decode_column);
impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, postgres::decode_column);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        decode_typed!(row, idx, category, [i64, i32, i16, i8, u64, u32, u16, u8])
            .unwrap_or_else(|| decode_text(row, idx))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Some(text) = get::<_, String>(row, idx) {
            return JsonValue::String(text);
        }
        if let Some(value) = decode_temporal(row, idx) {
            return value;
        }
        // VARBINARY-backed text columns
        match get::<_, Vec<u8>>(row, idx).map(String::from_utf8) {
            Some(Ok(text)) => JsonValue::String(text),
            Some(Err(e)) => encode_binary(e.as_bytes()),
            None => JsonValue::Null,
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        if let Some(value) = decode_typed!(row, idx, category, [i64, i32, i16]) {
            return value;
        }
        if category == TypeCategory::Uuid {
            return get::<_, uuid::Uuid>(row, idx)
                .map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()));
        }
        match row.try_get::<Option<String>, _>(idx) {
            Ok(text) => text.map_or(JsonValue::Null, JsonValue::String),
            Err(_) => decode_temporal(row, idx).unwrap_or(JsonValue::Null),
        }
    }
}

mod sqlite {
    use super::*;

    /// SQLite columns are dynamically typed; fall back through the storage classes.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Boolean => get::<_, bool>(row, idx)
                .map(JsonValue::Bool)
                .unwrap_or_else(|| decode_dynamic(row, idx)),
            TypeCategory::Binary => {
                get::<_, Vec<u8>>(row, idx).map_or(JsonValue::Null, |v| encode_binary(&v))
            }
            TypeCategory::Json => match get::<_, String>(row, idx) {
                Some(text) => serde_json::from_str(&text).unwrap_or(JsonValue::String(text)),
                None => JsonValue::Null,
            },
            _ => decode_dynamic(row, idx),
        }
    }

    fn decode_dynamic(row: &SqliteRow, idx: usize) -> JsonValue {
        get::<_, i64>(row, idx)
            .map(|v| JsonValue::Number(v.into()))
            .or_else(|| get::<_, f64>(row, idx).map(float_value))
            .or_else(|| get::<_, String>(row, idx).map(JsonValue::String))
            .or_else(|| get::<_, Vec<u8>>(row, idx).map(|v| encode_binary(&v)))
            .unwrap_or(JsonValue::Null)
    }
}
