//! PostgreSQL backend over the synchronous `postgres` client.
//!
//! Statements run inside an implicit transaction that is opened on the first
//! statement after a commit or rollback, so `commit`/`rollback` from the
//! shell behave the same as on the other backends.

use std::collections::VecDeque;
use std::error::Error;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::types::{FromSql, IsNull, ToSql, Type};
use postgres::{Client, Column, NoTls};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use super::{
    ConnectParams, Driver, NativeConnection, NativeCursor, needs_implicit_begin, probe_table_metadata,
    transaction_effect,
};
use crate::core::{ColumnDescription, ColumnMetadata, DbError, DbResult, IndexMetadata, Row, TypeTag, Value};

pub const DEFAULT_PORT: u16 = 5432;

type BoxError = Box<dyn Error + Sync + Send>;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl Driver for PostgresDriver {
    fn display_name(&self) -> &str {
        "PostgreSQL"
    }

    fn connect(&self, params: &ConnectParams<'_>) -> DbResult<Box<dyn NativeConnection>> {
        let mut config = postgres::Config::new();
        config
            .host(params.host)
            .port(params.port.unwrap_or(DEFAULT_PORT))
            .dbname(params.database);
        if !params.user.is_empty() {
            config.user(params.user);
        }
        if !params.password.is_empty() {
            config.password(params.password);
        }

        let client = config.connect(NoTls)?;
        Ok(Box::new(PostgresConnection {
            client: Some(client),
            in_transaction: false,
        }))
    }
}

struct PostgresConnection {
    client: Option<Client>,
    in_transaction: bool,
}

impl PostgresConnection {
    fn client(&mut self) -> DbResult<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| DbError::error("connection is closed"))
    }

    fn end_transaction(&mut self, verb: &str) -> DbResult<()> {
        if self.in_transaction {
            self.client()?.batch_execute(verb)?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

impl NativeConnection for PostgresConnection {
    fn cursor(&mut self) -> DbResult<Box<dyn NativeCursor + '_>> {
        self.client()?;
        Ok(Box::new(PostgresCursor {
            conn: self,
            rows: VecDeque::new(),
            description: None,
            row_count: None,
        }))
    }

    fn commit(&mut self) -> DbResult<()> {
        self.end_transaction("COMMIT")
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.end_transaction("ROLLBACK")
    }

    fn close(&mut self) -> DbResult<()> {
        match self.client.take() {
            Some(client) => Ok(client.close()?),
            None => Err(DbError::error("connection is closed")),
        }
    }
}

struct PostgresCursor<'a> {
    conn: &'a mut PostgresConnection,
    rows: VecDeque<Row>,
    description: Option<Vec<ColumnDescription>>,
    row_count: Option<i64>,
}

impl PostgresCursor<'_> {
    fn catalog_query(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<postgres::Row>> {
        Ok(self.conn.client()?.query(sql, params)?)
    }

    fn index_names(&mut self, table: &str) -> DbResult<Vec<String>> {
        let rows = self.catalog_query(
            "SELECT c.relname::text \
             FROM pg_catalog.pg_class c \
             JOIN pg_catalog.pg_index i ON i.indexrelid = c.oid \
             JOIN pg_catalog.pg_class c2 ON i.indrelid = c2.oid \
             LEFT JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             WHERE c.relkind = 'i' \
             AND n.nspname NOT IN ('pg_catalog', 'pg_toast') \
             AND pg_catalog.pg_table_is_visible(c.oid) \
             AND c2.relname = $1 \
             ORDER BY c.relname",
            &[&table.to_lowercase()],
        )?;
        rows.iter().map(|r| Ok(r.try_get::<_, String>(0)?)).collect()
    }

    fn index_columns(&mut self, index: &str) -> DbResult<Vec<String>> {
        let rows = self.catalog_query(
            "SELECT a.attname::text \
             FROM pg_catalog.pg_attribute a \
             JOIN pg_catalog.pg_class c ON a.attrelid = c.oid \
             WHERE c.relname = $1 \
             AND pg_catalog.pg_table_is_visible(c.oid) \
             AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum",
            &[&index],
        )?;
        rows.iter().map(|r| Ok(r.try_get::<_, String>(0)?)).collect()
    }

    fn index_description(&mut self, index: &str) -> DbResult<Option<String>> {
        let rows = self.catalog_query(
            "SELECT i.indisunique, i.indisprimary, i.indisclustered, a.amname::text \
             FROM pg_catalog.pg_index i \
             JOIN pg_catalog.pg_class c ON i.indexrelid = c.oid \
             JOIN pg_catalog.pg_am a ON c.relam = a.oid \
             WHERE c.relname = $1",
            &[&index],
        )?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let access_method: Option<String> = row.try_get(3)?;
        Ok(Some(describe_index(
            row.try_get(0)?,
            row.try_get(1)?,
            row.try_get(2)?,
            access_method.as_deref(),
        )))
    }
}

impl NativeCursor for PostgresCursor<'_> {
    fn execute(&mut self, statement: &str, params: &[Value]) -> DbResult<()> {
        self.rows.clear();
        self.description = None;
        self.row_count = None;

        if !self.conn.in_transaction && needs_implicit_begin(statement) {
            self.conn.client()?.batch_execute("BEGIN")?;
            self.conn.in_transaction = true;
        }
        if let Some(open) = transaction_effect(statement) {
            self.conn.in_transaction = open;
        }

        let wrapped: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = wrapped.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let client = self.conn.client()?;
        let prepared = client.prepare(statement)?;
        if prepared.columns().is_empty() {
            let affected = client.execute(&prepared, &refs)?;
            self.row_count = i64::try_from(affected).ok();
            return Ok(());
        }

        let rows = client.query(&prepared, &refs)?;
        let columns = prepared.columns();
        self.row_count = i64::try_from(rows.len()).ok();
        self.rows = rows
            .iter()
            .map(|row| convert_row(row, columns))
            .collect::<DbResult<_>>()?;
        self.description = Some(columns.iter().map(describe_column).collect());
        Ok(())
    }

    fn fetch_one(&mut self) -> DbResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }

    fn row_count(&self) -> Option<i64> {
        self.row_count
    }

    fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.description.clone()
    }

    fn table_metadata(&mut self, table: &str) -> DbResult<Vec<ColumnMetadata>> {
        let rows = self.catalog_query(
            "SELECT column_name::text, data_type::text, \
             character_maximum_length::int8, numeric_precision::int8, \
             numeric_scale::int8, is_nullable::text \
             FROM information_schema.columns \
             WHERE table_name = $1 \
             ORDER BY ordinal_position",
            &[&table.to_lowercase()],
        )?;
        if rows.is_empty() {
            return probe_table_metadata(self, table);
        }

        rows.iter()
            .map(|r| {
                let nullable: Option<String> = r.try_get(5)?;
                Ok(ColumnMetadata {
                    name: r.try_get(0)?,
                    type_name: r.try_get(1)?,
                    max_char_size: r.try_get(2)?,
                    precision: r.try_get(3)?,
                    scale: r.try_get(4)?,
                    nullable: nullable.map(|n| n.eq_ignore_ascii_case("YES")),
                })
            })
            .collect()
    }

    fn index_metadata(&mut self, table: &str) -> DbResult<Option<Vec<IndexMetadata>>> {
        let mut indexes = Vec::new();
        for name in self.index_names(table)? {
            let columns = self.index_columns(&name)?;
            let description = self.index_description(&name)?;
            indexes.push(IndexMetadata::new(name, columns, description));
        }
        Ok(Some(indexes))
    }
}

fn describe_index(unique: bool, primary: bool, clustered: bool, access_method: Option<&str>) -> String {
    let mut desc = String::new();
    if primary {
        desc.push_str("(PRIMARY) ");
    }
    desc.push_str(if unique { "Unique" } else { "Non-unique" });
    desc.push_str(if clustered { ", clustered" } else { ", non-clustered" });
    if let Some(am) = access_method {
        desc.push(' ');
        desc.push_str(am);
    }
    desc.push_str(" index");
    desc
}

fn type_tag(ty: &Type) -> Option<TypeTag> {
    match *ty {
        Type::BYTEA => Some(TypeTag::Binary),
        Type::INT2 | Type::INT4 | Type::INT8 | Type::FLOAT4 | Type::FLOAT8 | Type::NUMERIC | Type::MONEY => {
            Some(TypeTag::Number)
        }
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::CHAR | Type::NAME | Type::UNKNOWN => {
            Some(TypeTag::String)
        }
        Type::DATE | Type::TIME | Type::TIMETZ | Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::INTERVAL => {
            Some(TypeTag::DateTime)
        }
        Type::OID | Type::TID | Type::XID => Some(TypeTag::RowId),
        _ => None,
    }
}

fn describe_column(column: &Column) -> ColumnDescription {
    let ty = column.type_();
    ColumnDescription::new(column.name(), ty.name(), type_tag(ty))
}

fn convert_row(row: &postgres::Row, columns: &[Column]) -> DbResult<Row> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, col)| convert_value(row, idx, col.type_()))
        .collect()
}

fn cell<'a, T, F>(row: &'a postgres::Row, idx: usize, wrap: F) -> DbResult<Value>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    let value: Option<T> = row.try_get(idx)?;
    Ok(value.map_or(Value::Null, wrap))
}

fn convert_value(row: &postgres::Row, idx: usize, ty: &Type) -> DbResult<Value> {
    match *ty {
        Type::BOOL => cell(row, idx, Value::Boolean),
        Type::INT2 => cell(row, idx, |v: i16| Value::Integer(v.into())),
        Type::INT4 => cell(row, idx, |v: i32| Value::Integer(v.into())),
        Type::INT8 => cell(row, idx, Value::Integer),
        Type::OID => cell(row, idx, |v: u32| Value::Integer(v.into())),
        Type::FLOAT4 => cell(row, idx, |v: f32| Value::Real(v.into())),
        Type::FLOAT8 => cell(row, idx, Value::Real),
        Type::NUMERIC => cell(row, idx, Value::Numeric),
        Type::BYTEA => cell(row, idx, Value::Bytes),
        Type::DATE => cell(row, idx, Value::Date),
        Type::TIME => cell(row, idx, Value::Time),
        Type::TIMESTAMP => cell(row, idx, Value::Timestamp),
        Type::TIMESTAMPTZ => cell(row, idx, Value::TimestampTz),
        Type::UUID => cell(row, idx, Value::Uuid),
        Type::JSON | Type::JSONB => cell(row, idx, |v: serde_json::Value| Value::Json(v.to_string())),
        _ => Ok(match row.try_get::<_, Option<String>>(idx) {
            Ok(text) => text.map_or(Value::Null, Value::Text),
            Err(_) => Value::Text(format!("<{}>", ty.name())),
        }),
    }
}

/// Binds a [`Value`] to whatever parameter type the server inferred.
#[derive(Debug)]
struct PgParam<'a>(&'a Value);

fn is_text(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN)
}

fn encode_integer(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ if is_text(ty) => i.to_string().to_sql(ty, out),
        _ => i.to_sql(ty, out),
    }
}

fn encode_real(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(f)?.to_sql(ty, out),
        _ if is_text(ty) => f.to_string().to_sql(ty, out),
        _ => f.to_sql(ty, out),
    }
}

fn encode_numeric(d: &Decimal, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => {
            let i = d.to_i64().ok_or("numeric value out of integer range")?;
            encode_integer(i, ty, out)
        }
        Type::FLOAT4 | Type::FLOAT8 => {
            let f = d.to_f64().ok_or("numeric value out of float range")?;
            encode_real(f, ty, out)
        }
        _ if is_text(ty) => d.to_string().to_sql(ty, out),
        _ => d.to_sql(ty, out),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => encode_integer(s.trim().parse()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => encode_real(s.trim().parse()?, ty, out),
        Type::NUMERIC => Decimal::from_str(s.trim())?.to_sql(ty, out),
        Type::BOOL => parse_bool(s).ok_or("invalid boolean literal")?.to_sql(ty, out),
        Type::UUID => Uuid::parse_str(s.trim())?.to_sql(ty, out),
        Type::DATE => NaiveDate::from_str(s.trim())?.to_sql(ty, out),
        Type::TIME => NaiveTime::from_str(s.trim())?.to_sql(ty, out),
        Type::TIMESTAMP => NaiveDateTime::from_str(s.trim())?.to_sql(ty, out),
        Type::TIMESTAMPTZ => DateTime::<Utc>::from_str(s.trim())?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        _ => s.to_sql(ty, out),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Integer(i) => encode_integer(*i, ty, out),
            Value::Real(f) => encode_real(*f, ty, out),
            Value::Numeric(d) => encode_numeric(d, ty, out),
            Value::Text(s) => encode_text(s, ty, out),
            Value::Boolean(b) if is_text(ty) => b.to_string().to_sql(ty, out),
            Value::Boolean(b) => b.to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::Time(t) => t.to_sql(ty, out),
            Value::Timestamp(ts) => ts.to_sql(ty, out),
            Value::TimestampTz(ts) => ts.to_sql(ty, out),
            Value::Uuid(u) => u.to_sql(ty, out),
            Value::Json(s) if matches!(*ty, Type::JSON | Type::JSONB) => {
                serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
            }
            Value::Json(s) => s.to_sql(ty, out),
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        self.to_sql(ty, out)
    }
}
