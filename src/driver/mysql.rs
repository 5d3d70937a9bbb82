//! MySQL backend over the synchronous `mysql` client.
//!
//! The server runs in autocommit mode, so the first statement after a
//! commit or rollback opens a transaction with `BEGIN` the same way the
//! PostgreSQL backend does.

use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mysql::consts::{ColumnFlags, ColumnType};
use mysql::prelude::{FromValue, Protocol, Queryable};
use mysql::{Column, Conn, OptsBuilder, Params, QueryResult, Value as MyValue};
use rust_decimal::Decimal;

use super::{
    ConnectParams, Driver, NativeConnection, NativeCursor, needs_implicit_begin, probe_table_metadata,
    transaction_effect,
};
use crate::core::{ColumnDescription, ColumnMetadata, DbError, DbResult, IndexMetadata, Row, TypeTag, Value};

pub const DEFAULT_PORT: u16 = 3306;

/// Character set number MySQL reports for binary strings and blobs.
const BINARY_CHARSET: u16 = 63;

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDriver;

impl Driver for MysqlDriver {
    fn display_name(&self) -> &str {
        "MySQL"
    }

    fn connect(&self, params: &ConnectParams<'_>) -> DbResult<Box<dyn NativeConnection>> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(params.host))
            .tcp_port(params.port.unwrap_or(DEFAULT_PORT))
            .user(non_empty(params.user))
            .pass(non_empty(params.password))
            .db_name(non_empty(params.database));

        let conn = Conn::new(opts)?;
        Ok(Box::new(MysqlConnection {
            conn: Some(conn),
            in_transaction: false,
        }))
    }
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s).filter(|s| !s.is_empty())
}

struct MysqlConnection {
    conn: Option<Conn>,
    in_transaction: bool,
}

impl MysqlConnection {
    fn native(&mut self) -> DbResult<&mut Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::error("connection is closed"))
    }

    fn end_transaction(&mut self, verb: &str) -> DbResult<()> {
        if self.in_transaction {
            self.native()?.query_drop(verb)?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

impl NativeConnection for MysqlConnection {
    fn cursor(&mut self) -> DbResult<Box<dyn NativeCursor + '_>> {
        self.native()?;
        Ok(Box::new(MysqlCursor {
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
        // Dropping the client sends COM_QUIT.
        match self.conn.take() {
            Some(_) => Ok(()),
            None => Err(DbError::error("connection is closed")),
        }
    }
}

struct MysqlCursor<'a> {
    conn: &'a mut MysqlConnection,
    rows: VecDeque<Row>,
    description: Option<Vec<ColumnDescription>>,
    row_count: Option<i64>,
}

/// One fully read result set.
struct Buffered {
    columns: Vec<Column>,
    rows: VecDeque<Row>,
    affected: u64,
}

fn buffer_result<T: Protocol>(mut result: QueryResult<'_, '_, '_, T>) -> DbResult<Buffered> {
    let columns = result.columns().as_ref().to_vec();
    let affected = result.affected_rows();
    let mut rows = VecDeque::new();
    for row in result.by_ref() {
        let row = row?;
        rows.push_back(
            columns
                .iter()
                .enumerate()
                .map(|(idx, column)| row.as_ref(idx).map_or(Value::Null, |v| from_mysql(v, column)))
                .collect(),
        );
    }
    Ok(Buffered {
        columns,
        rows,
        affected,
    })
}

impl NativeCursor for MysqlCursor<'_> {
    fn execute(&mut self, statement: &str, params: &[Value]) -> DbResult<()> {
        self.rows.clear();
        self.description = None;
        self.row_count = None;

        if !self.conn.in_transaction && needs_implicit_begin(statement) {
            self.conn.native()?.query_drop("BEGIN")?;
            self.conn.in_transaction = true;
        }
        if let Some(open) = transaction_effect(statement) {
            self.conn.in_transaction = open;
        }

        let conn = self.conn.native()?;
        let buffered = if params.is_empty() {
            buffer_result(conn.query_iter(statement)?)?
        } else {
            let values = params.iter().map(to_mysql).collect();
            buffer_result(conn.exec_iter(statement, Params::Positional(values))?)?
        };

        if buffered.columns.is_empty() {
            self.row_count = i64::try_from(buffered.affected).ok();
            return Ok(());
        }
        self.row_count = i64::try_from(buffered.rows.len()).ok();
        self.description = Some(buffered.columns.iter().map(describe_column).collect());
        self.rows = buffered.rows;
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
        let rows: Vec<mysql::Row> = self.conn.native()?.exec(
            "SELECT column_name, data_type, character_maximum_length, \
             numeric_precision, numeric_scale, is_nullable \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? \
             ORDER BY ordinal_position",
            (table,),
        )?;
        if rows.is_empty() {
            return probe_table_metadata(self, table);
        }

        rows.iter()
            .map(|r| {
                let nullable: Option<String> = cell(r, 5)?;
                Ok(ColumnMetadata {
                    name: cell(r, 0)?.unwrap_or_default(),
                    type_name: cell(r, 1)?.unwrap_or_default(),
                    max_char_size: cell(r, 2)?,
                    precision: cell(r, 3)?,
                    scale: cell(r, 4)?,
                    nullable: nullable.map(|n| n.eq_ignore_ascii_case("YES")),
                })
            })
            .collect()
    }

    fn index_metadata(&mut self, table: &str) -> DbResult<Option<Vec<IndexMetadata>>> {
        let rows: Vec<mysql::Row> = self.conn.native()?.query(format!("SHOW INDEX FROM {table}"))?;
        let entries = rows
            .iter()
            .map(|r| {
                Ok(IndexRow {
                    name: cell(r, 2)?.unwrap_or_default(),
                    non_unique: cell::<i64>(r, 1)?.is_some_and(|n| n != 0),
                    column: cell(r, 4)?,
                    index_type: cell(r, 10)?,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Some(group_indexes(entries)))
    }
}

/// Typed read of one catalog cell; SQL NULL and a missing column are `None`.
fn cell<T: FromValue>(row: &mysql::Row, idx: usize) -> DbResult<Option<T>> {
    match row.get_opt::<Option<T>, _>(idx) {
        None => Ok(None),
        Some(Ok(value)) => Ok(value),
        Some(Err(err)) => Err(DbError::error(format!("unexpected value {:?} in column {idx}", err.0))),
    }
}

/// One row of `SHOW INDEX` output.
#[derive(Debug)]
struct IndexRow {
    name: String,
    non_unique: bool,
    column: Option<String>,
    index_type: Option<String>,
}

/// Rows arrive ordered by index and key position; output is sorted by name.
fn group_indexes(rows: Vec<IndexRow>) -> Vec<IndexMetadata> {
    let mut grouped: BTreeMap<String, (Vec<String>, String)> = BTreeMap::new();
    for row in rows {
        let entry = grouped.entry(row.name).or_insert_with_key(|name| {
            (
                Vec::new(),
                describe_index(row.non_unique, name, row.index_type.as_deref()),
            )
        });
        entry.0.push(row.column.unwrap_or_else(|| "<expression>".to_string()));
    }
    grouped
        .into_iter()
        .map(|(name, (columns, desc))| IndexMetadata::new(name, columns, Some(desc)))
        .collect()
}

fn describe_index(non_unique: bool, name: &str, index_type: Option<&str>) -> String {
    let kind = if !non_unique || name.eq_ignore_ascii_case("primary") {
        "Unique"
    } else {
        "Non-unique"
    };
    match index_type {
        Some(ty) => format!("{kind}, {ty} index"),
        None => kind.to_string(),
    }
}

fn is_binary(column: &Column) -> bool {
    column.character_set() == BINARY_CHARSET
}

fn type_tag(column: &Column) -> Option<TypeTag> {
    use ColumnType::*;

    match column.column_type() {
        MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL | MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_LONG
        | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE | MYSQL_TYPE_YEAR => {
            Some(TypeTag::Number)
        }
        MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE | MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 | MYSQL_TYPE_DATETIME
        | MYSQL_TYPE_DATETIME2 | MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_TIMESTAMP2 => Some(TypeTag::DateTime),
        MYSQL_TYPE_VARCHAR | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING | MYSQL_TYPE_TINY_BLOB
        | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB => {
            Some(if is_binary(column) { TypeTag::Binary } else { TypeTag::String })
        }
        MYSQL_TYPE_ENUM | MYSQL_TYPE_SET | MYSQL_TYPE_JSON => Some(TypeTag::String),
        MYSQL_TYPE_BIT | MYSQL_TYPE_GEOMETRY => Some(TypeTag::Binary),
        _ => None,
    }
}

/// `MYSQL_TYPE_VAR_STRING` is reported as `var_string`.
fn type_name(ty: ColumnType) -> String {
    let full = format!("{ty:?}");
    full.trim_start_matches("MYSQL_TYPE_").to_ascii_lowercase()
}

fn describe_column(column: &Column) -> ColumnDescription {
    let tag = type_tag(column);
    let length = Some(i64::from(column.column_length()));
    let desc = ColumnDescription::new(column.name_str(), type_name(column.column_type()), tag)
        .with_nullable(Some(!column.flags().contains(ColumnFlags::NOT_NULL_FLAG)));
    match (tag, column.column_type()) {
        (_, ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL) => {
            desc.with_precision(length, Some(i64::from(column.decimals())))
        }
        (Some(TypeTag::String | TypeTag::Binary), _) => desc.with_sizes(length, length),
        _ => desc,
    }
}

fn from_mysql(value: &MyValue, column: &Column) -> Value {
    match value {
        MyValue::NULL => Value::Null,
        MyValue::Int(i) => Value::Integer(*i),
        MyValue::UInt(u) => i64::try_from(*u).map_or_else(|_| Value::Numeric(Decimal::from(*u)), Value::Integer),
        MyValue::Float(f) => Value::Real(f64::from(*f)),
        MyValue::Double(d) => Value::Real(*d),
        MyValue::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day));
            let time = NaiveTime::from_hms_micro_opt(u32::from(*hour), u32::from(*minute), u32::from(*second), *micros);
            match (date, time, column.column_type()) {
                (Some(d), _, ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE) => Value::Date(d),
                (Some(d), Some(t), _) => Value::Timestamp(NaiveDateTime::new(d, t)),
                _ => Value::Text(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                )),
            }
        }
        MyValue::Time(negative, days, hours, minutes, seconds, micros) => {
            let time = NaiveTime::from_hms_micro_opt(u32::from(*hours), u32::from(*minutes), u32::from(*seconds), *micros)
                .filter(|_| !*negative && *days == 0);
            time.map_or_else(
                || {
                    let sign = if *negative { "-" } else { "" };
                    let total_hours = days * 24 + u32::from(*hours);
                    Value::Text(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}"))
                },
                Value::Time,
            )
        }
        MyValue::Bytes(bytes) => from_text(bytes, column),
    }
}

/// Values in the text protocol arrive as strings; the column type says how
/// to read them back.
fn from_text(bytes: &[u8], column: &Column) -> Value {
    use ColumnType::*;

    let text = String::from_utf8_lossy(bytes);
    let parsed = match column.column_type() {
        MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_LONG | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONGLONG
        | MYSQL_TYPE_YEAR => text
            .parse()
            .ok()
            .map(Value::Integer)
            .or_else(|| Decimal::from_str(&text).ok().map(Value::Numeric)),
        MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE => text.parse().ok().map(Value::Real),
        MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL => Decimal::from_str(&text).ok().map(Value::Numeric),
        MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok().map(Value::Date),
        MYSQL_TYPE_DATETIME | MYSQL_TYPE_DATETIME2 | MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_TIMESTAMP2 => {
            NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(Value::Timestamp)
        }
        MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 => NaiveTime::parse_from_str(&text, "%H:%M:%S%.f").ok().map(Value::Time),
        MYSQL_TYPE_JSON => Some(Value::Json(text.to_string())),
        _ if is_binary(column) => Some(Value::Bytes(bytes.to_vec())),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(text.into_owned()))
}

fn to_mysql(value: &Value) -> MyValue {
    match value {
        Value::Null => MyValue::NULL,
        Value::Integer(i) => MyValue::Int(*i),
        Value::Real(f) => MyValue::Double(*f),
        Value::Boolean(b) => MyValue::Int(i64::from(*b)),
        Value::Text(s) | Value::Json(s) => MyValue::Bytes(s.clone().into_bytes()),
        Value::Bytes(b) => MyValue::Bytes(b.clone()),
        Value::Timestamp(ts) => MyValue::Bytes(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string().into_bytes()),
        Value::TimestampTz(ts) => MyValue::Bytes(
            ts.naive_utc()
                .format("%Y-%m-%d %H:%M:%S%.f")
                .to_string()
                .into_bytes(),
        ),
        other => MyValue::Bytes(other.to_string().into_bytes()),
    }
}
