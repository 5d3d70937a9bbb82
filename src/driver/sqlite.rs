//! SQLite backend over `rusqlite`. The `database` connection parameter is
//! the file path (`:memory:` works too); host, port and credentials are
//! ignored.

use std::collections::{BTreeMap, VecDeque};

use rusqlite::params_from_iter;
use rusqlite::types::{Value as SqlValue, ValueRef};

use super::{ConnectParams, Driver, NativeConnection, NativeCursor, needs_implicit_begin, probe_table_metadata};
use crate::core::{ColumnDescription, ColumnMetadata, DbError, DbResult, IndexMetadata, Row, TypeTag, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn display_name(&self) -> &str {
        "SQLite"
    }

    fn connect(&self, params: &ConnectParams<'_>) -> DbResult<Box<dyn NativeConnection>> {
        let conn = rusqlite::Connection::open(params.database)?;
        Ok(Box::new(SqliteConnection { conn: Some(conn) }))
    }
}

struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
}

impl SqliteConnection {
    fn native(&self) -> DbResult<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DbError::error("connection is closed"))
    }

    fn end_transaction(&self, verb: &str) -> DbResult<()> {
        let conn = self.native()?;
        if !conn.is_autocommit() {
            conn.execute_batch(verb)?;
        }
        Ok(())
    }
}

impl NativeConnection for SqliteConnection {
    fn cursor(&mut self) -> DbResult<Box<dyn NativeCursor + '_>> {
        self.native()?;
        Ok(Box::new(SqliteCursor {
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
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| DbError::from(err)),
            None => Err(DbError::error("connection is closed")),
        }
    }
}

struct SqliteCursor<'a> {
    conn: &'a mut SqliteConnection,
    rows: VecDeque<Row>,
    description: Option<Vec<ColumnDescription>>,
    row_count: Option<i64>,
}

impl NativeCursor for SqliteCursor<'_> {
    fn execute(&mut self, statement: &str, params: &[Value]) -> DbResult<()> {
        self.rows.clear();
        self.description = None;
        self.row_count = None;

        let conn = self.conn.native()?;
        if conn.is_autocommit() && needs_implicit_begin(statement) {
            conn.execute_batch("BEGIN")?;
        }

        let mut stmt = conn.prepare(statement)?;
        let bound = params_from_iter(params.iter().map(to_sqlite));
        if stmt.column_count() == 0 {
            let changed = stmt.execute(bound)?;
            if reports_changes(statement) {
                self.row_count = i64::try_from(changed).ok();
            }
            return Ok(());
        }

        let columns: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .collect();

        let mut buffered = VecDeque::new();
        let mut rows = stmt.query(bound)?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(from_sqlite(row.get_ref(idx)?));
            }
            buffered.push_back(values);
        }

        self.description = Some(
            columns
                .iter()
                .enumerate()
                .map(|(idx, (name, decl))| describe_column(name, decl.as_deref(), idx, &buffered))
                .collect(),
        );
        self.row_count = i64::try_from(buffered.len()).ok();
        self.rows = buffered;
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
        let columns = {
            let conn = self.conn.native()?;
            let mut stmt = conn.prepare(r#"SELECT name, type, "notnull" FROM pragma_table_info(?1)"#)?;
            let rows = stmt.query_map([table], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        if columns.is_empty() {
            return probe_table_metadata(self, table);
        }

        Ok(columns
            .into_iter()
            .map(|(name, decl, not_null)| {
                let (base, sizes) = split_decl_type(&decl);
                let mut meta = ColumnMetadata::new(name, base.to_lowercase());
                match (affinity_tag(&decl), sizes) {
                    (TypeTag::String, Some((size, None))) => meta.max_char_size = Some(size),
                    (_, Some((precision, scale))) => {
                        meta.precision = Some(precision);
                        meta.scale = scale;
                    }
                    _ => {}
                }
                meta.nullable = Some(not_null == 0);
                meta
            })
            .collect())
    }

    fn index_metadata(&mut self, table: &str) -> DbResult<Option<Vec<IndexMetadata>>> {
        let conn = self.conn.native()?;
        let mut stmt = conn.prepare(
            r#"SELECT il.name, ii.name, il."unique", il.origin
               FROM pragma_index_list(?1) il, pragma_index_info(il.name) ii
               ORDER BY il.name, ii.seqno"#,
        )?;
        let rows = stmt.query_map([table], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, bool>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?;

        let mut grouped: BTreeMap<String, (Vec<String>, bool, String)> = BTreeMap::new();
        for row in rows {
            let (index, column, unique, origin) = row?;
            let entry = grouped
                .entry(index)
                .or_insert_with(|| (Vec::new(), unique, origin));
            entry.0.push(column.unwrap_or_else(|| "<expression>".to_string()));
        }

        Ok(Some(
            grouped
                .into_iter()
                .map(|(name, (columns, unique, origin))| {
                    IndexMetadata::new(name, columns, Some(describe_index(unique, &origin)))
                })
                .collect(),
        ))
    }
}

fn describe_index(unique: bool, origin: &str) -> String {
    let kind = if unique { "Unique" } else { "Non-unique" };
    match origin {
        "pk" => format!("{kind}, primary key index"),
        "u" => format!("{kind}, constraint index"),
        _ => kind.to_string(),
    }
}

/// DDL leaves `sqlite3_changes` untouched, so only data-modifying
/// statements have a meaningful count.
fn reports_changes(statement: &str) -> bool {
    let first = statement
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    matches!(first.as_str(), "insert" | "update" | "delete" | "replace" | "with")
}

/// Column affinity from a declared type, following SQLite's own rules.
fn affinity_tag(decl: &str) -> TypeTag {
    let upper = decl.to_ascii_uppercase();
    if upper.contains("INT") {
        TypeTag::Number
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|k| upper.contains(k)) {
        TypeTag::String
    } else if upper.contains("BLOB") {
        TypeTag::Binary
    } else if ["REAL", "FLOA", "DOUB"].iter().any(|k| upper.contains(k)) {
        TypeTag::Number
    } else if upper.contains("DATE") || upper.contains("TIME") {
        TypeTag::DateTime
    } else {
        TypeTag::Number
    }
}

/// Splits `VARCHAR(30)` into `("VARCHAR", Some((30, None)))` and
/// `NUMERIC(10, 2)` into `("NUMERIC", Some((10, Some(2))))`.
fn split_decl_type(decl: &str) -> (&str, Option<(i64, Option<i64>)>) {
    let Some((base, rest)) = decl.split_once('(') else {
        return (decl.trim(), None);
    };
    let inner = rest.trim_end().trim_end_matches(')');
    let mut parts = inner.split(',').map(|p| p.trim().parse::<i64>());
    let sizes = match (parts.next(), parts.next()) {
        (Some(Ok(first)), None) => Some((first, None)),
        (Some(Ok(first)), Some(Ok(second))) => Some((first, Some(second))),
        _ => None,
    };
    (base.trim(), sizes)
}

fn describe_column(name: &str, decl: Option<&str>, idx: usize, rows: &VecDeque<Row>) -> ColumnDescription {
    let decl = decl.map(str::trim).filter(|d| !d.is_empty());
    let Some(decl) = decl else {
        let tag = rows
            .iter()
            .filter_map(|row| row.get(idx))
            .find(|v| !v.is_null())
            .and_then(tag_for_value);
        return ColumnDescription::new(name, "", tag);
    };

    let tag = affinity_tag(decl);
    let mut col = ColumnDescription::new(name, decl, Some(tag));
    match (tag, split_decl_type(decl).1) {
        (TypeTag::String, Some((size, None))) => col = col.with_sizes(Some(size), Some(size)),
        (_, Some((precision, scale))) => col = col.with_precision(Some(precision), scale),
        _ => {}
    }
    col
}

fn tag_for_value(value: &Value) -> Option<TypeTag> {
    match value {
        Value::Integer(_) | Value::Real(_) => Some(TypeTag::Number),
        Value::Text(_) => Some(TypeTag::String),
        Value::Bytes(_) => Some(TypeTag::Binary),
        _ => None,
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn to_sqlite(value: &Value) -> SqlValue {
    use rust_decimal::prelude::ToPrimitive;

    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Numeric(d) if d.fract().is_zero() => d
            .to_i64()
            .map_or_else(|| SqlValue::Text(d.to_string()), SqlValue::Integer),
        Value::Numeric(d) => d
            .to_f64()
            .map_or_else(|| SqlValue::Text(d.to_string()), SqlValue::Real),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Connection;

    fn memory() -> Connection {
        let params = ConnectParams {
            host: "",
            port: None,
            user: "",
            password: "",
            database: ":memory:",
        };
        Connection::open("sqlite", &SqliteDriver, &params).unwrap()
    }

    fn run(conn: &mut Connection, sql: &str) -> Option<i64> {
        let mut cursor = conn.cursor().unwrap();
        cursor.execute(sql, &[]).unwrap();
        cursor.row_count()
    }

    #[test]
    fn test_insert_and_select() {
        let mut conn = memory();
        assert_eq!(run(&mut conn, "CREATE TABLE t (id INTEGER PRIMARY KEY, name VARCHAR(20), data BLOB)"), None);
        assert_eq!(run(&mut conn, "INSERT INTO t (name, data) VALUES ('a', x'00ff'), ('b', NULL)"), Some(2));
        conn.commit().unwrap();

        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT id, name, data FROM t ORDER BY id", &[]).unwrap();
        let desc = cursor.description().unwrap().to_vec();
        assert_eq!(desc[0].tag, Some(TypeTag::Number));
        assert_eq!(desc[1].tag, Some(TypeTag::String));
        assert_eq!(desc[1].display_size, Some(20));
        assert_eq!(desc[2].tag, Some(TypeTag::Binary));

        let rows = cursor.fetch_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], Value::Text("a".into()));
        assert_eq!(rows[0][2], Value::Bytes(vec![0x00, 0xff]));
        assert_eq!(rows[1][2], Value::Null);
    }

    #[test]
    fn test_parameters_are_bound() {
        let mut conn = memory();
        run(&mut conn, "CREATE TABLE t (n INTEGER, s TEXT)");
        let mut cursor = conn.cursor().unwrap();
        cursor
            .execute("INSERT INTO t VALUES (?1, ?2)", &[Value::Integer(7), Value::Text("x".into())])
            .unwrap();
        cursor.execute("SELECT n, s FROM t WHERE n = ?1", &[Value::Integer(7)]).unwrap();
        assert_eq!(
            cursor.fetch_one().unwrap(),
            Some(vec![Value::Integer(7), Value::Text("x".into())])
        );
    }

    #[test]
    fn test_rollback_discards_uncommitted_rows() {
        let mut conn = memory();
        run(&mut conn, "CREATE TABLE t (n INTEGER)");
        conn.commit().unwrap();
        run(&mut conn, "INSERT INTO t VALUES (1)");
        conn.rollback().unwrap();

        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(cursor.fetch_one().unwrap(), Some(vec![Value::Integer(0)]));
    }

    #[test]
    fn test_expression_columns_infer_tag_from_values() {
        let mut conn = memory();
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT 1 + 1, 'x', NULL", &[]).unwrap();
        let desc = cursor.description().unwrap();
        assert_eq!(desc[0].tag, Some(TypeTag::Number));
        assert_eq!(desc[1].tag, Some(TypeTag::String));
        assert_eq!(desc[2].tag, None);
    }

    #[test]
    fn test_table_metadata() {
        let mut conn = memory();
        run(
            &mut conn,
            "CREATE TABLE items (id INTEGER NOT NULL, name VARCHAR(30), price NUMERIC(10, 2))",
        );
        let mut cursor = conn.cursor().unwrap();
        let meta = cursor.table_metadata("items").unwrap();
        assert_eq!(meta.len(), 3);
        assert_eq!(meta[0].display_type(), "integer");
        assert_eq!(meta[0].nullability(), "NOT NULL");
        assert_eq!(meta[1].display_type(), "varchar(30)");
        assert_eq!(meta[1].nullability(), "NULL");
        assert_eq!(meta[2].display_type(), "numeric(10, 2)");
    }

    #[test]
    fn test_table_metadata_missing_table_is_error() {
        let mut conn = memory();
        let mut cursor = conn.cursor().unwrap();
        assert!(cursor.table_metadata("nope").is_err());
    }

    #[test]
    fn test_index_metadata() {
        let mut conn = memory();
        run(&mut conn, "CREATE TABLE t (a INTEGER, b TEXT, c TEXT UNIQUE)");
        run(&mut conn, "CREATE INDEX t_ab ON t (a, b)");
        let mut cursor = conn.cursor().unwrap();
        let indexes = cursor.index_metadata("t").unwrap().unwrap();
        assert_eq!(indexes.len(), 2);
        let ab = indexes.iter().find(|i| i.name == "t_ab").unwrap();
        assert_eq!(ab.columns, vec!["a", "b"]);
        assert_eq!(ab.description.as_deref(), Some("Non-unique"));
        let unique = indexes.iter().find(|i| i.name != "t_ab").unwrap();
        assert_eq!(unique.columns, vec!["c"]);
        assert_eq!(unique.description.as_deref(), Some("Unique, constraint index"));
    }

    #[test]
    fn test_no_indexes_is_empty_not_unsupported() {
        let mut conn = memory();
        run(&mut conn, "CREATE TABLE t (a INTEGER)");
        let mut cursor = conn.cursor().unwrap();
        assert_eq!(cursor.index_metadata("t").unwrap(), Some(vec![]));
    }

    #[test]
    fn test_split_decl_type() {
        assert_eq!(split_decl_type("VARCHAR(30)"), ("VARCHAR", Some((30, None))));
        assert_eq!(split_decl_type("NUMERIC(10, 2)"), ("NUMERIC", Some((10, Some(2)))));
        assert_eq!(split_decl_type("TEXT"), ("TEXT", None));
        assert_eq!(split_decl_type("CHAR(x)"), ("CHAR", None));
    }

    #[test]
    fn test_affinity() {
        assert_eq!(affinity_tag("BIGINT"), TypeTag::Number);
        assert_eq!(affinity_tag("nvarchar(10)"), TypeTag::String);
        assert_eq!(affinity_tag("BLOB"), TypeTag::Binary);
        assert_eq!(affinity_tag("DOUBLE PRECISION"), TypeTag::Number);
        assert_eq!(affinity_tag("DATETIME"), TypeTag::DateTime);
        assert_eq!(affinity_tag("DECIMAL"), TypeTag::Number);
    }
}
