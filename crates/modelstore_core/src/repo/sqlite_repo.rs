//! SQLite table backend.
//!
//! # Responsibility
//! - Store one entity type in one table with a `TEXT` column per registered
//!   field plus `id`.
//! - Translate criteria and changes into parameterized SQL.
//!
//! # Invariants
//! - Values are always bound as parameters; only validated identifiers are
//!   spliced into statement text.
//! - Table setup is idempotent and never drops existing data.
//! - Mutations run inside a transaction that only `save` commits.

use crate::db::{open_db, open_db_in_memory};
use crate::model::{
    validate_registry, CodecError, Entity, EnumRepr, FieldKind, Record, RecordError, Value,
    ID_KEY,
};
use crate::repo::criteria::{
    apply_changes, resolve_changes, resolve_criteria, Assignment, Term,
};
use crate::repo::{
    traced, validate_all, Changes, Criteria, EntityRepository, RepoError, RepoResult,
};
use log::info;
use rusqlite::{params_from_iter, Connection, Row};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const BACKEND: &str = "sqlite";

/// Relational repository for one entity type.
///
/// Repositories created through `shared` may use one connection for several
/// entity types; they then share its transaction, and `save` on any of them
/// commits all pending mutations.
pub struct SqliteRepository<E: Entity> {
    conn: Arc<Mutex<Connection>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> SqliteRepository<E> {
    /// Opens the database file at `path` and ensures the entity table exists.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::with_connection(open_db(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::with_connection(open_db_in_memory()?)
    }

    /// Binds the repository to an existing connection.
    pub fn with_connection(conn: Connection) -> RepoResult<Self> {
        Self::shared(Arc::new(Mutex::new(conn)))
    }

    /// Binds the repository to a connection shared with other repositories.
    ///
    /// # Errors
    /// - `RepoError::Serialization` when the field registry is invalid.
    /// - `RepoError::MissingRequiredColumn` when an existing table lacks a
    ///   registered column.
    pub fn shared(conn: Arc<Mutex<Connection>>) -> RepoResult<Self> {
        validate_registry::<E>()?;

        let repository = Self {
            conn,
            _entity: PhantomData,
        };
        ensure_table::<E>(&*repository.lock()?)?;
        info!(
            "event=repo_open module=repo backend={} entity={} status=ok",
            BACKEND,
            E::TYPE_NAME
        );
        Ok(repository)
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            RepoError::StorageUnavailable(format!("{} connection lock poisoned", E::TYPE_NAME))
        })
    }

    fn insert(&self, entities: Vec<E>) -> RepoResult<Vec<E>> {
        validate_all(&entities)?;
        let conn = self.lock()?;
        begin_if_needed(&conn)?;

        let columns = column_names::<E>();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            quote_ident(E::TYPE_NAME),
            columns.iter().map(|column| quote_ident(column)).collect::<Vec<_>>().join(", "),
            vec!["?"; columns.len()].join(", ")
        );

        let mut stmt = conn.prepare(&sql)?;
        for entity in &entities {
            let record = entity.to_record();
            let values = columns
                .iter()
                .map(|column| record.get(*column).and_then(to_sql_text));
            stmt.execute(params_from_iter(values))?;
        }

        Ok(entities)
    }

    fn modify(&self, criteria: &Criteria, changes: &Changes) -> RepoResult<Vec<E>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let assignments = resolve_changes::<E>(changes)?;
        let terms = resolve_criteria::<E>(criteria)?;
        let conn = self.lock()?;

        let mut affected = select_where::<E>(&conn, &terms)?;
        if affected.is_empty() {
            return Ok(affected);
        }

        begin_if_needed(&conn)?;
        let mut params = Vec::new();
        let sql = format!(
            "UPDATE {} SET {}{};",
            quote_ident(E::TYPE_NAME),
            set_clause(&assignments, &mut params),
            where_clause(&terms, &mut params)
        );
        conn.execute(&sql, params_from_iter(params))?;

        for entity in &mut affected {
            apply_changes(entity, &assignments)?;
        }
        Ok(affected)
    }

    fn remove(&self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        let terms = resolve_criteria::<E>(criteria)?;
        let conn = self.lock()?;

        let removed = select_where::<E>(&conn, &terms)?;
        if removed.is_empty() {
            return Ok(removed);
        }

        begin_if_needed(&conn)?;
        let mut params = Vec::new();
        let sql = format!(
            "DELETE FROM {}{};",
            quote_ident(E::TYPE_NAME),
            where_clause(&terms, &mut params)
        );
        conn.execute(&sql, params_from_iter(params))?;
        Ok(removed)
    }
}

impl<E: Entity> EntityRepository<E> for SqliteRepository<E> {
    fn add(&self, entities: Vec<E>) -> RepoResult<Vec<E>> {
        traced::<E, E>(BACKEND, "add", self.insert(entities))
    }

    fn get(&self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        let result = resolve_criteria::<E>(criteria)
            .and_then(|terms| select_where::<E>(&*self.lock()?, &terms));
        traced::<E, E>(BACKEND, "get", result)
    }

    fn update(&self, criteria: &Criteria, changes: &Changes) -> RepoResult<Vec<E>> {
        traced::<E, E>(BACKEND, "update", self.modify(criteria, changes))
    }

    fn delete(&self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        traced::<E, E>(BACKEND, "delete", self.remove(criteria))
    }

    fn save(&self) -> RepoResult<()> {
        let conn = self.lock()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT;")?;
        }
        info!(
            "event=repo_save module=repo backend={} entity={} status=ok",
            BACKEND,
            E::TYPE_NAME
        );
        Ok(())
    }

    fn count(&self, criteria: &Criteria) -> RepoResult<usize> {
        let terms = resolve_criteria::<E>(criteria)?;
        let conn = self.lock()?;

        let mut params = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) FROM {}{};",
            quote_ident(E::TYPE_NAME),
            where_clause(&terms, &mut params)
        );
        let count: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        row_count::<E>(count)
    }
}

fn ensure_table<E: Entity>(conn: &Connection) -> RepoResult<()> {
    let columns = column_names::<E>();
    let column_sql = columns
        .iter()
        .map(|column| format!("{} TEXT", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({column_sql});",
        quote_ident(E::TYPE_NAME)
    ))?;

    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
    let existing = stmt
        .query_map([E::TYPE_NAME], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;

    for column in columns {
        if !existing.contains(column) {
            return Err(RepoError::MissingRequiredColumn {
                table: E::TYPE_NAME.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn select_where<E: Entity>(conn: &Connection, terms: &[Term<E>]) -> RepoResult<Vec<E>> {
    let mut params = Vec::new();
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY rowid;",
        column_names::<E>()
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", "),
        quote_ident(E::TYPE_NAME),
        where_clause(terms, &mut params)
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next()? {
        entities.push(parse_row::<E>(row)?);
    }
    Ok(entities)
}

fn parse_row<E: Entity>(row: &Row<'_>) -> RepoResult<E> {
    let mut record = Record::new();
    for (index, field) in E::FIELDS.iter().enumerate() {
        let text: Option<String> = row.get(index)?;
        let value = from_sql_text(field.kind, text).map_err(|source| RecordError::InvalidField {
            entity: E::TYPE_NAME,
            field: field.name,
            source,
        })?;
        record.insert(field.name.to_string(), value);
    }

    let id: Option<String> = row.get(E::FIELDS.len())?;
    record.insert(ID_KEY.to_string(), id.map_or(Value::Null, Value::String));
    Ok(E::from_record(record)?)
}

fn row_count<E: Entity>(count: i64) -> RepoResult<usize> {
    usize::try_from(count).map_err(|_| {
        RepoError::StorageUnavailable(format!(
            "{} row count `{count}` is out of range",
            E::TYPE_NAME
        ))
    })
}

/// Registered field columns in declared order, followed by `id`.
fn column_names<E: Entity>() -> Vec<&'static str> {
    E::FIELDS
        .iter()
        .map(|field| field.name)
        .chain(std::iter::once(ID_KEY))
        .collect()
}

fn where_clause<E: Entity>(terms: &[Term<E>], params: &mut Vec<Option<String>>) -> String {
    let mut sql = String::from(" WHERE 1 = 1");
    for term in terms {
        sql.push_str(&format!(" AND {} = ?", quote_ident(term.column.name())));
        params.push(to_sql_text(&term.value));
    }
    sql
}

fn set_clause<E: Entity>(
    assignments: &[Assignment<E>],
    params: &mut Vec<Option<String>>,
) -> String {
    assignments
        .iter()
        .map(|assignment| {
            params.push(to_sql_text(&assignment.value));
            format!("{} = ?", quote_ident(assignment.field.name))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn begin_if_needed(conn: &Connection) -> RepoResult<()> {
    if conn.is_autocommit() {
        conn.execute_batch("BEGIN;")?;
    }
    Ok(())
}

/// Quotes a registry-validated identifier for use in statement text.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column text for a plain value; `None` stores SQL `NULL`.
///
/// Booleans become `1`/`0`; nested records and lists become JSON text.
fn to_sql_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(if *flag { "1" } else { "0" }.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn from_sql_text(kind: FieldKind, text: Option<String>) -> Result<Value, CodecError> {
    let Some(text) = text else {
        return Ok(Value::Null);
    };

    match kind {
        FieldKind::Text | FieldKind::Enum(EnumRepr::Text) => Ok(Value::String(text)),
        FieldKind::Integer | FieldKind::Enum(EnumRepr::Integer) => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| CodecError::type_mismatch("integer text", &Value::String(text))),
        FieldKind::Real => text
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| CodecError::type_mismatch("number text", &Value::String(text))),
        FieldKind::Bool if text == "1" => Ok(Value::Bool(true)),
        FieldKind::Bool if text == "0" => Ok(Value::Bool(false)),
        FieldKind::Bool => Err(CodecError::type_mismatch("1 or 0", &Value::String(text))),
        FieldKind::Nested | FieldKind::List => serde_json::from_str(&text)
            .map_err(|_| CodecError::type_mismatch("JSON text", &Value::String(text))),
    }
}

#[cfg(test)]
mod tests {
    use super::{from_sql_text, quote_ident, row_count, to_sql_text};
    use crate::model::{Entity, EntityId, EnumRepr, Field, FieldKind};
    use crate::repo::RepoError;
    use serde_json::{json, Value};

    #[test]
    fn values_translate_to_column_text() {
        assert_eq!(to_sql_text(&json!("bob")), Some("bob".to_string()));
        assert_eq!(to_sql_text(&json!(true)), Some("1".to_string()));
        assert_eq!(to_sql_text(&json!(false)), Some("0".to_string()));
        assert_eq!(to_sql_text(&json!(2)), Some("2".to_string()));
        assert_eq!(to_sql_text(&json!(1.5)), Some("1.5".to_string()));
        assert_eq!(to_sql_text(&Value::Null), None);
        assert_eq!(to_sql_text(&json!({"a": 1})), Some(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn column_text_decodes_by_field_kind() {
        let decode = |kind, text: &str| from_sql_text(kind, Some(text.to_string())).unwrap();

        assert_eq!(decode(FieldKind::Text, "42"), json!("42"));
        assert_eq!(decode(FieldKind::Integer, "42"), json!(42));
        assert_eq!(decode(FieldKind::Enum(EnumRepr::Integer), "2"), json!(2));
        assert_eq!(decode(FieldKind::Enum(EnumRepr::Text), "red"), json!("red"));
        assert_eq!(decode(FieldKind::Real, "1.5"), json!(1.5));
        assert_eq!(decode(FieldKind::Bool, "1"), json!(true));
        assert_eq!(decode(FieldKind::List, "[1,2]"), json!([1, 2]));
        assert_eq!(from_sql_text(FieldKind::Integer, None).unwrap(), Value::Null);
    }

    #[test]
    fn malformed_column_text_is_an_error() {
        assert!(from_sql_text(FieldKind::Integer, Some("abc".to_string())).is_err());
        assert!(from_sql_text(FieldKind::Bool, Some("yes".to_string())).is_err());
        assert!(from_sql_text(FieldKind::Nested, Some("{".to_string())).is_err());
    }

    #[derive(Debug, Clone)]
    struct Tally {
        id: EntityId,
    }

    impl Entity for Tally {
        const TYPE_NAME: &'static str = "Tally";
        const FIELDS: &'static [Field<Self>] = &[];

        fn blank(id: EntityId) -> Self {
            Self { id }
        }

        fn id(&self) -> &EntityId {
            &self.id
        }
    }

    #[test]
    fn negative_row_count_is_an_error() {
        assert_eq!(row_count::<Tally>(3).unwrap(), 3);
        assert!(matches!(
            row_count::<Tally>(-1),
            Err(RepoError::StorageUnavailable(message)) if message.contains("Tally")
        ));
    }

    #[test]
    fn identifiers_are_double_quoted() {
        assert_eq!(quote_ident("User"), "\"User\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
