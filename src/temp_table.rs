use crate::convert;
use crate::error::{Result, TsqlError};
use crate::types::{DataType, TypeSpec};
use crate::value::Value;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

static VERSIONS: AtomicU64 = AtomicU64::new(1);

/// Stamp for a table's row content; equal stamps mean identical rows.
fn next_version() -> u64 {
    VERSIONS.fetch_add(1, Ordering::Relaxed)
}

/// Column names and row values handed to a caller, or received from the query collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub seed: i64,
    pub increment: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: TypeSpec,
    pub nullable: bool,
    pub identity: Option<Identity>,
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: &str, ty: TypeSpec) -> Self {
        Self {
            name: name.to_string(),
            ty,
            nullable: true,
            identity: None,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Identity columns are implicitly NOT NULL.
    pub fn identity(mut self, seed: i64, increment: i64) -> Self {
        self.identity = Some(Identity { seed, increment });
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// `#name`: visible to the creating session and its nested calls.
    LocalTemp,
    /// `##name`: shared, survives session clear.
    GlobalTemp,
    /// `@name`: a table variable.
    Variable,
}

impl TableKind {
    pub fn of(name: &str) -> Result<TableKind> {
        let name = name.trim();
        if name.starts_with("##") {
            Ok(TableKind::GlobalTemp)
        } else if name.starts_with('#') {
            Ok(TableKind::LocalTemp)
        } else if name.starts_with('@') {
            Ok(TableKind::Variable)
        } else {
            Err(TsqlError::Invalid(format!(
                "'{name}' is not a temporary table or table variable name"
            )))
        }
    }
}

#[derive(Debug, Clone)]
pub struct TempTable {
    name: String,
    kind: TableKind,
    columns: Vec<ColumnDef>,
    primary_key: Vec<usize>,
    rows: Vec<Vec<Value>>,
    // last identity value handed out; None until the first insert after create/truncate
    identity_current: Option<i64>,
    identity_insert: bool,
    version: u64,
}

impl TempTable {
    pub fn new(name: &str, columns: Vec<ColumnDef>) -> Result<Self> {
        let kind = TableKind::of(name)?;
        if columns.is_empty() {
            return Err(TsqlError::Invalid(format!("table '{name}' must have at least one column")));
        }
        let mut seen = HashSet::new();
        for c in &columns {
            if !seen.insert(c.name.to_ascii_lowercase()) {
                return Err(TsqlError::Invalid(format!(
                    "column name '{}' is specified more than once in table '{name}'",
                    c.name
                )));
            }
            if let Some(id) = c.identity {
                if !c.ty.data_type.is_integer() && !c.ty.data_type.is_decimal() {
                    return Err(TsqlError::Invalid(format!(
                        "identity column '{}' must be of an integer or decimal type",
                        c.name
                    )));
                }
                if id.increment == 0 {
                    return Err(TsqlError::Invalid("identity increment cannot be zero".into()));
                }
            }
        }
        if columns.iter().filter(|c| c.identity.is_some()).count() > 1 {
            return Err(TsqlError::Invalid(format!(
                "multiple identity columns specified for table '{name}'"
            )));
        }
        Ok(Self {
            name: name.trim().to_string(),
            kind,
            columns,
            primary_key: Vec::new(),
            rows: Vec::new(),
            identity_current: None,
            identity_insert: false,
            version: next_version(),
        })
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Result<Self> {
        let mut idxs = Vec::with_capacity(columns.len());
        for name in columns {
            let i = self.column_index(name)?;
            self.columns[i].nullable = false;
            idxs.push(i);
        }
        self.primary_key = idxs;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| TsqlError::Invalid(format!("invalid column name '{name}' in table '{}'", self.name)))
    }

    fn identity_column(&self) -> Option<(usize, Identity)> {
        self.columns
            .iter()
            .enumerate()
            .find_map(|(i, c)| c.identity.map(|id| (i, id)))
    }

    /// `IDENT_CURRENT`: last identity issued, or the seed before any insert.
    pub fn ident_current(&self) -> Option<i64> {
        let (_, id) = self.identity_column()?;
        Some(self.identity_current.unwrap_or(id.seed))
    }

    fn next_identity(&self, id: Identity) -> i64 {
        match self.identity_current {
            None => id.seed,
            Some(cur) => cur + id.increment,
        }
    }

    fn coerce(&self, col: &ColumnDef, value: &Value) -> Result<Value> {
        if value.is_null() {
            if !col.nullable {
                return Err(TsqlError::NullNotAllowed {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
            return Ok(Value::null_of(&col.ty));
        }
        if col.ty.data_type == DataType::Table || col.ty.data_type == DataType::SqlVariant {
            return Ok(value.clone());
        }
        convert::cast(value, &col.ty)
    }

    fn check_key(&self, row: &[Value], skip: Option<usize>) -> Result<()> {
        if self.primary_key.is_empty() {
            return Ok(());
        }
        let clash = self.rows.iter().enumerate().any(|(i, existing)| {
            Some(i) != skip
                && self
                    .primary_key
                    .iter()
                    .all(|&k| existing[k].compare(&row[k]) == std::cmp::Ordering::Equal)
        });
        if clash {
            let key = self
                .primary_key
                .iter()
                .map(|&k| row[k].to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(TsqlError::DuplicateKey {
                table: self.name.clone(),
                key: format!("({key})"),
            });
        }
        Ok(())
    }

    /// Insert one row given as (column, value) pairs. Omitted columns take their default,
    /// or NULL. Returns the identity value assigned, if the table has an identity column.
    pub fn insert(&mut self, values: &[(&str, Value)]) -> Result<Option<i64>> {
        let mut provided: Vec<Option<&Value>> = vec![None; self.columns.len()];
        for (name, value) in values {
            let i = self.column_index(name)?;
            provided[i] = Some(value);
        }

        let identity = self.identity_column();
        let mut assigned = None;
        let mut row = Vec::with_capacity(self.columns.len());
        for (i, col) in self.columns.iter().enumerate() {
            let cell = match (col.identity, provided[i]) {
                (Some(_), Some(v)) => {
                    if !self.identity_insert {
                        return Err(TsqlError::IdentityInsert(self.name.clone()));
                    }
                    let v = self.coerce(col, v)?;
                    assigned = Some(v.as_int());
                    v
                }
                (Some(id), None) => {
                    if self.identity_insert {
                        return Err(TsqlError::Invalid(format!(
                            "explicit value must be specified for identity column in table '{}' when IDENTITY_INSERT is ON",
                            self.name
                        )));
                    }
                    let next = self.next_identity(id);
                    assigned = Some(next);
                    self.coerce(col, &Value::bigint(next))?
                }
                (None, Some(v)) => self.coerce(col, v)?,
                (None, None) => match &col.default {
                    Some(d) => self.coerce(col, d)?,
                    None => self.coerce(col, &Value::null_of(&col.ty))?,
                },
            };
            row.push(cell);
        }
        self.check_key(&row, None)?;

        if let (Some((_, id)), Some(v)) = (identity, assigned) {
            let advance = match self.identity_current {
                None => true,
                Some(cur) if id.increment > 0 => v > cur,
                Some(cur) => v < cur,
            };
            if advance {
                self.identity_current = Some(v);
            }
        }
        self.rows.push(row);
        self.version = next_version();
        Ok(assigned)
    }

    /// Positional insert of the non-identity columns, as `INSERT INTO t VALUES (...)`.
    /// With IDENTITY_INSERT on, the identity column is expected too.
    pub fn insert_values(&mut self, values: Vec<Value>) -> Result<Option<i64>> {
        let names: Vec<String> = self
            .columns
            .iter()
            .filter(|c| self.identity_insert || c.identity.is_none())
            .map(|c| c.name.clone())
            .collect();
        if names.len() != values.len() {
            return Err(TsqlError::Invalid(format!(
                "column name or number of supplied values does not match table definition of '{}'",
                self.name
            )));
        }
        let pairs: Vec<(&str, Value)> = names.iter().map(String::as_str).zip(values).collect();
        self.insert(&pairs)
    }

    pub fn select<P>(&self, mut pred: P) -> Result<ResultSet>
    where
        P: FnMut(&[String], &[Value]) -> Result<bool>,
    {
        let columns = self.column_names();
        let mut rows = Vec::new();
        for row in &self.rows {
            if pred(&columns, row)? {
                rows.push(row.clone());
            }
        }
        Ok(ResultSet { columns, rows })
    }

    pub fn select_all(&self) -> ResultSet {
        self.to_result_set()
    }

    /// Patch every row matching `pred` with the assignments `patch` computes for it.
    pub fn update_with<P, F>(&mut self, mut pred: P, mut patch: F) -> Result<usize>
    where
        P: FnMut(&[String], &[Value]) -> Result<bool>,
        F: FnMut(&[String], &[Value]) -> Result<Vec<(String, Value)>>,
    {
        let columns = self.column_names();
        let mut patches = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            if pred(&columns, row)? {
                patches.push((i, patch(&columns, row)?));
            }
        }
        self.apply_patches(patches)
    }

    /// Apply per-row assignments by row position. Every new row is built and checked
    /// first, so a failure leaves the table untouched.
    fn apply_patches(&mut self, patches: Vec<(usize, Vec<(String, Value)>)>) -> Result<usize> {
        let mut staged = Vec::with_capacity(patches.len());
        for (i, assignments) in patches {
            let mut next = self.rows[i].clone();
            for (name, value) in assignments {
                let c = self.column_index(&name)?;
                if self.columns[c].identity.is_some() {
                    return Err(TsqlError::Raised {
                        number: 8102,
                        message: format!("Cannot update identity column '{}'", self.columns[c].name),
                        severity: 16,
                        state: 1,
                    });
                }
                next[c] = self.coerce(&self.columns[c], &value)?;
            }
            staged.push((i, next));
        }
        for (i, next) in &staged {
            self.check_key(next, Some(*i))?;
        }
        let n = staged.len();
        for (i, next) in staged {
            self.rows[i] = next;
        }
        if n > 0 {
            self.version = next_version();
        }
        Ok(n)
    }

    pub fn update<P>(&mut self, pred: P, assignments: &[(&str, Value)]) -> Result<usize>
    where
        P: FnMut(&[String], &[Value]) -> Result<bool>,
    {
        self.update_with(pred, |_, _| {
            Ok(assignments
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect())
        })
    }

    pub fn delete<P>(&mut self, mut pred: P) -> Result<usize>
    where
        P: FnMut(&[String], &[Value]) -> Result<bool>,
    {
        let columns = self.column_names();
        let mut doomed = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            doomed.push(pred(&columns, row)?);
        }
        Ok(self.remove_rows(&doomed))
    }

    /// Drop the rows flagged `true`, by position.
    fn remove_rows(&mut self, doomed: &[bool]) -> usize {
        let before = self.rows.len();
        let mut flags = doomed.iter();
        self.rows.retain(|_| !flags.next().copied().unwrap_or(false));
        let n = before - self.rows.len();
        if n > 0 {
            self.version = next_version();
        }
        n
    }

    /// Remove all rows, keep the schema, and restart identity at the seed.
    pub fn truncate(&mut self) {
        self.rows.clear();
        self.identity_current = None;
        self.version = next_version();
    }

    pub fn set_identity_insert(&mut self, on: bool) -> Result<()> {
        if self.identity_column().is_none() {
            return Err(TsqlError::Invalid(format!(
                "table '{}' does not have the identity property",
                self.name
            )));
        }
        self.identity_insert = on;
        Ok(())
    }

    pub fn to_result_set(&self) -> ResultSet {
        ResultSet {
            columns: self.column_names(),
            rows: self.rows.clone(),
        }
    }
}

fn table_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Ephemeral relations of a session, shared with its nested calls.
#[derive(Debug, Default)]
pub struct TempTableManager {
    inner: RwLock<HashMap<String, TempTable>>,
}

impl TempTableManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, name: &str, columns: Vec<ColumnDef>) -> Result<()> {
        self.create_table(TempTable::new(name, columns)?)
    }

    pub fn create_table(&self, table: TempTable) -> Result<()> {
        let key = table_key(table.name());
        let mut tables = self.inner.write();
        if tables.contains_key(&key) {
            return Err(TsqlError::TableExists(table.name().to_string()));
        }
        debug!(table = table.name(), kind = ?table.kind(), "temp table created");
        tables.insert(key, table);
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.inner.read().contains_key(&table_key(name))
    }

    fn read<T>(&self, name: &str, f: impl FnOnce(&TempTable) -> T) -> Result<T> {
        let tables = self.inner.read();
        let table = tables
            .get(&table_key(name))
            .ok_or_else(|| TsqlError::TableNotFound(name.to_string()))?;
        Ok(f(table))
    }

    fn write<T>(&self, name: &str, f: impl FnOnce(&mut TempTable) -> Result<T>) -> Result<T> {
        let mut tables = self.inner.write();
        let table = tables
            .get_mut(&table_key(name))
            .ok_or_else(|| TsqlError::TableNotFound(name.to_string()))?;
        f(table)
    }

    pub fn insert(&self, name: &str, values: &[(&str, Value)]) -> Result<Option<i64>> {
        self.write(name, |t| t.insert(values))
    }

    pub fn insert_values(&self, name: &str, values: Vec<Value>) -> Result<Option<i64>> {
        self.write(name, |t| t.insert_values(values))
    }

    /// Copy of a table's rows with the content stamp they were taken at.
    fn snapshot_rows(&self, name: &str) -> Result<(u64, ResultSet)> {
        self.read(name, |t| (t.version, t.to_result_set()))
    }

    // Predicates and assignments may call back into this manager (IDENT_CURRENT,
    // OBJECT_ID), so they run against a copy with no lock held.

    pub fn select<P>(&self, name: &str, mut pred: P) -> Result<ResultSet>
    where
        P: FnMut(&[String], &[Value]) -> Result<bool>,
    {
        let (_, ResultSet { columns, rows }) = self.snapshot_rows(name)?;
        let mut matched = Vec::new();
        for row in rows {
            if pred(&columns, &row)? {
                matched.push(row);
            }
        }
        Ok(ResultSet::new(columns, matched))
    }

    pub fn select_all(&self, name: &str) -> Result<ResultSet> {
        self.read(name, TempTable::select_all)
    }

    pub fn update<P>(&self, name: &str, pred: P, assignments: &[(&str, Value)]) -> Result<usize>
    where
        P: FnMut(&[String], &[Value]) -> Result<bool>,
    {
        self.update_with(name, pred, |_, _| {
            Ok(assignments
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect())
        })
    }

    pub fn update_with<P, F>(&self, name: &str, mut pred: P, mut patch: F) -> Result<usize>
    where
        P: FnMut(&[String], &[Value]) -> Result<bool>,
        F: FnMut(&[String], &[Value]) -> Result<Vec<(String, Value)>>,
    {
        loop {
            let (version, ResultSet { columns, rows }) = self.snapshot_rows(name)?;
            let mut patches = Vec::new();
            for (i, row) in rows.iter().enumerate() {
                if pred(&columns, row)? {
                    patches.push((i, patch(&columns, row)?));
                }
            }
            let applied = self.write(name, |t| {
                if t.version != version {
                    return Ok(None);
                }
                t.apply_patches(patches).map(Some)
            })?;
            match applied {
                Some(n) => return Ok(n),
                None => trace!(table = name, "rows changed during update, re-evaluating"),
            }
        }
    }

    pub fn delete<P>(&self, name: &str, mut pred: P) -> Result<usize>
    where
        P: FnMut(&[String], &[Value]) -> Result<bool>,
    {
        loop {
            let (version, ResultSet { columns, rows }) = self.snapshot_rows(name)?;
            let mut doomed = Vec::with_capacity(rows.len());
            for row in &rows {
                doomed.push(pred(&columns, row)?);
            }
            let removed = self.write(name, |t| Ok((t.version == version).then(|| t.remove_rows(&doomed))))?;
            match removed {
                Some(n) => return Ok(n),
                None => trace!(table = name, "rows changed during delete, re-evaluating"),
            }
        }
    }

    pub fn truncate(&self, name: &str) -> Result<()> {
        self.write(name, |t| {
            t.truncate();
            Ok(())
        })?;
        debug!(table = name, "temp table truncated");
        Ok(())
    }

    pub fn set_identity_insert(&self, name: &str, on: bool) -> Result<()> {
        self.write(name, |t| t.set_identity_insert(on))
    }

    pub fn ident_current(&self, name: &str) -> Option<i64> {
        self.read(name, TempTable::ident_current).ok().flatten()
    }

    pub fn row_count(&self, name: &str) -> Result<usize> {
        self.read(name, TempTable::row_count)
    }

    pub fn columns(&self, name: &str) -> Result<Vec<ColumnDef>> {
        self.read(name, |t| t.columns().to_vec())
    }

    pub fn to_result_set(&self, name: &str) -> Result<ResultSet> {
        self.read(name, TempTable::to_result_set)
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        let removed = self.inner.write().remove(&table_key(name));
        if removed.is_none() {
            return Err(TsqlError::TableNotFound(name.to_string()));
        }
        debug!(table = name, "temp table dropped");
        Ok(())
    }

    /// Remove local temp tables and table variables; global temp tables stay.
    pub fn clear_session(&self) -> usize {
        let mut tables = self.inner.write();
        let before = tables.len();
        tables.retain(|_, t| t.kind() == TableKind::GlobalTemp);
        let n = before - tables.len();
        if n > 0 {
            debug!(count = n, "session temp tables cleared");
        }
        n
    }

    /// Copy of every table, taken when a transaction or savepoint starts.
    pub(crate) fn snapshot(&self) -> HashMap<String, TempTable> {
        self.inner.read().clone()
    }

    pub(crate) fn restore(&self, tables: HashMap<String, TempTable>) {
        let mut current = self.inner.write();
        debug!(before = current.len(), after = tables.len(), "temp tables restored");
        *current = tables;
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .values()
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }
}
