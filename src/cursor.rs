use crate::error::{Result, TsqlError};
use crate::temp_table::ResultSet;
use crate::value::Value;
use bitflags::bitflags;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CursorOptions: u32 {
        const LOCAL        = 1 << 0;
        const GLOBAL       = 1 << 1;
        const FORWARD_ONLY = 1 << 2;
        const SCROLL       = 1 << 3;
        const STATIC       = 1 << 4;
        const KEYSET       = 1 << 5;
        const DYNAMIC      = 1 << 6;
        const FAST_FORWARD = 1 << 7;
        const READ_ONLY    = 1 << 8;
    }
}

impl CursorOptions {
    pub fn is_scrollable(self) -> bool {
        if self.intersects(CursorOptions::FORWARD_ONLY | CursorOptions::FAST_FORWARD) {
            return false;
        }
        self.intersects(CursorOptions::SCROLL | CursorOptions::STATIC | CursorOptions::KEYSET | CursorOptions::DYNAMIC)
    }

    pub fn is_global(self) -> bool {
        self.contains(CursorOptions::GLOBAL)
    }
}

/// Parse the option keywords of `DECLARE c CURSOR <options> FOR ...`.
pub fn parse_cursor_options(input: &str) -> Result<CursorOptions> {
    let mut acc = CursorOptions::empty();
    for word in input.split_whitespace() {
        let w = word.trim_matches(',').to_ascii_uppercase();
        let bit = match w.as_str() {
            "" => continue,
            "LOCAL" => CursorOptions::LOCAL,
            "GLOBAL" => CursorOptions::GLOBAL,
            "FORWARD_ONLY" => CursorOptions::FORWARD_ONLY,
            "SCROLL" => CursorOptions::SCROLL,
            "STATIC" | "INSENSITIVE" => CursorOptions::STATIC,
            "KEYSET" => CursorOptions::KEYSET,
            "DYNAMIC" => CursorOptions::DYNAMIC,
            "FAST_FORWARD" => CursorOptions::FAST_FORWARD,
            "READ_ONLY" => CursorOptions::READ_ONLY,
            // Concurrency hints have no effect on a materialized cursor.
            "SCROLL_LOCKS" | "OPTIMISTIC" | "TYPE_WARNING" => continue,
            other => return Err(TsqlError::Invalid(format!("unknown cursor option: {other}"))),
        };
        acc |= bit;
    }
    if acc.contains(CursorOptions::LOCAL | CursorOptions::GLOBAL) {
        return Err(TsqlError::Invalid("cursor cannot be both LOCAL and GLOBAL".into()));
    }
    if acc.contains(CursorOptions::FORWARD_ONLY) && acc.contains(CursorOptions::SCROLL) {
        return Err(TsqlError::Invalid("cursor cannot be both FORWARD_ONLY and SCROLL".into()));
    }
    Ok(acc)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDirection {
    Next,
    Prior,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
}

pub const FETCH_OK: i32 = 0;
pub const FETCH_NO_ROW: i32 = -1;

/// Outcome of a FETCH: the `@@FETCH_STATUS` value and a copy of the row, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub status: i32,
    pub row: Option<Vec<Value>>,
}

impl Fetched {
    fn miss() -> Self {
        Self {
            status: FETCH_NO_ROW,
            row: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FETCH_OK
    }
}

#[derive(Debug, Clone)]
pub struct Cursor {
    name: String,
    query: String,
    options: CursorOptions,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    // -1 = before first, rows.len() = after last
    position: i64,
    open: bool,
}

impl Cursor {
    pub fn new(name: &str, query: &str, options: CursorOptions) -> Self {
        Self {
            name: name.to_string(),
            query: query.to_string(),
            options,
            columns: Vec::new(),
            rows: Vec::new(),
            position: -1,
            open: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn options(&self) -> CursorOptions {
        self.options
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn open(&mut self, result: ResultSet) -> Result<()> {
        if self.open {
            return Err(TsqlError::CursorAlreadyOpen(self.name.clone()));
        }
        self.columns = result.columns;
        self.rows = result.rows;
        self.position = -1;
        self.open = true;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(TsqlError::CursorNotOpen(self.name.clone()));
        }
        self.rows.clear();
        self.columns.clear();
        self.position = -1;
        self.open = false;
        Ok(())
    }

    /// `@@CURSOR_ROWS`: row count of an open cursor, 0 otherwise.
    pub fn row_count(&self) -> i64 {
        if self.open {
            self.rows.len() as i64
        } else {
            0
        }
    }

    /// `CURSOR_STATUS`: 1 open with rows, 0 open and empty, -1 closed.
    pub fn status(&self) -> i32 {
        match (self.open, self.rows.is_empty()) {
            (false, _) => -1,
            (true, true) => 0,
            (true, false) => 1,
        }
    }

    pub fn current_row(&self) -> Option<Vec<Value>> {
        if !self.open || self.position < 0 {
            return None;
        }
        self.rows.get(self.position as usize).cloned()
    }

    pub fn fetch(&mut self, direction: FetchDirection) -> Fetched {
        if !self.open {
            return Fetched::miss();
        }
        if direction != FetchDirection::Next && !self.options.is_scrollable() {
            return Fetched::miss();
        }
        let len = self.rows.len() as i64;
        let target = match direction {
            FetchDirection::Next => self.position.saturating_add(1),
            FetchDirection::Prior => self.position.saturating_sub(1),
            FetchDirection::First => 0,
            FetchDirection::Last => len - 1,
            FetchDirection::Absolute(0) => -1,
            FetchDirection::Absolute(n) if n > 0 => n - 1,
            FetchDirection::Absolute(n) => len + n,
            FetchDirection::Relative(n) => self.position.saturating_add(n),
        };
        self.seek(target)
    }

    fn seek(&mut self, target: i64) -> Fetched {
        let len = self.rows.len() as i64;
        if target < 0 {
            self.position = -1;
            return Fetched::miss();
        }
        if target >= len {
            self.position = len;
            return Fetched::miss();
        }
        self.position = target;
        Fetched {
            status: FETCH_OK,
            row: Some(self.rows[target as usize].clone()),
        }
    }
}

#[derive(Debug, Default)]
struct CursorState {
    local: HashMap<String, Cursor>,
    global: HashMap<String, Cursor>,
}

impl CursorState {
    fn find_mut(&mut self, key: &str) -> Option<&mut Cursor> {
        if self.local.contains_key(key) {
            return self.local.get_mut(key);
        }
        self.global.get_mut(key)
    }

    fn find(&self, key: &str) -> Option<&Cursor> {
        self.local.get(key).or_else(|| self.global.get(key))
    }
}

/// Cursors of a session and its nested calls. Lookup checks local scope before global.
#[derive(Debug, Default)]
pub struct CursorManager {
    inner: RwLock<CursorState>,
}

fn cursor_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl CursorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&self, name: &str, query: &str, options: CursorOptions) -> Result<()> {
        let key = cursor_key(name);
        let mut st = self.inner.write();
        let scope = if options.is_global() {
            &mut st.global
        } else {
            &mut st.local
        };
        if scope.contains_key(&key) {
            return Err(TsqlError::CursorExists(name.to_string()));
        }
        scope.insert(key, Cursor::new(name, query, options));
        debug!(cursor = name, global = options.is_global(), "cursor declared");
        Ok(())
    }

    pub fn open(&self, name: &str, result: ResultSet) -> Result<()> {
        let mut st = self.inner.write();
        let cursor = st
            .find_mut(&cursor_key(name))
            .ok_or_else(|| TsqlError::CursorNotFound(name.to_string()))?;
        let rows = result.rows.len();
        cursor.open(result)?;
        debug!(cursor = name, rows, "cursor opened");
        Ok(())
    }

    pub fn fetch(&self, name: &str, direction: FetchDirection) -> Result<Fetched> {
        let mut st = self.inner.write();
        let cursor = st
            .find_mut(&cursor_key(name))
            .ok_or_else(|| TsqlError::CursorNotFound(name.to_string()))?;
        Ok(cursor.fetch(direction))
    }

    pub fn close(&self, name: &str) -> Result<()> {
        let mut st = self.inner.write();
        let cursor = st
            .find_mut(&cursor_key(name))
            .ok_or_else(|| TsqlError::CursorNotFound(name.to_string()))?;
        cursor.close()?;
        debug!(cursor = name, "cursor closed");
        Ok(())
    }

    pub fn deallocate(&self, name: &str) -> Result<()> {
        let key = cursor_key(name);
        let mut st = self.inner.write();
        let scope = if st.local.contains_key(&key) {
            &mut st.local
        } else if st.global.contains_key(&key) {
            &mut st.global
        } else {
            return Err(TsqlError::CursorNotFound(name.to_string()));
        };
        if scope.get(&key).is_some_and(Cursor::is_open) {
            return Err(TsqlError::Invalid(format!(
                "cursor '{name}' must be closed before it is deallocated"
            )));
        }
        scope.remove(&key);
        debug!(cursor = name, "cursor deallocated");
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.inner.read().find(&cursor_key(name)).is_some()
    }

    /// `CURSOR_STATUS`, with -3 for a cursor that does not exist.
    pub fn status(&self, name: &str) -> i32 {
        self.inner
            .read()
            .find(&cursor_key(name))
            .map(Cursor::status)
            .unwrap_or(-3)
    }

    pub fn row_count(&self, name: &str) -> Result<i64> {
        self.inner
            .read()
            .find(&cursor_key(name))
            .map(Cursor::row_count)
            .ok_or_else(|| TsqlError::CursorNotFound(name.to_string()))
    }

    pub fn columns(&self, name: &str) -> Result<Vec<String>> {
        self.inner
            .read()
            .find(&cursor_key(name))
            .map(|c| c.columns().to_vec())
            .ok_or_else(|| TsqlError::CursorNotFound(name.to_string()))
    }

    pub fn query(&self, name: &str) -> Result<String> {
        self.inner
            .read()
            .find(&cursor_key(name))
            .map(|c| c.query().to_string())
            .ok_or_else(|| TsqlError::CursorNotFound(name.to_string()))
    }

    pub fn current_row(&self, name: &str) -> Result<Option<Vec<Value>>> {
        self.inner
            .read()
            .find(&cursor_key(name))
            .map(Cursor::current_row)
            .ok_or_else(|| TsqlError::CursorNotFound(name.to_string()))
    }

    /// Drop every session-local cursor, open or not. Global cursors stay.
    pub fn clear_local(&self) -> usize {
        let mut st = self.inner.write();
        let n = st.local.len();
        st.local.clear();
        if n > 0 {
            debug!(count = n, "local cursors cleared");
        }
        n
    }

    pub fn len(&self) -> usize {
        let st = self.inner.read();
        st.local.len() + st.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
