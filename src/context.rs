use crate::config::SessionConfig;
use crate::convert;
use crate::cursor::{CursorManager, CursorOptions, FetchDirection};
use crate::error::{Result, TsqlError};
use crate::eval::Evaluator;
use crate::functions::FunctionRegistry;
use crate::handler::{format_message, throw_error, ErrorHandler, ErrorRecord};
use crate::temp_table::{ColumnDef, ResultSet, TableKind, TempTable, TempTableManager};
use crate::types::{DataType, TypeSpec};
use crate::value::Value;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use sqlparser::ast::Expr;
use sqlparser::dialect::MsSqlDialect;
use sqlparser::parser::Parser;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Deepest procedure nesting the server allows.
pub const MAX_NEST_LEVEL: u32 = 32;

/// Runs the query text behind a cursor declaration and hands back its rows.
pub trait QueryExecutor: Send + Sync {
    fn query(&self, ctx: &ExecutionContext, sql: &str) -> Result<ResultSet>;
}

/// Catalog lookup behind `OBJECT_ID`.
pub trait ObjectResolver: Send + Sync {
    fn object_id(&self, name: &str, kind: Option<&str>) -> Option<i32>;
}

#[derive(Debug, Clone)]
struct Variable {
    spec: TypeSpec,
    value: Value,
    // copied from the caller; the callee may declare its own with the same name
    inherited: bool,
}

type Snapshot = HashMap<String, TempTable>;

#[derive(Debug, Default)]
struct TransactionState {
    depth: u32,
    name: Option<String>,
    doomed: bool,
    begin: Option<Snapshot>,
    savepoints: Vec<(String, Snapshot)>,
}

/// Per-session state shared by a context and every nested call it makes.
struct Session {
    rng: Mutex<StdRng>,
    transaction: Mutex<TransactionState>,
    sequence: Mutex<u128>,
}

impl Session {
    fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            transaction: Mutex::new(TransactionState::default()),
            sequence: Mutex::new(Uuid::new_v4().as_u128() & !(u64::MAX as u128)),
        }
    }
}

/// Everything generated code needs at run time: variables, session settings, the shared
/// cursor and temp table managers, TRY/CATCH state, transactions and `@@` variables.
pub struct ExecutionContext {
    config: SessionConfig,
    variables: HashMap<String, Variable>,
    functions: Arc<FunctionRegistry>,
    temp_tables: Arc<TempTableManager>,
    // table variables never leave the scope that declared them
    table_variables: TempTableManager,
    cursors: Arc<CursorManager>,
    executor: Option<Arc<dyn QueryExecutor>>,
    resolver: Option<Arc<dyn ObjectResolver>>,
    session: Arc<Session>,
    handler: ErrorHandler,
    messages: Vec<String>,
    row_count: i64,
    identity: Option<i64>,
    scope_identity: Option<i64>,
    fetch_status: i32,
    cursor_rows: i64,
    last_error: i32,
    nest_level: u32,
    procedure: Option<String>,
    parameters: Vec<(String, Value)>,
    line: u32,
    call_stack: Vec<String>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("procedure", &self.procedure)
            .field("nest_level", &self.nest_level)
            .field("variables", &self.variables.len())
            .field("row_count", &self.row_count)
            .field("trancount", &self.trancount())
            .finish_non_exhaustive()
    }
}

fn variable_key(name: &str) -> Result<String> {
    let name = name.trim();
    if !name.starts_with('@') || name.starts_with("@@") || name.len() < 2 {
        return Err(TsqlError::Invalid(format!("'{name}' is not a valid variable name")));
    }
    Ok(name.to_ascii_lowercase())
}

fn temp_object_id(name: &str) -> i32 {
    let h = name
        .to_ascii_lowercase()
        .bytes()
        .fold(17i32, |h, b| h.wrapping_mul(31).wrapping_add(b as i32));
    -((h & 0x7fff_ffff).max(1))
}

impl ExecutionContext {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_registry(config, Arc::new(FunctionRegistry::new()))
    }

    pub fn with_registry(config: SessionConfig, functions: Arc<FunctionRegistry>) -> Self {
        let session = Arc::new(Session::new(config.rand_seed));
        debug!(spid = config.spid, database = %config.database, "session started");
        Self {
            config,
            variables: HashMap::new(),
            functions,
            temp_tables: Arc::new(TempTableManager::new()),
            table_variables: TempTableManager::new(),
            cursors: Arc::new(CursorManager::new()),
            executor: None,
            resolver: None,
            session,
            handler: ErrorHandler::default(),
            messages: Vec::new(),
            row_count: 0,
            identity: None,
            scope_identity: None,
            fetch_status: -1,
            cursor_rows: 0,
            last_error: 0,
            nest_level: 0,
            procedure: None,
            parameters: Vec::new(),
            line: 0,
            call_stack: Vec::new(),
        }
    }

    /// Share temp tables and cursors with another session's managers (for `##` tables and
    /// global cursors held by a host process).
    pub fn with_managers(mut self, temp_tables: Arc<TempTableManager>, cursors: Arc<CursorManager>) -> Self {
        self.temp_tables = temp_tables;
        self.cursors = cursors;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ObjectResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn temp_tables(&self) -> &Arc<TempTableManager> {
        &self.temp_tables
    }

    pub fn cursors(&self) -> &Arc<CursorManager> {
        &self.cursors
    }

    /// `SET <option> <value>`.
    pub fn set_option(&mut self, name: &str, value: &Value) -> Result<()> {
        self.config.set_option(name, value)?;
        trace!(option = name, value = %value, "session option set");
        Ok(())
    }

    /// Source line reported by errors raised from here on.
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    pub fn procedure(&self) -> Option<&str> {
        self.procedure.as_deref()
    }

    pub fn nest_level(&self) -> u32 {
        self.nest_level
    }

    // ---- variables ----

    /// `DECLARE @name type [= value]`. The initial value is coerced to the declared type.
    pub fn declare(&mut self, name: &str, spec: TypeSpec, initial: Option<Value>) -> Result<()> {
        let key = variable_key(name)?;
        if spec.data_type == DataType::Table {
            return Err(TsqlError::Invalid(format!(
                "table variable {name} must be declared with its columns"
            )));
        }
        if self.variables.get(&key).is_some_and(|v| !v.inherited) {
            return Err(TsqlError::Raised {
                number: 134,
                message: format!(
                    "The variable name '{name}' has already been declared. Variable names must be unique within a query batch or stored procedure."
                ),
                severity: 15,
                state: 1,
            });
        }
        let value = match initial {
            Some(v) => Self::coerce(&v, &spec)?,
            None => Value::null_of(&spec),
        };
        trace!(variable = name, ty = %spec, "declared");
        self.variables.insert(
            key,
            Variable {
                spec,
                value,
                inherited: false,
            },
        );
        Ok(())
    }

    fn coerce(value: &Value, spec: &TypeSpec) -> Result<Value> {
        if spec.data_type == DataType::SqlVariant {
            return Ok(value.clone());
        }
        convert::cast(value, spec)
    }

    /// `SET @name = value`, converting to the variable's declared type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let key = variable_key(name)?;
        let var = self
            .variables
            .get_mut(&key)
            .ok_or_else(|| TsqlError::UndeclaredVariable(name.trim().to_string()))?;
        var.value = Self::coerce(&value, &var.spec)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        let key = variable_key(name)?;
        self.variables
            .get(&key)
            .map(|v| v.value.clone())
            .ok_or_else(|| TsqlError::UndeclaredVariable(name.trim().to_string()))
    }

    pub fn is_declared(&self, name: &str) -> bool {
        variable_key(name).is_ok_and(|k| self.variables.contains_key(&k))
    }

    pub fn variable_type(&self, name: &str) -> Option<TypeSpec> {
        let key = variable_key(name).ok()?;
        self.variables.get(&key).map(|v| v.spec.clone())
    }

    // ---- evaluation ----

    pub fn evaluate(&self, expr: &Expr) -> Result<Value> {
        Evaluator::new(self).eval(expr)
    }

    /// Parse and evaluate one T-SQL expression.
    pub fn evaluate_sql(&self, text: &str) -> Result<Value> {
        let expr = parse_expr(text)?;
        self.evaluate(&expr)
    }

    /// Evaluate `expr` and assign the result to a variable (`SET @x = expr`).
    pub fn assign(&mut self, name: &str, expr: &Expr) -> Result<()> {
        let value = self.evaluate(expr)?;
        self.set(name, value)
    }

    pub fn call_function(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.functions.call(self, name, args)
    }

    /// Session RAND generator; a seed restarts the sequence.
    pub fn rand(&self, seed: Option<i64>) -> f64 {
        let mut rng = self.session.rng.lock();
        if let Some(s) = seed {
            *rng = StdRng::seed_from_u64(s as u64);
        }
        rng.gen::<f64>()
    }

    pub fn next_sequential_id(&self) -> Uuid {
        let mut seq = self.session.sequence.lock();
        *seq = seq.wrapping_add(1);
        Uuid::from_u128(*seq)
    }

    pub fn database_id(&self) -> i64 {
        match self.config.database.to_ascii_lowercase().as_str() {
            "master" => 1,
            "tempdb" => 2,
            "model" => 3,
            "msdb" => 4,
            _ => 5,
        }
    }

    /// `OBJECT_ID`: asks the configured resolver, then falls back to session temp tables.
    pub fn object_id(&self, name: &str, kind: Option<&str>) -> Option<i32> {
        if let Some(id) = self.resolver.as_ref().and_then(|r| r.object_id(name, kind)) {
            return Some(id);
        }
        let lower = name.trim().to_ascii_lowercase();
        let local = lower
            .strip_prefix("tempdb..")
            .or_else(|| lower.strip_prefix("tempdb.dbo."))
            .unwrap_or(&lower);
        let is_table_kind = kind.map_or(true, |k| k.trim().eq_ignore_ascii_case("u"));
        (local.starts_with('#') && is_table_kind && self.temp_tables.exists(local)).then(|| temp_object_id(local))
    }

    // ---- @@ variables ----

    pub fn row_count(&self) -> i64 {
        self.row_count
    }

    pub fn set_row_count(&mut self, n: i64) {
        self.row_count = n;
    }

    pub fn identity(&self) -> Option<i64> {
        self.identity
    }

    pub fn scope_identity(&self) -> Option<i64> {
        self.scope_identity
    }

    pub fn fetch_status(&self) -> i32 {
        self.fetch_status
    }

    /// `@@ERROR`: number of the last error raised, 0 after a clean statement.
    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    pub fn clear_error(&mut self) {
        self.last_error = 0;
    }

    pub fn ident_current(&self, table: &str) -> Option<i64> {
        self.tables_for(table).ok()?.ident_current(table)
    }

    /// Value of a `@@` system variable. Unset counters read as their defaults.
    pub fn system_variable(&self, name: &str) -> Result<Value> {
        let upper = name.trim().trim_start_matches('@').to_ascii_uppercase();
        let sysname = |s: &str| Value::string_of(DataType::NVarChar, s, Some(128));
        let v = match upper.as_str() {
            "ROWCOUNT" => Value::int(self.row_count.clamp(i32::MIN as i64, i32::MAX as i64) as i32),
            "IDENTITY" => match self.identity {
                Some(n) => Value::decimal_with(Decimal::from(n), 38, 0),
                None => Value::null_of(&TypeSpec::decimal(38, 0)),
            },
            "FETCH_STATUS" => Value::int(self.fetch_status),
            "CURSOR_ROWS" => Value::int(
                i32::try_from(self.cursor_rows)
                    .map_err(|_| TsqlError::ArithmeticOverflow("@@CURSOR_ROWS to data type int".into()))?,
            ),
            "TRANCOUNT" => Value::int(self.trancount() as i32),
            "ERROR" => Value::int(self.last_error),
            "NESTLEVEL" => Value::int(self.nest_level as i32),
            "PROCID" => Value::int(self.procedure.as_deref().map_or(0, temp_object_id).abs()),
            "SPID" => Value::smallint(
                i16::try_from(self.config.spid)
                    .map_err(|_| TsqlError::ArithmeticOverflow("@@SPID to data type smallint".into()))?,
            ),
            "SERVERNAME" => sysname(&self.config.server_name),
            "SERVICENAME" => sysname(&self.config.service_name),
            "VERSION" => Value::nvarchar(self.config.version.clone()),
            "LANGUAGE" => sysname(&self.config.language),
            "DATEFIRST" => Value::tinyint(self.config.datefirst),
            "LOCK_TIMEOUT" => Value::int(self.config.lock_timeout),
            "TEXTSIZE" => Value::int(self.config.textsize),
            "MAX_PRECISION" => Value::tinyint(38),
            "OPTIONS" => {
                let mut bits = 0;
                if self.config.ansi_nulls {
                    bits |= 32;
                }
                if self.config.nocount {
                    bits |= 512;
                }
                if self.config.concat_null_yields_null {
                    bits |= 4096;
                }
                if self.config.xact_abort {
                    bits |= 16384;
                }
                Value::int(bits)
            }
            _ => return Err(TsqlError::NotSupported(format!("global variable @@{upper}"))),
        };
        Ok(v)
    }

    // ---- messages ----

    /// `PRINT`: informational output collected for the caller.
    pub fn print(&mut self, message: &Value) {
        let text = message.as_string();
        trace!(message = %text, "print");
        self.messages.push(text);
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    // ---- errors ----

    /// Typed record for `err` as raised at the current procedure and line.
    pub fn error_record(&self, err: &TsqlError) -> ErrorRecord {
        ErrorRecord::from_error(err, self.procedure.as_deref(), self.line)
            .with_parameters(self.parameters.iter().map(|(n, v)| (n.as_str(), v)))
            .with_trace(self.call_stack.clone())
    }

    fn note_error(&mut self, err: &TsqlError) {
        self.last_error = err.number();
        if self.config.xact_abort {
            let mut txn = self.session.transaction.lock();
            if txn.depth > 0 && !txn.doomed {
                warn!(number = err.number(), "transaction doomed by error under XACT_ABORT");
                txn.doomed = true;
            }
        }
    }

    /// Route an error through the innermost TRY region. `Ok` means it was caught and the
    /// caller should run its CATCH block (then call [`end_catch`](Self::end_catch));
    /// `Err` hands back the error to propagate.
    pub fn raise_error(&mut self, err: TsqlError) -> Result<ErrorRecord> {
        self.note_error(&err);
        let record = self.error_record(&err);
        self.handler.raise(record).map_err(|_| err)
    }

    pub fn begin_try(&mut self) {
        trace!(depth = self.handler.depth(), "begin try");
        self.handler.enter_try();
    }

    pub fn end_try(&mut self) -> Result<()> {
        self.handler.leave_try()
    }

    pub fn end_catch(&mut self) -> Result<()> {
        self.handler.leave_catch()
    }

    /// `BEGIN TRY body END TRY BEGIN CATCH catch END CATCH`.
    ///
    /// Errors returned by `body` are caught here; error functions see them until `catch`
    /// returns. Errors returned by `catch` propagate to the enclosing region.
    pub fn try_catch<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T>,
        catch: impl FnOnce(&mut Self, &ErrorRecord) -> Result<T>,
    ) -> Result<T> {
        let depth = self.handler.depth();
        self.begin_try();
        let err = match body(self) {
            Ok(v) => {
                self.handler.unwind_to(depth + 1);
                self.handler.leave_try()?;
                return Ok(v);
            }
            Err(e) => e,
        };
        self.handler.unwind_to(depth + 1);
        let record = self.raise_error(err)?;
        let result = catch(self, &record);
        self.handler.unwind_to(depth);
        result
    }

    pub fn current_error(&self) -> Option<&ErrorRecord> {
        self.handler.current()
    }

    pub fn in_try(&self) -> bool {
        self.handler.in_try()
    }

    /// `RAISERROR(msg, severity, state, args...)`. Severity 10 and below only adds a
    /// message; higher severities return the error.
    pub fn raiserror(&mut self, message: &str, severity: i32, state: i32, args: &[Value]) -> Result<()> {
        if !(0..=25).contains(&severity) {
            return Err(TsqlError::Invalid(format!("RAISERROR severity {severity} is out of range")));
        }
        if !(-1..=255).contains(&state) {
            return Err(TsqlError::Invalid(format!("RAISERROR state {state} is out of range")));
        }
        let text = format_message(message, args);
        if severity <= 10 {
            self.messages.push(text);
            return Ok(());
        }
        Err(TsqlError::Raised {
            number: crate::error::GENERIC_ERROR_NUMBER,
            message: text,
            severity: severity as u8,
            state: state.max(1) as u8,
        })
    }

    /// `THROW number, message, state`.
    pub fn throw(&mut self, number: i32, message: &str, state: i32) -> Result<()> {
        Err(throw_error(number, message, state)?)
    }

    /// `THROW;` inside a CATCH block.
    pub fn rethrow(&self) -> Result<()> {
        Err(self.handler.rethrow()?)
    }

    // ---- transactions ----

    pub fn begin_transaction(&mut self, name: Option<&str>) -> Result<()> {
        let mut txn = self.session.transaction.lock();
        if txn.doomed {
            return Err(uncommittable());
        }
        if txn.depth == 0 {
            txn.begin = Some(self.temp_tables.snapshot());
            txn.name = name.map(str::to_string);
        }
        txn.depth += 1;
        debug!(depth = txn.depth, name = ?name, "begin transaction");
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        let mut txn = self.session.transaction.lock();
        if txn.depth == 0 {
            return Err(TsqlError::Transaction(
                "The COMMIT TRANSACTION request has no corresponding BEGIN TRANSACTION.".into(),
            ));
        }
        if txn.doomed {
            return Err(uncommittable());
        }
        txn.depth -= 1;
        if txn.depth == 0 {
            *txn = TransactionState::default();
        }
        debug!(depth = txn.depth, "commit");
        Ok(())
    }

    /// `ROLLBACK [name]`. Without a name, or with the outermost transaction's name, the
    /// whole transaction is undone; otherwise `name` must be a savepoint.
    pub fn rollback(&mut self, name: Option<&str>) -> Result<()> {
        let mut txn = self.session.transaction.lock();
        if txn.depth == 0 {
            return Err(TsqlError::Raised {
                number: 3903,
                message: "The ROLLBACK TRANSACTION request has no corresponding BEGIN TRANSACTION.".into(),
                severity: 16,
                state: 1,
            });
        }
        let full = match name {
            None => true,
            Some(n) => txn.name.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(n)),
        };
        if full {
            if let Some(snapshot) = txn.begin.take() {
                self.temp_tables.restore(snapshot);
            }
            debug!(depth = txn.depth, "rollback");
            *txn = TransactionState::default();
            return Ok(());
        }
        let name = name.unwrap_or_default();
        let pos = txn
            .savepoints
            .iter()
            .rposition(|(n, _)| n.eq_ignore_ascii_case(name))
            .ok_or_else(|| TsqlError::Raised {
                number: 6401,
                message: format!("Cannot roll back {name}. No transaction or savepoint of that name was found."),
                severity: 16,
                state: 1,
            })?;
        if txn.doomed {
            return Err(TsqlError::Raised {
                number: 3931,
                message: "The current transaction cannot be committed and cannot be rolled back to a savepoint. Roll back the entire transaction.".into(),
                severity: 16,
                state: 1,
            });
        }
        self.temp_tables.restore(txn.savepoints[pos].1.clone());
        txn.savepoints.truncate(pos + 1);
        debug!(savepoint = name, "rollback to savepoint");
        Ok(())
    }

    /// `SAVE TRANSACTION name`.
    pub fn save_transaction(&mut self, name: &str) -> Result<()> {
        let mut txn = self.session.transaction.lock();
        if txn.depth == 0 {
            return Err(TsqlError::Raised {
                number: 628,
                message: "Cannot issue SAVE TRANSACTION when there is no active transaction.".into(),
                severity: 16,
                state: 1,
            });
        }
        if txn.doomed {
            return Err(uncommittable());
        }
        let snapshot = self.temp_tables.snapshot();
        txn.savepoints.push((name.to_string(), snapshot));
        debug!(savepoint = name, "save transaction");
        Ok(())
    }

    /// `@@TRANCOUNT`.
    pub fn trancount(&self) -> u32 {
        self.session.transaction.lock().depth
    }

    /// `XACT_STATE()`: 0 without a transaction, 1 committable, -1 doomed.
    pub fn xact_state(&self) -> i32 {
        let txn = self.session.transaction.lock();
        match (txn.depth, txn.doomed) {
            (0, _) => 0,
            (_, true) => -1,
            _ => 1,
        }
    }

    // ---- temp tables and table variables ----

    fn tables_for(&self, name: &str) -> Result<&TempTableManager> {
        match TableKind::of(name)? {
            TableKind::Variable => Ok(&self.table_variables),
            TableKind::LocalTemp | TableKind::GlobalTemp => Ok(&self.temp_tables),
        }
    }

    /// `CREATE TABLE #t (...)` or `DECLARE @t TABLE (...)`.
    pub fn create_table(&mut self, name: &str, columns: Vec<ColumnDef>) -> Result<()> {
        self.create_table_def(TempTable::new(name, columns)?)
    }

    pub fn create_table_def(&mut self, table: TempTable) -> Result<()> {
        self.tables_for(table.name())?.create_table(table)
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables_for(name)?.drop_table(name)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables_for(name).is_ok_and(|m| m.exists(name))
    }

    fn record_identity(&mut self, assigned: Option<i64>) {
        if let Some(id) = assigned {
            self.identity = Some(id);
            self.scope_identity = Some(id);
        }
    }

    pub fn insert(&mut self, table: &str, values: &[(&str, Value)]) -> Result<Option<i64>> {
        let assigned = self.tables_for(table)?.insert(table, values)?;
        self.record_identity(assigned);
        self.row_count = 1;
        Ok(assigned)
    }

    pub fn insert_values(&mut self, table: &str, values: Vec<Value>) -> Result<Option<i64>> {
        let assigned = self.tables_for(table)?.insert_values(table, values)?;
        self.record_identity(assigned);
        self.row_count = 1;
        Ok(assigned)
    }

    /// Rows of `table` matching `filter` (all rows when `None`).
    pub fn select(&mut self, table: &str, filter: Option<&Expr>) -> Result<ResultSet> {
        let rs = {
            let this = &*self;
            this.tables_for(table)?
                .select(table, |cols, row| row_matches(this, filter, cols, row))?
        };
        self.row_count = rs.len() as i64;
        Ok(rs)
    }

    /// `UPDATE table SET col = expr, ... WHERE filter`; expressions see the row's columns.
    pub fn update(&mut self, table: &str, assignments: &[(&str, Expr)], filter: Option<&Expr>) -> Result<usize> {
        let n = {
            let this = &*self;
            this.tables_for(table)?.update_with(
                table,
                |cols, row| row_matches(this, filter, cols, row),
                |cols, row| {
                    let eval = Evaluator::with_row(this, cols, row);
                    assignments
                        .iter()
                        .map(|(col, expr)| Ok((col.to_string(), eval.eval(expr)?)))
                        .collect()
                },
            )?
        };
        self.row_count = n as i64;
        Ok(n)
    }

    pub fn delete(&mut self, table: &str, filter: Option<&Expr>) -> Result<usize> {
        let n = {
            let this = &*self;
            this.tables_for(table)?
                .delete(table, |cols, row| row_matches(this, filter, cols, row))?
        };
        self.row_count = n as i64;
        Ok(n)
    }

    pub fn truncate(&mut self, table: &str) -> Result<()> {
        self.tables_for(table)?.truncate(table)?;
        self.row_count = 0;
        Ok(())
    }

    pub fn set_identity_insert(&mut self, table: &str, on: bool) -> Result<()> {
        self.tables_for(table)?.set_identity_insert(table, on)
    }

    /// The whole table, shaped for returning to a caller.
    pub fn table(&self, name: &str) -> Result<ResultSet> {
        self.tables_for(name)?.to_result_set(name)
    }

    // ---- cursors ----

    pub fn declare_cursor(&mut self, name: &str, query: &str, options: CursorOptions) -> Result<()> {
        self.cursors.declare(name, query, options)
    }

    /// `OPEN name`: runs the declared query through the configured executor.
    pub fn open_cursor(&mut self, name: &str) -> Result<()> {
        let query = self.cursors.query(name)?;
        let executor = self
            .executor
            .clone()
            .ok_or_else(|| TsqlError::NotSupported(format!("no query executor to open cursor '{name}'")))?;
        let rows = executor.query(self, &query)?;
        self.open_cursor_with(name, rows)
    }

    /// `OPEN name` over rows the caller already holds.
    pub fn open_cursor_with(&mut self, name: &str, rows: ResultSet) -> Result<()> {
        self.cursors.open(name, rows)?;
        self.cursor_rows = self.cursors.row_count(name)?;
        Ok(())
    }

    /// `FETCH direction FROM name`; updates `@@FETCH_STATUS`.
    pub fn fetch(&mut self, name: &str, direction: FetchDirection) -> Result<Option<Vec<Value>>> {
        let fetched = self.cursors.fetch(name, direction)?;
        self.fetch_status = fetched.status;
        Ok(fetched.row)
    }

    /// `FETCH ... INTO @a, @b`. Returns whether a row was fetched.
    pub fn fetch_into(&mut self, name: &str, direction: FetchDirection, targets: &[&str]) -> Result<bool> {
        let Some(row) = self.fetch(name, direction)? else {
            return Ok(false);
        };
        if row.len() != targets.len() {
            return Err(TsqlError::Raised {
                number: 16924,
                message: "Cursorfetch: The number of variables declared in the INTO list must match that of selected columns.".into(),
                severity: 16,
                state: 1,
            });
        }
        for (target, value) in targets.iter().zip(row) {
            self.set(target, value)?;
        }
        Ok(true)
    }

    pub fn close_cursor(&mut self, name: &str) -> Result<()> {
        self.cursors.close(name)
    }

    pub fn deallocate_cursor(&mut self, name: &str) -> Result<()> {
        self.cursors.deallocate(name)
    }

    /// `CURSOR_STATUS`: 1 open with rows, 0 open and empty, -1 closed, -3 missing.
    pub fn cursor_status(&self, name: &str) -> i32 {
        self.cursors.status(name)
    }

    // ---- nested calls ----

    /// Context for a procedure called from this one. Variables are copied, parameters
    /// declared on top; temp tables, cursors and the transaction are shared.
    pub fn child(&self, procedure: &str, params: &[(&str, TypeSpec, Value)]) -> Result<ExecutionContext> {
        if self.nest_level >= MAX_NEST_LEVEL {
            return Err(TsqlError::Raised {
                number: 217,
                message: format!(
                    "Maximum stored procedure, function, trigger, or view nesting level exceeded (limit {MAX_NEST_LEVEL})."
                ),
                severity: 16,
                state: 1,
            });
        }
        let variables = self
            .variables
            .iter()
            .map(|(k, v)| {
                let mut v = v.clone();
                v.inherited = true;
                (k.clone(), v)
            })
            .collect();
        let mut call_stack = self.call_stack.clone();
        call_stack.push(procedure.to_string());
        let mut child = ExecutionContext {
            config: self.config.clone(),
            variables,
            functions: Arc::clone(&self.functions),
            temp_tables: Arc::clone(&self.temp_tables),
            table_variables: TempTableManager::new(),
            cursors: Arc::clone(&self.cursors),
            executor: self.executor.clone(),
            resolver: self.resolver.clone(),
            session: Arc::clone(&self.session),
            handler: ErrorHandler::with_outer(self.handler.current().cloned()),
            messages: Vec::new(),
            row_count: 0,
            identity: self.identity,
            scope_identity: None,
            fetch_status: self.fetch_status,
            cursor_rows: self.cursor_rows,
            last_error: 0,
            nest_level: self.nest_level + 1,
            procedure: Some(procedure.to_string()),
            parameters: Vec::new(),
            line: 0,
            call_stack,
        };
        for (name, spec, value) in params {
            child.declare(name, spec.clone(), Some(value.clone()))?;
            child.parameters.push((name.to_string(), value.clone()));
        }
        debug!(procedure, nest_level = child.nest_level, "child context created");
        Ok(child)
    }

    /// Fold a finished child back in: session counters and messages flow up, variables
    /// and table variables do not.
    pub fn return_from(&mut self, child: ExecutionContext) {
        self.identity = child.identity;
        self.row_count = child.row_count;
        self.fetch_status = child.fetch_status;
        self.cursor_rows = child.cursor_rows;
        self.last_error = child.last_error;
        self.messages.extend(child.messages);
        trace!(procedure = ?child.procedure, "returned from child context");
    }

    /// Value of an OUTPUT parameter after the child ran.
    pub fn output_of(child: &ExecutionContext, name: &str) -> Result<Value> {
        child.get(name)
    }

    /// Session end: local cursors, local temp tables and table variables go away and an
    /// open transaction is rolled back.
    pub fn end_session(&mut self) {
        if self.trancount() > 0 {
            warn!(trancount = self.trancount(), "open transaction rolled back at session end");
            if let Err(e) = self.rollback(None) {
                warn!(error = %e, "rollback at session end failed");
            }
        }
        let cursors = self.cursors.clear_local();
        let tables = self.temp_tables.clear_session() + self.table_variables.clear_session();
        self.variables.clear();
        debug!(cursors, tables, "session ended");
    }
}

fn uncommittable() -> TsqlError {
    TsqlError::Raised {
        number: 3930,
        message: "The current transaction cannot be committed and cannot support operations that write to the log file. Roll back the transaction.".into(),
        severity: 16,
        state: 1,
    }
}

fn row_matches(ctx: &ExecutionContext, filter: Option<&Expr>, cols: &[String], row: &[Value]) -> Result<bool> {
    match filter {
        None => Ok(true),
        Some(expr) => Ok(Evaluator::with_row(ctx, cols, row).eval(expr)?.truth().is_true()),
    }
}

/// Parse one T-SQL expression.
pub fn parse_expr(text: &str) -> Result<Expr> {
    let dialect = MsSqlDialect {};
    Parser::new(&dialect)
        .try_with_sql(text)
        .and_then(|mut p| p.parse_expr())
        .map_err(|e| TsqlError::Invalid(format!("cannot parse expression '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_data_type;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(SessionConfig::default())
    }

    fn ty(name: &str) -> TypeSpec {
        parse_data_type(name).unwrap()
    }

    #[test]
    fn declare_set_and_coerce() {
        let mut c = ctx();
        c.declare("@n", ty("int"), None).unwrap();
        assert!(c.get("@N").unwrap().is_null());
        c.set("@n", Value::varchar("42")).unwrap();
        assert_eq!(c.get("@n").unwrap(), Value::int(42));
        c.declare("@s", ty("varchar(3)"), Some(Value::varchar("abcdef"))).unwrap();
        assert_eq!(c.get("@s").unwrap().as_string(), "abc");
        assert_eq!(c.declare("@n", ty("int"), None).unwrap_err().number(), 134);
        assert_eq!(c.get("@missing").unwrap_err().number(), 137);
        assert_eq!(c.set("@missing", Value::int(1)).unwrap_err().number(), 137);
    }

    #[test]
    fn system_variables_have_defaults() {
        let c = ctx();
        assert_eq!(c.system_variable("@@FETCH_STATUS").unwrap().as_int(), -1);
        assert_eq!(c.system_variable("@@ROWCOUNT").unwrap().as_int(), 0);
        assert_eq!(c.system_variable("@@TRANCOUNT").unwrap().as_int(), 0);
        assert!(c.system_variable("@@IDENTITY").unwrap().is_null());
        assert_eq!(c.system_variable("@@SERVERNAME").unwrap().as_string(), "localhost");
        assert!(c.system_variable("@@NOPE").is_err());

        let wide = ExecutionContext::new(SessionConfig {
            spid: 70_000,
            ..SessionConfig::default()
        });
        assert_eq!(wide.system_variable("@@SPID").unwrap_err().number(), 8115);
    }

    #[test]
    fn child_copies_variables() {
        let mut parent = ctx();
        parent.declare("@x", ty("int"), Some(Value::int(1))).unwrap();
        let mut child = parent.child("usp_inner", &[("@p", ty("int"), Value::int(9))]).unwrap();
        parent.set("@x", Value::int(2)).unwrap();
        assert_eq!(child.get("@x").unwrap().as_int(), 1);
        child.set("@x", Value::int(3)).unwrap();
        // an inherited name can be redeclared by the callee
        child.declare("@x", ty("varchar(5)"), None).unwrap();
        assert_eq!(child.get("@p").unwrap().as_int(), 9);
        assert!(!parent.is_declared("@p"));
        assert_eq!(parent.get("@x").unwrap().as_int(), 2);
        assert_eq!(child.system_variable("@@NESTLEVEL").unwrap().as_int(), 1);
        parent.return_from(child);
    }

    #[test]
    fn transactions_and_savepoints() {
        let mut c = ctx();
        c.create_table("#t", vec![ColumnDef::new("v", ty("int"))]).unwrap();
        c.begin_transaction(None).unwrap();
        c.insert("#t", &[("v", Value::int(1))]).unwrap();
        c.save_transaction("sp1").unwrap();
        c.insert("#t", &[("v", Value::int(2))]).unwrap();
        assert_eq!(c.xact_state(), 1);
        c.rollback(Some("sp1")).unwrap();
        assert_eq!(c.table("#t").unwrap().len(), 1);
        assert_eq!(c.trancount(), 1);
        c.rollback(None).unwrap();
        assert_eq!(c.table("#t").unwrap().len(), 0);
        assert_eq!(c.trancount(), 0);
        assert_eq!(c.commit().unwrap_err().number(), 3902);
        assert_eq!(c.rollback(None).unwrap_err().number(), 3903);
        assert_eq!(c.save_transaction("x").unwrap_err().number(), 628);
        c.begin_transaction(Some("outer")).unwrap();
        assert_eq!(c.rollback(Some("nope")).unwrap_err().number(), 6401);
        c.begin_transaction(None).unwrap();
        assert_eq!(c.trancount(), 2);
        c.commit().unwrap();
        c.commit().unwrap();
        assert_eq!(c.xact_state(), 0);
    }

    #[test]
    fn xact_abort_dooms_the_transaction() {
        let mut c = ctx();
        c.set_option("XACT_ABORT", &Value::varchar("ON")).unwrap();
        c.begin_transaction(None).unwrap();
        let state = c
            .try_catch(
                |_| Err::<i32, _>(TsqlError::DivideByZero),
                |ctx, rec| {
                    assert_eq!(rec.number, 8134);
                    Ok(ctx.xact_state())
                },
            )
            .unwrap();
        assert_eq!(state, -1);
        assert_eq!(c.commit().unwrap_err().number(), 3930);
        c.rollback(None).unwrap();
        assert_eq!(c.xact_state(), 0);
    }

    #[test]
    fn table_variables_stay_private() {
        let mut parent = ctx();
        parent
            .create_table("@rows", vec![ColumnDef::new("id", ty("int")).identity(1, 1), ColumnDef::new("v", ty("varchar(10)"))])
            .unwrap();
        parent.insert("@rows", &[("v", Value::varchar("a"))]).unwrap();
        assert_eq!(parent.scope_identity(), Some(1));
        assert_eq!(parent.system_variable("@@IDENTITY").unwrap().as_int(), 1);
        let child = parent.child("p", &[]).unwrap();
        assert!(!child.table_exists("@rows"));
        parent.create_table("#shared", vec![ColumnDef::new("v", ty("int"))]).unwrap();
        assert!(child.table_exists("#shared"));
        assert!(child.object_id("tempdb..#shared", None).is_some_and(|id| id < 0));
        assert!(child.object_id("dbo.Customers", None).is_none());
    }

    #[test]
    fn end_session_clears_local_state() {
        let mut c = ctx();
        c.create_table("#a", vec![ColumnDef::new("v", ty("int"))]).unwrap();
        c.create_table("##g", vec![ColumnDef::new("v", ty("int"))]).unwrap();
        c.declare_cursor("cur", "SELECT 1", CursorOptions::LOCAL).unwrap();
        c.begin_transaction(None).unwrap();
        c.end_session();
        assert!(!c.table_exists("#a"));
        assert!(c.table_exists("##g"));
        assert_eq!(c.cursor_status("cur"), -3);
        assert_eq!(c.trancount(), 0);
    }

    #[test]
    fn seeded_rand_repeats() {
        let cfg = SessionConfig {
            rand_seed: Some(3),
            ..SessionConfig::default()
        };
        let a = ExecutionContext::new(cfg.clone());
        let b = ExecutionContext::new(cfg);
        assert_eq!(a.rand(None), b.rand(None));
        let first = a.rand(Some(11));
        assert_eq!(first, a.rand(Some(11)));
    }
}
