//! Runtime support for stored procedures transpiled from T-SQL.
//!
//! Generated code holds an [`ExecutionContext`] per call and routes every expression,
//! cursor, temp table and TRY/CATCH operation through it.

pub mod config;
pub mod context;
pub mod convert;
pub mod cursor;
pub mod error;
pub mod eval;
pub mod functions;
pub mod handler;
pub mod temp_table;
pub mod types;
pub mod value;

pub use config::SessionConfig;
pub use context::{parse_expr, ExecutionContext, ObjectResolver, QueryExecutor};
pub use cursor::{parse_cursor_options, CursorManager, CursorOptions, FetchDirection};
pub use error::{Result, TsqlError};
pub use eval::Evaluator;
pub use functions::FunctionRegistry;
pub use handler::{ErrorHandler, ErrorRecord};
pub use temp_table::{ColumnDef, ResultSet, TableKind, TempTable, TempTableManager};
pub use types::{parse_data_type, DataType, TypeSpec};
pub use value::{TriBool, Value};
