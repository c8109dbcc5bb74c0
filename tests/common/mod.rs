#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Once};
use tsql_runtime::{
    parse_data_type, ExecutionContext, QueryExecutor, ResultSet, SessionConfig, TsqlError, TypeSpec,
    Value,
};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fresh session with a fixed RAND seed.
pub fn session() -> ExecutionContext {
    init_tracing();
    ExecutionContext::new(SessionConfig {
        rand_seed: Some(42),
        ..SessionConfig::default()
    })
}

pub fn ty(name: &str) -> anyhow::Result<TypeSpec> {
    Ok(parse_data_type(name)?)
}

pub fn eval(ctx: &ExecutionContext, sql: &str) -> anyhow::Result<Value> {
    Ok(ctx.evaluate_sql(sql)?)
}

pub fn eval_err(ctx: &ExecutionContext, sql: &str) -> anyhow::Result<TsqlError> {
    match ctx.evaluate_sql(sql) {
        Ok(v) => anyhow::bail!("expected {sql} to fail, got {v}"),
        Err(e) => Ok(e),
    }
}

pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultSet {
    ResultSet::new(columns.iter().map(|c| c.to_string()).collect(), rows)
}

/// Stands in for the database: answers cursor queries from canned result sets.
#[derive(Default)]
pub struct CannedQueries {
    results: HashMap<String, ResultSet>,
}

impl CannedQueries {
    pub fn with(mut self, sql: &str, result: ResultSet) -> Self {
        self.results.insert(sql.to_string(), result);
        self
    }

    pub fn into_arc(self) -> Arc<dyn QueryExecutor> {
        Arc::new(self)
    }
}

impl QueryExecutor for CannedQueries {
    fn query(&self, _ctx: &ExecutionContext, sql: &str) -> tsql_runtime::Result<ResultSet> {
        self.results
            .get(sql)
            .cloned()
            .ok_or_else(|| TsqlError::NotFound(format!("no canned result for {sql}")))
    }
}
