//! Built-in scalar functions, grouped by family and looked up case-insensitively.

use crate::context::ExecutionContext;
use crate::error::{Result, TsqlError};
use crate::types::DataType;
use crate::value::Value;
use std::collections::HashMap;

mod datetime;
mod hashing;
mod numeric;
mod path;
mod string;
mod system;

pub use datetime::DatePart;

pub type ScalarFn = fn(&ExecutionContext, &[Value]) -> Result<Value>;

#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    pub func: ScalarFn,
}

impl FunctionDef {
    fn check_arity(&self, got: usize) -> Result<()> {
        let ok = got >= self.min_args && self.max_args.map_or(true, |max| got <= max);
        if ok {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        };
        Err(TsqlError::arity(self.name, expected, got))
    }
}

#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// A registry with every built-in family registered.
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register_builtins();
        registry
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn register_builtins(&mut self) {
        string::register(self);
        numeric::register(self);
        datetime::register(self);
        system::register(self);
        hashing::register(self);
        path::register(self);
    }

    pub fn register(&mut self, name: &'static str, min_args: usize, max_args: Option<usize>, func: ScalarFn) {
        self.functions.insert(
            name.to_ascii_uppercase(),
            FunctionDef {
                name,
                min_args,
                max_args,
                func,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&normalize(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn call(&self, ctx: &ExecutionContext, name: &str, args: &[Value]) -> Result<Value> {
        let def = self
            .get(name)
            .ok_or_else(|| TsqlError::UnknownFunction(name.to_string()))?;
        def.check_arity(args.len())?;
        (def.func)(ctx, args)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.functions.values().map(|d| d.name).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// `dbo.fn`, `[LEN]` and `len` all name the same function.
fn normalize(name: &str) -> String {
    let last = name.rsplit('.').next().unwrap_or(name);
    last.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_uppercase()
}

pub(crate) fn any_null(args: &[Value]) -> bool {
    args.iter().any(Value::is_null)
}

/// Result type for string functions: nvarchar when the source is unicode.
pub(crate) fn text_type_of(v: &Value) -> DataType {
    if v.data_type().is_unicode() {
        DataType::NVarChar
    } else {
        DataType::VarChar
    }
}

pub(crate) fn text_like(source: &Value, s: String) -> Value {
    Value::string_of(text_type_of(source), s, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = FunctionRegistry::new();
        assert!(reg.contains("len"));
        assert!(reg.contains("Len"));
        assert!(reg.contains("dbo.LEN"));
        assert!(reg.contains("[len]"));
        assert!(!reg.contains("no_such_fn"));
        assert!(reg.len() > 100);
    }

    #[test]
    fn arity_is_checked_before_dispatch() {
        let ctx = ExecutionContext::new(SessionConfig::default());
        let reg = FunctionRegistry::new();
        let err = reg.call(&ctx, "LEFT", &[Value::varchar("abc")]).unwrap_err();
        assert_eq!(err.number(), 174);
        assert!(matches!(
            reg.call(&ctx, "FROBNICATE", &[]),
            Err(TsqlError::UnknownFunction(_))
        ));
    }

    #[test]
    fn custom_functions_can_be_registered() {
        fn answer(_: &ExecutionContext, _: &[Value]) -> Result<Value> {
            Ok(Value::int(42))
        }
        let mut reg = FunctionRegistry::empty();
        reg.register("answer", 0, Some(0), answer);
        let ctx = ExecutionContext::new(SessionConfig::default());
        assert_eq!(reg.call(&ctx, "ANSWER", &[]).unwrap().as_int(), 42);
    }
}
