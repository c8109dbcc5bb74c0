//! Scalar expression evaluation over `sqlparser` expression trees.

use crate::context::ExecutionContext;
use crate::convert;
use crate::error::{Result, TsqlError};
use crate::types::{parse_data_type, DataType, TypeSpec};
use crate::value::{TriBool, Value};
use rust_decimal::Decimal;
use sqlparser::ast;
use std::str::FromStr;

/// Functions whose first argument is a bare datepart keyword (`DATEADD(day, ...)`).
const DATEPART_FUNCTIONS: &[&str] = &["DATEADD", "DATEDIFF", "DATEDIFF_BIG", "DATEPART", "DATENAME"];

/// Built-ins that may be written without parentheses.
const NILADIC: &[(&str, &str)] = &[
    ("CURRENT_TIMESTAMP", "CURRENT_TIMESTAMP"),
    ("CURRENT_USER", "CURRENT_USER"),
    ("SESSION_USER", "SESSION_USER"),
    ("SYSTEM_USER", "SYSTEM_USER"),
    ("USER", "USER_NAME"),
];

/// Evaluates expressions against a context's variables, and optionally one row of a
/// relation whose columns are visible as bare identifiers.
pub struct Evaluator<'a> {
    ctx: &'a ExecutionContext,
    row: Option<(&'a [String], &'a [Value])>,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx, row: None }
    }

    pub fn with_row(ctx: &'a ExecutionContext, columns: &'a [String], values: &'a [Value]) -> Self {
        Self {
            ctx,
            row: Some((columns, values)),
        }
    }

    pub fn eval(&self, expr: &ast::Expr) -> Result<Value> {
        match expr {
            ast::Expr::Nested(inner) => self.eval(inner),
            ast::Expr::Value(v) => literal(&v.value),
            ast::Expr::Identifier(ident) => self.identifier(&ident.value),
            // qualified names resolve to their last segment
            ast::Expr::CompoundIdentifier(ids) => match ids.last() {
                Some(last) => self.identifier(&last.value),
                None => Err(TsqlError::Invalid("empty identifier".into())),
            },
            ast::Expr::UnaryOp { op, expr } => {
                let v = self.eval(expr)?;
                match op {
                    ast::UnaryOperator::Plus => Ok(v),
                    ast::UnaryOperator::Minus => v.neg(),
                    ast::UnaryOperator::Not => Ok(v.not()),
                    other if other.to_string() == "~" => v.bit_not(),
                    other => Err(TsqlError::NotSupported(format!("unary operator {other}"))),
                }
            }
            ast::Expr::BinaryOp { left, op, right } => self.binary(left, op, right),
            ast::Expr::IsNull(inner) => Ok(Value::bit(self.eval(inner)?.is_null())),
            ast::Expr::IsNotNull(inner) => Ok(Value::bit(!self.eval(inner)?.is_null())),
            ast::Expr::IsDistinctFrom(a, b) => Ok(Value::bit(!self.not_distinct(a, b)?)),
            ast::Expr::IsNotDistinctFrom(a, b) => Ok(Value::bit(self.not_distinct(a, b)?)),
            ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let v = self.eval(expr)?;
                let lo = self.eval(low)?;
                let hi = self.eval(high)?;
                if v.is_null() || lo.is_null() || hi.is_null() {
                    return Ok(Value::null(DataType::Bit));
                }
                let inside = v.greater_or_equal(&lo).and(&v.less_or_equal(&hi));
                Ok(if *negated { inside.not() } else { inside })
            }
            ast::Expr::InList {
                expr,
                list,
                negated,
            } => self.in_list(expr, list, *negated),
            ast::Expr::Like {
                negated,
                any,
                expr,
                pattern,
                escape_char,
            } => self.like(*negated, *any, expr, pattern, escape_char.as_ref(), false),
            ast::Expr::ILike {
                negated,
                any,
                expr,
                pattern,
                escape_char,
            } => self.like(*negated, *any, expr, pattern, escape_char.as_ref(), true),
            ast::Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => self.case(operand.as_deref(), conditions, else_result.as_deref()),
            ast::Expr::Cast {
                kind,
                expr,
                data_type,
                ..
            } => {
                let v = self.eval(expr)?;
                let target = cast_target(data_type)?;
                match kind {
                    ast::CastKind::TryCast | ast::CastKind::SafeCast => {
                        Ok(convert::try_convert(&v, &target, None))
                    }
                    _ => convert::cast(&v, &target),
                }
            }
            ast::Expr::Convert {
                is_try,
                expr,
                data_type,
                styles,
                ..
            } => {
                let Some(data_type) = data_type else {
                    return Err(TsqlError::NotSupported("CONVERT ... USING".into()));
                };
                let target = cast_target(data_type)?;
                let v = self.eval(expr)?;
                let style = match styles.first() {
                    Some(e) => {
                        let s = self.eval(e)?;
                        (!s.is_null()).then(|| s.as_int() as i32)
                    }
                    None => None,
                };
                if *is_try {
                    Ok(convert::try_convert(&v, &target, style))
                } else {
                    convert::convert(&v, &target, style)
                }
            }
            ast::Expr::Collate { expr, .. } => self.eval(expr),
            ast::Expr::Substring {
                expr,
                substring_from,
                substring_for,
                ..
            } => {
                let s = self.eval(expr)?;
                let from = match substring_from {
                    Some(e) => self.eval(e)?,
                    None => Value::int(1),
                };
                let len = match substring_for {
                    Some(e) => self.eval(e)?,
                    None => Value::int(i32::MAX),
                };
                self.ctx.call_function("SUBSTRING", &[s, from, len])
            }
            ast::Expr::Trim {
                expr,
                trim_where,
                trim_what,
                ..
            } => {
                let mut args = vec![self.eval(expr)?];
                if let Some(what) = trim_what {
                    args.push(self.eval(what)?);
                }
                let name = match trim_where {
                    Some(ast::TrimWhereField::Leading) => "LTRIM",
                    Some(ast::TrimWhereField::Trailing) => "RTRIM",
                    _ => "TRIM",
                };
                self.ctx.call_function(name, &args)
            }
            ast::Expr::Floor { expr, .. } => {
                let v = self.eval(expr)?;
                self.ctx.call_function("FLOOR", &[v])
            }
            ast::Expr::Ceil { expr, .. } => {
                let v = self.eval(expr)?;
                self.ctx.call_function("CEILING", &[v])
            }
            ast::Expr::Function(f) => self.function(f),
            ast::Expr::Subquery(_) | ast::Expr::Exists { .. } | ast::Expr::InSubquery { .. } => {
                Err(TsqlError::NotSupported(
                    "subqueries are not supported in this context".into(),
                ))
            }
            other => Err(TsqlError::NotSupported(format!("expression not supported: {other}"))),
        }
    }

    fn identifier(&self, name: &str) -> Result<Value> {
        if name.starts_with("@@") {
            return self.ctx.system_variable(name);
        }
        if name.starts_with('@') {
            return self.ctx.get(name);
        }
        if let Some((columns, values)) = self.row {
            if let Some(i) = columns.iter().position(|c| c.eq_ignore_ascii_case(name)) {
                return Ok(values.get(i).cloned().unwrap_or_else(|| Value::null(DataType::Int)));
            }
        }
        if let Some((_, func)) = NILADIC.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            return self.ctx.call_function(func, &[]);
        }
        Err(TsqlError::Raised {
            number: 207,
            message: format!("Invalid column name '{name}'."),
            severity: 16,
            state: 1,
        })
    }

    fn binary(&self, left: &ast::Expr, op: &ast::BinaryOperator, right: &ast::Expr) -> Result<Value> {
        use ast::BinaryOperator as Op;
        match op {
            Op::And => {
                let l = self.eval(left)?;
                if l.truth() == TriBool::False {
                    return Ok(Value::bit(false));
                }
                return Ok(l.and(&self.eval(right)?));
            }
            Op::Or => {
                let l = self.eval(left)?;
                if l.truth() == TriBool::True {
                    return Ok(Value::bit(true));
                }
                return Ok(l.or(&self.eval(right)?));
            }
            _ => {}
        }
        let l = self.eval(left)?;
        let r = self.eval(right)?;
        match op {
            Op::Plus => self.plus(&l, &r),
            Op::StringConcat => Ok(self.concat(&l, &r)),
            Op::Minus => l.sub(&r),
            Op::Multiply => l.mul(&r),
            Op::Divide => l.div(&r),
            Op::Modulo => l.modulo(&r),
            Op::Eq => Ok(l.equals(&r)),
            Op::NotEq => Ok(l.not_equals(&r)),
            Op::Lt => Ok(l.less_than(&r)),
            Op::LtEq => Ok(l.less_or_equal(&r)),
            Op::Gt => Ok(l.greater_than(&r)),
            Op::GtEq => Ok(l.greater_or_equal(&r)),
            Op::BitwiseAnd => l.bit_and(&r),
            Op::BitwiseOr => l.bit_or(&r),
            Op::BitwiseXor => l.bit_xor(&r),
            other => Err(TsqlError::NotSupported(format!("operator {other}"))),
        }
    }

    fn concat_nulls_as_empty(&self, l: &Value, r: &Value) -> bool {
        !self.ctx.config().concat_null_yields_null && (l.is_null() || r.is_null())
    }

    fn concat(&self, l: &Value, r: &Value) -> Value {
        if self.concat_nulls_as_empty(l, r) {
            let blank = |v: &Value| if v.is_null() { Value::varchar("") } else { v.clone() };
            return blank(l).concat(&blank(r));
        }
        l.concat(r)
    }

    fn plus(&self, l: &Value, r: &Value) -> Result<Value> {
        let stringy = l.data_type().is_string() || r.data_type().is_string();
        let temporal = l.data_type().is_datetime() || r.data_type().is_datetime();
        if stringy && !temporal {
            return Ok(self.concat(l, r));
        }
        l.add(r)
    }

    fn not_distinct(&self, a: &ast::Expr, b: &ast::Expr) -> Result<bool> {
        let a = self.eval(a)?;
        let b = self.eval(b)?;
        Ok(match (a.is_null(), b.is_null()) {
            (true, true) => true,
            (false, false) => a.equals(&b).truth().is_true(),
            _ => false,
        })
    }

    fn in_list(&self, expr: &ast::Expr, list: &[ast::Expr], negated: bool) -> Result<Value> {
        let needle = self.eval(expr)?;
        if needle.is_null() {
            return Ok(Value::null(DataType::Bit));
        }
        let mut saw_null = false;
        for item in list {
            let v = self.eval(item)?;
            if v.is_null() {
                saw_null = true;
                continue;
            }
            if needle.equals(&v).truth().is_true() {
                return Ok(Value::bit(!negated));
            }
        }
        let found = if saw_null { TriBool::Unknown } else { TriBool::False };
        let result = if negated { found.not() } else { found };
        Ok(result.into_value())
    }

    fn like(
        &self,
        negated: bool,
        any: bool,
        expr: &ast::Expr,
        pattern: &ast::Expr,
        escape: Option<&ast::Value>,
        fold_case: bool,
    ) -> Result<Value> {
        if any {
            return Err(TsqlError::NotSupported("LIKE ANY(...)".into()));
        }
        let v = self.eval(expr)?;
        let p = self.eval(pattern)?;
        if v.is_null() || p.is_null() {
            return Ok(Value::null(DataType::Bit));
        }
        let escape = like_escape_char(escape)?;
        let (text, pat) = if fold_case {
            (v.as_string().to_lowercase(), p.as_string().to_lowercase())
        } else {
            (v.as_string(), p.as_string())
        };
        Ok(Value::bit(like_matches(&text, &pat, escape) != negated))
    }

    fn case(
        &self,
        operand: Option<&ast::Expr>,
        conditions: &[ast::CaseWhen],
        else_result: Option<&ast::Expr>,
    ) -> Result<Value> {
        let subject = operand.map(|e| self.eval(e)).transpose()?;
        for when in conditions {
            let cond = self.eval(&when.condition)?;
            let hit = match &subject {
                Some(s) => s.equals(&cond).truth().is_true(),
                None => cond.truth().is_true(),
            };
            if hit {
                return self.eval(&when.result);
            }
        }
        match else_result {
            Some(e) => self.eval(e),
            None => Ok(Value::null(DataType::Int)),
        }
    }

    fn function(&self, f: &ast::Function) -> Result<Value> {
        let name = f.name.to_string();
        let upper = name.rsplit('.').next().unwrap_or(&name).to_ascii_uppercase();
        let arg_exprs: Vec<&ast::Expr> = match &f.args {
            ast::FunctionArguments::None => Vec::new(),
            ast::FunctionArguments::Subquery(_) => {
                return Err(TsqlError::NotSupported(
                    "subqueries are not supported in this context".into(),
                ))
            }
            ast::FunctionArguments::List(list) => list
                .args
                .iter()
                .map(|a| match a {
                    ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(e)) => Ok(e),
                    other => Err(TsqlError::NotSupported(format!(
                        "function argument '{other}' in {name}"
                    ))),
                })
                .collect::<Result<_>>()?,
        };
        let takes_datepart = DATEPART_FUNCTIONS.contains(&upper.as_str());
        let mut args = Vec::with_capacity(arg_exprs.len());
        for (i, e) in arg_exprs.into_iter().enumerate() {
            let v = match e {
                ast::Expr::Identifier(id) if i == 0 && takes_datepart && !id.value.starts_with('@') => {
                    Value::varchar(id.value.clone())
                }
                _ => self.eval(e)?,
            };
            args.push(v);
        }
        self.ctx.call_function(&name, &args)
    }
}

/// Target of a CAST/CONVERT. Unsized character and binary targets hold 30.
fn cast_target(data_type: &ast::DataType) -> Result<TypeSpec> {
    let text = data_type.to_string();
    let mut spec = parse_data_type(&text)?;
    let sized = matches!(
        spec.data_type,
        DataType::Char
            | DataType::VarChar
            | DataType::NChar
            | DataType::NVarChar
            | DataType::Binary
            | DataType::VarBinary
    );
    if sized && !text.contains('(') {
        spec.max_len = Some(30);
    }
    Ok(spec)
}

fn literal(v: &ast::Value) -> Result<Value> {
    match v {
        ast::Value::Null => Ok(Value::null(DataType::Int)),
        ast::Value::Boolean(b) => Ok(Value::bit(*b)),
        ast::Value::Number(n, _) => number_literal(n),
        ast::Value::SingleQuotedString(s) => {
            let len = s.chars().count().max(1);
            Ok(Value::string_of(DataType::VarChar, s.clone(), Some(len)))
        }
        ast::Value::NationalStringLiteral(s) => {
            let len = s.chars().count().max(1);
            Ok(Value::string_of(DataType::NVarChar, s.clone(), Some(len)))
        }
        ast::Value::HexStringLiteral(h) => {
            let bytes = hex_bytes(h)?;
            let len = bytes.len().max(1);
            Ok(Value::binary_of(DataType::VarBinary, bytes, Some(len)))
        }
        other => Err(TsqlError::NotSupported(format!("literal {other}"))),
    }
}

/// `1` is int, `3000000000` bigint, `1.50` decimal(3,2), `1e3` float.
fn number_literal(n: &str) -> Result<Value> {
    if n.contains(['e', 'E']) {
        return n
            .parse::<f64>()
            .map(Value::float)
            .map_err(|_| TsqlError::Invalid(format!("invalid numeric literal {n}")));
    }
    if !n.contains('.') {
        if let Ok(i) = n.parse::<i64>() {
            return Ok(match i32::try_from(i) {
                Ok(small) => Value::int(small),
                Err(_) => Value::bigint(i),
            });
        }
    }
    let d = Decimal::from_str(n).map_err(|_| TsqlError::ArithmeticOverflow(format!("numeric literal {n}")))?;
    let scale = d.scale();
    let digits = d.mantissa().unsigned_abs().to_string().len() as u32;
    let precision = digits.max(scale).clamp(1, 38);
    Ok(Value::decimal_with(d, precision as u8, scale as u8))
}

fn hex_bytes(h: &str) -> Result<Vec<u8>> {
    let digits = h.trim_start_matches("0x").trim_start_matches("0X");
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    (0..padded.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&padded[i..i + 2], 16)
                .map_err(|_| TsqlError::Invalid(format!("invalid binary literal 0x{h}")))
        })
        .collect()
}

fn like_escape_char(escape_char: Option<&ast::Value>) -> Result<Option<char>> {
    let Some(v) = escape_char else {
        return Ok(None);
    };
    let s = match v {
        ast::Value::SingleQuotedString(s) | ast::Value::NationalStringLiteral(s) => s.as_str(),
        _ => {
            return Err(TsqlError::NotSupported(
                "ESCAPE value must be a quoted string".into(),
            ))
        }
    };
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Some(c)),
        _ => Err(TsqlError::Raised {
            number: 506,
            message: "The invalid escape character was specified in a LIKE predicate.".into(),
            severity: 16,
            state: 1,
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Many,
    One,
    Lit(char),
    Set { negated: bool, items: Vec<(char, char)> },
}

fn like_tokens(pattern: &str, escape: Option<char>) -> Vec<Token> {
    let p: Vec<char> = pattern.chars().collect();
    let mut out = Vec::with_capacity(p.len());
    let mut i = 0;
    while i < p.len() {
        let c = p[i];
        if Some(c) == escape && i + 1 < p.len() {
            out.push(Token::Lit(p[i + 1]));
            i += 2;
            continue;
        }
        match c {
            '%' => {
                if out.last() != Some(&Token::Many) {
                    out.push(Token::Many);
                }
            }
            '_' => out.push(Token::One),
            '[' => {
                if let Some(close) = p[i + 1..].iter().skip(1).position(|&x| x == ']') {
                    let body = &p[i + 1..i + 2 + close];
                    let (negated, body) = match body.first() {
                        Some('^') if body.len() > 1 => (true, &body[1..]),
                        _ => (false, body),
                    };
                    let mut items = Vec::new();
                    let mut j = 0;
                    while j < body.len() {
                        if j + 2 < body.len() && body[j + 1] == '-' {
                            items.push((body[j], body[j + 2]));
                            j += 3;
                        } else {
                            items.push((body[j], body[j]));
                            j += 1;
                        }
                    }
                    out.push(Token::Set { negated, items });
                    i += close + 3;
                    continue;
                }
                out.push(Token::Lit('['));
            }
            other => out.push(Token::Lit(other)),
        }
        i += 1;
    }
    out
}

fn token_matches(token: &Token, c: char) -> bool {
    match token {
        Token::One => true,
        Token::Lit(l) => *l == c,
        Token::Set { negated, items } => items.iter().any(|&(lo, hi)| lo <= c && c <= hi) != *negated,
        Token::Many => false,
    }
}

/// `LIKE` matching with `%`, `_`, `[set]`, `[^set]`, `[a-z]` and an optional escape.
pub(crate) fn like_matches(text: &str, pattern: &str, escape: Option<char>) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p = like_tokens(pattern, escape);

    let mut ti = 0usize;
    let mut pi = 0usize;
    let mut star_pi: Option<usize> = None;
    let mut star_ti = 0usize;

    while ti < t.len() {
        if pi < p.len() {
            if p[pi] == Token::Many {
                star_pi = Some(pi);
                pi += 1;
                star_ti = ti;
                continue;
            }
            if token_matches(&p[pi], t[ti]) {
                pi += 1;
                ti += 1;
                continue;
            }
        }
        if let Some(star) = star_pi {
            star_ti += 1;
            ti = star_ti;
            pi = star + 1;
            continue;
        }
        return false;
    }
    p[pi..].iter().all(|tok| *tok == Token::Many)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::context::parse_expr;

    fn eval_in(ctx: &ExecutionContext, sql: &str) -> Value {
        let expr = parse_expr(sql).unwrap();
        Evaluator::new(ctx).eval(&expr).unwrap()
    }

    fn eval(sql: &str) -> Value {
        eval_in(&ExecutionContext::new(SessionConfig::default()), sql)
    }

    #[test]
    fn like_wildcards() {
        assert!(like_matches("hello", "h_llo", None));
        assert!(like_matches("hello world", "%world", None));
        assert!(!like_matches("hello", "x%", None));
        assert!(like_matches("abc", "%", None));
        assert!(like_matches("", "%%", None));
        assert!(!like_matches("", "_", None));
        assert!(like_matches("50%", "50!%", Some('!')));
        assert!(!like_matches("500", "50!%", Some('!')));
    }

    #[test]
    fn like_bracket_sets() {
        assert!(like_matches("b1", "[abc][0-9]", None));
        assert!(!like_matches("d1", "[abc][0-9]", None));
        assert!(like_matches("x", "[^0-9]", None));
        assert!(!like_matches("5", "[^0-9]", None));
        assert!(like_matches("[", "[", None));
        assert!(like_matches("a]", "a]", None));
    }

    #[test]
    fn literals_have_dialect_types() {
        assert_eq!(eval("42").data_type(), DataType::Int);
        assert_eq!(eval("3000000000").data_type(), DataType::BigInt);
        let d = eval("10.50");
        assert_eq!((d.data_type(), d.precision(), d.scale()), (DataType::Decimal, 4, 2));
        assert_eq!(eval("1e2").data_type(), DataType::Float);
        assert_eq!(eval("N'x'").data_type(), DataType::NVarChar);
        assert_eq!(eval("0x0A0B").as_bytes(), vec![10, 11]);
        assert!(eval("NULL").is_null());
    }

    #[test]
    fn decimal_arithmetic_is_exact() {
        assert_eq!(eval("10.50 + 3.25").to_string(), "13.75");
        assert!(eval("1.0 / 0").is_null());
        assert_eq!(eval("7 % 3").as_int(), 1);
        assert_eq!(eval("-(2 + 3)").as_int(), -5);
        assert_eq!(eval("6 & 3").as_int(), 2);
        assert_eq!(eval("6 | 1").as_int(), 7);
    }

    #[test]
    fn three_valued_logic() {
        assert!(eval("NULL = NULL").is_null());
        assert_eq!(eval("1 = 0 AND NULL = 1").as_int(), 0);
        assert!(eval("1 = 1 AND NULL = 1").is_null());
        assert_eq!(eval("1 = 1 OR NULL = 1").as_int(), 1);
        assert!(eval("1 = 0 OR NULL = 1").is_null());
        assert!(eval("NOT (NULL = 1)").is_null());
    }

    #[test]
    fn short_circuit_skips_the_right_side() {
        // the right side would fail: the variable is undeclared
        assert_eq!(eval("1 = 0 AND @nope = 1").as_int(), 0);
        assert_eq!(eval("1 = 1 OR @nope = 1").as_int(), 1);
    }

    #[test]
    fn predicates() {
        assert_eq!(eval("5 BETWEEN 1 AND 10").as_int(), 1);
        assert!(eval("NULL BETWEEN 1 AND 10").is_null());
        assert_eq!(eval("5 NOT BETWEEN 1 AND 4").as_int(), 1);
        // one NULL bound makes the whole range test unknown, even when the other bound fails
        assert!(eval("5 BETWEEN NULL AND 3").is_null());
        assert!(eval("5 NOT BETWEEN NULL AND 3").is_null());
        assert!(eval("5 NOT BETWEEN 1 AND NULL").is_null());
        assert_eq!(eval("2 IN (1, 2, 3)").as_int(), 1);
        assert!(eval("4 IN (1, NULL)").is_null());
        assert!(eval("NULL IN (1, 2)").is_null());
        assert_eq!(eval("4 NOT IN (1, 2)").as_int(), 1);
        assert_eq!(eval("'hello' LIKE 'h_llo'").as_int(), 1);
        assert_eq!(eval("'hello' NOT LIKE 'x%'").as_int(), 1);
        assert_eq!(eval("NULL IS NULL").as_int(), 1);
        assert_eq!(eval("1 IS NOT NULL").as_int(), 1);
    }

    #[test]
    fn case_forms() {
        assert_eq!(eval("CASE 2 WHEN 1 THEN 'a' WHEN 2 THEN 'b' ELSE 'c' END").as_string(), "b");
        assert_eq!(eval("CASE WHEN 1 > 2 THEN 'a' WHEN 2 > 1 THEN 'b' END").as_string(), "b");
        assert!(eval("CASE WHEN 1 > 2 THEN 'a' END").is_null());
        assert_eq!(eval("CASE NULL WHEN NULL THEN 1 ELSE 0 END").as_int(), 0);
    }

    #[test]
    fn casts_and_converts() {
        assert_eq!(eval("CAST('42' AS int)").as_int(), 42);
        assert_eq!(eval("CAST(2.567 AS decimal(5,2))").to_string(), "2.57");
        assert_eq!(eval("CONVERT(varchar(10), CAST('2024-03-05' AS date), 112)").as_string(), "20240305");
        assert!(eval("TRY_CAST('abc' AS datetime)").is_null());
        assert_eq!(eval("CAST(12345 AS varchar)").as_string(), "12345");
        let ctx = ExecutionContext::new(SessionConfig::default());
        let expr = parse_expr("CAST(300 AS tinyint)").unwrap();
        assert_eq!(Evaluator::new(&ctx).eval(&expr).unwrap_err().number(), 8115);
    }

    #[test]
    fn functions_and_variables() {
        let mut ctx = ExecutionContext::new(SessionConfig::default());
        ctx.declare("@name", parse_data_type("varchar(20)").unwrap(), Some(Value::varchar("World")))
            .unwrap();
        assert_eq!(eval_in(&ctx, "'Hello, ' + @name").as_string(), "Hello, World");
        assert_eq!(eval_in(&ctx, "UPPER(LEFT(@name, 3))").as_string(), "WOR");
        assert_eq!(eval_in(&ctx, "DATEADD(day, 1, '2024-02-28')").to_string(), "2024-02-29 00:00:00.000");
        assert_eq!(eval_in(&ctx, "DATEDIFF(month, '2024-01-31', '2024-02-01')").as_int(), 1);
        assert_eq!(eval_in(&ctx, "@@FETCH_STATUS").as_int(), -1);
        assert_eq!(eval_in(&ctx, "SUBSTRING(@name, 2, 3)").as_string(), "orl");
        assert_eq!(eval_in(&ctx, "FLOOR(2.7)").as_int(), 2);
        assert_eq!(eval_in(&ctx, "COALESCE(NULL, NULL, 3)").as_int(), 3);
        assert_eq!(eval_in(&ctx, "IIF(@name = 'World', 'same', 'different')").as_string(), "same");
        assert_eq!(eval_in(&ctx, "IIF(@name = 'world', 'same', 'different')").as_string(), "different");
    }

    #[test]
    fn concat_null_setting() {
        let mut ctx = ExecutionContext::new(SessionConfig::default());
        assert!(eval_in(&ctx, "'a' + NULL").is_null());
        ctx.set_option("CONCAT_NULL_YIELDS_NULL", &Value::varchar("OFF")).unwrap();
        assert_eq!(eval_in(&ctx, "'a' + NULL").as_string(), "a");
    }

    #[test]
    fn row_columns_resolve_by_last_segment() {
        let ctx = ExecutionContext::new(SessionConfig::default());
        let cols = vec!["Id".to_string(), "Name".to_string()];
        let row = vec![Value::int(7), Value::varchar("seven")];
        let ev = Evaluator::with_row(&ctx, &cols, &row);
        assert_eq!(ev.eval(&parse_expr("t.id * 2").unwrap()).unwrap().as_int(), 14);
        assert_eq!(ev.eval(&parse_expr("name LIKE 's%'").unwrap()).unwrap().as_int(), 1);
        assert_eq!(ev.eval(&parse_expr("missing").unwrap()).unwrap_err().number(), 207);
    }

    #[test]
    fn subqueries_are_rejected() {
        let ctx = ExecutionContext::new(SessionConfig::default());
        for sql in ["(SELECT 1)", "EXISTS (SELECT 1)", "1 IN (SELECT 1)"] {
            let err = Evaluator::new(&ctx).eval(&parse_expr(sql).unwrap()).unwrap_err();
            assert!(err.to_string().contains("not supported in this context"), "{sql}");
        }
    }
}
