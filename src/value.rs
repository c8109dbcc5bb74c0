use crate::error::{Result, TsqlError};
use crate::types::{DataType, TypeSpec};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Storage slot of a [`Value`]. Exactly one variant is live, chosen by the value's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Time(NaiveDateTime),
    Bytes(Vec<u8>),
}

/// A typed scalar. Null values still carry the type they were declared or computed as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    data_type: DataType,
    precision: u8,
    scale: u8,
    max_len: Option<usize>,
    cell: Cell,
}

/// Result of a predicate under three-valued logic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriBool {
    True,
    False,
    Unknown,
}

impl TriBool {
    pub fn and(self, other: TriBool) -> TriBool {
        match (self, other) {
            (TriBool::False, _) | (_, TriBool::False) => TriBool::False,
            (TriBool::True, b) => b,
            (TriBool::Unknown, TriBool::True) => TriBool::Unknown,
            (TriBool::Unknown, TriBool::Unknown) => TriBool::Unknown,
        }
    }

    pub fn or(self, other: TriBool) -> TriBool {
        match (self, other) {
            (TriBool::True, _) | (_, TriBool::True) => TriBool::True,
            (TriBool::False, b) => b,
            (TriBool::Unknown, TriBool::False) => TriBool::Unknown,
            (TriBool::Unknown, TriBool::Unknown) => TriBool::Unknown,
        }
    }

    pub fn not(self) -> TriBool {
        match self {
            TriBool::True => TriBool::False,
            TriBool::False => TriBool::True,
            TriBool::Unknown => TriBool::Unknown,
        }
    }

    pub fn is_true(self) -> bool {
        matches!(self, TriBool::True)
    }

    pub fn from_bool(b: bool) -> TriBool {
        if b {
            TriBool::True
        } else {
            TriBool::False
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            TriBool::True => Value::bit(true),
            TriBool::False => Value::bit(false),
            TriBool::Unknown => Value::null(DataType::Bit),
        }
    }
}

/// 1900-01-01 00:00:00, the zero point for day arithmetic and the date part of bare times.
pub fn base_datetime() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .expect("valid base date")
        .and_time(NaiveTime::MIN)
}

fn digit_count(d: &Decimal) -> u8 {
    let digits = d.mantissa().unsigned_abs().to_string().len() as u8;
    digits.max(d.scale() as u8 + 1).min(38)
}

impl Value {
    fn make(data_type: DataType, cell: Cell) -> Self {
        Self {
            data_type,
            precision: data_type.default_precision(),
            scale: data_type.default_scale(),
            max_len: None,
            cell,
        }
    }

    pub fn null(data_type: DataType) -> Self {
        Self::make(data_type, Cell::Null)
    }

    /// Typed null carrying full declaration modifiers.
    pub fn null_of(spec: &TypeSpec) -> Self {
        Self {
            data_type: spec.data_type,
            precision: spec.precision,
            scale: spec.scale,
            max_len: spec.max_len,
            cell: Cell::Null,
        }
    }

    pub fn bit(b: bool) -> Self {
        Self::make(DataType::Bit, Cell::Bool(b))
    }

    pub fn tinyint(v: u8) -> Self {
        Self::make(DataType::TinyInt, Cell::Int(v as i64))
    }

    pub fn smallint(v: i16) -> Self {
        Self::make(DataType::SmallInt, Cell::Int(v as i64))
    }

    pub fn int(v: i32) -> Self {
        Self::make(DataType::Int, Cell::Int(v as i64))
    }

    pub fn bigint(v: i64) -> Self {
        Self::make(DataType::BigInt, Cell::Int(v))
    }

    /// Integer of the given integer type; the caller is responsible for range.
    pub(crate) fn integer_of(data_type: DataType, v: i64) -> Self {
        if data_type == DataType::Bit {
            return Self::bit(v != 0);
        }
        Self::make(data_type, Cell::Int(v))
    }

    /// Decimal whose precision and scale are inferred from the literal digits.
    pub fn decimal(d: Decimal) -> Self {
        let scale = d.scale() as u8;
        Self::decimal_with(d, digit_count(&d), scale)
    }

    pub fn decimal_with(mut d: Decimal, precision: u8, scale: u8) -> Self {
        d.rescale(scale as u32);
        Self {
            data_type: DataType::Decimal,
            precision,
            scale,
            max_len: None,
            cell: Cell::Decimal(d),
        }
    }

    pub fn money(mut d: Decimal) -> Self {
        d.rescale(4);
        Self::make(DataType::Money, Cell::Decimal(d))
    }

    pub fn smallmoney(mut d: Decimal) -> Self {
        d.rescale(4);
        Self::make(DataType::SmallMoney, Cell::Decimal(d))
    }

    pub fn float(f: f64) -> Self {
        Self::make(DataType::Float, Cell::Float(f))
    }

    pub fn real(f: f32) -> Self {
        Self::make(DataType::Real, Cell::Float(f as f64))
    }

    pub fn varchar(s: impl Into<String>) -> Self {
        Self::make(DataType::VarChar, Cell::Text(s.into()))
    }

    pub fn nvarchar(s: impl Into<String>) -> Self {
        Self::make(DataType::NVarChar, Cell::Text(s.into()))
    }

    pub fn string_of(data_type: DataType, s: impl Into<String>, max_len: Option<usize>) -> Self {
        Self {
            max_len,
            ..Self::make(data_type, Cell::Text(s.into()))
        }
    }

    pub fn xml(s: impl Into<String>) -> Self {
        Self::make(DataType::Xml, Cell::Text(s.into()))
    }

    pub fn uniqueidentifier(id: Uuid) -> Self {
        Self::make(
            DataType::UniqueIdentifier,
            Cell::Text(id.hyphenated().to_string().to_ascii_uppercase()),
        )
    }

    pub fn datetime(dt: NaiveDateTime) -> Self {
        Self::make(DataType::DateTime, Cell::Time(dt))
    }

    pub fn datetime2(dt: NaiveDateTime) -> Self {
        Self::make(DataType::DateTime2, Cell::Time(dt))
    }

    pub fn date(d: NaiveDate) -> Self {
        Self::make(DataType::Date, Cell::Time(d.and_time(NaiveTime::MIN)))
    }

    pub fn time(t: NaiveTime) -> Self {
        Self::make(DataType::Time, Cell::Time(base_datetime().date().and_time(t)))
    }

    pub fn temporal_of(data_type: DataType, dt: NaiveDateTime, scale: u8) -> Self {
        Self {
            scale,
            ..Self::make(data_type, Cell::Time(dt))
        }
    }

    pub fn varbinary(bytes: Vec<u8>) -> Self {
        Self::make(DataType::VarBinary, Cell::Bytes(bytes))
    }

    pub fn binary_of(data_type: DataType, bytes: Vec<u8>, max_len: Option<usize>) -> Self {
        Self {
            max_len,
            ..Self::make(data_type, Cell::Bytes(bytes))
        }
    }

    /// Relabel within the same storage family (decimal as numeric, varchar as char).
    pub(crate) fn retyped(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_null(&self) -> bool {
        matches!(self.cell, Cell::Null)
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn type_spec(&self) -> TypeSpec {
        TypeSpec {
            data_type: self.data_type,
            precision: self.precision,
            scale: self.scale,
            max_len: self.max_len,
        }
    }

    pub fn as_int(&self) -> i64 {
        match &self.cell {
            Cell::Null => 0,
            Cell::Bool(b) => *b as i64,
            Cell::Int(i) => *i,
            Cell::Float(f) => f.trunc() as i64,
            Cell::Decimal(d) => d.trunc().to_i64().unwrap_or(0),
            Cell::Text(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .ok()
                    .or_else(|| Decimal::from_str(t).ok().and_then(|d| d.trunc().to_i64()))
                    .unwrap_or(0)
            }
            Cell::Time(t) => (*t - base_datetime()).num_days(),
            Cell::Bytes(b) => {
                let tail = &b[b.len().saturating_sub(8)..];
                let mut raw = [0u8; 8];
                raw[8 - tail.len()..].copy_from_slice(tail);
                i64::from_be_bytes(raw)
            }
        }
    }

    pub fn as_float(&self) -> f64 {
        match &self.cell {
            Cell::Null => 0.0,
            Cell::Float(f) => *f,
            Cell::Decimal(d) => d.to_f64().unwrap_or(0.0),
            Cell::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            Cell::Time(t) => {
                let delta = *t - base_datetime();
                delta.num_milliseconds() as f64 / 86_400_000.0
            }
            _ => self.as_int() as f64,
        }
    }

    pub fn as_decimal(&self) -> Decimal {
        match &self.cell {
            Cell::Null => Decimal::ZERO,
            Cell::Decimal(d) => *d,
            Cell::Float(f) => Decimal::from_f64(*f).unwrap_or_default(),
            Cell::Text(s) => {
                let t = s.trim();
                Decimal::from_str(t)
                    .ok()
                    .or_else(|| Decimal::from_scientific(t).ok())
                    .unwrap_or_default()
            }
            Cell::Time(_) => Decimal::from_f64(self.as_float()).unwrap_or_default(),
            _ => Decimal::from(self.as_int()),
        }
    }

    /// String form; null yields the empty string.
    pub fn as_string(&self) -> String {
        if self.is_null() {
            return String::new();
        }
        self.to_string()
    }

    pub fn as_bool(&self) -> bool {
        match &self.cell {
            Cell::Null => false,
            Cell::Bool(b) => *b,
            Cell::Int(i) => *i != 0,
            Cell::Float(f) => *f != 0.0,
            Cell::Decimal(d) => !d.is_zero(),
            Cell::Text(s) => {
                let t = s.trim();
                t.eq_ignore_ascii_case("true") || (!t.eq_ignore_ascii_case("false") && self.as_float() != 0.0)
            }
            Cell::Time(_) => true,
            Cell::Bytes(b) => b.iter().any(|x| *x != 0),
        }
    }

    pub fn as_time(&self) -> NaiveDateTime {
        match &self.cell {
            Cell::Null => base_datetime(),
            Cell::Time(t) => *t,
            Cell::Text(s) => crate::convert::parse_datetime(s, None).unwrap_or_else(base_datetime),
            Cell::Int(_) | Cell::Bool(_) => TimeDelta::try_days(self.as_int())
                .and_then(|d| base_datetime().checked_add_signed(d))
                .unwrap_or_else(base_datetime),
            _ => add_fractional_days(base_datetime(), self.as_float()).unwrap_or_else(base_datetime),
        }
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        match &self.cell {
            Cell::Null => Vec::new(),
            Cell::Bytes(b) => b.clone(),
            Cell::Text(s) => s.as_bytes().to_vec(),
            Cell::Bool(_) | Cell::Int(_) => self.as_int().to_be_bytes().to_vec(),
            Cell::Float(f) => f.to_be_bytes().to_vec(),
            Cell::Decimal(d) => d.serialize().to_vec(),
            Cell::Time(t) => t.and_utc().timestamp_millis().to_be_bytes().to_vec(),
        }
    }

    /// Truth value under three-valued logic.
    pub fn truth(&self) -> TriBool {
        if self.is_null() {
            TriBool::Unknown
        } else {
            TriBool::from_bool(self.as_bool())
        }
    }

    fn is_numeric_value(&self) -> bool {
        self.data_type.is_numeric()
    }

    /// Three-way ordering. Nulls sort first; callers needing SQL semantics use the
    /// comparison operators, which yield NULL instead.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        let (a, b) = (self.data_type, other.data_type);
        if self.is_numeric_value() && other.is_numeric_value() {
            return compare_numeric(self, other);
        }
        if a.is_string() && b.is_string() {
            return compare_text(&self.as_string(), &other.as_string());
        }
        if a.is_datetime() && b.is_datetime() {
            return self.as_time().cmp(&other.as_time());
        }
        if a.is_binary() && b.is_binary() {
            return self.as_bytes().cmp(&other.as_bytes());
        }
        // Implicit conversion of the string side toward the higher-precedence type.
        if let Some(ord) = compare_mixed(self, other) {
            return ord;
        }
        if let Some(ord) = compare_mixed(other, self) {
            return ord.reverse();
        }
        compare_text(&self.as_string(), &other.as_string())
    }

    fn compare_with(&self, other: &Value, pred: fn(Ordering) -> bool) -> Value {
        if self.is_null() || other.is_null() {
            return Value::null(DataType::Bit);
        }
        Value::bit(pred(self.compare(other)))
    }

    pub fn equals(&self, other: &Value) -> Value {
        self.compare_with(other, |o| o == Ordering::Equal)
    }

    pub fn not_equals(&self, other: &Value) -> Value {
        self.compare_with(other, |o| o != Ordering::Equal)
    }

    pub fn less_than(&self, other: &Value) -> Value {
        self.compare_with(other, |o| o == Ordering::Less)
    }

    pub fn less_or_equal(&self, other: &Value) -> Value {
        self.compare_with(other, |o| o != Ordering::Greater)
    }

    pub fn greater_than(&self, other: &Value) -> Value {
        self.compare_with(other, |o| o == Ordering::Greater)
    }

    pub fn greater_or_equal(&self, other: &Value) -> Value {
        self.compare_with(other, |o| o != Ordering::Less)
    }

    pub fn and(&self, other: &Value) -> Value {
        self.truth().and(other.truth()).into_value()
    }

    pub fn or(&self, other: &Value) -> Value {
        self.truth().or(other.truth()).into_value()
    }

    pub fn not(&self) -> Value {
        self.truth().not().into_value()
    }

    pub fn add(&self, other: &Value) -> Result<Value> {
        let stringy = self.data_type.is_string() || other.data_type.is_string();
        let temporal = self.data_type.is_datetime() || other.data_type.is_datetime();
        if stringy && !temporal {
            return Ok(self.concat(other));
        }
        if let Some(v) = self.temporal_shift(other, 1)? {
            return Ok(v);
        }
        self.arith(other, ArithOp::Add)
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        if let Some(v) = self.temporal_shift(other, -1)? {
            return Ok(v);
        }
        self.arith(other, ArithOp::Sub)
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        self.arith(other, ArithOp::Mul)
    }

    /// Division; a zero divisor yields a NULL of the result type.
    pub fn div(&self, other: &Value) -> Result<Value> {
        self.arith(other, ArithOp::Div)
    }

    pub fn modulo(&self, other: &Value) -> Result<Value> {
        self.arith(other, ArithOp::Mod)
    }

    pub fn neg(&self) -> Result<Value> {
        let ty = self.data_type;
        if !ty.is_numeric() {
            return Err(invalid_operand(ty, "negation"));
        }
        if self.is_null() {
            return Ok(Value::null(ty));
        }
        match &self.cell {
            Cell::Int(i) => {
                let n = i.checked_neg().ok_or_else(|| {
                    TsqlError::ArithmeticOverflow(format!("expression to data type {ty}"))
                })?;
                check_int_range(n, ty)
            }
            Cell::Bool(b) => Ok(Value::int(-(*b as i32))),
            Cell::Decimal(d) => Ok(Value {
                cell: Cell::Decimal(-*d),
                ..self.clone()
            }),
            Cell::Float(f) => Ok(Value {
                cell: Cell::Float(-*f),
                ..self.clone()
            }),
            _ => Err(invalid_operand(ty, "negation")),
        }
    }

    /// String concatenation; NULL on either side yields NULL.
    pub fn concat(&self, other: &Value) -> Value {
        let ty = if self.data_type.is_unicode() || other.data_type.is_unicode() {
            DataType::NVarChar
        } else {
            DataType::VarChar
        };
        if self.is_null() || other.is_null() {
            return Value::null(ty);
        }
        let mut s = self.as_string();
        s.push_str(&other.as_string());
        Value::make(ty, Cell::Text(s))
    }

    pub fn bit_and(&self, other: &Value) -> Result<Value> {
        self.bitwise(other, |a, b| a & b)
    }

    pub fn bit_or(&self, other: &Value) -> Result<Value> {
        self.bitwise(other, |a, b| a | b)
    }

    pub fn bit_xor(&self, other: &Value) -> Result<Value> {
        self.bitwise(other, |a, b| a ^ b)
    }

    pub fn bit_not(&self) -> Result<Value> {
        let ty = self.data_type;
        if !ty.is_integer() {
            return Err(invalid_operand(ty, "bitwise not"));
        }
        if self.is_null() {
            return Ok(Value::null(ty));
        }
        Ok(match ty {
            DataType::Bit => Value::bit(!self.as_bool()),
            DataType::TinyInt => Value::integer_of(ty, !self.as_int() & 0xFF),
            _ => Value::integer_of(ty, !self.as_int()),
        })
    }

    fn bitwise(&self, other: &Value, f: fn(i64, i64) -> i64) -> Result<Value> {
        let (a, b) = (self.data_type, other.data_type);
        if !(a.is_integer() || a.is_binary()) || !(b.is_integer() || b.is_binary()) {
            return Err(invalid_operand(
                if a.is_integer() { b } else { a },
                "bitwise operator",
            ));
        }
        let ty = if a.precedence() >= b.precedence() { a } else { b };
        let ty = if ty.is_binary() { DataType::BigInt } else { ty };
        if self.is_null() || other.is_null() {
            return Ok(Value::null(ty));
        }
        Ok(Value::integer_of(ty, f(self.as_int(), other.as_int())))
    }

    /// Datetime plus/minus a number of (fractional) days.
    fn temporal_shift(&self, other: &Value, sign: i64) -> Result<Option<Value>> {
        if !self.data_type.is_datetime() || !(other.is_numeric_value() || other.data_type.is_string()) {
            return Ok(None);
        }
        if self.is_null() || other.is_null() {
            return Ok(Some(Value::null(self.data_type)));
        }
        let days = other.as_float() * sign as f64;
        let shifted = add_fractional_days(self.as_time(), days)
            .ok_or_else(|| TsqlError::ArithmeticOverflow(format!("expression to data type {}", self.data_type)))?;
        Ok(Some(Value {
            cell: Cell::Time(shifted),
            ..self.clone()
        }))
    }

    fn arith(&self, other: &Value, op: ArithOp) -> Result<Value> {
        let (a, b) = (self.data_type, other.data_type);
        let operand_ok = |t: DataType| t.is_numeric() || t.is_string();
        if !operand_ok(a) || !operand_ok(b) || (a.is_string() && b.is_string()) {
            let bad = if operand_ok(a) && !a.is_string() { b } else { a };
            return Err(invalid_operand(bad, op.name()));
        }
        let ty = arith_result_type(a, b);
        if self.is_null() || other.is_null() {
            return Ok(Value::null(ty));
        }

        if ty.is_decimal() {
            let (p1, s1) = decimal_shape(self);
            let (p2, s2) = decimal_shape(other);
            let (x, y) = (self.as_decimal(), other.as_decimal());
            if matches!(op, ArithOp::Div | ArithOp::Mod) && y.is_zero() {
                return Ok(Value::null(ty));
            }
            let overflow = || TsqlError::ArithmeticOverflow(format!("expression to data type {ty}"));
            let (raw, precision, scale) = match op {
                ArithOp::Add | ArithOp::Sub => {
                    let scale = s1.max(s2);
                    let precision = (p1.saturating_sub(s1).max(p2.saturating_sub(s2)) + scale + 1).min(38);
                    let r = if op == ArithOp::Add { x.checked_add(y) } else { x.checked_sub(y) };
                    (r.ok_or_else(overflow)?, precision, scale)
                }
                ArithOp::Mul => {
                    let mut precision = p1 + p2 + 1;
                    let mut scale = s1 + s2;
                    if precision > 38 {
                        scale = scale.saturating_sub(precision - 38).max(scale.min(6));
                        precision = 38;
                    }
                    (x.checked_mul(y).ok_or_else(overflow)?, precision, scale)
                }
                ArithOp::Div => {
                    let int_digits = p1.saturating_sub(s1) + s2;
                    let mut scale = 6.max(s1 + p2 + 1);
                    if int_digits + scale > 38 {
                        scale = 6.max(38u16.saturating_sub(int_digits));
                    }
                    ((x.checked_div(y).ok_or_else(overflow)?), (int_digits + scale).min(38), scale)
                }
                ArithOp::Mod => {
                    let scale = s1.max(s2);
                    (x.checked_rem(y).ok_or_else(overflow)?, p2.min(38), scale)
                }
            };
            let scale = scale.min(28) as u8;
            let rounded = raw.round_dp_with_strategy(scale as u32, RoundingStrategy::MidpointAwayFromZero);
            return Ok(match ty {
                DataType::Money => Value::money(rounded),
                DataType::SmallMoney => Value::smallmoney(rounded),
                _ => Value::decimal_with(rounded, precision as u8, scale),
            });
        }

        if ty.is_float() {
            let (x, y) = (self.as_float(), other.as_float());
            let r = match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div | ArithOp::Mod if y == 0.0 => return Ok(Value::null(ty)),
                ArithOp::Div => x / y,
                ArithOp::Mod => x % y,
            };
            if !r.is_finite() {
                return Err(TsqlError::ArithmeticOverflow(format!("expression to data type {ty}")));
            }
            return Ok(if ty == DataType::Real {
                Value::real(r as f32)
            } else {
                Value::float(r)
            });
        }

        let (x, y) = (self.as_int(), other.as_int());
        let r = match op {
            ArithOp::Add => x.checked_add(y),
            ArithOp::Sub => x.checked_sub(y),
            ArithOp::Mul => x.checked_mul(y),
            ArithOp::Div | ArithOp::Mod if y == 0 => return Ok(Value::null(ty)),
            ArithOp::Div => x.checked_div(y),
            ArithOp::Mod => x.checked_rem(y),
        }
        .ok_or_else(|| TsqlError::ArithmeticOverflow(format!("expression to data type {ty}")))?;
        check_int_range(r, ty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "subtract",
            ArithOp::Mul => "multiply",
            ArithOp::Div => "divide",
            ArithOp::Mod => "modulo",
        }
    }
}

fn invalid_operand(ty: DataType, op: &str) -> TsqlError {
    TsqlError::Invalid(format!("Operand data type {ty} is invalid for {op} operator"))
}

fn check_int_range(n: i64, ty: DataType) -> Result<Value> {
    let (lo, hi) = ty.int_range().unwrap_or((i64::MIN, i64::MAX));
    if n < lo || n > hi {
        return Err(TsqlError::ArithmeticOverflow(format!(
            "expression to data type {ty}"
        )));
    }
    Ok(Value::integer_of(ty, n))
}

/// Result type of a binary arithmetic operator:
/// decimal family > float family > bigint > int.
fn arith_result_type(a: DataType, b: DataType) -> DataType {
    // A string operand takes the numeric type of the other side.
    let a = if a.is_string() { b } else { a };
    let b = if b.is_string() { a } else { b };
    if a.is_decimal() || b.is_decimal() {
        let plain = |t: DataType| matches!(t, DataType::Decimal | DataType::Numeric);
        if plain(a) || plain(b) {
            return DataType::Decimal;
        }
        if a == DataType::SmallMoney && b == DataType::SmallMoney {
            return DataType::SmallMoney;
        }
        return DataType::Money;
    }
    if a.is_float() || b.is_float() {
        if a == DataType::Real && b == DataType::Real {
            return DataType::Real;
        }
        return DataType::Float;
    }
    if a == DataType::BigInt || b == DataType::BigInt {
        return DataType::BigInt;
    }
    DataType::Int
}

/// Precision and scale an operand contributes to decimal arithmetic.
fn decimal_shape(v: &Value) -> (u16, u16) {
    let ty = v.data_type;
    if ty.is_decimal() {
        return (v.precision.max(1) as u16, v.scale as u16);
    }
    if ty.is_integer() {
        return (ty.default_precision().max(1) as u16, 0);
    }
    let d = v.as_decimal();
    (digit_count(&d) as u16, d.scale() as u16)
}

pub(crate) fn add_fractional_days(t: NaiveDateTime, days: f64) -> Option<NaiveDateTime> {
    let millis = (days * 86_400_000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    t.checked_add_signed(TimeDelta::try_milliseconds(millis as i64)?)
}

fn compare_numeric(a: &Value, b: &Value) -> Ordering {
    match (&a.cell, &b.cell) {
        (Cell::Int(x), Cell::Int(y)) => return x.cmp(y),
        (Cell::Float(x), Cell::Float(y)) => return x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => {}
    }
    match (exact_numeric(a), exact_numeric(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a
            .as_float()
            .partial_cmp(&b.as_float())
            .unwrap_or(Ordering::Equal),
    }
}

fn exact_numeric(v: &Value) -> Option<Decimal> {
    match &v.cell {
        Cell::Float(f) => Decimal::from_f64(*f),
        _ => Some(v.as_decimal()),
    }
}

/// Character comparison ignoring trailing spaces, as padded comparison requires.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.trim_end_matches(' ').cmp(b.trim_end_matches(' '))
}

/// `typed` against a string operand converted to `typed`'s family, when the string parses.
fn compare_mixed(typed: &Value, other: &Value) -> Option<Ordering> {
    if !other.data_type.is_string() {
        return None;
    }
    let text = other.as_string();
    if typed.data_type.is_numeric() {
        let d = Decimal::from_str(text.trim()).ok()?;
        return Some(typed.as_decimal().cmp(&d));
    }
    if typed.data_type.is_datetime() {
        let t = crate::convert::parse_datetime(&text, None)?;
        return Some(typed.as_time().cmp(&t));
    }
    if typed.data_type == DataType::UniqueIdentifier {
        return Some(compare_text(&typed.as_string(), &text.to_ascii_uppercase()));
    }
    None
}

fn fraction_digits(t: &NaiveDateTime, digits: u8) -> String {
    if digits == 0 {
        return String::new();
    }
    let nanos = format!("{:09}", t.nanosecond() % 1_000_000_000);
    let take = (digits as usize).min(9);
    let mut out = String::with_capacity(take + 1);
    out.push('.');
    out.push_str(&nanos[..take]);
    if digits > 9 {
        out.push_str(&"0".repeat(digits as usize - 9));
    }
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cell {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) if self.data_type == DataType::Real => write!(f, "{}", *x as f32),
            Cell::Float(x) => write!(f, "{x}"),
            Cell::Decimal(d) => write!(f, "{d}"),
            Cell::Text(s) => f.write_str(s),
            Cell::Time(t) => match self.data_type {
                DataType::Date => write!(f, "{}", t.format("%Y-%m-%d")),
                DataType::Time => write!(
                    f,
                    "{}{}",
                    t.format("%H:%M:%S"),
                    fraction_digits(t, self.scale)
                ),
                DataType::SmallDateTime => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
                DataType::DateTime => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.3f")),
                _ => write!(
                    f,
                    "{}{}",
                    t.format("%Y-%m-%d %H:%M:%S"),
                    fraction_digits(t, self.scale)
                ),
            },
            Cell::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
        }
    }
}

/// Days between the calendar dates of two timestamps, ignoring time of day.
pub(crate) fn day_number(t: &NaiveDateTime) -> i64 {
    t.date().num_days_from_ce() as i64
}
