use super::{any_null, FunctionRegistry};
use crate::context::ExecutionContext;
use crate::convert;
use crate::error::{Result, TsqlError};
use crate::types::{DataType, TypeSpec};
use crate::value::{Cell, Value};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;
use std::str::FromStr;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("ABS", 1, Some(1), abs);
    registry.register("CEILING", 1, Some(1), ceiling);
    registry.register("FLOOR", 1, Some(1), floor);
    registry.register("ROUND", 2, Some(3), round);
    registry.register("POWER", 2, Some(2), power);
    registry.register("SQRT", 1, Some(1), sqrt);
    registry.register("SQUARE", 1, Some(1), square);
    registry.register("EXP", 1, Some(1), exp);
    registry.register("LOG", 1, Some(2), log);
    registry.register("LOG10", 1, Some(1), log10);
    registry.register("SIGN", 1, Some(1), sign);
    registry.register("PI", 0, Some(0), pi);
    registry.register("RAND", 0, Some(1), rand);
    registry.register("SIN", 1, Some(1), sin);
    registry.register("COS", 1, Some(1), cos);
    registry.register("TAN", 1, Some(1), tan);
    registry.register("COT", 1, Some(1), cot);
    registry.register("ASIN", 1, Some(1), asin);
    registry.register("ACOS", 1, Some(1), acos);
    registry.register("ATAN", 1, Some(1), atan);
    registry.register("ATN2", 2, Some(2), atn2);
    registry.register("DEGREES", 1, Some(1), degrees);
    registry.register("RADIANS", 1, Some(1), radians);
    registry.register("GREATEST", 1, None, greatest);
    registry.register("LEAST", 1, None, least);
    registry.register("ISNUMERIC", 1, Some(1), isnumeric);
}

fn float_domain_error() -> TsqlError {
    TsqlError::Raised {
        number: 3623,
        message: "An invalid floating point operation occurred.".into(),
        severity: 16,
        state: 1,
    }
}

fn numeric_arg(v: &Value, func: &str) -> Result<()> {
    let ty = v.data_type();
    if ty.is_numeric() || ty.is_string() {
        return Ok(());
    }
    Err(TsqlError::Invalid(format!(
        "Operand data type {ty} is invalid for {func} function"
    )))
}

/// A value of `like`'s numeric type holding `d`. Integers are range-checked.
fn same_type(like: &Value, d: Decimal) -> Result<Value> {
    let ty = like.data_type();
    if ty.is_integer() {
        let n = d.trunc().to_i64().ok_or_else(|| overflow(ty))?;
        let (lo, hi) = ty.int_range().unwrap_or((i64::MIN, i64::MAX));
        if n < lo || n > hi {
            return Err(overflow(ty));
        }
        return Ok(Value::integer_of(ty, n));
    }
    match ty {
        DataType::Money => Ok(Value::money(d)),
        DataType::SmallMoney => Ok(Value::smallmoney(d)),
        DataType::Float | DataType::Real => Ok(Value::float(d.to_f64().unwrap_or(0.0))),
        _ => Ok(Value::decimal_with(d, like.precision().max(1), like.scale())),
    }
}

fn overflow(ty: DataType) -> TsqlError {
    TsqlError::ArithmeticOverflow(format!("expression to data type {ty}"))
}

/// Apply `f` to the float form, keeping NULLs typed as float.
fn float_fn(args: &[Value], f: impl Fn(f64) -> f64) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(DataType::Float));
    }
    let r = f(args[0].as_float());
    if !r.is_finite() {
        return Err(float_domain_error());
    }
    Ok(Value::float(r))
}

fn abs(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    numeric_arg(v, "abs")?;
    if v.is_null() {
        return Ok(Value::null(v.data_type()));
    }
    match v.cell() {
        Cell::Float(f) if v.data_type() == DataType::Real => Ok(Value::real(f.abs() as f32)),
        Cell::Float(f) => Ok(Value::float(f.abs())),
        Cell::Text(_) => Ok(Value::float(v.as_float().abs())),
        _ => same_type(v, v.as_decimal().abs()),
    }
}

fn ceiling(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    numeric_arg(v, "ceiling")?;
    if v.is_null() {
        return Ok(Value::null(v.data_type()));
    }
    match v.cell() {
        Cell::Float(f) => Ok(Value::float(f.ceil())),
        Cell::Text(_) => Ok(Value::float(v.as_float().ceil())),
        _ if v.data_type().is_decimal() => {
            Ok(Value::decimal_with(v.as_decimal().ceil(), v.precision().max(1), 0))
        }
        _ => Ok(v.clone()),
    }
}

fn floor(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    numeric_arg(v, "floor")?;
    if v.is_null() {
        return Ok(Value::null(v.data_type()));
    }
    match v.cell() {
        Cell::Float(f) => Ok(Value::float(f.floor())),
        Cell::Text(_) => Ok(Value::float(v.as_float().floor())),
        _ if v.data_type().is_decimal() => {
            Ok(Value::decimal_with(v.as_decimal().floor(), v.precision().max(1), 0))
        }
        _ => Ok(v.clone()),
    }
}

/// Round `d` to `places` digits; negative places round left of the decimal point.
fn round_decimal(d: Decimal, places: i64, truncate: bool) -> Option<Decimal> {
    let strategy = if truncate {
        RoundingStrategy::ToZero
    } else {
        RoundingStrategy::MidpointAwayFromZero
    };
    if places >= 0 {
        return Some(d.round_dp_with_strategy(places.min(28) as u32, strategy));
    }
    let factor = Decimal::from_i128_with_scale(10i128.pow((-places).min(28) as u32), 0);
    let scaled = d.checked_div(factor)?.round_dp_with_strategy(0, strategy);
    scaled.checked_mul(factor)
}

/// `ROUND(n, length[, function])`: a non-zero `function` truncates instead.
fn round(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    numeric_arg(v, "round")?;
    if any_null(&args[..2]) {
        return Ok(Value::null(v.data_type()));
    }
    let places = args[1].as_int();
    let truncate = args.get(2).is_some_and(|f| !f.is_null() && f.as_int() != 0);
    match v.cell() {
        Cell::Float(_) | Cell::Text(_) => {
            let d = Decimal::from_f64(v.as_float()).ok_or_else(|| overflow(DataType::Float))?;
            let r = round_decimal(d, places, truncate).ok_or_else(|| overflow(DataType::Float))?;
            Ok(Value::float(r.to_f64().unwrap_or(0.0)))
        }
        _ => {
            let r = round_decimal(v.as_decimal(), places, truncate).ok_or_else(|| overflow(v.data_type()))?;
            if v.data_type().is_decimal() {
                // scale is kept: ROUND(1.2345, 2) is 1.2300
                let d = convert::fit_decimal(r, v.precision().max(1), v.scale(), false)
                    .or_else(|_| convert::fit_decimal(r, (v.precision() + 1).min(38), v.scale(), false))?;
                return same_type(v, d);
            }
            same_type(v, r)
        }
    }
}

fn power(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let base = &args[0];
    numeric_arg(base, "power")?;
    if any_null(args) {
        return Ok(Value::null(base.data_type()));
    }
    let (x, y) = (base.as_float(), args[1].as_float());
    let r = x.powf(y);
    if !r.is_finite() {
        return Err(float_domain_error());
    }
    match base.data_type() {
        t if t.is_float() || t.is_string() => Ok(Value::float(r)),
        t if t.is_integer() => {
            let whole = r.trunc();
            if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
                return Err(overflow(t));
            }
            let ty = if t == DataType::BigInt { DataType::BigInt } else { DataType::Int };
            same_type(&Value::null(ty), Decimal::from(whole as i64))
        }
        _ => {
            let exact = exact_power(base.as_decimal(), args[1].as_decimal())
                .or_else(|| Decimal::from_f64(r))
                .ok_or_else(|| overflow(base.data_type()))?;
            let scale = base.scale();
            let d = convert::fit_decimal(exact, 38, scale, false)?;
            Ok(Value::decimal_with(d, 38, scale))
        }
    }
}

/// Whole, non-negative exponents are computed exactly by repeated multiplication.
fn exact_power(base: Decimal, exp: Decimal) -> Option<Decimal> {
    if !exp.fract().is_zero() || exp.is_sign_negative() {
        return None;
    }
    let n = exp.to_u32().filter(|n| *n <= 64)?;
    (0..n).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(base))
}

fn sqrt(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, f64::sqrt)
}

fn square(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, |x| x * x)
}

fn exp(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, f64::exp)
}

fn log(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::Float));
    }
    let x = args[0].as_float();
    if x <= 0.0 {
        return Err(float_domain_error());
    }
    match args.get(1) {
        Some(b) => {
            let base = b.as_float();
            if base <= 0.0 || base == 1.0 {
                return Err(float_domain_error());
            }
            Ok(Value::float(x.ln() / base.ln()))
        }
        None => Ok(Value::float(x.ln())),
    }
}

fn log10(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, |x| if x <= 0.0 { f64::NAN } else { x.log10() })
}

fn sign(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    numeric_arg(v, "sign")?;
    if v.is_null() {
        return Ok(Value::null(v.data_type()));
    }
    match v.cell() {
        Cell::Float(f) => Ok(Value::float(if *f > 0.0 { 1.0 } else if *f < 0.0 { -1.0 } else { 0.0 })),
        Cell::Text(_) => Ok(Value::float(v.as_float().signum())),
        _ => {
            let d = v.as_decimal();
            let s = match d.cmp(&Decimal::ZERO) {
                Ordering::Greater => Decimal::ONE,
                Ordering::Less => Decimal::NEGATIVE_ONE,
                Ordering::Equal => Decimal::ZERO,
            };
            if v.data_type() == DataType::TinyInt || v.data_type() == DataType::Bit {
                return Ok(Value::int(s.to_i32().unwrap_or(0)));
            }
            same_type(v, s)
        }
    }
}

fn pi(_: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::float(std::f64::consts::PI))
}

/// `RAND([seed])`: a seed re-seeds the session generator.
fn rand(ctx: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let seed = args.first().filter(|v| !v.is_null()).map(Value::as_int);
    Ok(Value::float(ctx.rand(seed)))
}

fn sin(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, f64::sin)
}

fn cos(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, f64::cos)
}

fn tan(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, f64::tan)
}

fn cot(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, |x| 1.0 / x.tan())
}

fn asin(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, f64::asin)
}

fn acos(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, f64::acos)
}

fn atan(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    float_fn(args, f64::atan)
}

fn atn2(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::Float));
    }
    Ok(Value::float(args[0].as_float().atan2(args[1].as_float())))
}

fn decimal_pi() -> Decimal {
    Decimal::from_f64(std::f64::consts::PI).unwrap_or_default()
}

fn degrees(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    if v.data_type().is_float() || v.is_null() {
        return float_fn(args, f64::to_degrees);
    }
    let d = v
        .as_decimal()
        .checked_mul(Decimal::from(180))
        .and_then(|d| d.checked_div(decimal_pi()))
        .ok_or_else(|| overflow(v.data_type()))?;
    same_type(v, d)
}

fn radians(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    if v.data_type().is_float() || v.is_null() {
        return float_fn(args, f64::to_radians);
    }
    let d = v
        .as_decimal()
        .checked_mul(decimal_pi())
        .and_then(|d| d.checked_div(Decimal::from(180)))
        .ok_or_else(|| overflow(v.data_type()))?;
    same_type(v, d)
}

/// Highest-precedence type among the non-null arguments.
fn common_type(args: &[Value]) -> TypeSpec {
    let mut best: Option<&Value> = None;
    for a in args {
        let better = match best {
            None => true,
            Some(b) => a.data_type().precedence() > b.data_type().precedence(),
        };
        if better {
            best = Some(a);
        }
    }
    let mut spec = best.map(Value::type_spec).unwrap_or_else(|| TypeSpec::new(DataType::Int));
    if matches!(spec.data_type, DataType::Decimal | DataType::Numeric) {
        // wide enough for every argument's integer digits and fraction
        let scale = args.iter().map(|a| if a.data_type().is_decimal() { a.scale() } else { 0 }).max().unwrap_or(0);
        let int_digits = args
            .iter()
            .map(|a| match a.data_type() {
                t if t.is_integer() => t.default_precision(),
                t if t.is_decimal() => a.precision().saturating_sub(a.scale()),
                _ => 0,
            })
            .max()
            .unwrap_or(0);
        spec.scale = scale;
        spec.precision = (int_digits + scale).clamp(1, 38);
    }
    spec
}

/// NULLs are skipped; the result is NULL only when every argument is.
fn extreme(args: &[Value], want: Ordering) -> Result<Value> {
    let ty = common_type(args);
    let mut pick: Option<Value> = None;
    for a in args.iter().filter(|a| !a.is_null()) {
        let a = convert::cast(a, &ty)?;
        let replace = match &pick {
            None => true,
            Some(cur) => a.compare(cur) == want,
        };
        if replace {
            pick = Some(a);
        }
    }
    Ok(pick.unwrap_or_else(|| Value::null_of(&ty)))
}

fn greatest(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    extreme(args, Ordering::Greater)
}

fn least(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    extreme(args, Ordering::Less)
}

/// Whether a string would convert to some numeric type, the way ISNUMERIC reports it.
pub(crate) fn looks_numeric(s: &str) -> bool {
    let t = s.trim();
    if t.is_empty() {
        return false;
    }
    let t = t.strip_prefix(['$', '£', '€', '¥']).unwrap_or(t).trim_start();
    let t = t.strip_prefix(['+', '-']).unwrap_or(t);
    if t.is_empty() || t == "." {
        // a lone sign or currency symbol counts
        return s.trim().chars().count() == 1 && !s.trim().starts_with('.');
    }
    let no_commas: String = t.chars().filter(|c| *c != ',').collect();
    Decimal::from_str(&no_commas).is_ok()
        || Decimal::from_scientific(&no_commas).is_ok()
        || no_commas.parse::<f64>().is_ok_and(|f| f.is_finite())
}

fn isnumeric(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    let yes = match v.cell() {
        Cell::Null => false,
        Cell::Text(s) if v.data_type().is_string() => looks_numeric(s),
        Cell::Text(_) | Cell::Time(_) | Cell::Bytes(_) => false,
        _ => true,
    };
    Ok(Value::int(yes as i32))
}
