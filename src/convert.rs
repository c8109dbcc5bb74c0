use crate::error::{Result, TsqlError};
use crate::types::{DataType, TypeSpec};
use crate::value::{base_datetime, Cell, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use uuid::Uuid;

/// Modifiers for an explicit conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// CONVERT style code, if one was given.
    pub style: Option<i32>,
    /// Truncate toward zero instead of rounding when reducing decimal scale.
    pub truncate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StyleKind {
    Date,
    Time,
    DateTime,
}

struct DateStyle {
    codes: &'static [i32],
    format: &'static str,
    kind: StyleKind,
}

const DATE_STYLES: &[DateStyle] = &[
    DateStyle { codes: &[0, 100], format: "%b %e %Y %l:%M%p", kind: StyleKind::DateTime },
    DateStyle { codes: &[1], format: "%m/%d/%y", kind: StyleKind::Date },
    DateStyle { codes: &[101], format: "%m/%d/%Y", kind: StyleKind::Date },
    DateStyle { codes: &[2], format: "%y.%m.%d", kind: StyleKind::Date },
    DateStyle { codes: &[102], format: "%Y.%m.%d", kind: StyleKind::Date },
    DateStyle { codes: &[3], format: "%d/%m/%y", kind: StyleKind::Date },
    DateStyle { codes: &[103], format: "%d/%m/%Y", kind: StyleKind::Date },
    DateStyle { codes: &[4], format: "%d.%m.%y", kind: StyleKind::Date },
    DateStyle { codes: &[104], format: "%d.%m.%Y", kind: StyleKind::Date },
    DateStyle { codes: &[5], format: "%d-%m-%y", kind: StyleKind::Date },
    DateStyle { codes: &[105], format: "%d-%m-%Y", kind: StyleKind::Date },
    DateStyle { codes: &[6], format: "%d %b %y", kind: StyleKind::Date },
    DateStyle { codes: &[106], format: "%d %b %Y", kind: StyleKind::Date },
    DateStyle { codes: &[7], format: "%b %d, %y", kind: StyleKind::Date },
    DateStyle { codes: &[107], format: "%b %d, %Y", kind: StyleKind::Date },
    DateStyle { codes: &[8, 24, 108], format: "%H:%M:%S", kind: StyleKind::Time },
    DateStyle { codes: &[9, 109], format: "%b %e %Y %l:%M:%S:%3f%p", kind: StyleKind::DateTime },
    DateStyle { codes: &[10], format: "%m-%d-%y", kind: StyleKind::Date },
    DateStyle { codes: &[110], format: "%m-%d-%Y", kind: StyleKind::Date },
    DateStyle { codes: &[11], format: "%y/%m/%d", kind: StyleKind::Date },
    DateStyle { codes: &[111], format: "%Y/%m/%d", kind: StyleKind::Date },
    DateStyle { codes: &[12], format: "%y%m%d", kind: StyleKind::Date },
    DateStyle { codes: &[112], format: "%Y%m%d", kind: StyleKind::Date },
    DateStyle { codes: &[13, 113], format: "%d %b %Y %H:%M:%S:%3f", kind: StyleKind::DateTime },
    DateStyle { codes: &[14, 114], format: "%H:%M:%S:%3f", kind: StyleKind::Time },
    DateStyle { codes: &[20, 120], format: "%Y-%m-%d %H:%M:%S", kind: StyleKind::DateTime },
    DateStyle { codes: &[21, 25, 121], format: "%Y-%m-%d %H:%M:%S%.3f", kind: StyleKind::DateTime },
    DateStyle { codes: &[22], format: "%m/%d/%y %l:%M:%S %p", kind: StyleKind::DateTime },
    DateStyle { codes: &[23], format: "%Y-%m-%d", kind: StyleKind::Date },
    DateStyle { codes: &[126], format: "%Y-%m-%dT%H:%M:%S%.3f", kind: StyleKind::DateTime },
    DateStyle { codes: &[127], format: "%Y-%m-%dT%H:%M:%S%.3fZ", kind: StyleKind::DateTime },
];

/// Formats tried in order when a string is converted without a style.
const FALLBACK_FORMATS: &[(StyleKind, &str)] = &[
    (StyleKind::DateTime, "%Y-%m-%d %H:%M:%S%.f"),
    (StyleKind::DateTime, "%Y-%m-%dT%H:%M:%S%.f"),
    (StyleKind::DateTime, "%Y-%m-%dT%H:%M:%S%.fZ"),
    (StyleKind::DateTime, "%Y-%m-%d %H:%M"),
    (StyleKind::DateTime, "%Y%m%d %H:%M:%S%.f"),
    (StyleKind::DateTime, "%m/%d/%Y %H:%M:%S%.f"),
    (StyleKind::DateTime, "%m/%d/%Y %I:%M:%S %p"),
    (StyleKind::DateTime, "%m/%d/%Y %H:%M"),
    (StyleKind::DateTime, "%b %d %Y %I:%M%p"),
    (StyleKind::DateTime, "%d %b %Y %H:%M:%S%.f"),
    (StyleKind::Date, "%Y-%m-%d"),
    (StyleKind::Date, "%Y%m%d"),
    (StyleKind::Date, "%m/%d/%Y"),
    (StyleKind::Date, "%Y/%m/%d"),
    (StyleKind::Date, "%d %b %Y"),
    (StyleKind::Date, "%b %d %Y"),
    (StyleKind::Date, "%B %d, %Y"),
    (StyleKind::Date, "%b %d, %Y"),
    (StyleKind::Time, "%H:%M:%S%.f"),
    (StyleKind::Time, "%H:%M"),
    (StyleKind::Time, "%I:%M %p"),
    (StyleKind::Time, "%I:%M%p"),
];

fn date_style(code: i32) -> Option<&'static DateStyle> {
    DATE_STYLES.iter().find(|s| s.codes.contains(&code))
}

fn parse_with(text: &str, kind: StyleKind, format: &str) -> Option<NaiveDateTime> {
    match kind {
        StyleKind::DateTime => NaiveDateTime::parse_from_str(text, format).ok(),
        StyleKind::Date => NaiveDate::parse_from_str(text, format)
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN)),
        StyleKind::Time => NaiveTime::parse_from_str(text, format)
            .ok()
            .map(|t| base_datetime().date().and_time(t)),
    }
}

/// Parse a date/time string. A style selects its template first; the common formats
/// are tried after it, or alone when no style is given.
pub fn parse_datetime(text: &str, style: Option<i32>) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(s) = style.and_then(date_style) {
        if let Some(t) = parse_with(text, s.kind, s.format) {
            return Some(t);
        }
    }
    FALLBACK_FORMATS
        .iter()
        .find_map(|(kind, fmt)| parse_with(text, *kind, fmt))
}

/// Format a date/time with a style code, or the type's default form when `style` is None.
pub fn format_datetime(t: &NaiveDateTime, data_type: DataType, style: Option<i32>) -> Result<String> {
    let code = match style {
        Some(code) => code,
        None if matches!(data_type, DataType::DateTime | DataType::SmallDateTime) => 0,
        None => return Ok(Value::temporal_of(data_type, *t, data_type.default_scale()).to_string()),
    };
    let s = date_style(code).ok_or_else(|| {
        TsqlError::Invalid(format!(
            "{code} is not a valid style number when converting from {data_type} to a character string"
        ))
    })?;
    Ok(t.format(s.format).to_string())
}

pub fn cast(value: &Value, target: &TypeSpec) -> Result<Value> {
    convert_with(value, target, ConvertOptions::default())
}

pub fn convert(value: &Value, target: &TypeSpec, style: Option<i32>) -> Result<Value> {
    convert_with(
        value,
        target,
        ConvertOptions {
            style,
            truncate: false,
        },
    )
}

/// TRY_CAST / TRY_CONVERT: any conversion failure becomes a NULL of the target type.
pub fn try_convert(value: &Value, target: &TypeSpec, style: Option<i32>) -> Value {
    convert(value, target, style).unwrap_or_else(|_| Value::null_of(target))
}

pub fn convert_with(value: &Value, target: &TypeSpec, opts: ConvertOptions) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::null_of(target));
    }
    let to = target.data_type;
    match to {
        DataType::Bit | DataType::TinyInt | DataType::SmallInt | DataType::Int | DataType::BigInt => {
            to_integer(value, to)
        }
        DataType::Decimal | DataType::Numeric => to_decimal(value, target, opts.truncate),
        DataType::Money | DataType::SmallMoney => to_money(value, to),
        DataType::Float | DataType::Real => to_float(value, to),
        DataType::Char
        | DataType::VarChar
        | DataType::NChar
        | DataType::NVarChar
        | DataType::Text
        | DataType::NText
        | DataType::Xml => to_string(value, target, opts.style),
        DataType::Date
        | DataType::Time
        | DataType::DateTime
        | DataType::DateTime2
        | DataType::SmallDateTime
        | DataType::DateTimeOffset => to_temporal(value, target, opts.style),
        DataType::Binary | DataType::VarBinary | DataType::Image => {
            to_binary(value, target, opts.style)
        }
        DataType::UniqueIdentifier => to_uniqueidentifier(value),
        DataType::SqlVariant => Ok(value.clone()),
        DataType::Table => Err(TsqlError::NotSupported(
            "conversion to table type".into(),
        )),
    }
}

fn overflow(to: DataType) -> TsqlError {
    TsqlError::ArithmeticOverflow(format!("expression to data type {to}"))
}

fn to_integer(value: &Value, to: DataType) -> Result<Value> {
    if to == DataType::Bit {
        return Ok(Value::bit(value.as_bool()));
    }
    let n = match value.cell() {
        Cell::Float(f) => {
            let t = f.trunc();
            if !t.is_finite() || t < i64::MIN as f64 || t > i64::MAX as f64 {
                return Err(overflow(to));
            }
            t as i64
        }
        Cell::Decimal(d) => d.trunc().to_i64().ok_or_else(|| overflow(to))?,
        Cell::Text(s) => {
            let t = s.trim();
            match t.parse::<i64>() {
                Ok(n) => n,
                Err(_) => match Decimal::from_str(t) {
                    Ok(d) => d.trunc().to_i64().ok_or_else(|| overflow(to))?,
                    Err(_) => 0,
                },
            }
        }
        Cell::Time(t) => {
            // datetime -> int rounds to the nearest day
            let delta = *t - base_datetime();
            let days = delta.num_days();
            if delta.num_seconds() - days * 86_400 >= 43_200 {
                days + 1
            } else {
                days
            }
        }
        _ => value.as_int(),
    };
    let (lo, hi) = to.int_range().unwrap_or((i64::MIN, i64::MAX));
    if n < lo || n > hi {
        return Err(overflow(to));
    }
    Ok(Value::integer_of(to, n))
}

fn integer_digits(d: &Decimal) -> u32 {
    let int = d.trunc().abs();
    if int.is_zero() {
        0
    } else {
        int.mantissa().to_string().len() as u32 - int.scale()
    }
}

/// Round (or truncate) to `scale` and verify the result fits `precision`.
pub fn fit_decimal(d: Decimal, precision: u8, scale: u8, truncate: bool) -> Result<Decimal> {
    let scale = scale.min(28);
    let strategy = if truncate {
        RoundingStrategy::ToZero
    } else {
        RoundingStrategy::MidpointAwayFromZero
    };
    let mut r = d.round_dp_with_strategy(scale as u32, strategy);
    if integer_digits(&r) > precision.saturating_sub(scale) as u32 {
        return Err(TsqlError::ArithmeticOverflow(format!(
            "numeric to data type numeric({precision},{scale})"
        )));
    }
    r.rescale(scale as u32);
    Ok(r)
}

fn source_decimal(value: &Value, to: DataType) -> Result<Decimal> {
    match value.cell() {
        Cell::Float(f) => Decimal::from_f64(*f).ok_or_else(|| overflow(to)),
        Cell::Text(s) => {
            let t = s.trim();
            Ok(Decimal::from_str(t)
                .or_else(|_| Decimal::from_scientific(t))
                .unwrap_or_default())
        }
        _ => Ok(value.as_decimal()),
    }
}

fn to_decimal(value: &Value, target: &TypeSpec, truncate: bool) -> Result<Value> {
    let d = source_decimal(value, target.data_type)?;
    let fitted = fit_decimal(d, target.precision, target.scale, truncate)?;
    Ok(Value::decimal_with(fitted, target.precision, target.scale.min(28)).retyped(target.data_type))
}

fn to_money(value: &Value, to: DataType) -> Result<Value> {
    let d = source_decimal(value, to)?;
    let r = d.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    let limit = if to == DataType::SmallMoney {
        Decimal::new(2_147_483_647, 4)
    } else {
        Decimal::new(i64::MAX, 4)
    };
    if r.abs() > limit {
        return Err(overflow(to));
    }
    Ok(if to == DataType::SmallMoney {
        Value::smallmoney(r)
    } else {
        Value::money(r)
    })
}

fn to_float(value: &Value, to: DataType) -> Result<Value> {
    let f = value.as_float();
    if to == DataType::Real {
        let r = f as f32;
        if f.is_finite() && !r.is_finite() {
            return Err(overflow(to));
        }
        return Ok(Value::real(r));
    }
    Ok(Value::float(f))
}

fn group_thousands(int_part: &str) -> String {
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("{sign}{out}")
}

fn money_string(d: Decimal, style: i32) -> String {
    match style {
        1 => {
            let s = d.round_dp(2);
            let mut r = s;
            r.rescale(2);
            let text = r.to_string();
            let (int_part, frac) = text.split_once('.').unwrap_or((&text, "00"));
            format!("{}.{}", group_thousands(int_part), frac)
        }
        2 | 126 => {
            let mut r = d;
            r.rescale(4);
            r.to_string()
        }
        _ => {
            let mut r = d.round_dp(2);
            r.rescale(2);
            r.to_string()
        }
    }
}

fn hex_string(bytes: &[u8], prefix: bool) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 2);
    if prefix {
        out.push_str("0x");
    }
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

pub(crate) fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let t = text.trim();
    let digits = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);
    if !digits.is_ascii() {
        return None;
    }
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    (0..padded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&padded[i..i + 2], 16).ok())
        .collect()
}

fn to_string(value: &Value, target: &TypeSpec, style: Option<i32>) -> Result<Value> {
    let from = value.data_type();
    let text = match value.cell() {
        Cell::Time(t) => format_datetime(t, from, style)?,
        Cell::Decimal(d) if matches!(from, DataType::Money | DataType::SmallMoney) => {
            money_string(*d, style.unwrap_or(0))
        }
        Cell::Float(f) => match style.unwrap_or(0) {
            1 => format!("{f:.7e}"),
            2 => format!("{f:.15e}"),
            _ => value.to_string(),
        },
        Cell::Bytes(b) => match style.unwrap_or(0) {
            1 => hex_string(b, true),
            2 => hex_string(b, false),
            _ => String::from_utf8_lossy(b).into_owned(),
        },
        _ => value.as_string(),
    };
    let text = fit_string(text, target);
    Ok(Value::string_of(target.data_type, text, target.max_len))
}

/// Truncate to the declared length; fixed-length types pad with spaces.
pub(crate) fn fit_string(text: String, target: &TypeSpec) -> String {
    let Some(n) = target.max_len else {
        return text;
    };
    let len = text.chars().count();
    if len > n {
        return text.chars().take(n).collect();
    }
    if matches!(target.data_type, DataType::Char | DataType::NChar) && len < n {
        let mut padded = text;
        padded.extend(std::iter::repeat(' ').take(n - len));
        return padded;
    }
    text
}

fn to_temporal(value: &Value, target: &TypeSpec, style: Option<i32>) -> Result<Value> {
    let to = target.data_type;
    let t = match value.cell() {
        Cell::Time(t) => *t,
        Cell::Text(s) => parse_datetime(s, style).ok_or_else(|| {
            TsqlError::conversion(value.data_type().name(), to.name(), s.clone())
        })?,
        Cell::Int(_) | Cell::Bool(_) | Cell::Decimal(_) | Cell::Float(_)
            if matches!(to, DataType::DateTime | DataType::SmallDateTime) =>
        {
            value.as_time()
        }
        _ => {
            return Err(TsqlError::Invalid(format!(
                "Explicit conversion from data type {} to {} is not allowed",
                value.data_type(),
                to
            )))
        }
    };
    let shaped = match to {
        DataType::Date => t.date().and_time(NaiveTime::MIN),
        DataType::Time => base_datetime().date().and_time(truncate_fraction(t, target.scale).time()),
        DataType::SmallDateTime => {
            let floor = t.with_second(0).and_then(|x| x.with_nanosecond(0)).unwrap_or(t);
            if t.second() >= 30 {
                floor
                    .checked_add_signed(TimeDelta::minutes(1))
                    .ok_or_else(|| overflow(to))?
            } else {
                floor
            }
        }
        DataType::DateTime => truncate_fraction(t, 3),
        _ => truncate_fraction(t, target.scale),
    };
    Ok(Value::temporal_of(to, shaped, target.scale))
}

fn truncate_fraction(t: NaiveDateTime, digits: u8) -> NaiveDateTime {
    let unit = 10u32.pow(9u32.saturating_sub(digits.min(9) as u32));
    let nanos = t.nanosecond() % 1_000_000_000;
    t.with_nanosecond(nanos - nanos % unit).unwrap_or(t)
}

fn to_binary(value: &Value, target: &TypeSpec, style: Option<i32>) -> Result<Value> {
    let integral = matches!(value.cell(), Cell::Int(_) | Cell::Bool(_));
    let mut bytes = match value.cell() {
        Cell::Text(s) => match style.unwrap_or(0) {
            1 | 2 => parse_hex(s).ok_or_else(|| {
                TsqlError::conversion(value.data_type().name(), target.data_type.name(), s.clone())
            })?,
            _ => s.as_bytes().to_vec(),
        },
        _ => value.as_bytes(),
    };
    if let Some(n) = target.max_len {
        if bytes.len() > n {
            bytes = if integral {
                bytes[bytes.len() - n..].to_vec()
            } else {
                bytes[..n].to_vec()
            };
        } else if target.data_type == DataType::Binary && bytes.len() < n {
            let pad = n - bytes.len();
            if integral {
                let mut padded = vec![0u8; pad];
                padded.extend_from_slice(&bytes);
                bytes = padded;
            } else {
                bytes.extend(std::iter::repeat(0u8).take(pad));
            }
        }
    }
    Ok(Value::binary_of(target.data_type, bytes, target.max_len))
}

fn to_uniqueidentifier(value: &Value) -> Result<Value> {
    let id = match value.cell() {
        Cell::Bytes(b) => Uuid::from_slice(b).ok(),
        _ => {
            let s = value.as_string();
            let t = s.trim().trim_start_matches('{').trim_end_matches('}');
            Uuid::parse_str(t).ok()
        }
    };
    id.map(Value::uniqueidentifier).ok_or_else(|| {
        TsqlError::conversion(
            value.data_type().name(),
            DataType::UniqueIdentifier.name(),
            value.as_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_data_type;

    fn ty(name: &str) -> TypeSpec {
        parse_data_type(name).unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn narrowing_integer_conversions_range_check() {
        assert_eq!(cast(&Value::int(255), &ty("tinyint")).unwrap().as_int(), 255);
        let err = cast(&Value::int(256), &ty("tinyint")).unwrap_err();
        assert_eq!(err.number(), 8115);
        assert!(cast(&Value::int(-1), &ty("tinyint")).is_err());
        assert!(cast(&Value::int(32768), &ty("smallint")).is_err());
        assert_eq!(
            cast(&Value::int(-32768), &ty("smallint")).unwrap().as_int(),
            -32768
        );
        assert!(cast(&Value::bigint(i64::from(i32::MAX) + 1), &ty("int")).is_err());
        assert!(cast(&Value::varchar("99999999999"), &ty("int")).is_err());
    }

    #[test]
    fn malformed_numeric_strings_degrade_to_zero() {
        let v = cast(&Value::varchar("abc"), &ty("int")).unwrap();
        assert_eq!(v, Value::int(0));
        let v = cast(&Value::varchar("12.7"), &ty("int")).unwrap();
        assert_eq!(v.as_int(), 12);
    }

    #[test]
    fn decimal_conversion_rounds_unless_truncating() {
        let src = Value::decimal(Decimal::from_str("2.345").unwrap());
        let target = ty("decimal(10,2)");
        let rounded = cast(&src, &target).unwrap();
        assert_eq!(rounded.to_string(), "2.35");
        let truncated = convert_with(
            &src,
            &target,
            ConvertOptions {
                style: None,
                truncate: true,
            },
        )
        .unwrap();
        assert_eq!(truncated.to_string(), "2.34");
        assert!(cast(&Value::int(1000), &ty("decimal(4,2)")).is_err());
        assert_eq!(
            cast(&Value::int(5), &ty("numeric(5,1)")).unwrap().data_type(),
            DataType::Numeric
        );
    }

    #[test]
    fn date_styles_format() {
        let v = Value::datetime(dt("2023-07-04 13:05:09.123"));
        let s = |style| {
            convert(&v, &ty("varchar(40)"), Some(style))
                .unwrap()
                .as_string()
        };
        assert_eq!(s(101), "07/04/2023");
        assert_eq!(s(1), "07/04/23");
        assert_eq!(s(103), "04/07/2023");
        assert_eq!(s(112), "20230704");
        assert_eq!(s(120), "2023-07-04 13:05:09");
        assert_eq!(s(121), "2023-07-04 13:05:09.123");
        assert_eq!(s(126), "2023-07-04T13:05:09.123");
        assert_eq!(s(127), "2023-07-04T13:05:09.123Z");
        assert_eq!(s(108), "13:05:09");
        assert_eq!(s(100), "Jul  4 2023  1:05PM");
        assert!(convert(&v, &ty("varchar(40)"), Some(999)).is_err());
    }

    #[test]
    fn style_120_round_trips_to_the_second() {
        let samples = [
            "2023-07-04 13:05:09.999",
            "1999-12-31 23:59:59",
            "2000-02-29 00:00:00",
            "1900-01-01 12:00:01.5",
        ];
        for s in samples {
            let original = Value::datetime(dt(s));
            let text = convert(&original, &ty("varchar(30)"), Some(120)).unwrap();
            let back = convert(&text, &ty("datetime"), Some(120)).unwrap();
            assert_eq!(
                back.as_time(),
                original.as_time().with_nanosecond(0).unwrap(),
                "{s}"
            );
        }
    }

    #[test]
    fn unstyled_parse_tries_common_formats() {
        let target = ty("datetime");
        for s in ["2023-01-02", "2023-01-02 03:04:05", "20230102", "01/02/2023", "2023-01-02T03:04:05.5"] {
            let v = cast(&Value::varchar(s), &target).unwrap();
            assert_eq!(v.as_time().date(), NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), "{s}");
        }
        let err = cast(&Value::varchar("not a date"), &target).unwrap_err();
        assert_eq!(err.number(), 245);
        assert!(try_convert(&Value::varchar("not a date"), &target, None).is_null());
    }

    #[test]
    fn style_parse_uses_template() {
        let v = convert(&Value::varchar("04/07/2023"), &ty("date"), Some(103)).unwrap();
        assert_eq!(v.as_time().date(), NaiveDate::from_ymd_opt(2023, 7, 4).unwrap());
        let v = convert(&Value::varchar("04/07/2023"), &ty("date"), Some(101)).unwrap();
        assert_eq!(v.as_time().date(), NaiveDate::from_ymd_opt(2023, 4, 7).unwrap());
    }

    #[test]
    fn binary_from_integer_is_big_endian() {
        let v = cast(&Value::int(1), &ty("varbinary(max)")).unwrap();
        assert_eq!(v.as_bytes(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
        let v = cast(&Value::int(0x0102), &ty("binary(2)")).unwrap();
        assert_eq!(v.as_bytes(), vec![1, 2]);
        let v = cast(&Value::int(7), &ty("binary(10)")).unwrap();
        assert_eq!(v.as_bytes().len(), 10);
        assert_eq!(v.as_bytes()[9], 7);
        let v = convert(&Value::varchar("0x0A0B"), &ty("varbinary(10)"), Some(1)).unwrap();
        assert_eq!(v.as_bytes(), vec![0x0A, 0x0B]);
        let text = convert(&v, &ty("varchar(10)"), Some(1)).unwrap();
        assert_eq!(text.as_string(), "0x0A0B");
    }

    #[test]
    fn strings_fit_declared_length() {
        assert_eq!(cast(&Value::varchar("hello"), &ty("varchar(3)")).unwrap().as_string(), "hel");
        assert_eq!(cast(&Value::varchar("ab"), &ty("char(4)")).unwrap().as_string(), "ab  ");
        assert_eq!(
            convert(&Value::money(Decimal::new(12345678, 2)), &ty("varchar(20)"), Some(1))
                .unwrap()
                .as_string(),
            "123,456.78"
        );
    }

    #[test]
    fn nulls_convert_to_typed_nulls() {
        let v = cast(&Value::null(DataType::Int), &ty("nvarchar(10)")).unwrap();
        assert!(v.is_null());
        assert_eq!(v.data_type(), DataType::NVarChar);
        assert_eq!(v.max_len(), Some(10));
    }

    #[test]
    fn uniqueidentifier_parses_braced_text() {
        let v = cast(
            &Value::varchar("{6F9619FF-8B86-D011-B42D-00C04FC964FF}"),
            &ty("uniqueidentifier"),
        )
        .unwrap();
        assert_eq!(v.as_string(), "6F9619FF-8B86-D011-B42D-00C04FC964FF");
        assert!(cast(&Value::varchar("zzz"), &ty("uniqueidentifier")).is_err());
    }
}
