use super::{any_null, text_like, text_type_of, FunctionRegistry};
use crate::context::ExecutionContext;
use crate::error::{Result, TsqlError};
use crate::types::DataType;
use crate::value::{Cell, Value};
use chrono::{Datelike, NaiveDateTime, Timelike};
use rust_decimal::{Decimal, RoundingStrategy};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("LEN", 1, Some(1), len);
    registry.register("DATALENGTH", 1, Some(1), datalength);
    registry.register("LEFT", 2, Some(2), left);
    registry.register("RIGHT", 2, Some(2), right);
    registry.register("SUBSTRING", 3, Some(3), substring);
    registry.register("UPPER", 1, Some(1), upper);
    registry.register("LOWER", 1, Some(1), lower);
    registry.register("LTRIM", 1, Some(2), ltrim);
    registry.register("RTRIM", 1, Some(2), rtrim);
    registry.register("TRIM", 1, Some(2), trim);
    registry.register("REPLACE", 3, Some(3), replace);
    registry.register("REPLICATE", 2, Some(2), replicate);
    registry.register("REVERSE", 1, Some(1), reverse);
    registry.register("CHARINDEX", 2, Some(3), charindex);
    registry.register("PATINDEX", 2, Some(2), patindex);
    registry.register("STUFF", 4, Some(4), stuff);
    registry.register("SPACE", 1, Some(1), space);
    registry.register("CONCAT", 2, None, concat);
    registry.register("CONCAT_WS", 3, None, concat_ws);
    registry.register("ASCII", 1, Some(1), ascii);
    registry.register("UNICODE", 1, Some(1), unicode);
    registry.register("CHAR", 1, Some(1), char_fn);
    registry.register("NCHAR", 1, Some(1), nchar);
    registry.register("QUOTENAME", 1, Some(2), quotename);
    registry.register("STRING_ESCAPE", 2, Some(2), string_escape);
    registry.register("FORMAT", 2, Some(3), format);
    registry.register("STR", 1, Some(3), str_fn);
    registry.register("SOUNDEX", 1, Some(1), soundex_fn);
    registry.register("DIFFERENCE", 2, Some(2), difference);
    registry.register("TRANSLATE", 3, Some(3), translate);
}

fn chars(v: &Value) -> Vec<char> {
    v.as_string().chars().collect()
}

fn invalid_length(func: &str) -> TsqlError {
    TsqlError::Raised {
        number: 536,
        message: format!("Invalid length parameter passed to the {func} function."),
        severity: 16,
        state: 1,
    }
}

/// Characters in `s` from 1-based `start` for `len` characters; a start before 1 eats
/// into the length, as SUBSTRING does.
fn char_slice(s: &[char], start: i64, len: i64) -> String {
    let end = start.saturating_add(len);
    let from = start.max(1);
    if end <= from {
        return String::new();
    }
    let from = (from - 1) as usize;
    let to = ((end - 1) as usize).min(s.len());
    if from >= to {
        return String::new();
    }
    s[from..to].iter().collect()
}

fn len(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    if v.is_null() {
        return Ok(Value::null(DataType::Int));
    }
    if v.data_type().is_binary() {
        return Ok(Value::int(v.as_bytes().len() as i32));
    }
    let n = v.as_string().trim_end_matches(' ').chars().count();
    Ok(Value::int(n as i32))
}

fn datalength(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    if v.is_null() {
        return Ok(Value::null(DataType::Int));
    }
    let ty = v.data_type();
    let n = match v.cell() {
        Cell::Text(s) if ty.is_unicode() => s.encode_utf16().count() * 2,
        Cell::Text(_) if ty == DataType::UniqueIdentifier => 16,
        Cell::Text(s) => s.len(),
        Cell::Bytes(b) => b.len(),
        _ => match ty {
            DataType::Bit | DataType::TinyInt => 1,
            DataType::SmallInt => 2,
            DataType::Int | DataType::Real | DataType::SmallMoney | DataType::SmallDateTime => 4,
            DataType::Date => 3,
            DataType::Time => 5,
            DataType::DateTimeOffset => 10,
            DataType::Decimal | DataType::Numeric => match v.precision() {
                0..=9 => 5,
                10..=19 => 9,
                20..=28 => 13,
                _ => 17,
            },
            _ => 8,
        },
    };
    Ok(Value::int(n as i32))
}

fn left(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    let n = args[1].as_int();
    if n < 0 {
        return Err(invalid_length("left"));
    }
    let s: String = args[0].as_string().chars().take(n as usize).collect();
    Ok(text_like(&args[0], s))
}

fn right(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    let n = args[1].as_int();
    if n < 0 {
        return Err(invalid_length("right"));
    }
    let c = chars(&args[0]);
    let skip = c.len().saturating_sub(n as usize);
    Ok(text_like(&args[0], c[skip..].iter().collect()))
}

fn substring(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let src = &args[0];
    if any_null(args) {
        return Ok(Value::null(src.data_type()));
    }
    let (start, len) = (args[1].as_int(), args[2].as_int());
    if len < 0 {
        return Err(invalid_length("substring"));
    }
    if src.data_type().is_binary() {
        let bytes = src.as_bytes();
        let end = start.saturating_add(len);
        let from = (start.max(1) - 1) as usize;
        let to = ((end - 1).max(0) as usize).min(bytes.len());
        let out = if from < to { bytes[from..to].to_vec() } else { Vec::new() };
        return Ok(Value::varbinary(out));
    }
    Ok(text_like(src, char_slice(&chars(src), start, len)))
}

fn upper(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    Ok(text_like(&args[0], args[0].as_string().to_uppercase()))
}

fn lower(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    Ok(text_like(&args[0], args[0].as_string().to_lowercase()))
}

fn trim_set(args: &[Value]) -> Vec<char> {
    match args.get(1) {
        Some(v) => v.as_string().chars().collect(),
        None => vec![' '],
    }
}

fn ltrim(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    let set = trim_set(args);
    let s = args[0].as_string();
    Ok(text_like(&args[0], s.trim_start_matches(|c: char| set.contains(&c)).to_string()))
}

fn rtrim(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    let set = trim_set(args);
    let s = args[0].as_string();
    Ok(text_like(&args[0], s.trim_end_matches(|c: char| set.contains(&c)).to_string()))
}

/// `TRIM(s)` or `TRIM(s, characters)`.
fn trim(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    let set = trim_set(args);
    let s = args[0].as_string();
    Ok(text_like(&args[0], s.trim_matches(|c: char| set.contains(&c)).to_string()))
}

fn replace(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    let (s, find, with) = (args[0].as_string(), args[1].as_string(), args[2].as_string());
    if find.is_empty() {
        return Ok(text_like(&args[0], s));
    }
    Ok(text_like(&args[0], s.replace(&find, &with)))
}

fn replicate(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let n = args[1].as_int();
    if any_null(args) || n < 0 {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    let ty = text_type_of(&args[0]);
    Ok(text_like(&args[0], repeat_capped(&args[0].as_string(), n as usize, ty)))
}

/// Repeat `unit` up to the non-max string limit: 8000 varchar bytes or 4000 nvarchar characters.
fn repeat_capped(unit: &str, times: usize, ty: DataType) -> String {
    let limit = if ty.is_unicode() { 4000 } else { 8000 };
    let width = unit.chars().count();
    if width == 0 {
        return String::new();
    }
    let times = times.min(limit / width + 1);
    unit.repeat(times).chars().take(limit).collect()
}

fn reverse(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    Ok(text_like(&args[0], args[0].as_string().chars().rev().collect()))
}

/// 1-based character position of `needle` in `hay` at or after `start`, 0 when absent.
fn find_from(hay: &[char], needle: &[char], start: usize) -> i64 {
    if needle.is_empty() || needle.len() > hay.len() {
        return 0;
    }
    let from = start.saturating_sub(1);
    (from..=hay.len() - needle.len())
        .find(|&i| hay[i..i + needle.len()] == *needle)
        .map(|i| i as i64 + 1)
        .unwrap_or(0)
}

fn charindex(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::null(DataType::Int));
    }
    let start = args.get(2).map(|v| v.as_int().max(1) as usize).unwrap_or(1);
    let pos = find_from(&chars(&args[1]), &chars(&args[0]), start);
    Ok(Value::int(pos as i32))
}

/// Wildcard markers are stripped and the remainder located as a plain substring.
fn patindex(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::Int));
    }
    let needle: Vec<char> = args[0]
        .as_string()
        .chars()
        .filter(|c| *c != '%' && *c != '_')
        .collect();
    let hay = chars(&args[1]);
    if needle.is_empty() {
        return Ok(Value::int(if hay.is_empty() { 0 } else { 1 }));
    }
    Ok(Value::int(find_from(&hay, &needle, 1) as i32))
}

fn stuff(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let src = &args[0];
    if src.is_null() || args[1].is_null() || args[2].is_null() {
        return Ok(Value::null(text_type_of(src)));
    }
    let c = chars(src);
    let (start, len) = (args[1].as_int(), args[2].as_int());
    if start < 1 || start as usize > c.len() || len < 0 {
        return Ok(Value::null(text_type_of(src)));
    }
    let from = start as usize - 1;
    let to = (from + len as usize).min(c.len());
    let mut out: String = c[..from].iter().collect();
    out.push_str(&args[3].as_string());
    out.extend(&c[to..]);
    Ok(text_like(src, out))
}

fn space(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let n = args[0].as_int();
    if args[0].is_null() || n < 0 {
        return Ok(Value::null(DataType::VarChar));
    }
    Ok(Value::varchar(repeat_capped(" ", n as usize, DataType::VarChar)))
}

fn concat_type(args: &[Value]) -> DataType {
    if args.iter().any(|a| a.data_type().is_unicode()) {
        DataType::NVarChar
    } else {
        DataType::VarChar
    }
}

/// NULL arguments contribute nothing.
fn concat(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let s: String = args.iter().map(Value::as_string).collect();
    Ok(Value::string_of(concat_type(args), s, None))
}

fn concat_ws(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(concat_type(args)));
    }
    let sep = args[0].as_string();
    let parts: Vec<String> = args[1..]
        .iter()
        .filter(|a| !a.is_null())
        .map(Value::as_string)
        .collect();
    Ok(Value::string_of(concat_type(args), parts.join(&sep), None))
}

fn ascii(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    match args[0].as_string().chars().next() {
        Some(c) if !args[0].is_null() => Ok(Value::int((c as u32 & 0xFF) as i32)),
        _ => Ok(Value::null(DataType::Int)),
    }
}

fn unicode(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    match args[0].as_string().chars().next() {
        Some(c) if !args[0].is_null() => Ok(Value::int(c as i32)),
        _ => Ok(Value::null(DataType::Int)),
    }
}

fn char_fn(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let n = args[0].as_int();
    if args[0].is_null() || !(0..=255).contains(&n) {
        return Ok(Value::null(DataType::Char));
    }
    let c = char::from(n as u8);
    Ok(Value::string_of(DataType::Char, c.to_string(), Some(1)))
}

fn nchar(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let n = args[0].as_int();
    match u32::try_from(n).ok().and_then(char::from_u32) {
        Some(c) if !args[0].is_null() => Ok(Value::string_of(DataType::NChar, c.to_string(), Some(1))),
        _ => Ok(Value::null(DataType::NChar)),
    }
}

fn quotename(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::NVarChar));
    }
    let s = args[0].as_string();
    if s.chars().count() > 128 {
        return Ok(Value::null(DataType::NVarChar));
    }
    let quote = args
        .get(1)
        .map(|q| q.as_string())
        .unwrap_or_else(|| "[".into());
    let (open, close) = match quote.as_str() {
        "[" | "]" => ('[', ']'),
        "'" => ('\'', '\''),
        "\"" => ('"', '"'),
        "(" | ")" => ('(', ')'),
        "<" | ">" => ('<', '>'),
        "{" | "}" => ('{', '}'),
        "`" => ('`', '`'),
        _ => return Ok(Value::null(DataType::NVarChar)),
    };
    let escaped = s.replace(close, &format!("{close}{close}"));
    Ok(Value::nvarchar(format!("{open}{escaped}{close}")))
}

fn string_escape(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let kind = args[1].as_string();
    if !kind.eq_ignore_ascii_case("json") {
        return Err(TsqlError::Invalid(format!(
            "'{kind}' is not a valid STRING_ESCAPE type"
        )));
    }
    if args[0].is_null() {
        return Ok(Value::null(DataType::NVarChar));
    }
    let quoted = serde_json::to_string(&args[0].as_string())
        .map_err(|e| TsqlError::Invalid(e.to_string()))?;
    // strip the surrounding quotes; JSON escaping of '/' is added to match the server
    let inner = &quoted[1..quoted.len() - 1];
    Ok(Value::nvarchar(inner.replace('/', "\\/")))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn fixed(d: Decimal, places: u32, grouped: bool) -> String {
    let r = d.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.*}", places as usize, r.abs());
    let (int, frac) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text.clone(), None),
    };
    let int = if grouped { group_thousands(&int) } else { int };
    let sign = if r.is_sign_negative() && !r.is_zero() { "-" } else { "" };
    match frac {
        Some(f) => format!("{sign}{int}.{f}"),
        None => format!("{sign}{int}"),
    }
}

fn format_number(v: &Value, pattern: &str) -> Result<Option<String>> {
    let d = v.as_decimal();
    let mut chars = pattern.chars();
    let Some(spec) = chars.next() else {
        return Ok(None);
    };
    let digits: Option<u32> = chars.as_str().parse().ok();
    let standard = spec.is_ascii_alphabetic()
        && pattern.len() <= 3
        && chars.as_str().chars().all(|c| c.is_ascii_digit());
    if standard {
        return Ok(match spec.to_ascii_uppercase() {
            'N' => Some(fixed(d, digits.unwrap_or(2), true)),
            'F' => Some(fixed(d, digits.unwrap_or(2), false)),
            'C' => {
                let body = fixed(d.abs(), digits.unwrap_or(2), true);
                Some(if d.is_sign_negative() { format!("-${body}") } else { format!("${body}") })
            }
            'P' => {
                let percent = d
                    .checked_mul(Decimal::ONE_HUNDRED)
                    .ok_or_else(|| TsqlError::ArithmeticOverflow("expression to data type nvarchar".into()))?;
                Some(format!("{} %", fixed(percent, digits.unwrap_or(2), true)))
            }
            'D' => {
                let n = v.as_int();
                let width = digits.unwrap_or(0) as usize;
                let body = format!("{:0width$}", n.unsigned_abs());
                Some(if n < 0 { format!("-{body}") } else { body })
            }
            'X' => {
                let width = digits.unwrap_or(0) as usize;
                let hex = format!("{:0width$X}", v.as_int());
                Some(if spec == 'x' { hex.to_lowercase() } else { hex })
            }
            'E' => Some(format!("{:.*E}", digits.unwrap_or(6) as usize, v.as_float())),
            'G' => Some(v.as_string()),
            _ => None,
        });
    }
    // Custom pattern such as "#,##0.00" or "000.0".
    if !pattern.chars().all(|c| matches!(c, '#' | '0' | ',' | '.')) {
        return Ok(None);
    }
    let (int_pat, frac_pat) = pattern.split_once('.').unwrap_or((pattern, ""));
    let places = frac_pat.chars().filter(|c| *c == '0' || *c == '#').count() as u32;
    let min_int = int_pat.chars().filter(|c| *c == '0').count();
    let body = fixed(d.abs(), places, false);
    let (int, frac) = body.split_once('.').unwrap_or((&body, ""));
    let mut int = format!("{int:0>min_int$}");
    if min_int == 0 && int == "0" {
        int.clear();
    }
    if int_pat.contains(',') {
        int = group_thousands(&int);
    }
    let sign = if d.is_sign_negative() && !d.round_dp(places).is_zero() { "-" } else { "" };
    Ok(Some(if frac.is_empty() { format!("{sign}{int}") } else { format!("{sign}{int}.{frac}") }))
}

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];
const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

pub(super) fn month_name(month: u32) -> &'static str {
    MONTHS[(month.clamp(1, 12) - 1) as usize]
}

pub(super) fn weekday_name(t: &NaiveDateTime) -> &'static str {
    WEEKDAYS[t.weekday().num_days_from_monday() as usize]
}

/// .NET-style custom date format tokens.
fn format_date(t: &NaiveDateTime, pattern: &str) -> String {
    let standard = match pattern {
        "d" => Some("M/d/yyyy"),
        "D" => Some("dddd, MMMM d, yyyy"),
        "t" => Some("h:mm tt"),
        "T" => Some("h:mm:ss tt"),
        "g" => Some("M/d/yyyy h:mm tt"),
        "G" => Some("M/d/yyyy h:mm:ss tt"),
        "s" => Some("yyyy-MM-ddTHH:mm:ss"),
        "o" | "O" => Some("yyyy-MM-ddTHH:mm:ss.fffffff"),
        _ => None,
    };
    let pattern: Vec<char> = standard.unwrap_or(pattern).chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < pattern.len() {
        let c = pattern[i];
        let mut run = 1;
        while i + run < pattern.len() && pattern[i + run] == c {
            run += 1;
        }
        let hour12 = match t.hour() % 12 {
            0 => 12,
            h => h,
        };
        match c {
            'y' if run >= 3 => out.push_str(&format!("{:0run$}", t.year())),
            'y' => out.push_str(&format!("{:02}", t.year() % 100)),
            'M' => match run {
                1 => out.push_str(&t.month().to_string()),
                2 => out.push_str(&format!("{:02}", t.month())),
                3 => out.push_str(&month_name(t.month())[..3]),
                _ => out.push_str(month_name(t.month())),
            },
            'd' => match run {
                1 => out.push_str(&t.day().to_string()),
                2 => out.push_str(&format!("{:02}", t.day())),
                3 => out.push_str(&weekday_name(t)[..3]),
                _ => out.push_str(weekday_name(t)),
            },
            'H' if run == 1 => out.push_str(&t.hour().to_string()),
            'H' => out.push_str(&format!("{:02}", t.hour())),
            'h' if run == 1 => out.push_str(&hour12.to_string()),
            'h' => out.push_str(&format!("{hour12:02}")),
            'm' if run == 1 => out.push_str(&t.minute().to_string()),
            'm' => out.push_str(&format!("{:02}", t.minute())),
            's' if run == 1 => out.push_str(&t.second().to_string()),
            's' => out.push_str(&format!("{:02}", t.second())),
            'f' | 'F' => {
                let nanos = format!("{:09}", t.nanosecond() % 1_000_000_000);
                out.push_str(&nanos[..run.min(9)]);
            }
            't' => {
                let ampm = if t.hour() < 12 { "AM" } else { "PM" };
                out.push_str(if run == 1 { &ampm[..1] } else { ampm });
            }
            '\\' if i + 1 < pattern.len() => {
                out.push(pattern[i + 1]);
                i += 2;
                continue;
            }
            other => {
                for _ in 0..run {
                    out.push(other);
                }
            }
        }
        i += run;
    }
    out
}

/// `FORMAT(value, pattern[, culture])`; only the invariant/en-US culture is modelled.
fn format(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::null(DataType::NVarChar));
    }
    let pattern = args[1].as_string();
    let v = &args[0];
    let out = if v.data_type().is_datetime() {
        Some(format_date(&v.as_time(), &pattern))
    } else if v.data_type().is_numeric() {
        format_number(v, &pattern)?
    } else {
        None
    };
    Ok(match out {
        Some(s) => Value::nvarchar(s),
        None => Value::null(DataType::NVarChar),
    })
}

/// `STR(number[, length[, decimals]])`: right-justified, `*` filled on overflow.
fn str_fn(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::VarChar));
    }
    let length = args.get(1).map(|v| v.as_int()).unwrap_or(10);
    let decimals = args.get(2).map(|v| v.as_int()).unwrap_or(0).clamp(0, 16);
    if length <= 0 {
        return Ok(Value::null(DataType::VarChar));
    }
    let length = length as usize;
    let d = args[0].as_decimal();
    let mut body = fixed(d, decimals as u32, false);
    if body.len() > length {
        // Drop decimals before giving up.
        let int_only = fixed(d, 0, false);
        if int_only.len() > length {
            return Ok(Value::varchar("*".repeat(length)));
        }
        let room = length.saturating_sub(int_only.len() + 1) as u32;
        body = if room == 0 { int_only } else { fixed(d, room, false) };
    }
    Ok(Value::varchar(format!("{body:>length$}")))
}

pub(crate) fn soundex(s: &str) -> String {
    fn code(c: char) -> Option<char> {
        match c.to_ascii_uppercase() {
            'B' | 'F' | 'P' | 'V' => Some('1'),
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
            'D' | 'T' => Some('3'),
            'L' => Some('4'),
            'M' | 'N' => Some('5'),
            'R' => Some('6'),
            _ => None,
        }
    }
    let letters: Vec<char> = s
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let Some(&first) = letters.first() else {
        return String::new();
    };
    let mut out = String::with_capacity(4);
    out.push(first.to_ascii_uppercase());
    let mut last = code(first);
    for &c in &letters[1..] {
        let upper = c.to_ascii_uppercase();
        let cur = code(c);
        if cur.is_some() && cur != last {
            if let Some(d) = cur {
                out.push(d);
            }
            if out.len() == 4 {
                break;
            }
        }
        // H and W do not separate letters with the same code
        if upper != 'H' && upper != 'W' {
            last = cur;
        }
    }
    while out.len() < 4 {
        out.push('0');
    }
    out
}

fn soundex_fn(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(DataType::VarChar));
    }
    let code = soundex(&args[0].as_string());
    let code = if code.is_empty() { "0000".to_string() } else { code };
    Ok(Value::string_of(DataType::VarChar, code, Some(4)))
}

fn difference(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::Int));
    }
    let a = soundex(&args[0].as_string());
    let b = soundex(&args[1].as_string());
    let same = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
    Ok(Value::int(same as i32))
}

fn translate(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(text_type_of(&args[0])));
    }
    let from = chars(&args[1]);
    let to = chars(&args[2]);
    if from.len() != to.len() {
        return Err(TsqlError::Invalid(
            "The second and third arguments of the TRANSLATE built-in function must contain an equal number of characters".into(),
        ));
    }
    let out: String = args[0]
        .as_string()
        .chars()
        .map(|c| match from.iter().position(|f| *f == c) {
            Some(i) => to[i],
            None => c,
        })
        .collect();
    Ok(text_like(&args[0], out))
}
