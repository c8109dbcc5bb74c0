use super::string::{month_name, weekday_name};
use super::{any_null, FunctionRegistry};
use crate::context::ExecutionContext;
use crate::convert;
use crate::error::{Result, TsqlError};
use crate::types::{DataType, TypeSpec};
use crate::value::{day_number, Value};
use chrono::{Datelike, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("GETDATE", 0, Some(0), getdate);
    registry.register("CURRENT_TIMESTAMP", 0, Some(0), getdate);
    registry.register("GETUTCDATE", 0, Some(0), getutcdate);
    registry.register("SYSDATETIME", 0, Some(0), sysdatetime);
    registry.register("SYSUTCDATETIME", 0, Some(0), sysutcdatetime);
    registry.register("SYSDATETIMEOFFSET", 0, Some(0), sysdatetimeoffset);
    registry.register("DATEADD", 3, Some(3), dateadd);
    registry.register("DATEDIFF", 3, Some(3), datediff);
    registry.register("DATEDIFF_BIG", 3, Some(3), datediff_big);
    registry.register("DATEPART", 2, Some(2), datepart);
    registry.register("DATENAME", 2, Some(2), datename);
    registry.register("YEAR", 1, Some(1), year);
    registry.register("MONTH", 1, Some(1), month);
    registry.register("DAY", 1, Some(1), day);
    registry.register("EOMONTH", 1, Some(2), eomonth);
    registry.register("DATEFROMPARTS", 3, Some(3), datefromparts);
    registry.register("DATETIMEFROMPARTS", 7, Some(7), datetimefromparts);
    registry.register("DATETIME2FROMPARTS", 8, Some(8), datetime2fromparts);
    registry.register("SMALLDATETIMEFROMPARTS", 5, Some(5), smalldatetimefromparts);
    registry.register("TIMEFROMPARTS", 5, Some(5), timefromparts);
    registry.register("ISDATE", 1, Some(1), isdate);
}

/// Interval keyword accepted by DATEADD, DATEDIFF, DATEPART and DATENAME.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Quarter,
    Month,
    DayOfYear,
    Day,
    Week,
    Weekday,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
    TzOffset,
    IsoWeek,
}

impl DatePart {
    pub fn parse(text: &str) -> Result<DatePart> {
        let t = text.trim().trim_matches(|c| c == '\'' || c == '[' || c == ']');
        let part = match t.to_ascii_lowercase().as_str() {
            "year" | "yy" | "yyyy" => DatePart::Year,
            "quarter" | "qq" | "q" => DatePart::Quarter,
            "month" | "mm" | "m" => DatePart::Month,
            "dayofyear" | "dy" | "y" => DatePart::DayOfYear,
            "day" | "dd" | "d" => DatePart::Day,
            "week" | "wk" | "ww" => DatePart::Week,
            "weekday" | "dw" | "w" => DatePart::Weekday,
            "hour" | "hh" => DatePart::Hour,
            "minute" | "mi" | "n" => DatePart::Minute,
            "second" | "ss" | "s" => DatePart::Second,
            "millisecond" | "ms" => DatePart::Millisecond,
            "microsecond" | "mcs" => DatePart::Microsecond,
            "nanosecond" | "ns" => DatePart::Nanosecond,
            "tzoffset" | "tz" => DatePart::TzOffset,
            "iso_week" | "isowk" | "isoww" => DatePart::IsoWeek,
            _ => {
                return Err(TsqlError::Invalid(format!(
                    "'{t}' is not a recognized datepart option"
                )))
            }
        };
        Ok(part)
    }

    pub fn name(self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Quarter => "quarter",
            DatePart::Month => "month",
            DatePart::DayOfYear => "dayofyear",
            DatePart::Day => "day",
            DatePart::Week => "week",
            DatePart::Weekday => "weekday",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
            DatePart::Millisecond => "millisecond",
            DatePart::Microsecond => "microsecond",
            DatePart::Nanosecond => "nanosecond",
            DatePart::TzOffset => "tzoffset",
            DatePart::IsoWeek => "iso_week",
        }
    }

    fn is_time_part(self) -> bool {
        matches!(
            self,
            DatePart::Hour
                | DatePart::Minute
                | DatePart::Second
                | DatePart::Millisecond
                | DatePart::Microsecond
                | DatePart::Nanosecond
        )
    }
}

fn unsupported_part(part: DatePart, func: &str, ty: DataType) -> TsqlError {
    TsqlError::Raised {
        number: 9810,
        message: format!(
            "The datepart {} is not supported by date function {func} for data type {ty}.",
            part.name()
        ),
        severity: 16,
        state: 1,
    }
}

/// Coerce a date argument; strings and numbers become datetime.
fn temporal_arg(v: &Value) -> Result<(NaiveDateTime, DataType)> {
    let ty = v.data_type();
    if ty.is_datetime() {
        return Ok((v.as_time(), ty));
    }
    let dt = convert::cast(v, &TypeSpec::new(DataType::DateTime))?;
    Ok((dt.as_time(), DataType::DateTime))
}

fn truncate_to_millis(t: NaiveDateTime) -> NaiveDateTime {
    let ms = t.nanosecond() % 1_000_000_000 / 1_000_000;
    t.with_nanosecond(ms * 1_000_000).unwrap_or(t)
}

fn getdate(_: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::datetime(truncate_to_millis(Local::now().naive_local())))
}

fn getutcdate(_: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::datetime(truncate_to_millis(Utc::now().naive_utc())))
}

fn sysdatetime(_: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::datetime2(Local::now().naive_local()))
}

fn sysutcdatetime(_: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::datetime2(Utc::now().naive_utc()))
}

fn sysdatetimeoffset(_: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::temporal_of(DataType::DateTimeOffset, Local::now().naive_local(), 7))
}

fn add_months(t: NaiveDateTime, n: i64) -> Option<NaiveDateTime> {
    let months = Months::new(u32::try_from(n.unsigned_abs()).ok()?);
    if n >= 0 {
        t.checked_add_months(months)
    } else {
        t.checked_sub_months(months)
    }
}

pub(crate) fn add_part(t: NaiveDateTime, part: DatePart, n: i64) -> Option<NaiveDateTime> {
    let delta = match part {
        DatePart::Year => return add_months(t, n.checked_mul(12)?),
        DatePart::Quarter => return add_months(t, n.checked_mul(3)?),
        DatePart::Month => return add_months(t, n),
        DatePart::DayOfYear | DatePart::Day | DatePart::Weekday => TimeDelta::try_days(n)?,
        DatePart::Week | DatePart::IsoWeek => TimeDelta::try_weeks(n)?,
        DatePart::Hour => TimeDelta::try_hours(n)?,
        DatePart::Minute => TimeDelta::try_minutes(n)?,
        DatePart::Second => TimeDelta::try_seconds(n)?,
        DatePart::Millisecond => TimeDelta::try_milliseconds(n)?,
        DatePart::Microsecond => TimeDelta::microseconds(n),
        DatePart::Nanosecond => TimeDelta::nanoseconds(n),
        DatePart::TzOffset => return None,
    };
    t.checked_add_signed(delta)
}

fn valid_year(t: &NaiveDateTime) -> bool {
    (1..=9999).contains(&t.year())
}

fn dateadd(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let part = DatePart::parse(&args[0].as_string())?;
    if args[1].is_null() || args[2].is_null() {
        let ty = if args[2].data_type().is_datetime() { args[2].data_type() } else { DataType::DateTime };
        return Ok(Value::null(ty));
    }
    let (t, ty) = temporal_arg(&args[2])?;
    if (ty == DataType::Date && part.is_time_part()) || part == DatePart::TzOffset {
        return Err(unsupported_part(part, "dateadd", ty));
    }
    if ty == DataType::Time && !part.is_time_part() {
        return Err(unsupported_part(part, "dateadd", ty));
    }
    let n = args[1].as_int();
    let overflow = || TsqlError::Raised {
        number: 517,
        message: format!("Adding a value to a '{ty}' column caused an overflow."),
        severity: 16,
        state: 1,
    };
    let shifted = add_part(t, part, n).filter(valid_year).ok_or_else(overflow)?;
    let shifted = match ty {
        // time wraps around midnight
        DataType::Time => crate::value::base_datetime().date().and_time(shifted.time()),
        DataType::DateTime => truncate_to_millis(shifted),
        _ => shifted,
    };
    let scale = if args[2].data_type().is_datetime() { args[2].scale() } else { ty.default_scale() };
    Ok(Value::temporal_of(ty, shifted, scale))
}

/// Number of `part` boundaries crossed between `a` and `b`.
pub(crate) fn diff_part(part: DatePart, a: &NaiveDateTime, b: &NaiveDateTime) -> Result<i128> {
    let ticks = |t: &NaiveDateTime, per_second: i128| -> i128 {
        let ts = t.and_utc().timestamp() as i128;
        let sub = (t.nanosecond() % 1_000_000_000) as i128;
        ts * per_second + sub * per_second / 1_000_000_000
    };
    let n = match part {
        DatePart::Year => (b.year() - a.year()) as i128,
        DatePart::Quarter => {
            let q = |t: &NaiveDateTime| t.year() as i128 * 4 + (t.month0() / 3) as i128;
            q(b) - q(a)
        }
        DatePart::Month => {
            let m = |t: &NaiveDateTime| t.year() as i128 * 12 + t.month0() as i128;
            m(b) - m(a)
        }
        DatePart::DayOfYear | DatePart::Day | DatePart::Weekday => (day_number(b) - day_number(a)) as i128,
        DatePart::Week => {
            // weeks always start on Sunday here, whatever DATEFIRST says
            let sunday = |t: &NaiveDateTime| day_number(t) - t.weekday().num_days_from_sunday() as i64;
            ((sunday(b) - sunday(a)) / 7) as i128
        }
        DatePart::IsoWeek => {
            let monday = |t: &NaiveDateTime| day_number(t) - t.weekday().num_days_from_monday() as i64;
            ((monday(b) - monday(a)) / 7) as i128
        }
        DatePart::Hour => ticks(b, 1).div_euclid(3600) - ticks(a, 1).div_euclid(3600),
        DatePart::Minute => ticks(b, 1).div_euclid(60) - ticks(a, 1).div_euclid(60),
        DatePart::Second => ticks(b, 1) - ticks(a, 1),
        DatePart::Millisecond => ticks(b, 1_000) - ticks(a, 1_000),
        DatePart::Microsecond => ticks(b, 1_000_000) - ticks(a, 1_000_000),
        DatePart::Nanosecond => ticks(b, 1_000_000_000) - ticks(a, 1_000_000_000),
        DatePart::TzOffset => return Err(unsupported_part(part, "datediff", DataType::DateTime)),
    };
    Ok(n)
}

fn diff_args(args: &[Value]) -> Result<Option<(DatePart, NaiveDateTime, NaiveDateTime)>> {
    let part = DatePart::parse(&args[0].as_string())?;
    if args[1].is_null() || args[2].is_null() {
        return Ok(None);
    }
    let (a, _) = temporal_arg(&args[1])?;
    let (b, _) = temporal_arg(&args[2])?;
    Ok(Some((part, a, b)))
}

fn datediff(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let Some((part, a, b)) = diff_args(args)? else {
        return Ok(Value::null(DataType::Int));
    };
    let n = diff_part(part, &a, &b)?;
    let n = i32::try_from(n).map_err(|_| TsqlError::Raised {
        number: 535,
        message: format!(
            "The datediff function resulted in an overflow. The number of dateparts separating two date/time instances is too large. Try to use datediff with a less precise datepart ({}).",
            part.name()
        ),
        severity: 16,
        state: 1,
    })?;
    Ok(Value::int(n))
}

fn datediff_big(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let Some((part, a, b)) = diff_args(args)? else {
        return Ok(Value::null(DataType::BigInt));
    };
    let n = diff_part(part, &a, &b)?;
    let n = i64::try_from(n).map_err(|_| TsqlError::ArithmeticOverflow("datediff_big".into()))?;
    Ok(Value::bigint(n))
}

/// 1-based day of the week, counted from the session's DATEFIRST.
fn weekday_number(t: &NaiveDateTime, datefirst: u8) -> i64 {
    let from_monday = t.weekday().number_from_monday() as i64;
    (from_monday - datefirst as i64 + 7).rem_euclid(7) + 1
}

pub(crate) fn part_of(part: DatePart, t: &NaiveDateTime, datefirst: u8) -> i64 {
    match part {
        DatePart::Year => t.year() as i64,
        DatePart::Quarter => (t.month0() / 3 + 1) as i64,
        DatePart::Month => t.month() as i64,
        DatePart::DayOfYear => t.ordinal() as i64,
        DatePart::Day => t.day() as i64,
        DatePart::Week => {
            let jan1 = t.with_ordinal(1).unwrap_or(*t);
            let offset = weekday_number(&jan1, datefirst) - 1;
            (t.ordinal0() as i64 + offset) / 7 + 1
        }
        DatePart::Weekday => weekday_number(t, datefirst),
        DatePart::Hour => t.hour() as i64,
        DatePart::Minute => t.minute() as i64,
        DatePart::Second => t.second() as i64,
        DatePart::Millisecond => (t.nanosecond() % 1_000_000_000 / 1_000_000) as i64,
        DatePart::Microsecond => (t.nanosecond() % 1_000_000_000 / 1_000) as i64,
        DatePart::Nanosecond => (t.nanosecond() % 1_000_000_000) as i64,
        DatePart::TzOffset => 0,
        DatePart::IsoWeek => t.iso_week().week() as i64,
    }
}

fn datepart(ctx: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let part = DatePart::parse(&args[0].as_string())?;
    if args[1].is_null() {
        return Ok(Value::null(DataType::Int));
    }
    let (t, ty) = temporal_arg(&args[1])?;
    if ty == DataType::Time && !part.is_time_part() {
        return Err(unsupported_part(part, "datepart", ty));
    }
    if ty == DataType::Date && part.is_time_part() {
        return Err(unsupported_part(part, "datepart", ty));
    }
    Ok(Value::int(part_of(part, &t, ctx.config().datefirst) as i32))
}

fn datename(ctx: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let part = DatePart::parse(&args[0].as_string())?;
    if args[1].is_null() {
        return Ok(Value::null(DataType::NVarChar));
    }
    let (t, _) = temporal_arg(&args[1])?;
    let name = match part {
        DatePart::Month => month_name(t.month()).to_string(),
        DatePart::Weekday => weekday_name(&t).to_string(),
        DatePart::TzOffset => "+00:00".to_string(),
        _ => part_of(part, &t, ctx.config().datefirst).to_string(),
    };
    Ok(Value::nvarchar(name))
}

fn single_part(args: &[Value], part: DatePart) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(DataType::Int));
    }
    let (t, _) = temporal_arg(&args[0])?;
    Ok(Value::int(part_of(part, &t, 7) as i32))
}

fn year(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    single_part(args, DatePart::Year)
}

fn month(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    single_part(args, DatePart::Month)
}

fn day(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    single_part(args, DatePart::Day)
}

fn eomonth(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::Date));
    }
    let (t, _) = temporal_arg(&args[0])?;
    let shift = args.get(1).map(Value::as_int).unwrap_or(0);
    let first = t.date().with_day(1).unwrap_or(t.date()).and_time(NaiveTime::MIN);
    let end = add_months(first, shift + 1)
        .and_then(|next| next.checked_sub_signed(TimeDelta::days(1)))
        .filter(valid_year)
        .ok_or_else(|| TsqlError::ArithmeticOverflow("expression to data type date".into()))?;
    Ok(Value::date(end.date()))
}

fn parts_error(ty: &str) -> TsqlError {
    TsqlError::Raised {
        number: 289,
        message: format!("Cannot construct data type {ty}, some of the arguments have values which are not valid."),
        severity: 16,
        state: 1,
    }
}

fn int_part(v: &Value) -> u32 {
    u32::try_from(v.as_int()).unwrap_or(u32::MAX)
}

fn make_date(args: &[Value], ty: &str) -> Result<NaiveDate> {
    let year = i32::try_from(args[0].as_int()).map_err(|_| parts_error(ty))?;
    NaiveDate::from_ymd_opt(year, int_part(&args[1]), int_part(&args[2]))
        .filter(|d| (1..=9999).contains(&d.year()))
        .ok_or_else(|| parts_error(ty))
}

fn datefromparts(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::Date));
    }
    Ok(Value::date(make_date(args, "date")?))
}

fn datetimefromparts(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::DateTime));
    }
    let date = make_date(args, "datetime")?;
    if date.year() < 1753 {
        return Err(parts_error("datetime"));
    }
    let ms = int_part(&args[6]);
    if ms > 999 {
        return Err(parts_error("datetime"));
    }
    let time = NaiveTime::from_hms_milli_opt(int_part(&args[3]), int_part(&args[4]), int_part(&args[5]), ms)
        .ok_or_else(|| parts_error("datetime"))?;
    Ok(Value::datetime(date.and_time(time)))
}

/// Nanoseconds for `fraction` at `precision` digits, e.g. (5, 1) is half a second.
fn fraction_nanos(fraction: i64, precision: i64, ty: &str) -> Result<u32> {
    if !(0..=7).contains(&precision) || fraction < 0 || fraction >= 10i64.pow(precision as u32).max(1) {
        return Err(parts_error(ty));
    }
    if precision == 0 {
        return Ok(0);
    }
    Ok((fraction * 10i64.pow(9 - precision as u32)) as u32)
}

fn datetime2fromparts(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[7].is_null() {
        return Err(parts_error("datetime2"));
    }
    if any_null(args) {
        return Ok(Value::null(DataType::DateTime2));
    }
    let date = make_date(args, "datetime2")?;
    let precision = args[7].as_int();
    let nanos = fraction_nanos(args[6].as_int(), precision, "datetime2")?;
    let time = NaiveTime::from_hms_nano_opt(int_part(&args[3]), int_part(&args[4]), int_part(&args[5]), nanos)
        .ok_or_else(|| parts_error("datetime2"))?;
    Ok(Value::temporal_of(DataType::DateTime2, date.and_time(time), precision as u8))
}

fn smalldatetimefromparts(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if any_null(args) {
        return Ok(Value::null(DataType::SmallDateTime));
    }
    let date = make_date(args, "smalldatetime")?;
    if !(1900..=2079).contains(&date.year()) {
        return Err(parts_error("smalldatetime"));
    }
    let time = NaiveTime::from_hms_opt(int_part(&args[3]), int_part(&args[4]), 0)
        .ok_or_else(|| parts_error("smalldatetime"))?;
    Ok(Value::temporal_of(DataType::SmallDateTime, date.and_time(time), 0))
}

fn timefromparts(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[4].is_null() {
        return Err(parts_error("time"));
    }
    if any_null(args) {
        return Ok(Value::null(DataType::Time));
    }
    let precision = args[4].as_int();
    let nanos = fraction_nanos(args[3].as_int(), precision, "time")?;
    let time = NaiveTime::from_hms_nano_opt(int_part(&args[0]), int_part(&args[1]), int_part(&args[2]), nanos)
        .ok_or_else(|| parts_error("time"))?;
    let base = crate::value::base_datetime().date();
    Ok(Value::temporal_of(DataType::Time, base.and_time(time), precision as u8))
}

fn isdate(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    let ok = match v.data_type() {
        _ if v.is_null() => false,
        t if t.is_datetime() => true,
        t if t.is_string() => convert::parse_datetime(&v.as_string(), None)
            .is_some_and(|d| (1753..=9999).contains(&d.year())),
        _ => false,
    };
    Ok(Value::int(ok as i32))
}
