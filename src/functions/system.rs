use super::FunctionRegistry;
use crate::context::ExecutionContext;
use crate::convert;
use crate::error::{Result, TsqlError};
use crate::handler::{format_message, ErrorRecord};
use crate::types::{parse_data_type, DataType, TypeSpec};
use crate::value::Value;
use rust_decimal::Decimal;
use uuid::Uuid;

pub(super) fn register(registry: &mut FunctionRegistry) {
    // null handling
    registry.register("ISNULL", 2, Some(2), isnull);
    registry.register("COALESCE", 2, None, coalesce);
    registry.register("NULLIF", 2, Some(2), nullif);
    registry.register("IIF", 3, Some(3), iif);
    registry.register("CHOOSE", 2, None, choose);

    // type probing
    registry.register("SQL_VARIANT_PROPERTY", 2, Some(2), sql_variant_property);
    registry.register("TYPE_NAME", 1, Some(1), type_name);
    registry.register("TYPE_ID", 1, Some(1), type_id);

    // session
    registry.register("NEWID", 0, Some(0), newid);
    registry.register("NEWSEQUENTIALID", 0, Some(0), newsequentialid);
    registry.register("DB_NAME", 0, Some(1), db_name);
    registry.register("SUSER_SNAME", 0, Some(1), suser_sname);
    registry.register("SUSER_NAME", 0, Some(1), suser_sname);
    registry.register("SYSTEM_USER", 0, Some(0), suser_sname);
    registry.register("USER_NAME", 0, Some(1), user_name);
    registry.register("CURRENT_USER", 0, Some(0), user_name);
    registry.register("SESSION_USER", 0, Some(0), user_name);
    registry.register("HOST_NAME", 0, Some(0), host_name);
    registry.register("APP_NAME", 0, Some(0), app_name);
    registry.register("OBJECT_ID", 1, Some(2), object_id);
    registry.register("SCOPE_IDENTITY", 0, Some(0), scope_identity);
    registry.register("IDENT_CURRENT", 1, Some(1), ident_current);
    registry.register("ROWCOUNT_BIG", 0, Some(0), rowcount_big);
    registry.register("XACT_STATE", 0, Some(0), xact_state);

    // error introspection
    registry.register("ERROR_NUMBER", 0, Some(0), error_number);
    registry.register("ERROR_MESSAGE", 0, Some(0), error_message);
    registry.register("ERROR_SEVERITY", 0, Some(0), error_severity);
    registry.register("ERROR_STATE", 0, Some(0), error_state);
    registry.register("ERROR_LINE", 0, Some(0), error_line);
    registry.register("ERROR_PROCEDURE", 0, Some(0), error_procedure);
    registry.register("FORMATMESSAGE", 1, None, formatmessage);

    // conversion
    registry.register("PARSE", 2, Some(3), parse);
    registry.register("TRY_PARSE", 2, Some(3), try_parse);
}

fn isnull(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let (check, replacement) = (&args[0], &args[1]);
    if !check.is_null() {
        return Ok(check.clone());
    }
    if replacement.is_null() {
        return Ok(Value::null_of(&check.type_spec()));
    }
    // the result takes the checked expression's type when the replacement fits it
    let converted = convert::try_convert(replacement, &check.type_spec(), None);
    if converted.is_null() {
        return Ok(replacement.clone());
    }
    Ok(converted)
}

fn coalesce(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    Ok(args
        .iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| Value::null_of(&args[0].type_spec())))
}

fn nullif(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].equals(&args[1]).truth().is_true() {
        return Ok(Value::null_of(&args[0].type_spec()));
    }
    Ok(args[0].clone())
}

fn iif(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].truth().is_true() {
        Ok(args[1].clone())
    } else {
        Ok(args[2].clone())
    }
}

fn choose(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let choices = &args[1..];
    let ty = choices
        .iter()
        .map(Value::data_type)
        .max_by_key(|t| t.precedence())
        .unwrap_or(DataType::Int);
    if args[0].is_null() {
        return Ok(Value::null(ty));
    }
    let index = args[0].as_int();
    if index < 1 || index as usize > choices.len() {
        return Ok(Value::null(ty));
    }
    Ok(choices[index as usize - 1].clone())
}

/// System type ids as reported by `sys.types`.
const TYPE_IDS: &[(i64, DataType)] = &[
    (34, DataType::Image),
    (35, DataType::Text),
    (36, DataType::UniqueIdentifier),
    (40, DataType::Date),
    (41, DataType::Time),
    (42, DataType::DateTime2),
    (43, DataType::DateTimeOffset),
    (48, DataType::TinyInt),
    (52, DataType::SmallInt),
    (56, DataType::Int),
    (58, DataType::SmallDateTime),
    (59, DataType::Real),
    (60, DataType::Money),
    (61, DataType::DateTime),
    (62, DataType::Float),
    (98, DataType::SqlVariant),
    (99, DataType::NText),
    (104, DataType::Bit),
    (106, DataType::Decimal),
    (108, DataType::Numeric),
    (122, DataType::SmallMoney),
    (127, DataType::BigInt),
    (165, DataType::VarBinary),
    (167, DataType::VarChar),
    (173, DataType::Binary),
    (175, DataType::Char),
    (231, DataType::NVarChar),
    (239, DataType::NChar),
    (241, DataType::Xml),
];

fn sysname(s: impl Into<String>) -> Value {
    Value::string_of(DataType::NVarChar, s, Some(128))
}

fn type_name(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let id = args[0].as_int();
    Ok(TYPE_IDS
        .iter()
        .find(|(i, _)| *i == id)
        .filter(|_| !args[0].is_null())
        .map(|(_, ty)| sysname(ty.name()))
        .unwrap_or_else(|| Value::null(DataType::NVarChar)))
}

fn type_id(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(DataType::Int));
    }
    let Ok(spec) = parse_data_type(&args[0].as_string()) else {
        return Ok(Value::null(DataType::Int));
    };
    Ok(TYPE_IDS
        .iter()
        .find(|(_, ty)| *ty == spec.data_type)
        .map(|(i, _)| Value::int(*i as i32))
        .unwrap_or_else(|| Value::null(DataType::Int)))
}

/// Storage size in bytes, as `SQL_VARIANT_PROPERTY(..., 'MaxLength')` reports it.
fn max_length(v: &Value) -> i64 {
    let ty = v.data_type();
    match ty {
        DataType::Bit | DataType::TinyInt => 1,
        DataType::SmallInt => 2,
        DataType::Int | DataType::SmallMoney | DataType::Real | DataType::SmallDateTime => 4,
        DataType::BigInt | DataType::Money | DataType::Float | DataType::DateTime => 8,
        DataType::Decimal | DataType::Numeric => 17,
        DataType::Date => 3,
        DataType::Time => 5,
        DataType::DateTime2 => 8,
        DataType::DateTimeOffset => 10,
        DataType::UniqueIdentifier => 16,
        _ => {
            let chars = v.max_len().unwrap_or_else(|| v.as_string().chars().count()) as i64;
            if ty.is_unicode() {
                chars * 2
            } else if ty.is_binary() {
                v.max_len().map_or(v.as_bytes().len() as i64, |n| n as i64)
            } else {
                chars
            }
        }
    }
}

fn sql_variant_property(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let v = &args[0];
    let property = args[1].as_string().to_ascii_lowercase();
    let out = match property.as_str() {
        "basetype" => sysname(v.data_type().name()),
        "precision" => match v.data_type() {
            t if t.is_decimal() => Value::int(v.precision() as i32),
            t if t.is_numeric() || t.is_datetime() => Value::int(t.default_precision() as i32),
            _ => Value::int(0),
        },
        "scale" => Value::int(v.scale() as i32),
        "maxlength" => Value::int(max_length(v) as i32),
        "totalbytes" => Value::int(max_length(v) as i32 + 2),
        "collation" if v.data_type().is_string() => sysname("SQL_Latin1_General_CP1_CI_AS"),
        _ => Value::null(DataType::SqlVariant),
    };
    Ok(out)
}

fn newid(_: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::uniqueidentifier(Uuid::new_v4()))
}

fn newsequentialid(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::uniqueidentifier(ctx.next_sequential_id()))
}

fn db_name(ctx: &ExecutionContext, args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(id) if id.is_null() => Ok(Value::null(DataType::NVarChar)),
        Some(id) if id.as_int() != 1 && id.as_int() != ctx.database_id() => {
            Ok(Value::null(DataType::NVarChar))
        }
        _ => Ok(sysname(&ctx.config().database)),
    }
}

fn suser_sname(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(sysname(&ctx.config().login_name))
}

fn user_name(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(sysname(&ctx.config().user_name))
}

fn host_name(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(sysname(&ctx.config().host_name))
}

fn app_name(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(sysname(&ctx.config().app_name))
}

fn object_id(ctx: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(DataType::Int));
    }
    let kind = args.get(1).filter(|v| !v.is_null()).map(Value::as_string);
    Ok(ctx
        .object_id(&args[0].as_string(), kind.as_deref())
        .map(Value::int)
        .unwrap_or_else(|| Value::null(DataType::Int)))
}

fn identity_value(id: Option<i64>) -> Value {
    match id {
        Some(n) => Value::decimal_with(Decimal::from(n), 38, 0),
        None => Value::null_of(&TypeSpec::decimal(38, 0)),
    }
}

fn scope_identity(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(identity_value(ctx.scope_identity()))
}

fn ident_current(ctx: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(identity_value(None));
    }
    Ok(identity_value(ctx.ident_current(&args[0].as_string())))
}

fn rowcount_big(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::bigint(ctx.row_count()))
}

fn xact_state(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    Ok(Value::smallint(ctx.xact_state() as i16))
}

fn with_error(ctx: &ExecutionContext, ty: DataType, f: impl FnOnce(&ErrorRecord) -> Value) -> Result<Value> {
    Ok(ctx.current_error().map(f).unwrap_or_else(|| Value::null(ty)))
}

fn error_number(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    with_error(ctx, DataType::Int, |e| Value::int(e.number))
}

fn error_message(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    with_error(ctx, DataType::NVarChar, |e| Value::nvarchar(e.message.clone()))
}

fn error_severity(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    with_error(ctx, DataType::Int, |e| Value::int(e.severity as i32))
}

fn error_state(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    with_error(ctx, DataType::Int, |e| Value::int(e.state as i32))
}

fn error_line(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    with_error(ctx, DataType::Int, |e| Value::int(e.line as i32))
}

fn error_procedure(ctx: &ExecutionContext, _: &[Value]) -> Result<Value> {
    with_error(ctx, DataType::NVarChar, |e| match &e.procedure {
        Some(p) => sysname(p.clone()),
        None => Value::null(DataType::NVarChar),
    })
}

fn formatmessage(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let template = &args[0];
    // numbered messages live in sys.messages, which this runtime does not carry
    if template.is_null() || template.data_type().is_numeric() {
        return Ok(Value::null(DataType::NVarChar));
    }
    Ok(Value::nvarchar(format_message(&template.as_string(), &args[1..])))
}

fn parse_target(args: &[Value]) -> Result<TypeSpec> {
    if let Some(culture) = args.get(2).filter(|c| !c.is_null()) {
        let culture = culture.as_string();
        if !matches!(culture.to_ascii_lowercase().as_str(), "" | "en-us" | "en" | "us_english") {
            return Err(TsqlError::NotSupported(format!("culture '{culture}'")));
        }
    }
    let spec = parse_data_type(&args[1].as_string())?;
    if !(spec.data_type.is_numeric() || spec.data_type.is_datetime()) {
        return Err(TsqlError::Invalid(format!(
            "PARSE cannot target data type {}",
            spec.data_type
        )));
    }
    Ok(spec)
}

fn parse_value(args: &[Value]) -> Result<Value> {
    let spec = parse_target(args)?;
    let source = &args[0];
    if source.is_null() {
        return Ok(Value::null_of(&spec));
    }
    if !source.data_type().is_string() {
        return Err(TsqlError::Invalid(format!(
            "argument data type {} is invalid for argument 1 of parse function",
            source.data_type()
        )));
    }
    let text = source.as_string();
    let trimmed = text.trim();
    // numeric parsing accepts a currency symbol and thousands separators
    let input = if spec.data_type.is_numeric() {
        Value::varchar(trimmed.trim_start_matches('$').replace(',', ""))
    } else {
        Value::varchar(trimmed)
    };
    let failed = || TsqlError::Raised {
        number: 9819,
        message: format!(
            "Error converting string value '{text}' into data type {} using culture ''.",
            spec.data_type
        ),
        severity: 16,
        state: 1,
    };
    if spec.data_type.is_numeric() && !super::numeric::looks_numeric(&input.as_string()) {
        return Err(failed());
    }
    convert::cast(&input, &spec).map_err(|_| failed())
}

fn parse(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    parse_value(args)
}

fn try_parse(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let spec = parse_target(args)?;
    match parse_value(args) {
        Ok(v) => Ok(v),
        Err(e) if e.number() == 9819 => Ok(Value::null_of(&spec)),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn call_in(ctx: &ExecutionContext, name: &str, args: &[Value]) -> Result<Value> {
        FunctionRegistry::new().call(ctx, name, args)
    }

    fn call(name: &str, args: &[Value]) -> Value {
        call_in(&ExecutionContext::new(SessionConfig::default()), name, args).unwrap()
    }

    #[test]
    fn coalesce_keeps_first_type_when_all_null() {
        let v = call("COALESCE", &[Value::null(DataType::Int), Value::varchar("x")]);
        assert_eq!(v.as_string(), "x");
        let v = call("COALESCE", &[Value::null(DataType::Date), Value::null(DataType::VarChar)]);
        assert!(v.is_null());
        assert_eq!(v.data_type(), DataType::Date);
    }

    #[test]
    fn nullif_returns_typed_null_on_match() {
        let v = call("NULLIF", &[Value::int(3), Value::int(3)]);
        assert!(v.is_null());
        assert_eq!(v.data_type(), DataType::Int);
        assert_eq!(call("NULLIF", &[Value::int(3), Value::int(4)]).as_int(), 3);
        assert_eq!(call("NULLIF", &[Value::int(3), Value::null(DataType::Int)]).as_int(), 3);
    }

    #[test]
    fn isnull_takes_first_argument_type() {
        let v = call("ISNULL", &[Value::null(DataType::Int), Value::varchar("42")]);
        assert_eq!((v.data_type(), v.as_int()), (DataType::Int, 42));
        assert_eq!(call("ISNULL", &[Value::varchar("a"), Value::varchar("b")]).as_string(), "a");
    }

    #[test]
    fn iif_and_choose() {
        let (yes, no) = (Value::varchar("yes"), Value::varchar("no"));
        assert_eq!(call("IIF", &[Value::bit(true), yes.clone(), no.clone()]).as_string(), "yes");
        // an unknown condition takes the false branch
        assert_eq!(call("IIF", &[Value::null(DataType::Bit), yes.clone(), no.clone()]).as_string(), "no");
        assert_eq!(call("CHOOSE", &[Value::int(2), yes.clone(), no.clone()]).as_string(), "no");
        assert!(call("CHOOSE", &[Value::int(0), yes.clone(), no.clone()]).is_null());
        assert!(call("CHOOSE", &[Value::int(3), yes, no]).is_null());
    }

    #[test]
    fn type_probing() {
        assert_eq!(call("TYPE_NAME", &[Value::int(56)]).as_string(), "int");
        assert_eq!(call("TYPE_ID", &[Value::varchar("nvarchar")]).as_int(), 231);
        assert!(call("TYPE_NAME", &[Value::int(9999)]).is_null());
        let base = call("SQL_VARIANT_PROPERTY", &[Value::decimal_with(Decimal::new(125, 2), 10, 2), Value::varchar("BaseType")]);
        assert_eq!(base.as_string(), "decimal");
        let p = call("SQL_VARIANT_PROPERTY", &[Value::decimal_with(Decimal::new(125, 2), 10, 2), Value::varchar("Precision")]);
        assert_eq!(p.as_int(), 10);
    }

    #[test]
    fn error_functions_are_null_outside_catch() {
        for name in ["ERROR_NUMBER", "ERROR_MESSAGE", "ERROR_SEVERITY", "ERROR_STATE", "ERROR_LINE", "ERROR_PROCEDURE"] {
            assert!(call(name, &[]).is_null(), "{name}");
        }
    }

    #[test]
    fn session_metadata() {
        let cfg = SessionConfig {
            database: "sales".into(),
            login_name: "alice".into(),
            ..SessionConfig::default()
        };
        let ctx = ExecutionContext::new(cfg);
        assert_eq!(call_in(&ctx, "DB_NAME", &[]).unwrap().as_string(), "sales");
        assert_eq!(call_in(&ctx, "SUSER_SNAME", &[]).unwrap().as_string(), "alice");
        assert_eq!(call_in(&ctx, "XACT_STATE", &[]).unwrap().as_int(), 0);
        assert!(call_in(&ctx, "SCOPE_IDENTITY", &[]).unwrap().is_null());
        let a = call_in(&ctx, "NEWSEQUENTIALID", &[]).unwrap().as_string();
        let b = call_in(&ctx, "NEWSEQUENTIALID", &[]).unwrap().as_string();
        assert!(a < b);
        assert_ne!(call("NEWID", &[]), call("NEWID", &[]));
    }

    #[test]
    fn formatmessage_substitutes() {
        let v = call("FORMATMESSAGE", &[Value::varchar("%s has %d rows"), Value::varchar("t"), Value::int(3)]);
        assert_eq!(v.as_string(), "t has 3 rows");
    }

    #[test]
    fn parse_and_try_parse() {
        let v = call("PARSE", &[Value::varchar("$1,234.50"), Value::varchar("decimal(10,2)")]);
        assert_eq!(v.as_decimal(), Decimal::new(123450, 2));
        let ctx = ExecutionContext::new(SessionConfig::default());
        let err = call_in(&ctx, "PARSE", &[Value::varchar("abc"), Value::varchar("int")]).unwrap_err();
        assert_eq!(err.number(), 9819);
        assert!(call("TRY_PARSE", &[Value::varchar("abc"), Value::varchar("int")]).is_null());
        let d = call("TRY_PARSE", &[Value::varchar("2024-03-01"), Value::varchar("date")]);
        assert_eq!(d.to_string(), "2024-03-01");
    }
}
