mod common;

use std::sync::Arc;
use tsql_runtime::{DataType, ExecutionContext, FunctionRegistry, SessionConfig, Value};

fn shipping_days(_: &ExecutionContext, args: &[Value]) -> tsql_runtime::Result<Value> {
    Ok(Value::int(if args[0].as_string() == "express" { 1 } else { 5 }))
}

#[test]
fn verify_functions() -> anyhow::Result<()> {
    let mut ctx = common::session();
    ctx.declare("@name", common::ty("nvarchar(40)")?, Some(Value::nvarchar("  Ada Lovelace ")))?;
    ctx.declare("@doc", common::ty("nvarchar(200)")?, Some(Value::nvarchar(
        r#"{"order":{"id":7,"lines":[{"sku":"A1","qty":2},{"sku":"B2","qty":5}]},"note":null}"#,
    )))?;

    // strings
    assert_eq!(common::eval(&ctx, "LEN(@name)")?.as_int(), 14);
    assert_eq!(common::eval(&ctx, "DATALENGTH(@name)")?.as_int(), 30);
    assert_eq!(common::eval(&ctx, "UPPER(TRIM(@name))")?.as_string(), "ADA LOVELACE");
    assert_eq!(common::eval(&ctx, "CHARINDEX('Love', @name)")?.as_int(), 7);
    assert_eq!(common::eval(&ctx, "REPLACE(TRIM(@name), ' ', '_')")?.as_string(), "Ada_Lovelace");
    assert_eq!(common::eval(&ctx, "STUFF('abcdef', 2, 3, 'XY')")?.as_string(), "aXYef");
    assert_eq!(common::eval(&ctx, "CONCAT('a', NULL, 1)")?.as_string(), "a1");
    assert_eq!(common::eval(&ctx, "CONCAT_WS('-', 'x', NULL, 'y')")?.as_string(), "x-y");
    assert_eq!(common::eval(&ctx, "QUOTENAME('my]table')")?.as_string(), "[my]]table]");
    assert_eq!(common::eval(&ctx, "PATINDEX('%world%', 'hello world')")?.as_int(), 7);
    assert_eq!(common::eval(&ctx, "REPLICATE('ab', 3)")?.as_string(), "ababab");
    let name = common::eval(&ctx, "LTRIM(@name)")?;
    assert_eq!(name.data_type(), DataType::NVarChar);

    // numbers
    assert_eq!(common::eval(&ctx, "ABS(-3)")?.as_int(), 3);
    assert_eq!(common::eval(&ctx, "ROUND(2.345, 2)")?.to_string(), "2.350");
    assert_eq!(common::eval(&ctx, "POWER(2, 10)")?.as_int(), 1024);
    assert_eq!(common::eval(&ctx, "SIGN(-0.5)")?.as_int(), -1);
    assert_eq!(common::eval(&ctx, "ISNUMERIC('1,234.5')")?.as_int(), 1);
    assert_eq!(common::eval(&ctx, "ISNUMERIC('12abc')")?.as_int(), 0);
    assert_eq!(common::eval(&ctx, "GREATEST(3, NULL, 7, -1)")?.as_int(), 7);
    assert_eq!(common::eval(&ctx, "LEAST(3, NULL, 7, -1)")?.as_int(), -1);
    assert!(common::eval(&ctx, "GREATEST(NULL, NULL)")?.is_null());

    // decimal results too large for the type raise an overflow
    let max = "79228162514264337593543950335";
    for sql in [
        format!("DEGREES({max})"),
        format!("RADIANS({max})"),
        format!("ROUND({max}, -1)"),
        format!("FORMAT({max}, 'P')"),
    ] {
        assert_eq!(common::eval_err(&ctx, &sql)?.number(), 8115, "{sql}");
    }
    assert_eq!(common::eval(&ctx, "LEN(REPLICATE('ab', 2000000000))")?.as_int(), 8000);

    let first = common::eval(&ctx, "RAND(7)")?.as_float();
    let second = common::eval(&ctx, "RAND(7)")?.as_float();
    assert_eq!(first, second);
    assert!((0.0..1.0).contains(&first));

    // dates
    assert_eq!(
        common::eval(&ctx, "DATEADD(month, 1, '2024-01-31')")?.to_string(),
        "2024-02-29 00:00:00.000"
    );
    assert_eq!(common::eval(&ctx, "DATEDIFF(day, '2024-02-28', '2024-03-01')")?.as_int(), 2);
    assert_eq!(common::eval(&ctx, "DATEPART(quarter, '2024-08-15')")?.as_int(), 3);
    assert_eq!(common::eval(&ctx, "DATENAME(weekday, '2024-01-07')")?.as_string(), "Sunday");
    assert_eq!(common::eval(&ctx, "YEAR(EOMONTH('2023-02-10'))")?.as_int(), 2023);
    assert_eq!(common::eval(&ctx, "DAY(EOMONTH('2023-02-10'))")?.as_int(), 28);
    assert_eq!(common::eval(&ctx, "DATEFROMPARTS(2024, 2, 29)")?.to_string(), "2024-02-29");
    assert_eq!(common::eval(&ctx, "ISDATE('2023-02-29')")?.as_int(), 0);
    assert_eq!(common::eval(&ctx, "GETDATE()")?.data_type(), DataType::DateTime);

    // null handling
    assert_eq!(common::eval(&ctx, "ISNULL(NULL, 5)")?.as_int(), 5);
    assert_eq!(common::eval(&ctx, "COALESCE(NULL, NULL, 'x')")?.as_string(), "x");
    assert!(common::eval(&ctx, "NULLIF(3, 3)")?.is_null());
    assert_eq!(common::eval(&ctx, "NULLIF(3, 4)")?.as_int(), 3);
    assert_eq!(common::eval(&ctx, "CHOOSE(2, 'a', 'b', 'c')")?.as_string(), "b");
    assert!(common::eval(&ctx, "CHOOSE(9, 'a', 'b')")?.is_null());

    // system
    let id = common::eval(&ctx, "NEWID()")?;
    assert_eq!(id.data_type(), DataType::UniqueIdentifier);
    assert_eq!(id.to_string().len(), 36);
    assert_ne!(id.to_string(), common::eval(&ctx, "NEWID()")?.to_string());
    assert_eq!(common::eval(&ctx, "DB_NAME()")?.as_string(), ctx.config().database);
    assert_eq!(common::eval(&ctx, "XACT_STATE()")?.as_int(), 0);
    assert_eq!(
        common::eval(&ctx, "FORMATMESSAGE('%s has %d rows', 'orders', 3)")?.as_string(),
        "orders has 3 rows"
    );

    // hashing
    let md5 = common::eval(&ctx, "HASHBYTES('MD5', 'abc')")?;
    assert_eq!((md5.data_type(), md5.as_bytes().len()), (DataType::VarBinary, 16));
    assert_eq!(common::eval(&ctx, "HASHBYTES('SHA2_256', 'abc')")?.as_bytes().len(), 32);
    assert_eq!(
        common::eval(&ctx, "CHECKSUM('abc')")?.as_int(),
        common::eval(&ctx, "CHECKSUM('ABC')")?.as_int()
    );
    assert_ne!(
        common::eval(&ctx, "BINARY_CHECKSUM('abc')")?.as_int(),
        common::eval(&ctx, "BINARY_CHECKSUM('ABC')")?.as_int()
    );

    // JSON and XML
    assert_eq!(common::eval(&ctx, "JSON_VALUE(@doc, '$.order.lines[1].sku')")?.as_string(), "B2");
    assert!(common::eval(&ctx, "JSON_VALUE(@doc, '$.order.lines')")?.is_null());
    assert_eq!(common::eval(&ctx, "ISJSON(@doc)")?.as_int(), 1);
    assert_eq!(common::eval_err(&ctx, "JSON_VALUE(@doc, 'strict $.missing')")?.number(), 13608);
    let modified = common::eval(&ctx, "JSON_MODIFY('{\"a\":1,\"b\":2}', '$.a', 5)")?;
    assert_eq!(modified.as_string(), r#"{"a":5,"b":2}"#);
    let xml = "<order id=\"7\"><item><qty>2</qty></item><item><qty>5</qty></item></order>";
    ctx.declare("@xml", common::ty("nvarchar(200)")?, Some(Value::nvarchar(xml)))?;
    assert_eq!(common::eval(&ctx, "XML_VALUE(@xml, '/order/item[2]/qty')")?.as_string(), "5");
    assert_eq!(common::eval(&ctx, "XML_VALUE(@xml, '/order/@id')")?.as_string(), "7");

    // lookup and arity failures
    assert_eq!(common::eval_err(&ctx, "FROBNICATE(1)")?.number(), 195);
    assert_eq!(common::eval_err(&ctx, "STUFF('a', 1)")?.number(), 174);
    assert_eq!(common::eval(&ctx, "dbo.UPPER('x')")?.as_string(), "X");

    // host-registered functions sit beside the built-ins
    let mut registry = FunctionRegistry::new();
    assert!(registry.len() > 100);
    registry.register("SHIPPING_DAYS", 1, Some(1), shipping_days);
    let custom = ExecutionContext::with_registry(SessionConfig::default(), Arc::new(registry));
    assert_eq!(common::eval(&custom, "SHIPPING_DAYS('express')")?.as_int(), 1);
    assert_eq!(common::eval(&custom, "SHIPPING_DAYS('ground') + LEN('ab')")?.as_int(), 7);

    Ok(())
}
