mod common;

use tsql_runtime::{DataType, Value};

#[test]
fn verify_expressions() -> anyhow::Result<()> {
    let mut ctx = common::session();

    ctx.declare("@qty", common::ty("int")?, Some(Value::int(4)))?;
    ctx.declare("@price", common::ty("decimal(10,2)")?, Some(Value::varchar("10.50")))?;
    ctx.declare("@label", common::ty("nvarchar(50)")?, None)?;

    let total = common::eval(&ctx, "@qty * @price")?;
    assert_eq!(total.to_string(), "42.00");
    assert_eq!(total.data_type(), DataType::Decimal);

    assert_eq!(common::eval(&ctx, "10.50 + 3.25")?.to_string(), "13.75");
    assert!(common::eval(&ctx, "@price / 0.00")?.is_null());
    assert_eq!(common::eval(&ctx, "@price / 0.00")?.data_type(), DataType::Decimal);

    // an unset variable reads as a typed NULL
    let label = common::eval(&ctx, "@label")?;
    assert!(label.is_null());
    assert_eq!(label.data_type(), DataType::NVarChar);

    let expr = tsql_runtime::parse_expr("'Order of ' + CAST(@qty AS varchar(10)) + ' items'")?;
    ctx.assign("@label", &expr)?;
    assert_eq!(ctx.get("@label")?.as_string(), "Order of 4 items");

    assert_eq!(common::eval(&ctx, "CASE WHEN @qty > 3 THEN 'bulk' ELSE 'single' END")?.as_string(), "bulk");
    assert_eq!(common::eval(&ctx, "CASE @qty WHEN 1 THEN 'one' WHEN 4 THEN 'four' END")?.as_string(), "four");
    assert!(common::eval(&ctx, "CASE @qty WHEN 1 THEN 'one' END")?.is_null());

    assert_eq!(common::eval(&ctx, "@qty BETWEEN 1 AND 4")?.as_int(), 1);
    assert_eq!(common::eval(&ctx, "@qty IN (1, 2, 4)")?.as_int(), 1);
    assert!(common::eval(&ctx, "@qty NOT IN (1, NULL)")?.is_null());
    // a NULL bound leaves the range test unknown in both directions
    assert!(common::eval(&ctx, "@qty BETWEEN NULL AND 3")?.is_null());
    assert!(common::eval(&ctx, "@qty NOT BETWEEN NULL AND 3")?.is_null());
    assert_eq!(
        common::eval(&ctx, "CASE WHEN @qty NOT BETWEEN NULL AND 3 THEN 'kept' ELSE 'dropped' END")?.as_string(),
        "dropped"
    );
    // strings compare against numbers as numbers
    assert_eq!(common::eval(&ctx, "CASE WHEN 10 > '9' THEN 1 ELSE 0 END")?.as_int(), 1);
    assert_eq!(common::eval(&ctx, "@qty = '4'")?.as_int(), 1);
    assert_eq!(common::eval(&ctx, "@label LIKE 'Order%'")?.as_int(), 1);
    assert_eq!(common::eval(&ctx, "@label LIKE '%[0-9] items'")?.as_int(), 1);
    assert_eq!(common::eval(&ctx, "'100% legit' LIKE '100!% legit' ESCAPE '!'")?.as_int(), 1);

    // three-valued logic
    assert_eq!(common::eval(&ctx, "NULL = 1 AND 1 = 0")?.as_int(), 0);
    assert!(common::eval(&ctx, "NULL = 1 AND 1 = 1")?.is_null());
    assert_eq!(common::eval(&ctx, "NULL = 1 OR 1 = 1")?.as_int(), 1);
    assert!(common::eval(&ctx, "NULL = 1 OR 1 = 0")?.is_null());

    // round trip through style 120 keeps seconds
    let stamp = common::eval(
        &ctx,
        "CONVERT(datetime, CONVERT(varchar(30), CAST('2023-07-14 08:15:42' AS datetime), 120), 120)",
    )?;
    assert_eq!(stamp.to_string(), "2023-07-14 08:15:42.000");
    assert_eq!(common::eval(&ctx, "CONVERT(varchar(10), CAST('2023-07-14' AS date), 101)")?.as_string(), "07/14/2023");

    assert_eq!(common::eval_err(&ctx, "CAST(70000 AS smallint)")?.number(), 8115);
    assert_eq!(common::eval_err(&ctx, "@undeclared + 1")?.number(), 137);
    // malformed numeric text degrades to zero instead of failing
    assert_eq!(common::eval(&ctx, "CONVERT(int, 'abc')")?.as_int(), 0);
    assert!(common::eval(&ctx, "TRY_CONVERT(datetime, 'not a date')")?.is_null());
    assert_eq!(common::eval(&ctx, "CAST(255 AS varbinary(2))")?.as_bytes(), vec![0x00, 0xff]);

    // datetime plus a number adds days
    assert_eq!(
        common::eval(&ctx, "CAST('2024-01-01' AS datetime) + 1.5")?.to_string(),
        "2024-01-02 12:00:00.000"
    );

    assert_eq!(common::eval(&ctx, "@@ROWCOUNT")?.as_int(), 0);
    assert_eq!(common::eval(&ctx, "@@TRANCOUNT")?.as_int(), 0);
    assert_eq!(common::eval(&ctx, "@@DATEFIRST")?.as_int(), 7);
    assert!(common::eval(&ctx, "@@SPID")?.as_int() > 0);

    let err = common::eval_err(&ctx, "EXISTS (SELECT 1 FROM dbo.Orders)")?;
    assert!(err.to_string().contains("not supported in this context"));

    ctx.set("@qty", Value::varchar("12"))?;
    assert_eq!(ctx.get("@qty")?, Value::int(12));
    assert_eq!(ctx.declare("@qty", common::ty("int")?, None).unwrap_err().number(), 134);

    Ok(())
}
