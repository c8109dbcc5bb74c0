mod common;

use tsql_runtime::{parse_expr, ColumnDef, TempTable, Value};

#[test]
fn verify_temp_tables() -> anyhow::Result<()> {
    let mut ctx = common::session();

    ctx.create_table(
        "#staging",
        vec![
            ColumnDef::new("id", common::ty("int")?).identity(1, 1),
            ColumnDef::new("sku", common::ty("varchar(10)")?).not_null(),
            ColumnDef::new("qty", common::ty("int")?).default_value(Value::int(1)),
            ColumnDef::new("price", common::ty("decimal(8,2)")?),
        ],
    )?;
    assert!(ctx.create_table("#STAGING", vec![ColumnDef::new("x", common::ty("int")?)]).is_err());

    for (sku, qty, price) in [("A-1", 5, "2.50"), ("B-2", 1, "10.00"), ("C-3", 12, "0.99")] {
        ctx.insert(
            "#staging",
            &[("sku", Value::varchar(sku)), ("qty", Value::int(qty)), ("price", Value::varchar(price))],
        )?;
    }
    ctx.insert("#staging", &[("sku", Value::varchar("D-4"))])?;
    assert_eq!(ctx.scope_identity(), Some(4));
    assert_eq!(common::eval(&ctx, "SCOPE_IDENTITY()")?.as_int(), 4);
    assert_eq!(common::eval(&ctx, "IDENT_CURRENT('#staging')")?.as_int(), 4);
    assert_eq!(common::eval(&ctx, "@@ROWCOUNT")?.as_int(), 1);

    let all = ctx.table("#staging")?;
    let ids: Vec<i64> = all.rows.iter().map(|r| r[0].as_int()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(all.rows[3][2].as_int(), 1);
    assert!(all.rows[3][3].is_null());

    let err = ctx.insert("#staging", &[("qty", Value::int(1))]).unwrap_err();
    assert_eq!(err.number(), 515);
    let err = ctx.insert("#staging", &[("id", Value::int(9)), ("sku", Value::varchar("X"))]).unwrap_err();
    assert_eq!(err.number(), 544);
    ctx.set_identity_insert("#staging", true)?;
    ctx.insert("#staging", &[("id", Value::int(9)), ("sku", Value::varchar("X"))])?;
    ctx.set_identity_insert("#staging", false)?;

    let filter = parse_expr("qty > 1 AND price < 5")?;
    let cheap = ctx.select("#staging", Some(&filter))?;
    let skus: Vec<String> = cheap.rows.iter().map(|r| r[1].as_string()).collect();
    assert_eq!(skus, vec!["A-1", "C-3"]);
    assert_eq!(common::eval(&ctx, "@@ROWCOUNT")?.as_int(), 2);

    let bump = [("qty", parse_expr("qty * 2")?), ("price", parse_expr("price + 0.01")?)];
    let n = ctx.update("#staging", &bump, Some(&parse_expr("sku LIKE '[AB]-%'")?))?;
    assert_eq!(n, 2);
    let a = ctx.select("#staging", Some(&parse_expr("sku = 'A-1'")?))?;
    assert_eq!(a.rows[0][2].as_int(), 10);
    assert_eq!(a.rows[0][3].to_string(), "2.51");

    // NULL predicates never match
    assert_eq!(ctx.delete("#staging", Some(&parse_expr("price > NULL")?))?, 0);
    assert_eq!(ctx.delete("#staging", Some(&parse_expr("price IS NULL")?))?, 2);
    assert_eq!(ctx.table("#staging")?.len(), 3);

    ctx.truncate("#staging")?;
    assert_eq!(ctx.insert("#staging", &[("sku", Value::varchar("E-5"))])?, Some(1));

    // primary keys reject duplicates
    let keyed = TempTable::new(
        "##codes",
        vec![
            ColumnDef::new("code", common::ty("char(3)")?).not_null(),
            ColumnDef::new("label", common::ty("nvarchar(20)")?),
        ],
    )?
    .with_primary_key(&["code"])?;
    ctx.create_table_def(keyed)?;
    ctx.insert_values("##codes", vec![Value::varchar("USD"), Value::nvarchar("dollar")])?;
    let err = ctx
        .insert_values("##codes", vec![Value::varchar("USD"), Value::nvarchar("again")])
        .unwrap_err();
    assert_eq!(err.number(), 2627);

    // table variables are private to the declaring scope
    ctx.create_table("@totals", vec![ColumnDef::new("total", common::ty("int")?)])?;
    ctx.insert_values("@totals", vec![Value::int(7)])?;
    let child = ctx.child("usp_report", &[])?;
    assert!(child.table_exists("#staging"));
    assert!(child.table_exists("##codes"));
    assert!(!child.table_exists("@totals"));
    assert!(common::eval(&child, "OBJECT_ID('tempdb..#staging')")?.as_int() != 0);
    assert!(common::eval(&child, "OBJECT_ID('dbo.Missing')")?.is_null());
    ctx.return_from(child);

    // transactions roll temp table contents back
    ctx.begin_transaction(None)?;
    ctx.insert("#staging", &[("sku", Value::varchar("F-6"))])?;
    ctx.save_transaction("after_f")?;
    ctx.insert("#staging", &[("sku", Value::varchar("G-7"))])?;
    ctx.rollback(Some("after_f"))?;
    assert_eq!(ctx.table("#staging")?.len(), 2);
    ctx.rollback(None)?;
    assert_eq!(ctx.table("#staging")?.len(), 1);

    // WHERE and SET expressions may call functions that read the temp tables themselves
    ctx.create_table(
        "#audit",
        vec![
            ColumnDef::new("id", common::ty("int")?).identity(1, 1),
            ColumnDef::new("note", common::ty("varchar(40)")?),
        ],
    )?;
    ctx.insert("#audit", &[("note", Value::varchar("first"))])?;
    ctx.insert("#audit", &[("note", Value::varchar("second"))])?;
    let newest = parse_expr("id = IDENT_CURRENT('#audit')")?;
    let tagged = [("note", parse_expr("CONCAT(note, ' @', OBJECT_ID('tempdb..#audit'))")?)];
    assert_eq!(ctx.update("#audit", &tagged, Some(&newest))?, 1);
    let note = ctx.select("#audit", Some(&newest))?.rows[0][1].as_string();
    assert!(note.starts_with("second @-"), "{note}");
    assert_eq!(ctx.delete("#audit", Some(&newest))?, 1);
    assert_eq!(ctx.table("#audit")?.len(), 1);

    let shared = std::sync::Arc::clone(ctx.temp_tables());
    ctx.end_session();
    assert!(!shared.exists("#staging"));
    assert!(shared.exists("##codes"));
    assert!(ctx.drop_table("#staging").is_err());
    ctx.drop_table("##codes")?;

    Ok(())
}
