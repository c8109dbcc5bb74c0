mod common;

use tsql_runtime::{ErrorRecord, TsqlError, Value};

#[test]
fn verify_error_handling() -> anyhow::Result<()> {
    let mut ctx = common::session();
    ctx.declare("@log", common::ty("nvarchar(200)")?, None)?;

    // introspection reads NULL outside any handler
    for f in ["ERROR_NUMBER()", "ERROR_MESSAGE()", "ERROR_LINE()", "ERROR_PROCEDURE()"] {
        assert!(common::eval(&ctx, f)?.is_null(), "{f}");
    }

    // 1/0 yields NULL here, so the body overflows a tinyint instead
    let caught = ctx.try_catch(
        |c| {
            c.set_line(14);
            c.evaluate_sql("CAST(300 AS tinyint)")?;
            Ok(false)
        },
        |c, rec| {
            assert_eq!(rec.number, 8115);
            assert_eq!(c.evaluate_sql("ERROR_NUMBER()")?.as_int(), 8115);
            assert_eq!(c.evaluate_sql("ERROR_LINE()")?.as_int(), 14);
            assert_eq!(c.evaluate_sql("ERROR_SEVERITY()")?.as_int(), 16);
            let msg = c.evaluate_sql("ERROR_MESSAGE()")?;
            c.set("@log", msg)?;
            Ok(true)
        },
    )?;
    assert!(caught);
    assert!(ctx.get("@log")?.as_string().starts_with("Arithmetic overflow"));
    assert!(common::eval(&ctx, "ERROR_NUMBER()")?.is_null());
    assert_eq!(common::eval(&ctx, "@@ERROR")?.as_int(), 8115);

    // a clean body leaves no handler state behind
    let v = ctx.try_catch(|c| c.evaluate_sql("1 + 1"), |_, _| Ok(Value::int(-1)))?;
    assert_eq!(v.as_int(), 2);
    assert!(!ctx.in_try());

    // nested regions: the inner CATCH rethrows to the outer one
    let outer = ctx.try_catch(
        |c| {
            c.try_catch(
                |c| c.throw(50001, "inventory too low", 3),
                |c, rec| {
                    assert_eq!((rec.number, rec.state), (50001, 3));
                    c.rethrow()
                },
            )?;
            Ok(0)
        },
        |c, rec| {
            assert_eq!(c.evaluate_sql("ERROR_MESSAGE()")?.as_string(), "inventory too low");
            Ok(rec.number)
        },
    )?;
    assert_eq!(outer, 50001);

    // errors raised from inside CATCH escape to the caller when nothing encloses them
    let escaped = ctx.try_catch(
        |c| c.throw(50002, "first", 1),
        |c, _| c.throw(50003, "second", 1),
    );
    assert_eq!(escaped.unwrap_err().number(), 50003);
    assert!(common::eval(&ctx, "ERROR_NUMBER()")?.is_null());

    // RAISERROR: low severity only prints, high severity raises with substitution
    ctx.raiserror("processing %s: %d rows", 10, 1, &[Value::varchar("orders"), Value::int(12)])?;
    assert_eq!(ctx.take_messages(), vec!["processing orders: 12 rows".to_string()]);
    let err = ctx
        .raiserror("order %d not found", 16, 2, &[Value::int(77)])
        .unwrap_err();
    assert_eq!(err.number(), 50000);
    assert_eq!(err.to_string(), "order 77 not found");
    assert_eq!((err.severity(), err.state()), (16, 2));
    assert!(ctx.throw(100, "too low", 1).is_err());
    assert_eq!(ctx.rethrow().unwrap_err().number(), 10704);

    // records carry the procedure, parameters and call trace
    let mut child = ctx.child("usp_ship", &[("@order_id", common::ty("int")?, Value::int(77))])?;
    child.set_line(31);
    let rec: ErrorRecord = child.error_record(&TsqlError::DuplicateKey {
        table: "#shipments".into(),
        key: "(77)".into(),
    });
    assert_eq!(rec.procedure.as_deref(), Some("usp_ship"));
    assert_eq!(rec.number, 2627);
    assert_eq!(rec.line, 31);
    assert_eq!(rec.parameters.get("@order_id").map(String::as_str), Some("77"));
    assert_eq!(rec.trace, vec!["usp_ship".to_string()]);

    let json: serde_json::Value = serde_json::from_str(&rec.to_json()?)?;
    assert_eq!(json["number"], 2627);
    assert_eq!(json["procedure"], "usp_ship");
    let xml = rec.to_xml();
    assert!(xml.contains("<number>2627</number>"));
    assert!(xml.contains("<parameter name=\"@order_id\">77</parameter>"));

    // a callee sees the error its caller is handling, but cannot catch on the caller's behalf
    let seen_by_callee = ctx.try_catch(
        |c| c.throw(50010, "outer failure", 1).map(|_| 0),
        |c, _| {
            let callee = c.child("usp_log_error", &[])?;
            Ok(callee.evaluate_sql("ERROR_NUMBER()")?.as_int())
        },
    )?;
    assert_eq!(seen_by_callee, 50010);

    // XACT_ABORT dooms the transaction on any error
    ctx.set_option("XACT_ABORT", &Value::varchar("ON"))?;
    ctx.begin_transaction(Some("ship"))?;
    let state = ctx.try_catch(
        |c| c.throw(50020, "boom", 1).map(|_| 0),
        |c, _| Ok(c.evaluate_sql("XACT_STATE()")?.as_int()),
    )?;
    assert_eq!(state, -1);
    assert_eq!(ctx.commit().unwrap_err().number(), 3930);
    assert_eq!(ctx.save_transaction("sp").unwrap_err().number(), 3930);
    ctx.rollback(Some("ship"))?;
    assert_eq!(common::eval(&ctx, "XACT_STATE()")?.as_int(), 0);

    // nesting depth is bounded
    let mut depth = ctx.child("p", &[])?;
    for _ in 0..31 {
        depth = depth.child("p", &[])?;
    }
    assert_eq!(depth.nest_level(), 32);
    assert_eq!(depth.child("p", &[]).unwrap_err().number(), 217);

    Ok(())
}
