mod common;

use tsql_runtime::{parse_cursor_options, CursorOptions, FetchDirection, Value};

const ORDERS: &str = "SELECT id, customer FROM dbo.Orders ORDER BY id";

fn orders() -> tsql_runtime::ResultSet {
    common::rows(
        &["id", "customer"],
        vec![
            vec![Value::int(1), Value::varchar("alpha")],
            vec![Value::int(2), Value::varchar("beta")],
            vec![Value::int(3), Value::varchar("gamma")],
        ],
    )
}

#[test]
fn verify_cursors() -> anyhow::Result<()> {
    let executor = common::CannedQueries::default().with(ORDERS, orders()).into_arc();
    let mut ctx = common::session().with_executor(executor);
    ctx.declare("@id", common::ty("int")?, None)?;
    ctx.declare("@customer", common::ty("varchar(20)")?, None)?;

    // forward-only loop, the shape generated WHILE @@FETCH_STATUS = 0 loops take
    ctx.declare_cursor("order_cur", ORDERS, parse_cursor_options("LOCAL FAST_FORWARD")?)?;
    assert_eq!(ctx.cursor_status("order_cur"), -1);
    ctx.open_cursor("order_cur")?;
    assert_eq!(ctx.cursor_status("order_cur"), 1);
    assert_eq!(common::eval(&ctx, "@@CURSOR_ROWS")?.as_int(), 3);

    let mut seen = Vec::new();
    ctx.fetch_into("order_cur", FetchDirection::Next, &["@id", "@customer"])?;
    while common::eval(&ctx, "@@FETCH_STATUS = 0")?.as_bool() {
        seen.push(ctx.get("@customer")?.as_string());
        ctx.fetch_into("order_cur", FetchDirection::Next, &["@id", "@customer"])?;
    }
    assert_eq!(seen, vec!["alpha", "beta", "gamma"]);
    assert_eq!(ctx.fetch_status(), -1);

    // forward-only cursors refuse to scroll
    assert!(ctx.fetch("order_cur", FetchDirection::First)?.is_none());
    assert_eq!(ctx.fetch_status(), -1);

    // deallocating an open cursor is refused
    assert!(ctx.deallocate_cursor("order_cur").is_err());
    ctx.close_cursor("order_cur")?;
    assert_eq!(ctx.cursor_status("order_cur"), -1);
    // fetching from a closed cursor is a miss, not an error
    assert!(ctx.fetch("order_cur", FetchDirection::Next)?.is_none());
    ctx.deallocate_cursor("order_cur")?;
    assert_eq!(ctx.cursor_status("order_cur"), -3);

    // scrollable cursor over rows supplied directly
    ctx.declare_cursor("scroll_cur", "n/a", CursorOptions::SCROLL | CursorOptions::LOCAL)?;
    ctx.open_cursor_with("scroll_cur", orders())?;
    let id = |row: Option<Vec<Value>>| row.map(|r| r[0].as_int());
    assert_eq!(id(ctx.fetch("scroll_cur", FetchDirection::First)?), Some(1));
    assert_eq!(id(ctx.fetch("scroll_cur", FetchDirection::Last)?), Some(3));
    assert_eq!(id(ctx.fetch("scroll_cur", FetchDirection::Absolute(2))?), Some(2));
    assert_eq!(id(ctx.fetch("scroll_cur", FetchDirection::Relative(-1))?), Some(1));
    assert_eq!(id(ctx.fetch("scroll_cur", FetchDirection::Absolute(-1))?), Some(3));
    assert_eq!(id(ctx.fetch("scroll_cur", FetchDirection::Next)?), None);
    assert_eq!(ctx.fetch_status(), -1);
    assert_eq!(id(ctx.fetch("scroll_cur", FetchDirection::Prior)?), Some(3));

    // fetched rows are copies
    let mut row = ctx.fetch("scroll_cur", FetchDirection::First)?.unwrap_or_default();
    row[1] = Value::varchar("changed");
    let again = ctx.fetch("scroll_cur", FetchDirection::First)?.unwrap_or_default();
    assert_eq!(again[1].as_string(), "alpha");

    let err = ctx
        .fetch_into("scroll_cur", FetchDirection::First, &["@id"])
        .unwrap_err();
    assert_eq!(err.number(), 16924);

    // a nested call sees the caller's cursor; a global cursor outlives the session
    ctx.declare_cursor("shared_cur", ORDERS, CursorOptions::GLOBAL)?;
    let mut child = ctx.child("usp_child", &[])?;
    child.open_cursor("shared_cur")?;
    assert!(child.fetch("shared_cur", FetchDirection::Next)?.is_some());
    ctx.return_from(child);
    assert_eq!(ctx.fetch_status(), 0);
    assert_eq!(ctx.cursor_status("shared_cur"), 1);

    let cursors = std::sync::Arc::clone(ctx.cursors());
    ctx.end_session();
    assert_eq!(cursors.status("scroll_cur"), -3);
    assert_eq!(cursors.status("shared_cur"), 1);

    // opening without an executor fails cleanly
    let mut bare = common::session();
    bare.declare_cursor("c", ORDERS, CursorOptions::empty())?;
    assert!(bare.open_cursor("c").is_err());
    assert!(bare.declare_cursor("c", ORDERS, CursorOptions::empty()).is_err());

    Ok(())
}
