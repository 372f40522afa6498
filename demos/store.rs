//! Demonstration of Store for managing todo list state
//!
//! Run with `RUST_LOG=tincan=debug cargo run --example store` to see the
//! store's own tracing output.

use serde_json::json;
use tincan::{Change, State, Store};
use tracing_subscriber::EnvFilter;

fn main() -> tincan::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Todo Store Demo ===\n");

    let store = Store::new(State::from_value(json!({
        "todos": { "items": [], "next_id": 0 },
        "filter": { "show": "all" },
        "stats": { "total": 0 }
    }))?);

    // Keep derived stats in sync: this listener applies its own change, which
    // the store delivers right after the current pass.
    let weak = store.downgrade();
    store.subscribe(move |previous, current, _| {
        if previous.shares_root(current, "todos") {
            return;
        }
        let total = current
            .field("todos", "items")
            .and_then(|items| items.as_array())
            .map_or(0, Vec::len);
        if let Some(store) = weak.upgrade() {
            if let Err(err) = store.apply_change(Change::new("STATS").set("stats", "total", total)) {
                eprintln!("failed to update stats: {err}");
            }
        }
    });

    let logger = store.subscribe(|_, current, change| {
        println!(
            "[{}] total={} filter={}",
            change.kind().unwrap_or("?"),
            current.field("stats", "total").unwrap_or(&json!(null)),
            current.field("filter", "show").unwrap_or(&json!(null)),
        );
    });

    for title in ["Learn tincan", "Write docs", "Ship it"] {
        let state = store.get();
        let mut items = state
            .field("todos", "items")
            .and_then(|items| items.as_array())
            .cloned()
            .unwrap_or_default();
        let id = state
            .field("todos", "next_id")
            .and_then(|id| id.as_u64())
            .unwrap_or(0);
        items.push(json!({ "id": id, "title": title, "completed": false }));

        store.apply_change(
            Change::new("ADD_TODO")
                .set("todos", "items", items)
                .set("todos", "next_id", id + 1),
        )?;
    }

    store.apply_change(Change::new("SET_FILTER").set("filter", "show", "active"))?;

    // Unknown roots are rejected and leave the state as it was.
    if let Err(err) = store.apply_change(Change::new("OOPS").set("settings", "theme", "dark")) {
        println!("\nrejected: {err}");
    }

    logger.unsubscribe();
    store.reset_and_apply_change(Change::new("CLEAR"))?;

    println!("\nFinal state: {}", serde_json::to_string_pretty(&*store.get()).unwrap_or_default());
    Ok(())
}
