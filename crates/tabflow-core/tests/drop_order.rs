use tabflow_core::{drop_order, Connector, DataType, MemoryConnector, Schema};

fn schema() -> Schema { Schema::new().with_column("id", DataType::Integer) }

#[test]
fn foreign_keys_order_children_first() {
    let mem = MemoryConnector::new("mem");
    let a = mem.create_table("a", schema(), vec![]).expect("a");
    let b = mem.create_table("b", schema(), vec![]).expect("b");
    let c = mem.create_table("c", schema(), vec![]).expect("c");
    mem.add_reference("b", "a").expect("b -> a");
    mem.add_reference("c", "b").expect("c -> b");

    let order = drop_order(&[a.clone(), b.clone(), c.clone()]);
    assert!(!order.is_fallback());
    assert_eq!(order.uris(), vec!["c@mem", "b@mem", "a@mem"]);

    mem.drop_resources(&order.resources).expect("drop in order");
    assert!(mem.list("*").expect("list").is_empty());
}

#[test]
fn parents_outside_the_set_are_ignored() {
    let mem = MemoryConnector::new("mem");
    mem.create_table("customers", schema(), vec![]).expect("customers");
    let orders = mem.create_table("orders", schema(), vec![]).expect("orders");
    let notes = mem.create_table("notes", schema(), vec![]).expect("notes");
    mem.add_reference("orders", "customers").expect("orders -> customers");

    let order = drop_order(&[orders, notes]);
    assert!(!order.is_fallback());
    assert_eq!(order.uris(), vec!["orders@mem", "notes@mem"]);
}

#[test]
fn cycles_fall_back_to_the_given_order_without_duplicates() {
    let mem = MemoryConnector::new("mem");
    let x = mem.create_table("x", schema(), vec![]).expect("x");
    let y = mem.create_table("y", schema(), vec![]).expect("y");
    mem.add_reference("x", "y").expect("x -> y");
    mem.add_reference("y", "x").expect("y -> x");

    let order = drop_order(&[x.clone(), y, x]);
    assert!(order.is_fallback());
    assert!(order.fallback.as_deref().unwrap_or_default().contains("cyclic"));
    assert_eq!(order.uris(), vec!["x@mem", "y@mem"]);
}

#[test]
fn views_are_dropped_before_their_tables() {
    let mem = MemoryConnector::new("mem");
    let base = mem.create_table("base", schema(), vec![]).expect("base");
    let view = mem.create_view("summary", schema(), &["base"]).expect("view");
    let order = drop_order(&[base, view]);
    assert_eq!(order.uris(), vec!["summary@mem", "base@mem"]);
}
