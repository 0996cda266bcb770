mod common;

use common::*;
use insta::assert_snapshot;
use serde_json::{json, Map, Value};
use sql_db_meta::{
	filter::{translate, Direction, FilterValue, Operator},
	sql_tree::ObjectCategory,
	type_map::{ScalarKind, SemanticType},
	CacheConfig,
	ErrorKind,
	MetadataCache,
};

fn request(value: Value) -> Map<String, Value> {
	match value {
		Value::Object(map) => map,
		_ => Map::new(),
	}
}

fn shop() -> MetadataCache {
	let mut catalog = FakeCatalog::with_schemas(&["shop"]);
	catalog.add_table(table(
		"shop",
		"orders",
		vec![column("id", "integer"), column("status", "text"), column("tag", "text"), column("created_at", "timestamp with time zone")],
	));
	catalog.add_function(routine("shop", "order_lines", "p_order integer", "TABLE(id int, name text)", ObjectCategory::Function));
	catalog.add_function(routine("shop", "order_count", "p_status text DEFAULT 'open'::text", "integer", ObjectCategory::Function));
	catalog.add_function(routine("shop", "recent_orders", "p_limit integer DEFAULT 10", "SETOF orders", ObjectCategory::Function));
	catalog.add_function(routine("shop", "close_order", "IN p_id integer", "void", ObjectCategory::Procedure));
	catalog.add_function(routine("shop", "stamp", "", "trigger", ObjectCategory::Trigger));
	MetadataCache::build(CacheConfig::default(), &mut catalog).unwrap()
}

#[test]
fn unknown_fields_are_dropped_and_controls_applied() {
	let snapshot = shop().snapshot();
	let orders = &snapshot.tables["shop.orders"];
	let spec = translate(
		orders,
		&request(json!({"status": "active", "limit": 10, "order_by": "created_at", "unknown_field": "x"})),
	);

	assert_eq!(spec.predicates.len(), 1);
	assert_eq!(spec.predicates[0].column, "status");
	assert_eq!(spec.predicates[0].op, Operator::Eq);
	assert_eq!(spec.predicates[0].value, FilterValue::Single("active".into()));
	let order = spec.order.clone().unwrap();
	assert_eq!(order.column, "created_at");
	assert_eq!(order.direction, Direction::Asc);
	assert_eq!(spec.limit, Some(10));
	assert_eq!(spec.offset, None);

	let select = spec.to_select(orders);
	assert_snapshot!(select.sql, @r#"SELECT to_jsonb(t) FROM "shop"."orders" AS t WHERE "status" = $1::text::text ORDER BY "created_at" ASC LIMIT 10"#);
	assert_eq!(select.params, vec![Some("active".to_owned())]);
}

#[test]
fn membership_filter_binds_each_value() {
	let snapshot = shop().snapshot();
	let orders = &snapshot.tables["shop.orders"];
	let spec = translate(orders, &request(json!({"tag[in]": "a,b,c"})));

	assert_eq!(spec.predicates.len(), 1);
	assert_eq!(spec.predicates[0].op, Operator::In);
	match &spec.predicates[0].value {
		FilterValue::List(values) => {
			let mut sorted = values.clone();
			sorted.sort();
			assert_eq!(sorted, ["a", "b", "c"]);
		},
		other => panic!("expected a list, got {:?}", other),
	}

	let select = spec.to_select(orders);
	assert_snapshot!(select.sql, @r#"SELECT to_jsonb(t) FROM "shop"."orders" AS t WHERE "tag" IN ($1::text::text, $2::text::text, $3::text::text)"#);
	assert_eq!(select.params.len(), 3);
}

#[test]
fn filtered_fetch_goes_through_the_executor() {
	let snapshot = shop().snapshot();
	let orders = &snapshot.tables["shop.orders"];
	let spec = translate(orders, &request(json!({"id[gte]": "5", "order_dir": "desc"})));
	let mut executor = FakeExecutor {
		rows: vec![json!({"id": 5})],
		..FakeExecutor::default()
	};

	let rows = spec.fetch(orders, &mut executor).unwrap();
	assert_eq!(rows, [json!({"id": 5})]);
	let (sql, params) = &executor.statements[0];
	assert_snapshot!(sql, @r#"SELECT to_jsonb(t) FROM "shop"."orders" AS t WHERE "id" >= $1::text::integer"#);
	assert_eq!(params, &[Some("5".to_owned())]);
}

#[test]
fn table_grammar_yields_one_field_per_column() {
	let plan = shop().plan_routine("shop", "order_lines").unwrap();
	let fields: Vec<_> = plan.output.fields.iter().map(|f| (f.name.as_str(), f.ty.clone())).collect();
	assert_eq!(
		fields,
		[
			("id", SemanticType::Scalar(ScalarKind::Integer)),
			("name", SemanticType::Scalar(ScalarKind::Text)),
		]
	);
	assert!(plan.returns_list);
}

#[test]
fn scalar_return_yields_a_single_result_field() {
	let plan = shop().plan_routine("shop", "order_count").unwrap();
	assert_eq!(plan.output.fields.len(), 1);
	assert_eq!(plan.output.fields[0].name, "result");
	assert_eq!(plan.output.fields[0].ty, SemanticType::Scalar(ScalarKind::Integer));
	assert!(!plan.returns_list);
}

#[test]
fn invoking_a_scalar_function_collapses_the_row() {
	let plan = shop().plan_routine("shop", "order_count").unwrap();
	let mut executor = FakeExecutor {
		rows: vec![json!({"order_count": 3})],
		..FakeExecutor::default()
	};

	let result = plan.invoke(&mut executor, &json!({})).unwrap();
	assert_eq!(result, json!({"result": 3}));
	let (sql, params) = &executor.statements[0];
	assert_snapshot!(sql, @r#"SELECT row_to_json(r) FROM (SELECT * FROM "shop"."order_count"()) AS r"#);
	assert!(params.is_empty());
}

#[test]
fn setof_relation_resolves_to_its_columns() {
	let plan = shop().plan_routine("shop", "recent_orders").unwrap();
	let names: Vec<_> = plan.output.fields.iter().map(|f| f.name.as_str()).collect();
	assert_eq!(names, ["id", "status", "tag", "created_at"]);

	let mut executor = FakeExecutor::default();
	assert_eq!(plan.invoke(&mut executor, &json!({"p_limit": "3"})).unwrap(), json!([]));
	assert_eq!(executor.statements[0].1, [Some("3".to_owned())]);
}

#[test]
fn procedures_report_success() {
	let plan = shop().plan_routine("shop", "close_order").unwrap();
	let mut executor = FakeExecutor::default();
	let result = plan.invoke(&mut executor, &json!({"p_id": 9})).unwrap();
	assert_eq!(result["status"], "success");
	assert_snapshot!(executor.statements[0].0.as_str(), @r#"CALL "shop"."close_order"($1::text::integer)"#);
}

#[test]
fn request_errors_map_to_http_classes() {
	let cache = shop();
	assert_eq!(cache.plan_routine("shop", "missing").unwrap_err().kind(), ErrorKind::NotFound);
	assert_eq!(cache.plan_routine("shop", "stamp").unwrap_err().kind(), ErrorKind::BadRequest);

	let plan = cache.plan_routine("shop", "order_lines").unwrap();
	let err = plan.invoke(&mut FakeExecutor::default(), &json!({"p_order": "not a number"})).unwrap_err();
	assert_eq!(err.kind().status_code(), 400);
}
