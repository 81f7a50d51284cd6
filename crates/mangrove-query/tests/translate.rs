//! End-to-end translation tests against the identity resolver, plus a
//! schema-aware resolver exercising renames, join conditions, and
//! injected filters.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use mangrove_query::{
    translate, ColumnTranslation, DefaultResolver, JoinSpec, NameResolver, QueryRequest,
    TableTranslation, TranslateError, Translator,
};
use mangrove_sql::{CompareOp, FilterExpr, JoinKind, Params, Statement};

fn request(body: Value) -> QueryRequest {
    serde_json::from_value(body).unwrap()
}

fn selector_filters(selector: Value) -> Result<FilterExpr, TranslateError> {
    let mut translator = Translator::new(&DefaultResolver);
    Ok(translator.selector_filters(&selector, "veteran")?.build())
}

fn render(statement: &Statement) -> (String, Params) {
    let mut params = Params::new();
    let sql = statement.render(&mut params).unwrap();
    (sql, params)
}

fn eq(field: &str, value: Value) -> FilterExpr {
    FilterExpr::comparison(field, CompareOp::Eq, value)
}

// =============================================================================
// Selector parsing
// =============================================================================

#[test]
fn test_selector_explicit_everything() {
    let filter = selector_filters(json!({"$and": [
        {"veteran.f_name": {"$eq": "Charlie"}},
        {"veteran.l_name": {"$eq": "Smith"}},
    ]}))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::And(vec![
            eq("veteran.f_name", json!("Charlie")),
            eq("veteran.l_name", json!("Smith")),
        ])
    );
}

#[test]
fn test_selector_with_not() {
    let filter = selector_filters(json!({"$and": [
        {"veteran.f_name": {"$not": {"$eq": "Charlie"}}},
        {"veteran.l_name": {"$not": {"$eq": "Smith"}}},
    ]}))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::And(vec![
            FilterExpr::Not(Box::new(eq("veteran.f_name", json!("Charlie")))),
            FilterExpr::Not(Box::new(eq("veteran.l_name", json!("Smith")))),
        ])
    );
}

#[test]
fn test_selector_implicit_table() {
    let filter = selector_filters(json!({"$and": [
        {"f_name": {"$eq": "Charlie"}},
        {"l_name": {"$eq": "Smith"}},
    ]}))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::And(vec![
            eq("veteran.f_name", json!("Charlie")),
            eq("veteran.l_name", json!("Smith")),
        ])
    );
}

#[test]
fn test_selector_implicit_group() {
    let filter = selector_filters(json!({
        "veteran.f_name": {"$eq": "Charlie"},
        "veteran.l_name": {"$eq": "Smith"},
    }))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::And(vec![
            eq("veteran.f_name", json!("Charlie")),
            eq("veteran.l_name", json!("Smith")),
        ])
    );
}

#[test]
fn test_selector_implicit_everything() {
    let filter = selector_filters(json!({
        "f_name": "Charlie",
        "l_name": "Smith",
    }))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::And(vec![
            eq("veteran.f_name", json!("Charlie")),
            eq("veteran.l_name", json!("Smith")),
        ])
    );
}

#[test]
fn test_selector_single_condition_collapses() {
    let filter = selector_filters(json!({"f_name": "Charlie"})).unwrap();
    assert_eq!(filter, eq("veteran.f_name", json!("Charlie")));
}

#[test]
fn test_selector_nested_fields() {
    let filter = selector_filters(json!({
        "user": {"f_name": "Charlie", "l_name": "Smith"},
    }))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::And(vec![
            eq("user.f_name", json!("Charlie")),
            eq("user.l_name", json!("Smith")),
        ])
    );
}

#[test]
fn test_selector_nested_fields_explicit_operator() {
    let filter = selector_filters(json!({
        "user": {"f_name": {"$eq": "Charlie"}},
    }))
    .unwrap();
    assert_eq!(filter, eq("user.f_name", json!("Charlie")));
}

#[test]
fn test_selector_or_group() {
    let filter = selector_filters(json!({"$or": [
        {"f_name": "Charlie"},
        {"f_name": "Frank"},
    ]}))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::Or(vec![
            eq("veteran.f_name", json!("Charlie")),
            eq("veteran.f_name", json!("Frank")),
        ])
    );
}

#[test]
fn test_selector_nor_group() {
    let filter = selector_filters(json!({"$nor": [
        {"f_name": "Charlie"},
        {"f_name": "Frank"},
    ]}))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::Not(Box::new(FilterExpr::Or(vec![
            eq("veteran.f_name", json!("Charlie")),
            eq("veteran.f_name", json!("Frank")),
        ])))
    );
}

#[test]
fn test_selector_nand_group() {
    let filter = selector_filters(json!({"$nand": [
        {"f_name": "Charlie"},
        {"l_name": "Smith"},
    ]}))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::Not(Box::new(FilterExpr::And(vec![
            eq("veteran.f_name", json!("Charlie")),
            eq("veteran.l_name", json!("Smith")),
        ])))
    );
}

#[test]
fn test_selector_comparison_operators() {
    let filter = selector_filters(json!({"age": {"$gte": 21, "$lt": 65}})).unwrap();
    assert_eq!(
        filter,
        FilterExpr::And(vec![
            FilterExpr::comparison("veteran.age", CompareOp::Gte, json!(21)),
            FilterExpr::comparison("veteran.age", CompareOp::Lt, json!(65)),
        ])
    );
}

#[test]
fn test_selector_in_and_contains() {
    let filter = selector_filters(json!({
        "id": {"$in": [1, 2]},
        "notes": {"$contains": "flag"},
    }))
    .unwrap();
    assert_eq!(
        filter,
        FilterExpr::And(vec![
            FilterExpr::comparison("veteran.id", CompareOp::In, json!([1, 2])),
            FilterExpr::comparison("veteran.notes", CompareOp::LikeWithin, json!("flag")),
        ])
    );
}

#[test]
fn test_selector_empty_polarity() {
    let empty = selector_filters(json!({"notes": {"$empty": true}})).unwrap();
    let not_empty = selector_filters(json!({"notes": {"$empty": false}})).unwrap();
    assert_eq!(
        empty,
        FilterExpr::Or(vec![
            FilterExpr::comparison("veteran.notes", CompareOp::Eq, Value::Null),
            FilterExpr::comparison("veteran.notes", CompareOp::Eq, json!("")),
        ])
    );
    assert_eq!(
        not_empty,
        FilterExpr::And(vec![
            FilterExpr::comparison("veteran.notes", CompareOp::Ne, Value::Null),
            FilterExpr::comparison("veteran.notes", CompareOp::Ne, json!("")),
        ])
    );
    // $not-empty flips the same way
    assert_eq!(
        selector_filters(json!({"notes": {"$not-empty": true}})).unwrap(),
        not_empty
    );
    assert_eq!(
        selector_filters(json!({"notes": {"$not-empty": false}})).unwrap(),
        empty
    );
}

#[test]
fn test_selector_operator_outside_field_is_rejected() {
    assert!(matches!(
        selector_filters(json!({"$eq": "Charlie"})),
        Err(TranslateError::OperatorOutsideField { .. })
    ));
}

#[test]
fn test_selector_unknown_key_is_rejected() {
    assert!(matches!(
        selector_filters(json!({"$bogus": 1})),
        Err(TranslateError::UnknownKey(key)) if key == "$bogus"
    ));
    assert!(matches!(
        selector_filters(json!({"f-name": 1})),
        Err(TranslateError::UnknownKey(_))
    ));
}

#[test]
fn test_selector_list_under_field_is_rejected() {
    assert!(matches!(
        selector_filters(json!({"f_name": [1, 2]})),
        Err(TranslateError::InvalidSelector { .. })
    ));
}

#[test]
fn test_selector_unresolvable_field_is_rejected() {
    assert!(matches!(
        selector_filters(json!({"a.b.c": 1})),
        Err(TranslateError::UnknownKey(_))
    ));
}

// =============================================================================
// Fields and joins
// =============================================================================

#[test]
fn test_translate_joins() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": ["cvso.f_name"]})),
        "veteran",
    )
    .unwrap();
    let (sql, params) = render(&statement);
    assert_eq!(
        sql,
        "SELECT `cvso`.`f_name` AS `cvso.f_name` FROM veteran AS `veteran` JOIN cvso AS `cvso` ;"
    );
    assert!(params.is_empty());
}

#[test]
fn test_translate_joins_left() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": ["cvso.f_name"], "join": "left"})),
        "veteran",
    )
    .unwrap();
    let (sql, _) = render(&statement);
    assert_eq!(
        sql,
        "SELECT `cvso`.`f_name` AS `cvso.f_name` FROM veteran AS `veteran` LEFT JOIN cvso AS `cvso` ;"
    );
}

#[test]
fn test_translate_joins_each_table_once() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": ["cvso.f_name", "cvso.l_name"]})),
        "veteran",
    )
    .unwrap();
    let (sql, _) = render(&statement);
    assert_eq!(sql.matches("JOIN").count(), 1, "got: {sql}");
}

#[test]
fn test_translate_plain_fields_get_base_table() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": ["f_name", "l_name"]})),
        "veteran",
    )
    .unwrap();
    let (sql, _) = render(&statement);
    assert_eq!(
        sql,
        "SELECT `veteran`.`f_name` AS `f_name`, `veteran`.`l_name` AS `l_name` \
         FROM veteran AS `veteran` ;"
    );
}

#[test]
fn test_translate_aggregate_field() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": [{"$max": "veteran.dob"}]})),
        "veteran",
    )
    .unwrap();
    let (sql, _) = render(&statement);
    assert_eq!(
        sql,
        "SELECT MAX(veteran.dob) AS `$max.veteran.dob` FROM veteran AS `veteran` ;"
    );
}

#[test]
fn test_translate_value_directive_with_implicit_table() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": [{"$value": "f_name"}]})),
        "veteran",
    )
    .unwrap();
    let (sql, _) = render(&statement);
    assert_eq!(
        sql,
        "SELECT `veteran`.`f_name` AS `$value.f_name` FROM veteran AS `veteran` ;"
    );
}

#[test]
fn test_translate_concat_directive() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": [{"$concat": "tags"}]})),
        "veteran",
    )
    .unwrap();
    let (sql, _) = render(&statement);
    assert!(
        sql.contains("GROUP_CONCAT(veteran.tags ORDER BY veteran.tags SEPARATOR ', ')"),
        "got: {sql}"
    );
}

#[test]
fn test_translate_unknown_aggregate_is_rejected() {
    let result = translate(
        &DefaultResolver,
        &request(json!({"fields": [{"$median": "dob"}]})),
        "veteran",
    );
    assert!(matches!(
        result,
        Err(TranslateError::UnknownAggregate(d)) if d == "$median"
    ));
}

#[test]
fn test_translate_no_fields_is_rejected() {
    let result = translate(
        &DefaultResolver,
        &request(json!({"fields": []})),
        "veteran",
    );
    assert!(matches!(result, Err(TranslateError::NoFields)));
}

#[test]
fn test_translate_unknown_base_table_is_rejected() {
    let result = translate(
        &DefaultResolver,
        &request(json!({"fields": ["f_name"]})),
        "not a table",
    );
    assert!(matches!(
        result,
        Err(TranslateError::UnknownBaseTable(t)) if t == "not a table"
    ));
}

#[test]
fn test_translate_unknown_field_is_rejected() {
    let result = translate(
        &DefaultResolver,
        &request(json!({"fields": ["no;good"]})),
        "veteran",
    );
    assert!(matches!(result, Err(TranslateError::UnknownField(_))));
}

// =============================================================================
// Sort, group, limit
// =============================================================================

#[test]
fn test_order_by_single_implicit_direction() {
    let mut translator = Translator::new(&DefaultResolver);
    assert_eq!(
        translator.order_by(&json!("l_name"), "veteran").unwrap(),
        "veteran.l_name"
    );
}

#[test]
fn test_order_by_list_implicit_direction() {
    let mut translator = Translator::new(&DefaultResolver);
    assert_eq!(
        translator
            .order_by(&json!(["f_name", "l_name"]), "veteran")
            .unwrap(),
        "veteran.f_name, veteran.l_name"
    );
}

#[test]
fn test_order_by_list_explicit_direction() {
    let mut translator = Translator::new(&DefaultResolver);
    assert_eq!(
        translator
            .order_by(&json!([{"f_name": "desc"}, {"l_name": "asc"}]), "veteran")
            .unwrap(),
        "veteran.f_name DESC, veteran.l_name ASC"
    );
}

#[test]
fn test_order_by_single_explicit_direction() {
    let mut translator = Translator::new(&DefaultResolver);
    assert_eq!(
        translator
            .order_by(&json!({"l_name": "asc"}), "veteran")
            .unwrap(),
        "veteran.l_name ASC"
    );
}

#[test]
fn test_order_by_unknown_direction_is_rejected() {
    let mut translator = Translator::new(&DefaultResolver);
    assert!(matches!(
        translator.order_by(&json!({"l_name": "sideways"}), "veteran"),
        Err(TranslateError::UnknownSortDirection(_))
    ));
}

#[test]
fn test_group_by_single() {
    let mut translator = Translator::new(&DefaultResolver);
    assert_eq!(
        translator.group_by(&json!("l_name"), "veteran").unwrap(),
        "veteran.l_name"
    );
}

#[test]
fn test_group_by_list() {
    let mut translator = Translator::new(&DefaultResolver);
    assert_eq!(
        translator
            .group_by(&json!(["f_name", "l_name"]), "veteran")
            .unwrap(),
        "veteran.f_name, veteran.l_name"
    );
}

#[test]
fn test_group_by_invalid_value_is_rejected() {
    let mut translator = Translator::new(&DefaultResolver);
    assert!(matches!(
        translator.group_by(&json!(7), "veteran"),
        Err(TranslateError::InvalidGroupBy(_))
    ));
}

#[test]
fn test_translate_limit_only() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": ["f_name"], "limit": 25})),
        "veteran",
    )
    .unwrap();
    let (sql, params) = render(&statement);
    assert!(sql.ends_with("LIMIT :limit_count ;"), "got: {sql}");
    assert_eq!(params.get("limit_count"), Some(&json!(25)));
}

#[test]
fn test_translate_limit_and_skip() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": ["f_name"], "limit": 25, "skip": 50})),
        "veteran",
    )
    .unwrap();
    let (sql, params) = render(&statement);
    assert!(sql.ends_with("LIMIT :limit_skip, :limit_count ;"), "got: {sql}");
    assert_eq!(params.get("limit_skip"), Some(&json!(50)));
    assert_eq!(params.get("limit_count"), Some(&json!(25)));
}

#[test]
fn test_translate_skip_without_limit_is_ignored() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({"fields": ["f_name"], "skip": 50})),
        "veteran",
    )
    .unwrap();
    let (sql, params) = render(&statement);
    assert!(!sql.contains("LIMIT"), "got: {sql}");
    assert!(params.is_empty());
}

#[test]
fn test_translate_full_query() {
    let statement = translate(
        &DefaultResolver,
        &request(json!({
            "fields": ["f_name"],
            "selector": {"l_name": "Smith"},
            "sort": {"f_name": "asc"},
            "limit": 10,
        })),
        "veteran",
    )
    .unwrap();
    let (sql, params) = render(&statement);
    assert_eq!(
        sql,
        "SELECT `veteran`.`f_name` AS `f_name` FROM veteran AS `veteran` \
         WHERE (`veteran`.`l_name` = :l_name_p0) \
         ORDER BY veteran.f_name ASC LIMIT :limit_count ;"
    );
    assert_eq!(params.get("l_name_p0"), Some(&json!("Smith")));
    assert_eq!(params.get("limit_count"), Some(&json!(10)));
}

// =============================================================================
// Schema-aware resolver
// =============================================================================

/// Renames tables and columns, joins with a real condition, and hides
/// archived rows everywhere.
struct SchemaResolver;

impl SchemaResolver {
    fn veterans() -> TableTranslation {
        TableTranslation {
            alias: "veterans".to_string(),
            table: "tbl_veteran".to_string(),
            joins: BTreeMap::new(),
        }
    }
}

impl NameResolver for SchemaResolver {
    fn base_table(&self, alias: &str) -> Option<TableTranslation> {
        (alias == "veterans").then(Self::veterans)
    }

    fn field(&self, alias: &str, _base_table: &str) -> Option<ColumnTranslation> {
        match alias {
            "veterans.name" => Some(ColumnTranslation {
                alias: alias.to_string(),
                selector: "veterans.full_name".to_string(),
                table: Self::veterans(),
            }),
            "office.city" => Some(ColumnTranslation {
                alias: alias.to_string(),
                selector: "office.city".to_string(),
                table: TableTranslation {
                    alias: "office".to_string(),
                    table: "tbl_office".to_string(),
                    joins: BTreeMap::from([(
                        "office".to_string(),
                        JoinSpec {
                            table: "tbl_office".to_string(),
                            condition: Some("office.id = veterans.office_id".to_string()),
                            kind: Some(JoinKind::Left),
                        },
                    )]),
                },
            }),
            _ => None,
        }
    }

    fn extra_filters(&self, tables: &BTreeMap<String, TableTranslation>) -> Option<FilterExpr> {
        tables
            .contains_key("veterans")
            .then(|| eq("veterans.archived", json!(0)))
    }
}

#[test]
fn test_schema_resolver_renames_and_joins() {
    let statement = translate(
        &SchemaResolver,
        &request(json!({"fields": ["veterans.name", "office.city"]})),
        "veterans",
    )
    .unwrap();
    let (sql, params) = render(&statement);
    assert_eq!(
        sql,
        "SELECT `veterans`.`full_name` AS `veterans.name`, `office`.`city` AS `office.city` \
         FROM tbl_veteran AS `veterans` \
         LEFT JOIN tbl_office AS `office` ON office.id = veterans.office_id \
         WHERE (`veterans`.`archived` = :archived_p0) ;"
    );
    assert_eq!(params.get("archived_p0"), Some(&json!(0)));
}

#[test]
fn test_schema_resolver_rejects_unknown_names() {
    let result = translate(
        &SchemaResolver,
        &request(json!({"fields": ["veterans.ssn"]})),
        "veterans",
    );
    assert!(matches!(
        result,
        Err(TranslateError::UnknownField(f)) if f == "veterans.ssn"
    ));
}
