use repo_harness::{Criteria, Data, Expression, Filter, HarnessError, Order, Value};

use crate::support::entities::{ASSOCIATION, ASSOCIATION_HOST, EMBEDDABLE_HOST, MULTI_A, MULTI_B, PLAIN};
use crate::support::harness;

#[tokio::test]
async fn quirky_association_field_names_do_not_clash() {
    let mut h = harness().await;
    let filter = || {
        Filter::new()
            .nested("assoc", Filter::new().eq("val", "a"))
            .eq("_assoc_val", "b")
    };
    h.dont_see_in_repository(ASSOCIATION_HOST, filter()).await.unwrap();

    let id = h
        .have_in_repository(ASSOCIATION, Data::new().with("val", "a"))
        .await
        .unwrap();
    let association = h
        .grab_entity_from_repository(ASSOCIATION, Filter::new().eq("id", Value::from(id)))
        .await
        .unwrap();
    h.have_in_repository(
        ASSOCIATION_HOST,
        Data::new().with("assoc", association).with("_assoc_val", "b"),
    )
    .await
    .unwrap();

    h.see_in_repository(ASSOCIATION_HOST, filter()).await.unwrap();
}

#[tokio::test]
async fn quirky_embeddable_field_names_do_not_clash() {
    let mut h = harness().await;
    let filter = || Filter::new().eq("embed.val", "a").eq("embedval", "b");
    h.dont_see_in_repository(EMBEDDABLE_HOST, filter()).await.unwrap();
    h.have_in_repository(
        EMBEDDABLE_HOST,
        Data::new().with("embed.val", "a").with("embedval", "b"),
    )
    .await
    .unwrap();
    h.see_in_repository(EMBEDDABLE_HOST, filter()).await.unwrap();
    h.dont_see_in_repository(EMBEDDABLE_HOST, Filter::new().eq("embed.val", "b"))
        .await
        .unwrap();
}

#[tokio::test]
async fn criteria_are_merged_into_the_query() {
    let mut h = harness().await;
    h.have_in_repository(PLAIN, Data::new().with("name", "Test 1"))
        .await
        .unwrap();

    for expr in [
        Expression::eq("name", "Test 1"),
        Expression::contains("name", "est"),
        Expression::is_in("name", ["Test 1"]),
    ] {
        let criteria = Criteria::new().and_where(expr);
        h.see_in_repository(PLAIN, Filter::new().criteria(criteria))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn bare_expressions_are_wrapped_in_criteria() {
    let mut h = harness().await;
    h.have_in_repository(PLAIN, Data::new().with("name", "Test 1"))
        .await
        .unwrap();

    for expr in [
        Expression::eq("name", "Test 1"),
        Expression::contains("name", "est"),
        Expression::is_in("name", ["Test 1"]),
    ] {
        h.see_in_repository(PLAIN, Filter::new().expr(expr)).await.unwrap();
    }
    h.dont_see_in_repository(PLAIN, Filter::new().expr(Expression::starts_with("name", "est")))
        .await
        .unwrap();
}

#[tokio::test]
async fn key_paired_with_an_expression_is_ignored() {
    let mut h = harness().await;
    h.have_in_repository(PLAIN, Data::new().with("name", "Test 1"))
        .await
        .unwrap();
    let filter = Filter::new().with("no_such_field", Expression::eq("name", "Test 1"));
    h.see_in_repository(PLAIN, filter).await.unwrap();
}

#[tokio::test]
async fn criteria_ordering_is_applied() {
    let mut h = harness().await;
    for name in ["a", "b", "c"] {
        h.have_in_repository(PLAIN, Data::new().with("name", name))
            .await
            .unwrap();
    }

    let names = |entities: Vec<repo_harness::EntityRef>| -> Vec<Value> {
        entities.iter().map(|e| e.get_or_null("name")).collect()
    };

    let asc = h
        .grab_entities_from_repository(PLAIN, Filter::new().criteria(Criteria::new().order_by("name", Order::Asc)))
        .await
        .unwrap();
    assert_eq!(names(asc), vec![Value::from("a"), Value::from("b"), Value::from("c")]);

    let desc = h
        .grab_entities_from_repository(PLAIN, Filter::new().criteria(Criteria::new().order_by("name", Order::Desc)))
        .await
        .unwrap();
    assert_eq!(names(desc), vec![Value::from("c"), Value::from("b"), Value::from("a")]);
}

#[tokio::test]
async fn null_filter_values_test_for_null() {
    let mut h = harness().await;
    h.have_in_repository(PLAIN, Data::new()).await.unwrap();
    h.see_in_repository(PLAIN, Filter::new().is_null("name")).await.unwrap();
    h.dont_see_in_repository(PLAIN, Filter::new().eq("name", "anything"))
        .await
        .unwrap();
}

#[tokio::test]
async fn nested_filters_join_through_to_many_associations() {
    let mut h = harness().await;
    let data = Data::new()
        .with("name", "parent")
        .with("b", vec![Data::new().with("name", "child")]);
    h.have_in_repository(MULTI_A, data).await.unwrap();

    h.see_in_repository(MULTI_A, Filter::new().nested("b", Filter::new().eq("name", "child")))
        .await
        .unwrap();
    h.see_in_repository(MULTI_B, Filter::new().nested("a", Filter::new().eq("name", "parent")))
        .await
        .unwrap();
    h.dont_see_in_repository(MULTI_A, Filter::new().nested("b", Filter::new().eq("name", "nobody")))
        .await
        .unwrap();
}

#[tokio::test]
async fn grab_from_repository_selects_one_field() {
    let mut h = harness().await;
    let id = h
        .have_in_repository(PLAIN, Data::new().with("name", "grabbed"))
        .await
        .unwrap();
    let value = h
        .grab_from_repository(PLAIN, "id", Filter::new().eq("name", "grabbed"))
        .await
        .unwrap();
    assert_eq!(value, Value::from(id));
}

#[tokio::test]
async fn single_result_grabs_require_exactly_one_row() {
    let mut h = harness().await;
    let missing = h
        .grab_entity_from_repository(PLAIN, Filter::new().eq("name", "missing"))
        .await
        .unwrap_err();
    assert!(matches!(missing, HarnessError::NonUniqueOrMissingResult { found: 0, .. }));

    for _ in 0..2 {
        h.have_in_repository(PLAIN, Data::new().with("name", "twin"))
            .await
            .unwrap();
    }
    let twins = h
        .grab_from_repository(PLAIN, "name", Filter::new().eq("name", "twin"))
        .await
        .unwrap_err();
    assert!(matches!(twins, HarnessError::NonUniqueOrMissingResult { found: 2, .. }));
}

#[tokio::test]
async fn failed_presence_check_describes_the_filter() {
    let mut h = harness().await;
    let err = h
        .see_in_repository(PLAIN, Filter::new().eq("name", "nobody"))
        .await
        .unwrap_err();
    assert!(err.is_assertion_failure());
    assert_eq!(
        err.to_string(),
        "PlainEntity with {\"name\":\"nobody\"}\nFailed asserting that false is True."
    );
}

#[tokio::test]
async fn filtering_on_an_unknown_field_is_an_error() {
    let mut h = harness().await;
    let err = h
        .see_in_repository(PLAIN, Filter::new().eq("nickname", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::UnknownField { .. }));
}

#[tokio::test]
async fn ordering_attached_to_a_joined_level_sorts_the_roots() {
    let mut h = harness().await;
    for (parent, child) in [("first", "z"), ("second", "m"), ("third", "a")] {
        let data = Data::new()
            .with("name", parent)
            .with("b", vec![Data::new().with("name", child)]);
        h.have_in_repository(MULTI_A, data).await.unwrap();
    }

    let filter = Filter::new().nested(
        "b",
        Filter::new().criteria(Criteria::new().order_by("name", Order::Asc)),
    );
    let roots = h.grab_entities_from_repository(MULTI_A, filter).await.unwrap();
    let names: Vec<Value> = roots.iter().map(|e| e.get_or_null("name")).collect();
    assert_eq!(
        names,
        vec![Value::from("third"), Value::from("second"), Value::from("first")]
    );
}
