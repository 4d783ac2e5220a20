use repo_harness::{Data, Filter, HarnessError, PrimaryKey, PropertyAccessor, Value};
use serde_json::json;

use crate::support::entities::{
    COMPOSITE_PK, MULTI_A, MULTI_B, MULTI_C, NON_TYPICAL_PK, PLAIN, WITH_CTOR, WITH_EMBEDDABLE, WITH_UUID,
};
use crate::support::harness;

#[tokio::test]
async fn plain_entity() {
    let mut h = harness().await;
    let filter = || Filter::new().eq("name", "Test 1");
    h.dont_see_in_repository(PLAIN, filter()).await.unwrap();
    let pk = h
        .have_in_repository(PLAIN, Data::new().with("name", "Test 1"))
        .await
        .unwrap();
    h.see_in_repository(PLAIN, filter()).await.unwrap();
    assert!(matches!(pk, PrimaryKey::Single(Value::Int(id)) if id > 0));
}

#[tokio::test]
async fn constructor_parameters_fall_back_to_defaults() {
    let mut h = harness().await;
    let filter = || {
        Filter::new()
            .eq("name", "Constructor Test 1")
            .eq("foo", "test")
            .eq("bar", "foobar")
    };
    h.dont_see_in_repository(WITH_CTOR, filter()).await.unwrap();
    h.have_in_repository(
        WITH_CTOR,
        Data::new().with("name", "Constructor Test 1").with("foo", "test"),
    )
    .await
    .unwrap();
    h.see_in_repository(WITH_CTOR, filter()).await.unwrap();
}

#[tokio::test]
async fn preconstructed_entity_is_persisted_as_is() {
    let mut h = harness().await;
    let meta = h.entity_manager().await.unwrap().metadata(WITH_CTOR).unwrap();
    let entity = PropertyAccessor::instantiate(
        &meta,
        &[
            ("name".to_string(), Value::from("Constructor Test 1")),
            ("foo".to_string(), Value::from("test")),
        ],
    )
    .unwrap();

    h.have_in_repository(&entity, Data::new()).await.unwrap();
    h.see_in_repository(
        WITH_CTOR,
        Filter::new()
            .eq("name", "Constructor Test 1")
            .eq("foo", "test")
            .eq("bar", "foobar"),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn missing_constructor_parameter_is_reported() {
    let mut h = harness().await;
    let err = h.have_in_repository(WITH_CTOR, Data::new()).await.unwrap_err();
    assert!(matches!(err, HarnessError::MissingConstructorArgument { .. }));
    assert!(err.to_string().contains("Constructor parameter \"name\" missing"));
}

#[tokio::test]
async fn embedded_values_are_stored_inline() {
    let mut h = harness().await;
    let filter = || Filter::new().eq("embed.val", "Test 1");
    h.dont_see_in_repository(WITH_EMBEDDABLE, filter()).await.unwrap();
    h.have_in_repository(WITH_EMBEDDABLE, Data::new().with("embed.val", "Test 1"))
        .await
        .unwrap();
    h.see_in_repository(WITH_EMBEDDABLE, filter()).await.unwrap();
}

#[tokio::test]
async fn non_typical_primary_key_is_returned() {
    let mut h = harness().await;
    let pk = h
        .have_in_repository(NON_TYPICAL_PK, Data::new().with("primaryKey", "abc"))
        .await
        .unwrap();
    assert_eq!(pk, PrimaryKey::Single(Value::from("abc")));
}

#[tokio::test]
async fn composite_primary_key_keeps_declared_order() {
    let mut h = harness().await;
    let pk = h
        .have_in_repository(
            COMPOSITE_PK,
            Data::new().with("integerPart", 123).with("stringPart", "abc"),
        )
        .await
        .unwrap();
    assert_eq!(
        pk,
        PrimaryKey::Composite(vec![Value::Int(123), Value::from("abc")])
    );
}

#[tokio::test]
async fn uuid_identifier_is_generated_and_returned() {
    let mut h = harness().await;
    let pk = h.have_in_repository(WITH_UUID, Data::new()).await.unwrap();
    let PrimaryKey::Single(Value::Uuid(id)) = pk else {
        panic!("expected a uuid key, got {pk:?}");
    };
    h.see_in_repository(WITH_UUID, Filter::new().eq("id", id)).await.unwrap();
}

#[tokio::test]
async fn many_to_one_chain_is_created_recursively() {
    let mut h = harness().await;
    let data = Data::from_json(json!({
        "name": "ccc",
        "b": {
            "name": "bbb",
            "a": {"name": "aaa"},
        },
    }))
    .unwrap();
    h.have_in_repository(MULTI_C, data).await.unwrap();

    let aaa = h
        .grab_entity_from_repository(MULTI_A, Filter::new().eq("name", "aaa"))
        .await
        .unwrap();
    let bbb = h
        .grab_entity_from_repository(MULTI_B, Filter::new().eq("name", "bbb"))
        .await
        .unwrap();
    let ccc = h
        .grab_entity_from_repository(MULTI_C, Filter::new().eq("name", "ccc"))
        .await
        .unwrap();

    assert_eq!(ccc.related("b"), Some(bbb.clone()));
    assert_eq!(bbb.related("a"), Some(aaa.clone()));
    assert_eq!(ccc.related("b").and_then(|b| b.related("a")), Some(aaa));
}

#[tokio::test]
async fn one_to_many_items_are_materialized_after_refresh() {
    let mut h = harness().await;
    let data = Data::from_json(json!({
        "name": "aaa",
        "b": [
            {"name": "bbb1"},
            {"name": "bbb2", "c": [{"name": "ccc"}]},
        ],
    }))
    .unwrap();
    h.have_in_repository(MULTI_A, data).await.unwrap();

    let aaa = h
        .grab_entity_from_repository(MULTI_A, Filter::new().eq("name", "aaa"))
        .await
        .unwrap();
    let bbb1 = h
        .grab_entity_from_repository(MULTI_B, Filter::new().eq("name", "bbb1"))
        .await
        .unwrap();
    let bbb2 = h
        .grab_entity_from_repository(MULTI_B, Filter::new().eq("name", "bbb2"))
        .await
        .unwrap();
    let ccc = h
        .grab_entity_from_repository(MULTI_C, Filter::new().eq("name", "ccc"))
        .await
        .unwrap();

    let bs = aaa.collection("b");
    assert!(bs.contains(&bbb1));
    assert!(bs.contains(&bbb2));
    assert!(bbb2.collection("c").contains(&ccc));
    assert_eq!(bbb1.related("a"), Some(aaa.clone()));
    assert_eq!(bbb2.related("a"), Some(aaa));
    assert_eq!(ccc.related("b"), Some(bbb2));
}

#[tokio::test]
async fn to_many_items_must_be_mappings() {
    let mut h = harness().await;
    let data = Data::from_json(json!({"name": "aaa", "b": ["bbb"]})).unwrap();
    let err = h.have_in_repository(MULTI_A, data).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Association \"b\" of entity \"{MULTI_A}\" requires mapping as input, got \"string\" instead")
    );
}

#[tokio::test]
async fn unmapped_keys_are_ignored() {
    let mut h = harness().await;
    h.have_in_repository(PLAIN, Data::new().with("name", "kept").with("nickname", "dropped"))
        .await
        .unwrap();
    h.see_in_repository(PLAIN, Filter::new().eq("name", "kept")).await.unwrap();
}
