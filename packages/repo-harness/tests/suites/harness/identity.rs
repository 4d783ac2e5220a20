use repo_harness::{Data, Filter, PrimaryKey, PropertyAccessor, Value};
use test_support::unique_str;

use crate::support::entities::{CIRCULAR_A, CIRCULAR_B, CIRCULAR_C, PLAIN};
use crate::support::harness;

async fn rename_behind_the_orm(h: &mut repo_harness::RepositoryHarness, id: &Value, name: &str) {
    let sql = format!("UPDATE plain_entity SET name = '{name}' WHERE id = {id}");
    h.entity_manager()
        .await
        .unwrap()
        .session()
        .execute_sql(&sql)
        .await
        .unwrap();
}

#[tokio::test]
async fn loaded_entities_are_stale_until_refreshed() {
    let mut h = harness().await;
    let pk = h
        .have_in_repository(PLAIN, Data::new().with("name", "a"))
        .await
        .unwrap();
    let id = Value::from(pk);
    let entity = h
        .grab_entity_from_repository(PLAIN, Filter::new().eq("id", id.clone()))
        .await
        .unwrap();

    rename_behind_the_orm(&mut h, &id, "b").await;

    let again = h
        .grab_entity_from_repository(PLAIN, Filter::new().eq("id", id.clone()))
        .await
        .unwrap();
    assert!(again.ptr_eq(&entity));
    assert_eq!(again.get_or_null("name"), Value::from("a"));

    h.refresh_entities(&[entity.clone()]).await.unwrap();
    assert_eq!(entity.get_or_null("name"), Value::from("b"));
}

#[tokio::test]
async fn refresh_accepts_several_entities() {
    let mut h = harness().await;
    let mut entities = Vec::new();
    for name in ["first", "second"] {
        h.have_in_repository(PLAIN, Data::new().with("name", name))
            .await
            .unwrap();
        entities.push(
            h.grab_entity_from_repository(PLAIN, Filter::new().eq("name", name))
                .await
                .unwrap(),
        );
    }

    h.entity_manager()
        .await
        .unwrap()
        .session()
        .execute_sql("UPDATE plain_entity SET name = 'renamed'")
        .await
        .unwrap();
    h.refresh_entities(&entities).await.unwrap();

    for entity in &entities {
        assert_eq!(entity.get_or_null("name"), Value::from("renamed"));
    }
}

#[tokio::test]
async fn clearing_detaches_loaded_entities() {
    let mut h = harness().await;
    let name = unique_str("plain");
    h.have_in_repository(PLAIN, Data::new().with("name", name.as_str()))
        .await
        .unwrap();
    let before = h
        .grab_entity_from_repository(PLAIN, Filter::new().eq("name", name.as_str()))
        .await
        .unwrap();

    h.clear_entity_manager().await.unwrap();

    let after = h
        .grab_entity_from_repository(PLAIN, Filter::new().eq("name", name.as_str()))
        .await
        .unwrap();
    assert!(!after.ptr_eq(&before));
    assert_eq!(after.get_or_null("id"), before.get_or_null("id"));
}

#[tokio::test]
async fn flush_writes_changes_to_managed_entities() {
    let mut h = harness().await;
    h.have_in_repository(PLAIN, Data::new().with("name", "before"))
        .await
        .unwrap();
    let entity = h
        .grab_entity_from_repository(PLAIN, Filter::new().eq("name", "before"))
        .await
        .unwrap();

    PropertyAccessor::set_property(&entity, "name", Value::from("after"));
    h.flush_to_database().await.unwrap();
    h.clear_entity_manager().await.unwrap();

    h.see_in_repository(PLAIN, Filter::new().eq("name", "after"))
        .await
        .unwrap();
    h.dont_see_in_repository(PLAIN, Filter::new().eq("name", "before"))
        .await
        .unwrap();
}

#[tokio::test]
async fn composite_key_made_of_entities_returns_the_entities() {
    let mut h = harness().await;
    let (a, b) = {
        let em = h.entity_manager().await.unwrap();
        let a = PropertyAccessor::instantiate(&em.metadata(CIRCULAR_A).unwrap(), &[]).unwrap();
        let b = PropertyAccessor::instantiate(&em.metadata(CIRCULAR_B).unwrap(), &[]).unwrap();
        (a, b)
    };

    let pk = h
        .have_in_repository(CIRCULAR_C, Data::new().with("a", &a).with("b", &b))
        .await
        .unwrap();
    assert_eq!(
        pk,
        PrimaryKey::Composite(vec![Value::Entity(a.clone()), Value::Entity(b.clone())])
    );
    assert!(matches!(a.get_or_null("id"), Value::Int(id) if id > 0));
    assert!(matches!(b.get_or_null("id"), Value::Int(id) if id > 0));

    h.see_in_repository(CIRCULAR_C, Filter::new().eq("a", &a).eq("b", &b))
        .await
        .unwrap();
}
