use std::sync::Arc;

use repo_harness::{Data, Filter, FixtureRef, HarnessConfig, HarnessError, PurgeMode};
use serde_json::json;

use crate::support::entities::PLAIN;
use crate::support::fixtures::NamedFixture;
use crate::support::{harness, harness_with};

fn named(name: &str) -> Filter {
    Filter::new().eq("name", format!("from {name}"))
}

#[tokio::test]
async fn single_fixture() {
    let mut h = harness().await;
    h.dont_see_in_repository(PLAIN, named("TestFixture1")).await.unwrap();
    h.load_fixtures(["TestFixture1"], true).await.unwrap();
    h.see_in_repository(PLAIN, named("TestFixture1")).await.unwrap();
}

#[tokio::test]
async fn multiple_fixtures() {
    let mut h = harness().await;
    h.load_fixtures(["TestFixture1", "TestFixture2"], true).await.unwrap();
    h.see_in_repository(PLAIN, named("TestFixture1")).await.unwrap();
    h.see_in_repository(PLAIN, named("TestFixture2")).await.unwrap();
}

#[tokio::test]
async fn append_mode_keeps_existing_rows() {
    let mut h = harness().await;
    h.load_fixtures(["TestFixture1"], true).await.unwrap();
    h.dont_see_in_repository(PLAIN, named("TestFixture2")).await.unwrap();
    h.load_fixtures(["TestFixture2"], true).await.unwrap();
    h.see_in_repository(PLAIN, named("TestFixture1")).await.unwrap();
    h.see_in_repository(PLAIN, named("TestFixture2")).await.unwrap();
}

#[tokio::test]
async fn replace_mode_purges_first() {
    let mut h = harness().await;
    h.have_in_repository(PLAIN, Data::new().with("name", "hand made"))
        .await
        .unwrap();
    h.load_fixtures(["TestFixture1"], true).await.unwrap();
    h.load_fixtures(["TestFixture2"], false).await.unwrap();
    h.dont_see_in_repository(PLAIN, named("TestFixture1")).await.unwrap();
    h.dont_see_in_repository(PLAIN, Filter::new().eq("name", "hand made"))
        .await
        .unwrap();
    h.see_in_repository(PLAIN, named("TestFixture2")).await.unwrap();
}

#[tokio::test]
async fn truncate_mode_falls_back_to_delete_on_sqlite() {
    let mut h = harness_with(HarnessConfig::default().with_purge_mode(PurgeMode::Truncate)).await;
    h.load_fixtures(["TestFixture1"], true).await.unwrap();
    h.load_fixtures(["TestFixture2"], false).await.unwrap();
    h.dont_see_in_repository(PLAIN, named("TestFixture1")).await.unwrap();
    h.see_in_repository(PLAIN, named("TestFixture2")).await.unwrap();
}

#[tokio::test]
async fn instances_and_duplicates() {
    let mut h = harness().await;
    let instance: Arc<dyn repo_harness::Fixture> = Arc::new(NamedFixture("TestFixture1"));
    h.load_fixtures(
        [FixtureRef::from("TestFixture1"), FixtureRef::from(instance)],
        true,
    )
    .await
    .unwrap();
    let loaded = h
        .grab_entities_from_repository(PLAIN, named("TestFixture1"))
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
}

#[tokio::test]
async fn fixtures_share_references_within_one_load() {
    let mut h = harness().await;
    let references = h
        .load_fixtures(["SharedTestFixture1", "SharedTestFixture2", "ReferenceConsumer"], true)
        .await
        .unwrap();
    assert!(references.has_reference("shared-testfixture-1"));
    assert!(references.has_reference("shared-testfixture-2"));
    h.see_in_repository(PLAIN, Filter::new().eq("name", "copy of from SharedTestFixture1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn persisted_fixture_entities_are_written_by_the_load() {
    let mut h = harness().await;
    h.load_fixtures(["PersistOnlyFixture"], true).await.unwrap();
    h.clear_entity_manager().await.unwrap();
    h.see_in_repository(PLAIN, Filter::new().eq("name", "persisted only"))
        .await
        .unwrap();
}

#[tokio::test]
async fn failing_fixture_rolls_back_its_work() {
    let mut h = harness().await;
    let err = h.load_fixtures(["TestFixture1", "FailingFixture"], true).await.unwrap_err();
    assert!(matches!(err, HarnessError::FixtureLoadFailure { .. }));
    assert!(err
        .to_string()
        .starts_with("Fixtures could not be loaded, got "));
    h.dont_see_in_repository(PLAIN, named("TestFixture1")).await.unwrap();
    h.dont_see_in_repository(PLAIN, named("FailingFixture")).await.unwrap();
}

#[tokio::test]
async fn unknown_fixture_class() {
    let mut h = harness().await;
    let err = h.load_fixtures(["InvalidFixtureClass"], true).await.unwrap_err();
    assert_eq!(err.to_string(), "Fixture class \"InvalidFixtureClass\" does not exist");
}

#[tokio::test]
async fn unsuitable_fixture_class() {
    let mut h = harness().await;
    let err = h.load_fixtures([PLAIN], true).await.unwrap_err();
    assert!(err.to_string().contains("does not inherit from"));
}

#[tokio::test]
async fn unsuitable_fixture_instance() {
    let mut h = harness().await;
    let meta = h.entity_manager().await.unwrap().metadata(PLAIN).unwrap();
    let entity = repo_harness::PropertyAccessor::instantiate(&meta, &[]).unwrap();
    let err = h.load_fixtures([FixtureRef::from(entity)], true).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Fixture \"PlainEntity\" does not inherit from \"Fixture\""
    );
}

#[tokio::test]
async fn unsuitable_fixture_type() {
    let mut h = harness().await;
    let err = h.load_fixtures([FixtureRef::from(json!(1))], true).await.unwrap_err();
    assert!(matches!(err, HarnessError::UnsuitableFixtureType { .. }));
    assert!(err.to_string().ends_with("got \"integer\" instead"));
}
