use repo_harness::{
    Data, Filter, HarnessConfig, HarnessError, IsolationState, RepositoryHarness, SchemaTool, SessionObject,
    SessionSource, UrlSessionProvider,
};

use crate::support::entities::{self, PLAIN};
use crate::support::{harness, harness_with, in_memory_source};

fn stored() -> Filter {
    Filter::new().eq("name", "stored")
}

async fn next_test(h: &mut RepositoryHarness) {
    h.after_test().await;
    h.before_test().await.unwrap();
}

#[tokio::test]
async fn changes_are_reverted_between_tests() {
    let mut h = harness().await;
    assert_eq!(h.state(), IsolationState::InTransaction);
    h.have_in_repository(PLAIN, Data::new().with("name", "stored"))
        .await
        .unwrap();
    h.see_in_repository(PLAIN, stored()).await.unwrap();

    next_test(&mut h).await;

    h.dont_see_in_repository(PLAIN, stored()).await.unwrap();
}

#[tokio::test]
async fn loaded_fixtures_are_reverted_between_tests() {
    let mut h = harness().await;
    h.load_fixtures(["TestFixture1"], true).await.unwrap();
    next_test(&mut h).await;
    h.dont_see_in_repository(PLAIN, Filter::new().eq("name", "from TestFixture1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn changes_survive_when_cleanup_is_disabled() {
    let mut h = harness_with(HarnessConfig::default().with_cleanup(false)).await;
    assert_eq!(h.state(), IsolationState::Connected);
    h.have_in_repository(PLAIN, Data::new().with("name", "stored"))
        .await
        .unwrap();

    next_test(&mut h).await;

    h.see_in_repository(PLAIN, stored()).await.unwrap();
}

#[tokio::test]
async fn reconfiguring_mid_suite_switches_isolation() {
    let mut h = harness().await;
    h.reconfigure(HarnessConfig::default().with_cleanup(false))
        .await
        .unwrap();
    assert_eq!(h.state(), IsolationState::Connected);
    h.have_in_repository(PLAIN, Data::new().with("name", "stored"))
        .await
        .unwrap();

    h.reconfigure(HarnessConfig::default()).await.unwrap();
    assert_eq!(h.state(), IsolationState::InTransaction);
    h.see_in_repository(PLAIN, stored()).await.unwrap();
}

#[tokio::test]
async fn suite_setup_requires_a_session_source() {
    let mut h = RepositoryHarness::new(HarnessConfig::default(), SessionSource::default());
    let err = h.before_suite().await.unwrap_err();
    assert!(matches!(err, HarnessError::Config { .. }));
    assert!(err.to_string().contains("No session source configured"));
    assert_eq!(h.state(), IsolationState::Idle);
}

#[tokio::test]
async fn callback_returning_nothing_is_a_configuration_error() {
    let source = SessionSource::callback(|| async { Ok(None) });
    let mut h = RepositoryHarness::new(HarnessConfig::default(), source);
    let err = h.before_suite().await.unwrap_err();
    assert!(err.to_string().contains("EntityManager can't be obtained"));
}

#[tokio::test]
async fn callback_returning_another_object_is_a_configuration_error() {
    let source = SessionSource::callback(|| async { Ok(Some(Box::new("not a session") as SessionObject)) });
    let mut h = RepositoryHarness::new(HarnessConfig::default(), source);
    let err = h.before_suite().await.unwrap_err();
    assert!(err
        .to_string()
        .contains("Connection object is not an instance of EntityManager"));
}

#[tokio::test]
async fn session_is_obtained_lazily_on_first_use() {
    let mut h = RepositoryHarness::new(HarnessConfig::default(), in_memory_source());
    assert_eq!(h.state(), IsolationState::Idle);
    h.have_in_repository(PLAIN, Data::new().with("name", "stored"))
        .await
        .unwrap();
    assert_eq!(h.state(), IsolationState::Connected);
    h.see_in_repository(PLAIN, stored()).await.unwrap();
}

#[tokio::test]
async fn url_provider_opens_its_own_database() {
    let provider = UrlSessionProvider::new("sqlite::memory:", entities::registry());
    let mut h = RepositoryHarness::new(HarnessConfig::default(), SessionSource::provider(provider));
    h.before_suite().await.unwrap();
    SchemaTool::new(h.entity_manager().await.unwrap())
        .create_all()
        .await
        .unwrap();
    h.before_test().await.unwrap();

    h.have_in_repository(PLAIN, Data::new().with("name", "stored"))
        .await
        .unwrap();
    h.see_in_repository(PLAIN, stored()).await.unwrap();

    next_test(&mut h).await;
    h.dont_see_in_repository(PLAIN, stored()).await.unwrap();
}
