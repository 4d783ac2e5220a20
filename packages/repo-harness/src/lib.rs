#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

//! Database test harness over a metadata-driven persistence layer.
//!
//! Tests create entity graphs from nested data, assert on repository
//! contents through join queries built from nested filters, load fixture
//! sets, swap in fake repositories, and run inside a per-test transaction
//! that is rolled back afterwards.

pub mod accessor;
pub mod config;
pub mod data;
pub mod db;
pub mod entity;
pub mod error;
pub mod filter;
pub mod fixtures;
pub mod harness;
pub mod metadata;
pub mod orm;
pub mod value;

// Re-exports for public API
pub use accessor::PropertyAccessor;
pub use config::{HarnessConfig, PurgeMode};
pub use data::{Data, Input};
pub use entity::EntityRef;
pub use error::HarnessError;
pub use filter::{CompareOp, Criteria, Expression, Filter, FilterValue, Order};
pub use fixtures::{Fixture, FixtureContext, FixtureRef, FixtureRegistry, ReferenceRepository};
pub use harness::{
    Assertion, IsolationState, RepositoryHarness, SessionObject, SessionProvider, SessionSource,
    Target, UrlSessionProvider,
};
pub use metadata::{ColumnType, EmbeddableMeta, EntityMeta, IdGeneration, MetadataRegistry};
pub use orm::{EntityManager, FakeRepository, SchemaTool, StubReturn};
pub use value::{PrimaryKey, Value};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_support::init_logging();
}
