pub mod association;
pub mod entity_manager;
pub(crate) mod persister;
pub mod query;
pub mod repository;
pub mod schema;
pub(crate) mod unit_of_work;

pub use association::build_association_query;
pub use entity_manager::EntityManager;
pub use query::{Predicate, QueryBuilder, Selection};
pub use repository::{FakeRepository, MethodStub, Repository, StubReturn};
pub use schema::SchemaTool;
