//! Sample entity catalog shared by the integration suites.

use repo_harness::{ColumnType, EmbeddableMeta, EntityMeta, IdGeneration, MetadataRegistry, Value};

pub const PLAIN: &str = "PlainEntity";
pub const WITH_CTOR: &str = "EntityWithConstructorParameters";
pub const WITH_EMBEDDABLE: &str = "EntityWithEmbeddable";
pub const EMBEDDABLE_HOST: &str = "QuirkyFieldName\\EmbeddableHost";
pub const ASSOCIATION: &str = "QuirkyFieldName\\Association";
pub const ASSOCIATION_HOST: &str = "QuirkyFieldName\\AssociationHost";
pub const NON_TYPICAL_PK: &str = "NonTypicalPrimaryKeyEntity";
pub const COMPOSITE_PK: &str = "CompositePrimaryKeyEntity";
pub const WITH_UUID: &str = "EntityWithUuid";
pub const MULTI_A: &str = "MultilevelRelations\\A";
pub const MULTI_B: &str = "MultilevelRelations\\B";
pub const MULTI_C: &str = "MultilevelRelations\\C";
pub const CIRCULAR_A: &str = "CircularRelations\\A";
pub const CIRCULAR_B: &str = "CircularRelations\\B";
pub const CIRCULAR_C: &str = "CircularRelations\\C";

pub fn registry() -> MetadataRegistry {
    MetadataRegistry::new()
        .with(
            EntityMeta::builder(PLAIN)
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .scalar("name", ColumnType::Text)
                .build(),
        )
        .with(
            EntityMeta::builder(WITH_CTOR)
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .scalar("name", ColumnType::Text)
                .scalar("foo", ColumnType::Text)
                .scalar("bar", ColumnType::Text)
                .default_value("bar", "")
                .ctor_param("name", None)
                .ctor_param("foo", Some(Value::Null))
                .ctor_param("bar", Some(Value::from("foobar")))
                .build(),
        )
        .with(
            EntityMeta::builder(WITH_EMBEDDABLE)
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .embedded("embed", EmbeddableMeta::new("SampleEmbeddable").field("val", ColumnType::Text))
                .build(),
        )
        .with(
            EntityMeta::builder(EMBEDDABLE_HOST)
                .table("embeddable_host")
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .embedded(
                    "embed",
                    EmbeddableMeta::new("QuirkyFieldName\\Embeddable").field("val", ColumnType::Text),
                )
                .scalar("embedval", ColumnType::Text)
                .build(),
        )
        .with(
            EntityMeta::builder(ASSOCIATION)
                .table("association")
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .scalar("val", ColumnType::Text)
                .build(),
        )
        .with(
            EntityMeta::builder(ASSOCIATION_HOST)
                .table("association_host")
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .to_one("assoc", ASSOCIATION)
                .scalar("_assoc_val", ColumnType::Text)
                .build(),
        )
        .with(
            EntityMeta::builder(NON_TYPICAL_PK)
                .id("primaryKey", ColumnType::Text, IdGeneration::Assigned)
                .build(),
        )
        .with(
            EntityMeta::builder(COMPOSITE_PK)
                .scalar("integerPart", ColumnType::Integer)
                .scalar("stringPart", ColumnType::Text)
                .id_part("integerPart")
                .id_part("stringPart")
                .build(),
        )
        .with(
            EntityMeta::builder(WITH_UUID)
                .id("id", ColumnType::Uuid, IdGeneration::Uuid)
                .build(),
        )
        .with(
            EntityMeta::builder(MULTI_A)
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .scalar("name", ColumnType::Text)
                .to_many("b", MULTI_B, Some("a"))
                .build(),
        )
        .with(
            EntityMeta::builder(MULTI_B)
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .scalar("name", ColumnType::Text)
                .to_one("a", MULTI_A)
                .to_many("c", MULTI_C, Some("b"))
                .build(),
        )
        .with(
            EntityMeta::builder(MULTI_C)
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .scalar("name", ColumnType::Text)
                .to_one("b", MULTI_B)
                .build(),
        )
        .with(
            EntityMeta::builder(CIRCULAR_A)
                .table("circular_a")
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .to_many("cs", CIRCULAR_C, Some("a"))
                .build(),
        )
        .with(
            EntityMeta::builder(CIRCULAR_B)
                .table("circular_b")
                .id("id", ColumnType::Integer, IdGeneration::Auto)
                .to_many("cs", CIRCULAR_C, Some("b"))
                .build(),
        )
        .with(
            EntityMeta::builder(CIRCULAR_C)
                .table("circular_c")
                .to_one_with("a", CIRCULAR_A, Some("cs"), true)
                .to_one_with("b", CIRCULAR_B, Some("cs"), true)
                .id_part("a")
                .id_part("b")
                .ctor_param("a", None)
                .ctor_param("b", None)
                .build(),
        )
}
