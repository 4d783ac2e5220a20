use sea_orm::DbErr;
use thiserror::Error;

/// Name used in fixture messages for the fixture capability.
pub const FIXTURE_CAPABILITY: &str = "Fixture";

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {detail}")]
    Config { detail: String },
    #[error("Invalid argument: {detail}")]
    InvalidArgument { detail: String },
    #[error("Constructor parameter \"{parameter}\" missing for {class}")]
    MissingConstructorArgument { class: String, parameter: String },
    #[error("Association \"{field}\" of entity \"{class}\" requires {expected} as input, got \"{got}\" instead")]
    InvalidAssociationInput {
        class: String,
        field: String,
        expected: &'static str,
        got: String,
    },
    #[error("Class \"{class}\" is not a mapped entity")]
    UnknownEntity { class: String },
    #[error("Entity \"{class}\" has no mapped field \"{field}\"")]
    UnknownField { class: String, field: String },
    #[error("Invalid filter for {class}: {detail}")]
    InvalidFilter { class: String, detail: String },
    #[error("Fixture class \"{name}\" does not exist")]
    UnknownFixtureClass { name: String },
    #[error("{detail}")]
    UnsuitableFixtureType { detail: String },
    #[error("{detail}")]
    FixtureLoadFailure { detail: String },
    #[error("Reference \"{name}\" does not exist")]
    UnknownReference { name: String },
    #[error("Expected exactly one {class} result, found {found}")]
    NonUniqueOrMissingResult { class: String, found: usize },
    #[error("{description}\nFailed asserting that {actual} is {expected}.")]
    AssertionFailed {
        expected: String,
        actual: bool,
        description: String,
    },
    #[error("Flush failed: {detail}")]
    Flush { detail: String },
    #[error("Repository for {class} has no method \"{method}\"")]
    UnknownRepositoryMethod { class: String, method: String },
    #[error("Stubbed method \"{method}\" returned {got}, expected {expected}")]
    StubMismatch {
        method: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
    #[error("Query build error: {0}")]
    Query(#[from] sea_orm::sea_query::error::Error),
}

impl HarnessError {
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            detail: detail.into(),
        }
    }

    pub fn unknown_entity(class: impl Into<String>) -> Self {
        Self::UnknownEntity {
            class: class.into(),
        }
    }

    pub fn unknown_field(class: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            class: class.into(),
            field: field.into(),
        }
    }

    pub fn invalid_filter(class: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidFilter {
            class: class.into(),
            detail: detail.into(),
        }
    }

    pub fn flush(detail: impl Into<String>) -> Self {
        Self::Flush {
            detail: detail.into(),
        }
    }

    /// True for the errors a test author sees as a failed assertion rather than a broken setup.
    pub fn is_assertion_failure(&self) -> bool {
        matches!(self, HarnessError::AssertionFailed { .. })
    }
}
