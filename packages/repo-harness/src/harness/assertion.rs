use crate::error::HarnessError;
use crate::filter::Filter;

/// Outcome of a repository presence check, reported to the test runner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assertion {
    pub expected: String,
    pub actual: bool,
    pub description: String,
}

impl Assertion {
    pub(crate) fn presence(class: &str, filter: &Filter, found: bool) -> Self {
        Self {
            expected: "True".to_string(),
            actual: found,
            description: format!("{class} with {}", filter.to_json()),
        }
    }

    /// Passes when `actual` is true.
    pub fn assert(self) -> Result<(), HarnessError> {
        if self.actual {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }

    /// Passes when `actual` is false.
    pub fn assert_not(self) -> Result<(), HarnessError> {
        if self.actual {
            let expected = format!("not {}", self.expected);
            Err(HarnessError::AssertionFailed {
                expected,
                actual: self.actual,
                description: self.description,
            })
        } else {
            Ok(())
        }
    }

    fn into_error(self) -> HarnessError {
        HarnessError::AssertionFailed {
            expected: self.expected,
            actual: self.actual,
            description: self.description,
        }
    }
}
