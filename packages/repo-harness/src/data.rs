//! Population requests: ordered field → input mappings.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::entity::EntityRef;
use crate::error::HarnessError;
use crate::value::Value;

/// One entry of a population request.
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    /// A scalar, an already-constructed entity, or any other ready value.
    Value(Value),
    /// Embedded value or to-one association to create.
    Map(Data),
    /// To-many association items to create.
    List(Vec<Input>),
}

impl Input {
    pub fn type_name(&self) -> String {
        match self {
            Input::Value(v) => v.type_name().to_string(),
            Input::Map(_) => "mapping".to_string(),
            Input::List(_) => "list".to_string(),
        }
    }

    fn from_json(json: JsonValue) -> Input {
        match json {
            JsonValue::Object(map) => Input::Map(Data(
                map.into_iter().map(|(k, v)| (k, Input::from_json(v))).collect(),
            )),
            JsonValue::Array(items) => Input::List(items.into_iter().map(Input::from_json).collect()),
            scalar => Input::Value(Value::from_json(&scalar).unwrap_or_default()),
        }
    }
}

macro_rules! input_from_value {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for Input {
            fn from(v: $ty) -> Self {
                Input::Value(v.into())
            }
        })*
    };
}

input_from_value!(bool, i64, i32, u32, f64, String, &str, Uuid, EntityRef, &EntityRef, Value);

impl From<Data> for Input {
    fn from(v: Data) -> Self {
        Input::Map(v)
    }
}

impl From<Vec<Data>> for Input {
    fn from(v: Vec<Data>) -> Self {
        Input::List(v.into_iter().map(Input::Map).collect())
    }
}

/// Ordered mapping from field name to [`Input`]; later keys overwrite earlier ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Data(Vec<(String, Input)>);

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a request from a JSON object. Objects become nested mappings,
    /// arrays become lists.
    pub fn from_json(json: JsonValue) -> Result<Self, HarnessError> {
        match Input::from_json(json) {
            Input::Map(data) => Ok(data),
            other => Err(HarnessError::invalid_argument(format!(
                "population data must be a mapping, got \"{}\"",
                other.type_name()
            ))),
        }
    }

    pub fn with(mut self, field: impl Into<String>, input: impl Into<Input>) -> Self {
        self.insert(field, input);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, input: impl Into<Input>) {
        let field = field.into();
        let input = input.into();
        match self.0.iter_mut().find(|(k, _)| *k == field) {
            Some(entry) => entry.1 = input,
            None => self.0.push((field, input)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Input> {
        self.0.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Data {
    type Item = (String, Input);
    type IntoIter = std::vec::IntoIter<(String, Input)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, Input)> for Data {
    fn from_iter<I: IntoIterator<Item = (String, Input)>>(iter: I) -> Self {
        let mut data = Data::new();
        for (k, v) in iter {
            data.insert(k, v);
        }
        data
    }
}
