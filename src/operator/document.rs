//! Typed access to schema-less resource documents
//!
//! Custom resources of kinds the controller has no Rust types for are built from
//! JSON templates. A [`Document`] wraps such a template and exposes get and set
//! by dotted path (`spec.applicationMenu.section`) instead of ad hoc casts.

use kube::api::DynamicObject;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("template root is not an object")]
    NotAnObject,
    #[error("path {0} crosses a value that is not an object")]
    NotTraversable(String),
    #[error("required field {0} is missing")]
    MissingField(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document(Value);

impl Document {
    pub fn parse(template: &str) -> Result<Self, DocumentError> {
        Self::from_value(serde_json::from_str(template)?)
    }

    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(_) => Ok(Self(value)),
            _ => Err(DocumentError::NotAnObject),
        }
    }

    pub fn from_object(object: &DynamicObject) -> Result<Self, DocumentError> {
        Self::from_value(serde_json::to_value(object)?)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.0, |value, segment| value.as_object()?.get(segment))
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        path.split('.')
            .try_fold(&mut self.0, |value, segment| value.as_object_mut()?.get_mut(segment))
    }

    /// Sets the value at `path`, creating missing intermediate objects.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), DocumentError> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments
            .pop()
            .ok_or_else(|| DocumentError::NotTraversable(path.to_owned()))?;

        let mut current = &mut self.0;
        for segment in segments {
            let object = current
                .as_object_mut()
                .ok_or_else(|| DocumentError::NotTraversable(path.to_owned()))?;
            current = object
                .entry(segment)
                .or_insert_with(|| Value::Object(Map::new()));
        }

        current
            .as_object_mut()
            .ok_or_else(|| DocumentError::NotTraversable(path.to_owned()))?
            .insert(last.to_owned(), value.into());
        Ok(())
    }

    pub fn name(&self) -> Result<&str, DocumentError> {
        self.get_str("metadata.name")
            .ok_or_else(|| DocumentError::MissingField("metadata.name".to_owned()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_object(self) -> Result<DynamicObject, DocumentError> {
        Ok(serde_json::from_value(self.0)?)
    }
}
