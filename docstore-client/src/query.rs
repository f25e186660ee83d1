//! Fluent construction of parameterized queries.
//!
//! Query text is opaque to the client; the builder only concatenates
//! fragments and collects named parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

use crate::error::{DocstoreError, Result};

/// A named query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

/// An immutable query: text plus ordered parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    #[serde(rename = "query")]
    text: String,
    parameters: Vec<QueryParameter>,
}

impl QueryDefinition {
    /// A query without parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[QueryParameter] {
        &self.parameters
    }

    /// Value of a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

impl From<&str> for QueryDefinition {
    fn from(text: &str) -> Self {
        QueryDefinition::new(text)
    }
}

impl From<String> for QueryDefinition {
    fn from(text: String) -> Self {
        QueryDefinition::new(text)
    }
}

/// Per-query paging options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Resume from a token returned with an earlier page
    pub continuation_token: Option<String>,
    /// Upper bound on items per page
    pub max_item_count: Option<u32>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    pub fn with_max_item_count(mut self, count: u32) -> Self {
        self.max_item_count = Some(count);
        self
    }
}

/// Builder for [`QueryDefinition`].
///
/// ```
/// use docstore_client::QueryBuilder;
///
/// let query = QueryBuilder::new()
///     .append_text("SELECT * FROM c WHERE c.type = @type")
///     .append_text_if(" AND c.age > @age", false)
///     .with_parameter("@type", "Person")
///     .with_parameter_if("@age", 40, false)
///     .build()
///     .unwrap();
///
/// assert_eq!(query.text(), "SELECT * FROM c WHERE c.type = @type");
/// assert_eq!(query.parameters().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    text: String,
    parameters: Vec<QueryParameter>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the query text.
    pub fn append_text(mut self, text: &str) -> Self {
        self.text.push_str(text);
        self
    }

    pub fn append_text_if(self, text: &str, condition: bool) -> Self {
        if condition {
            self.append_text(text)
        } else {
            self
        }
    }

    /// Append a fragment if the asynchronous condition resolves to `true`.
    pub async fn append_text_if_async<F, Fut>(self, text: &str, condition: F) -> Self
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let append = condition().await;
        self.append_text_if(text, append)
    }

    /// Add a named parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(QueryParameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_parameter_if(
        self,
        name: impl Into<String>,
        value: impl Into<Value>,
        condition: bool,
    ) -> Self {
        if condition {
            self.with_parameter(name, value)
        } else {
            self
        }
    }

    /// Add a parameter whose value is only computed when `condition` holds.
    pub fn with_parameter_if_with<F, V>(self, name: impl Into<String>, condition: bool, value: F) -> Self
    where
        F: FnOnce() -> V,
        V: Into<Value>,
    {
        if condition {
            self.with_parameter(name, value())
        } else {
            self
        }
    }

    /// Add a parameter if the asynchronous condition resolves to `true`.
    pub async fn with_parameter_if_async<F, Fut>(
        self,
        name: impl Into<String>,
        value: impl Into<Value>,
        condition: F,
    ) -> Self
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let add = condition().await;
        self.with_parameter_if(name, value, add)
    }

    /// Finish the query. Parameter names must be unique.
    pub fn build(self) -> Result<QueryDefinition> {
        for (i, parameter) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|p| p.name == parameter.name) {
                return Err(DocstoreError::DuplicateParameter(parameter.name.clone()));
            }
        }

        Ok(QueryDefinition {
            text: self.text,
            parameters: self.parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_conditional_fragments() {
        let query = QueryBuilder::new()
            .append_text("SELECT * FROM c")
            .append_text_if(" WHERE c.a = 1", true)
            .append_text_if(" AND c.b = 2", false)
            .build()
            .unwrap();

        assert_eq!(query.text(), "SELECT * FROM c WHERE c.a = 1");
        assert!(query.parameters().is_empty());
    }

    #[test]
    fn test_lazy_provider_not_called_when_false() {
        let calls = Cell::new(0);
        let query = QueryBuilder::new()
            .append_text("SELECT * FROM c")
            .with_parameter_if_with("@skipped", false, || {
                calls.set(calls.get() + 1);
                json!("never")
            })
            .with_parameter_if_with("@used", true, || {
                calls.set(calls.get() + 1);
                json!(1)
            })
            .build()
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(query.parameter("@used"), Some(&json!(1)));
        assert_eq!(query.parameter("@skipped"), None);
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = QueryBuilder::new()
            .with_parameter("@id", "a")
            .with_parameter("@id", "b")
            .build()
            .unwrap_err();

        assert!(matches!(err, DocstoreError::DuplicateParameter(name) if name == "@id"));
    }

    #[test]
    fn test_wire_form() {
        let query = QueryBuilder::new()
            .append_text("SELECT * FROM c WHERE c.id = @id")
            .with_parameter("@id", "x")
            .build()
            .unwrap();

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "query": "SELECT * FROM c WHERE c.id = @id",
                "parameters": [{ "name": "@id", "value": "x" }]
            })
        );
    }

    #[tokio::test]
    async fn test_async_conditions() {
        let query = QueryBuilder::new()
            .append_text("SELECT * FROM c")
            .append_text_if_async(" WHERE c.a = @a", || async { true })
            .await
            .with_parameter_if_async("@a", 1, || async { true })
            .await
            .with_parameter_if_async("@b", 2, || async { false })
            .await
            .build()
            .unwrap();

        assert_eq!(query.text(), "SELECT * FROM c WHERE c.a = @a");
        assert_eq!(query.parameters().len(), 1);
    }
}
