//! The response shape returned by the model backend.
//!
//! A response is an ordered sequence of elements. Each element may carry
//! content made of parts, and only some parts carry text: function calls
//! and function responses emitted during tool use have none.

use serde::{Deserialize, Serialize};

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// The delegate being invoked.
    pub name: String,
    /// Arguments supplied by the model.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The result of a function call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// The delegate that was invoked.
    pub name: String,
    /// The delegate's result.
    #[serde(default)]
    pub response: serde_json::Value,
}

/// One part of a content block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text emitted by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// A function call emitted by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// A function result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    /// Creates a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Creates a function-call part.
    #[must_use]
    pub fn function_call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            function_call: Some(FunctionCall {
                name: name.into(),
                args,
            }),
            ..Self::default()
        }
    }

    /// Creates a function-response part.
    #[must_use]
    pub fn function_response(name: impl Into<String>, response: serde_json::Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response,
            }),
            ..Self::default()
        }
    }
}

/// A content block: a role and its parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// The producer of the content (`model`, `user`, ...).
    #[serde(default)]
    pub role: String,
    /// The parts, in emission order.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Creates a content block.
    #[must_use]
    pub fn new(role: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            role: role.into(),
            parts,
        }
    }

    /// Creates a model content block with a single text part.
    #[must_use]
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new("model", vec![Part::text(text)])
    }
}

/// One element of a response sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseElement {
    /// The stage that produced the element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// The element's content, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

impl ResponseElement {
    /// Creates an element with content.
    #[must_use]
    pub fn new(author: impl Into<String>, content: Content) -> Self {
        Self {
            author: Some(author.into()),
            content: Some(content),
        }
    }

    /// Creates an element without content.
    #[must_use]
    pub fn empty(author: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            content: None,
        }
    }

    /// Creates a model element with a single text part.
    #[must_use]
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(author, Content::model_text(text))
    }

    /// Returns the function calls carried by this element.
    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.content
            .iter()
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.function_call.as_ref())
    }
}

/// The ordered elements returned for one completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseSequence(pub Vec<ResponseElement>);

impl ResponseSequence {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sequence holding one text element.
    #[must_use]
    pub fn from_text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self(vec![ResponseElement::text(author, text)])
    }

    /// Appends an element.
    pub fn push(&mut self, element: ResponseElement) {
        self.0.push(element);
    }

    /// Returns the elements.
    #[must_use]
    pub fn elements(&self) -> &[ResponseElement] {
        &self.0
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ResponseElement>> for ResponseSequence {
    fn from(elements: Vec<ResponseElement>) -> Self {
        Self(elements)
    }
}
