//! [`ResponseFragment`]: one piece of streamed response text.

use std::fmt;

/// One incremental piece of response text, delivered in emission order.
///
/// Fragments are never merged or deduplicated; concatenating every fragment
/// of a query reproduces the full response text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFragment {
    text: String,
    turn: u32,
}

impl ResponseFragment {
    /// Create a fragment produced during the given 1-based conversation turn.
    #[must_use]
    pub fn new(text: impl Into<String>, turn: u32) -> Self {
        Self {
            text: text.into(),
            turn,
        }
    }

    /// The fragment text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The conversation turn that produced this fragment.
    #[must_use]
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Consume the fragment, returning its text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for ResponseFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for ResponseFragment {
    fn as_ref(&self) -> &str {
        &self.text
    }
}
