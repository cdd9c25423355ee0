//! Canonical decoded-page event

use std::fmt;

/// One decoded page, ready for spam screening and persistence
///
/// Produced by [`parse_line`](crate::parse_line) from a single decoder
/// output line and consumed immediately. The receive timestamp is
/// assigned by the store at insert time, not carried here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageEvent {
    /// Channel name plus protocol variant, e.g. `"Hospital (POCSAG1200)"`
    pub source: String,

    /// Pager address or capcode, kept as text regardless of origin
    pub recipient: String,

    /// Cleaned printable-ASCII message text, never empty
    pub content: String,
}

impl fmt::Display for PageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.source, self.recipient, self.content)
    }
}
