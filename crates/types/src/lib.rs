//! Shared type definitions for Chiron tutorial documents.
//!
//! A tutorial document is an ordered list of [`Step`]s. Each step carries the HTML shown to
//! the operator, the setup actions that prepare the cluster before the text is shown, and
//! the post-checks that must clear before the tutorial moves on. The engine consumes these
//! types; the server deserializes them from the remote JSON document.

use std::{fmt, str::FromStr};

use thiserror::Error;

pub mod document;
pub mod history;

pub use document::{Asset, Document, DocumentError, ManifestContent, PostCheck, ResourceCondition, SetupAction, Step};
pub use history::CompletedChunkRecord;

/// Resource kinds the cluster client knows how to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Deployment,
    Service,
    ConfigMap,
    Secret,
    ReplicaSet,
}

impl ResourceKind {
    /// Every supported kind, in a stable order.
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Pod,
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::ConfigMap,
        ResourceKind::Secret,
        ResourceKind::ReplicaSet,
    ];

    /// The tag used for this kind in tutorial documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "POD",
            ResourceKind::Deployment => "DEPLOYMENT",
            ResourceKind::Service => "SERVICE",
            ResourceKind::ConfigMap => "CONFIGMAP",
            ResourceKind::Secret => "SECRET",
            ResourceKind::ReplicaSet => "REPLICASET",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a document names a kind outside [`ResourceKind::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported resource kind '{0}'")]
pub struct UnsupportedKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnsupportedKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| UnsupportedKind(raw.to_string()))
    }
}

/// Comparison applied between an observed resource count and the expected value.
///
/// `GreaterThan` and `LessThan` are inclusive: an observed count equal to the expected
/// value satisfies both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityOperator {
    Equals,
    GreaterThan,
    LessThan,
}

impl EqualityOperator {
    /// The tag used for this operator in tutorial documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            EqualityOperator::Equals => "EQUALS",
            EqualityOperator::GreaterThan => "GREATERTHAN",
            EqualityOperator::LessThan => "LESSTHAN",
        }
    }

    /// Compares `observed` against `expected`.
    pub fn compare(&self, observed: u64, expected: u64) -> bool {
        match self {
            EqualityOperator::Equals => observed == expected,
            EqualityOperator::GreaterThan => observed >= expected,
            EqualityOperator::LessThan => observed <= expected,
        }
    }
}

impl fmt::Display for EqualityOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a document names an operator other than EQUALS, GREATERTHAN or LESSTHAN.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported equality operator '{0}'")]
pub struct UnsupportedOperator(pub String);

impl FromStr for EqualityOperator {
    type Err = UnsupportedOperator;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "EQUALS" => Ok(EqualityOperator::Equals),
            "GREATERTHAN" => Ok(EqualityOperator::GreaterThan),
            "LESSTHAN" => Ok(EqualityOperator::LessThan),
            other => Err(UnsupportedOperator(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_kind_parses_document_tags() {
        assert_eq!("CONFIGMAP".parse::<ResourceKind>(), Ok(ResourceKind::ConfigMap));
        assert_eq!("REPLICASET".parse::<ResourceKind>(), Ok(ResourceKind::ReplicaSet));
        assert_eq!(
            "SOMETHING".parse::<ResourceKind>(),
            Err(UnsupportedKind("SOMETHING".into()))
        );
    }

    #[test]
    fn inclusive_operators_accept_equal_counts() {
        assert!(EqualityOperator::GreaterThan.compare(3, 3));
        assert!(EqualityOperator::LessThan.compare(3, 3));
        assert!(!EqualityOperator::GreaterThan.compare(2, 3));
        assert!(!EqualityOperator::LessThan.compare(4, 3));
        assert!(EqualityOperator::Equals.compare(0, 0));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert_eq!(
            "SOMETHING".parse::<EqualityOperator>(),
            Err(UnsupportedOperator("SOMETHING".into()))
        );
    }
}
