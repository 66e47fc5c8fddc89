//! Dotted hierarchical label path (`week_1.assignment_2`) used to model
//! the course-content tree without pointer cycles: the path is stored
//! as an immutable ordered label list and indexed for ancestor/descendant
//! queries rather than walking parent pointers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LtreePath {
    labels: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LtreePathError {
    #[error("ltree path must not be empty")]
    Empty,
    #[error("ltree label {0:?} must be alphanumeric/underscore, non-empty")]
    InvalidLabel(String),
}

impl LtreePath {
    pub fn new(labels: Vec<String>) -> Result<Self, LtreePathError> {
        if labels.is_empty() {
            return Err(LtreePathError::Empty);
        }
        for label in &labels {
            if label.is_empty()
                || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(LtreePathError::InvalidLabel(label.clone()));
            }
        }
        Ok(Self { labels })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn depth(&self) -> usize {
        self.labels.len()
    }

    /// The Postgres-ltree-style SQL `LIKE`/prefix pattern for descendant
    /// lookups: `{path}.%` with escaping left to the caller's query
    /// builder (this type only models the path, not its SQL encoding).
    pub fn is_ancestor_of(&self, other: &LtreePath) -> bool {
        self.labels.len() < other.labels.len() && other.labels.starts_with(&self.labels)
    }

    pub fn is_descendant_of(&self, other: &LtreePath) -> bool {
        other.is_ancestor_of(self)
    }

    pub fn parent(&self) -> Option<LtreePath> {
        if self.labels.len() <= 1 {
            return None;
        }
        Some(LtreePath {
            labels: self.labels[..self.labels.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, label: impl Into<String>) -> Result<LtreePath, LtreePathError> {
        let label = label.into();
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(LtreePathError::InvalidLabel(label));
        }
        let mut labels = self.labels.clone();
        labels.push(label);
        Ok(LtreePath { labels })
    }
}

impl fmt::Display for LtreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.labels.join("."))
    }
}

impl FromStr for LtreePath {
    type Err = LtreePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LtreePath::new(s.split('.').map(str::to_string).collect())
    }
}

impl TryFrom<String> for LtreePath {
    type Error = LtreePathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LtreePath> for String {
    fn from(path: LtreePath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders() {
        let p: LtreePath = "week_1.assignment_2".parse().unwrap();
        assert_eq!(p.depth(), 2);
        assert_eq!(p.to_string(), "week_1.assignment_2");
    }

    #[test]
    fn ancestor_relationship() {
        let week: LtreePath = "week_1".parse().unwrap();
        let assignment: LtreePath = "week_1.assignment_2".parse().unwrap();
        assert!(week.is_ancestor_of(&assignment));
        assert!(assignment.is_descendant_of(&week));
        assert!(!assignment.is_ancestor_of(&week));
        assert!(!week.is_ancestor_of(&week));
    }

    #[test]
    fn rejects_empty_and_invalid_labels() {
        assert!(matches!(LtreePath::new(vec![]), Err(LtreePathError::Empty)));
        assert!(matches!(
            LtreePath::new(vec!["bad label".to_string()]),
            Err(LtreePathError::InvalidLabel(_))
        ));
    }

    #[test]
    fn parent_and_child_roundtrip() {
        let assignment: LtreePath = "week_1.assignment_2".parse().unwrap();
        let parent = assignment.parent().unwrap();
        assert_eq!(parent.to_string(), "week_1");
        let child = parent.child("assignment_2").unwrap();
        assert_eq!(child, assignment);
    }
}
