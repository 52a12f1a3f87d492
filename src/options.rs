//! Value types for settings.
//!
//! These are persisted as JSON; the serialized spelling is part of the
//! on-disk format and must stay stable.

use serde::{Deserialize, Serialize};

/// Action bound to a trailing swipe on a list row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwipeAction {
    #[default]
    None,
    Favorite,
}

/// How elemental weaknesses are shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeaknessDisplayMode {
    None,
    #[default]
    Sign,
    Number,
}

/// When the software keyboard goes away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyboardDismissMode {
    #[default]
    Button,
    Scroll,
    Interactive,
}

/// Ordering of the entity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Sort {
    InGame { reversed: bool },
    Name { reversed: bool },
}

impl Default for Sort {
    fn default() -> Self {
        Sort::InGame { reversed: false }
    }
}

impl Sort {
    pub fn is_reversed(&self) -> bool {
        match self {
            Sort::InGame { reversed } | Sort::Name { reversed } => *reversed,
        }
    }

    /// Same key, opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Sort::InGame { reversed } => Sort::InGame { reversed: !reversed },
            Sort::Name { reversed } => Sort::Name { reversed: !reversed },
        }
    }
}

/// Section grouping of the entity list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupOption {
    #[default]
    None,
    Type,
    Weakness,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_spelling() {
        assert_eq!(serde_json::to_string(&SwipeAction::Favorite).unwrap(), "\"favorite\"");
        assert_eq!(serde_json::to_string(&WeaknessDisplayMode::Sign).unwrap(), "\"sign\"");
        assert_eq!(serde_json::to_string(&GroupOption::None).unwrap(), "\"none\"");
        assert_eq!(
            serde_json::to_string(&Sort::InGame { reversed: true }).unwrap(),
            r#"{"kind":"inGame","reversed":true}"#
        );
    }

    #[test]
    fn test_sort_reversal() {
        let sort = Sort::default();
        assert!(!sort.is_reversed());
        assert_eq!(sort.reversed(), Sort::InGame { reversed: true });
        assert_eq!(sort.reversed().reversed(), sort);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(SwipeAction::default(), SwipeAction::None);
        assert_eq!(WeaknessDisplayMode::default(), WeaknessDisplayMode::Sign);
        assert_eq!(KeyboardDismissMode::default(), KeyboardDismissMode::Button);
    }
}
