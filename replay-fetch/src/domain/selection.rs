use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Error;

/// Which segments of a recording to process.
///
/// Indices are 1-based; `0` is ignored wherever it appears.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "SelectionRepr", into = "SelectionRepr")]
pub enum Selection {
    #[default]
    All,
    Indices(BTreeSet<u32>),
}

impl Selection {
    pub fn from_indices(indices: impl IntoIterator<Item = u32>) -> Self {
        Self::Indices(indices.into_iter().filter(|&i| i != 0).collect())
    }

    /// Number of selected segments, if known without the total.
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Indices(set) => Some(set.len()),
        }
    }

    /// Selected indices within `1..=total`, ascending.
    ///
    /// Indices past the end are dropped with a warning.
    pub fn resolve(&self, total: usize) -> Vec<u32> {
        match self {
            Self::All => (1..=total as u32).collect(),
            Self::Indices(set) => {
                let (kept, dropped): (Vec<u32>, Vec<u32>) =
                    set.iter().partition(|&&i| (i as usize) <= total);
                if !dropped.is_empty() {
                    warn!(?dropped, total, "Ignoring selected segments past the end of the recording");
                }
                kept
            }
        }
    }

    /// Whether every one of `total` segments is selected.
    pub fn covers_all(&self, total: usize) -> bool {
        total > 0 && self.resolve(total).len() == total
    }
}

impl FromStr for Selection {
    type Err = Error;

    /// Parse `all` (any case) or a comma-separated list such as `1, 3,4`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if s.is_empty() {
            return Err(Error::selection("empty selection"));
        }

        let mut set = BTreeSet::new();
        for item in s.split(',') {
            let item = item.trim();
            let index: u32 = item
                .parse()
                .map_err(|_| Error::selection(format!("`{item}` is not a segment number")))?;
            if index != 0 {
                set.insert(index);
            }
        }
        Ok(Self::Indices(set))
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Indices(set) => {
                let items: Vec<String> = set.iter().map(u32::to_string).collect();
                write!(f, "{}", items.join(","))
            }
        }
    }
}

/// Wire form: the string `"all"` (or a comma list) or an array of indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Token(String),
    List(Vec<u32>),
}

impl TryFrom<SelectionRepr> for Selection {
    type Error = Error;

    fn try_from(repr: SelectionRepr) -> Result<Self, Self::Error> {
        match repr {
            SelectionRepr::Token(token) => token.parse(),
            SelectionRepr::List(list) => Ok(Self::from_indices(list)),
        }
    }
}

impl From<Selection> for SelectionRepr {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::All => Self::Token("all".to_string()),
            Selection::Indices(set) => Self::List(set.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all() {
        assert_eq!("all".parse::<Selection>().unwrap(), Selection::All);
        assert_eq!(" ALL ".parse::<Selection>().unwrap(), Selection::All);
    }

    #[test]
    fn test_parse_list_dedups_and_ignores_zero() {
        let selection: Selection = "3, 1,3 ,0".parse().unwrap();
        assert_eq!(selection, Selection::from_indices([1, 3]));
        assert_eq!(selection.count(), Some(2));
        assert_eq!(selection.to_string(), "1,3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("".parse::<Selection>(), Err(Error::Selection(_))));
        assert!(matches!("1,x".parse::<Selection>(), Err(Error::Selection(_))));
        assert!(matches!("-1".parse::<Selection>(), Err(Error::Selection(_))));
        assert!(matches!("1,,2".parse::<Selection>(), Err(Error::Selection(_))));
    }

    #[test]
    fn test_resolve() {
        assert_eq!(Selection::All.resolve(3), vec![1, 2, 3]);
        assert_eq!(Selection::All.count(), None);
        assert_eq!(Selection::from_indices([4, 2, 9]).resolve(5), vec![2, 4]);
        assert!(Selection::All.resolve(0).is_empty());
    }

    #[test]
    fn test_covers_all() {
        assert!(Selection::All.covers_all(5));
        assert!(Selection::from_indices(1..=5).covers_all(5));
        assert!(Selection::from_indices(1..=6).covers_all(5));
        assert!(!Selection::from_indices([2, 4]).covers_all(5));
        assert!(!Selection::All.covers_all(0));
    }

    #[test]
    fn test_serde_forms() {
        let all: Selection = serde_json::from_str(r#""all""#).unwrap();
        assert_eq!(all, Selection::All);
        let list: Selection = serde_json::from_str("[2, 0, 4, 2]").unwrap();
        assert_eq!(list, Selection::from_indices([2, 4]));
        let token: Selection = serde_json::from_str(r#""2,4""#).unwrap();
        assert_eq!(token, list);

        assert_eq!(serde_json::to_string(&Selection::All).unwrap(), r#""all""#);
        assert_eq!(serde_json::to_string(&list).unwrap(), "[2,4]");
        assert!(serde_json::from_str::<Selection>(r#""some""#).is_err());
    }
}
