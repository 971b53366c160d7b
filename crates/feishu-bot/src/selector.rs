use std::collections::HashSet;

use crate::{domain::ChatId, errors::Error, Result};

/// Which groups a message goes to.
///
/// `All` broadcasts to every group the bot has joined at call time;
/// the explicit variants name chat ids directly. Resolution of the
/// explicit variants is pure (no network) so argument errors surface
/// before any request is issued.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum GroupSelector {
    #[default]
    All,
    One(String),
    Many(Vec<String>),
}

impl From<&str> for GroupSelector {
    fn from(id: &str) -> Self {
        GroupSelector::One(id.to_string())
    }
}

impl From<String> for GroupSelector {
    fn from(id: String) -> Self {
        GroupSelector::One(id)
    }
}

impl From<Vec<String>> for GroupSelector {
    fn from(ids: Vec<String>) -> Self {
        GroupSelector::Many(ids)
    }
}

impl From<Vec<&str>> for GroupSelector {
    fn from(ids: Vec<&str>) -> Self {
        GroupSelector::Many(ids.into_iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[&str]> for GroupSelector {
    fn from(ids: &[&str]) -> Self {
        GroupSelector::Many(ids.iter().map(|s| s.to_string()).collect())
    }
}

impl GroupSelector {
    /// Resolve the explicit variants into a target list; `All` returns
    /// `None` and is resolved by the caller against the live group
    /// list. Duplicates are dropped (first occurrence wins) and blank
    /// ids are rejected.
    pub(crate) fn explicit_targets(&self) -> Option<Result<Vec<ChatId>>> {
        match self {
            GroupSelector::All => None,
            GroupSelector::One(id) => Some(dedup_targets(std::slice::from_ref(id))),
            GroupSelector::Many(ids) => Some(dedup_targets(ids)),
        }
    }
}

/// Order-preserving de-dup with blank-id rejection.
pub(crate) fn dedup_targets(ids: &[String]) -> Result<Vec<ChatId>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(ids.len());
    for id in ids {
        if id.trim().is_empty() {
            return Err(Error::Validation("empty group id".to_string()));
        }
        if seen.insert(id.as_str()) {
            targets.push(ChatId(id.clone()));
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(targets: Vec<ChatId>) -> Vec<String> {
        targets.into_iter().map(|c| c.0).collect()
    }

    #[test]
    fn single_id_resolves_to_one_target() {
        let sel = GroupSelector::from("oc_a");
        let targets = sel.explicit_targets().unwrap().unwrap();
        assert_eq!(ids(targets), vec!["oc_a"]);
    }

    #[test]
    fn duplicates_are_dropped_preserving_order() {
        let sel = GroupSelector::from(vec!["oc_a", "oc_a", "oc_b"]);
        let targets = sel.explicit_targets().unwrap().unwrap();
        assert_eq!(ids(targets), vec!["oc_a", "oc_b"]);
    }

    #[test]
    fn blank_ids_are_rejected() {
        let sel = GroupSelector::from(vec!["oc_a", "  "]);
        let err = sel.explicit_targets().unwrap().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = GroupSelector::from("").explicit_targets().unwrap().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn broadcast_defers_to_caller() {
        assert!(GroupSelector::All.explicit_targets().is_none());
        assert_eq!(GroupSelector::default(), GroupSelector::All);
    }
}
