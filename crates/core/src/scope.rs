//! Request scopes for catalog lookups.

use std::collections::BTreeSet;

/// The owning namespaces a lookup may search: projects named directly plus
/// groups whose descendants are included.
///
/// A scope is bounded to [`crate::MAX_SCOPE_IDS`] combined ids as supplied,
/// duplicates included; larger scopes are rejected by
/// [`RequestScope::validate`] and callers treat that as "no result" rather
/// than an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestScope {
    pub project_ids: BTreeSet<i64>,
    pub group_ids: BTreeSet<i64>,
    supplied: usize,
}

impl RequestScope {
    pub fn new(
        project_ids: impl IntoIterator<Item = i64>,
        group_ids: impl IntoIterator<Item = i64>,
    ) -> Self {
        let project_ids: Vec<i64> = project_ids.into_iter().collect();
        let group_ids: Vec<i64> = group_ids.into_iter().collect();
        Self {
            supplied: project_ids.len() + group_ids.len(),
            project_ids: project_ids.into_iter().collect(),
            group_ids: group_ids.into_iter().collect(),
        }
    }

    /// Scope covering one group and everything below it.
    pub fn group(group_id: i64) -> Self {
        Self::new([], [group_id])
    }

    /// Combined number of distinct ids.
    pub fn len(&self) -> usize {
        self.project_ids.len() + self.group_ids.len()
    }

    /// Combined number of ids as supplied, before deduplication.
    pub fn supplied_len(&self) -> usize {
        self.supplied
    }

    pub fn is_empty(&self) -> bool {
        self.project_ids.is_empty() && self.group_ids.is_empty()
    }

    /// Check the scope is non-empty and within the id bound.
    pub fn validate(&self) -> crate::Result<()> {
        if self.is_empty() {
            return Err(crate::Error::InvalidScope("no project or group ids".into()));
        }
        if self.supplied > crate::MAX_SCOPE_IDS {
            return Err(crate::Error::InvalidScope(format!(
                "{} ids exceeds maximum of {}",
                self.supplied,
                crate::MAX_SCOPE_IDS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_bounds() {
        assert!(RequestScope::default().validate().is_err());
        assert!(RequestScope::group(1).validate().is_ok());

        let at_limit = RequestScope::new(1..=14, 100..=105);
        assert_eq!(at_limit.len(), 20);
        assert!(at_limit.validate().is_ok());

        let over = RequestScope::new(1..=15, 100..=105);
        assert_eq!(over.len(), 21);
        assert!(over.validate().is_err());
    }

    #[test]
    fn test_scope_dedupes_ids() {
        let scope = RequestScope::new([1, 1, 2], [3, 3]);
        assert_eq!(scope.len(), 3);
        assert_eq!(scope.supplied_len(), 5);
    }

    #[test]
    fn test_scope_bound_counts_repeated_ids() {
        // 21 ids supplied, 20 distinct.
        let ids: Vec<i64> = (1..=20).chain([1]).collect();
        let scope = RequestScope::new(ids, []);
        assert_eq!(scope.len(), 20);
        assert!(scope.validate().is_err());
    }
}
