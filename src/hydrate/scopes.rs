//! Scope diff: which configured scopes the store does not know yet.

use std::collections::HashSet;

use futures_util::stream::{self, StreamExt, TryStreamExt};

use crate::error::StoreError;
use crate::store::CredentialRegistrar;

/// Drop repeated tokens, keeping the first occurrence of each.
pub fn dedup_scopes(scopes: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(scopes.len());
    scopes
        .iter()
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}

/// Result of diffing configured scopes against the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeDiff {
    /// Distinct tokens whose existence was checked.
    pub checked: usize,
    /// Absent tokens, in `desired` order.
    pub missing: Vec<String>,
}

/// Find the scopes in `desired` that the store reports as absent.
///
/// One existence check is issued per distinct token, at most `concurrency`
/// in flight at a time (a limit of 0 is treated as 1), and all are awaited
/// before the diff is computed. The first failed check fails the whole diff.
pub async fn missing_scopes(
    registrar: &dyn CredentialRegistrar,
    desired: &[String],
    concurrency: usize,
) -> Result<ScopeDiff, StoreError> {
    let candidates = dedup_scopes(desired);
    let checked = candidates.len();
    if candidates.is_empty() {
        return Ok(ScopeDiff::default());
    }

    let results: Vec<(String, bool)> = stream::iter(candidates)
        .map(|scope| async move {
            let exists = registrar.exists_scope(&scope).await?;
            Ok::<_, StoreError>((scope, exists))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let missing = results
        .into_iter()
        .filter(|(_, exists)| !exists)
        .map(|(scope, _)| scope)
        .collect();
    Ok(ScopeDiff { checked, missing })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn owned(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        assert_eq!(
            dedup_scopes(&owned(&["b", "a", "b", "c", "a"])),
            owned(&["b", "a", "c"])
        );
        assert!(dedup_scopes(&[]).is_empty());
    }

    #[tokio::test]
    async fn all_missing_on_empty_store() {
        let store = MemoryStore::new();
        let diff = missing_scopes(&store, &owned(&["read", "write"]), 4).await.unwrap();
        assert_eq!(diff.checked, 2);
        assert_eq!(diff.missing, owned(&["read", "write"]));
    }

    #[tokio::test]
    async fn existing_scopes_are_filtered_in_order() {
        let store = MemoryStore::new();
        store.insert_scopes(&owned(&["b", "d"])).await.unwrap();

        let diff = missing_scopes(&store, &owned(&["e", "d", "c", "b", "a"]), 2)
            .await
            .unwrap();
        assert_eq!(diff.missing, owned(&["e", "c", "a"]));
    }

    #[tokio::test]
    async fn nothing_missing_when_all_present() {
        let store = MemoryStore::new();
        store.insert_scopes(&owned(&["read", "write"])).await.unwrap();
        let diff = missing_scopes(&store, &owned(&["write", "read"]), 16).await.unwrap();
        assert_eq!(diff.checked, 2);
        assert!(diff.missing.is_empty());
    }

    #[tokio::test]
    async fn zero_concurrency_still_progresses() {
        let store = MemoryStore::new();
        let diff = missing_scopes(&store, &owned(&["x"]), 0).await.unwrap();
        assert_eq!(diff.missing, owned(&["x"]));
    }

    #[tokio::test]
    async fn checked_counts_distinct_tokens() {
        let store = MemoryStore::new();
        store.insert_scopes(&owned(&["a"])).await.unwrap();
        let diff = missing_scopes(&store, &owned(&["a", "b", "a", "b"]), 4).await.unwrap();
        assert_eq!(diff, ScopeDiff { checked: 2, missing: owned(&["b"]) });
    }

    #[tokio::test]
    async fn empty_input_checks_nothing() {
        let store = MemoryStore::new();
        assert_eq!(missing_scopes(&store, &[], 4).await.unwrap(), ScopeDiff::default());
    }
}
