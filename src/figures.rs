//! Figure registry: which figure windows are open
//!
//! Handles are compared as a set, so the order the engine reports them in
//! and any duplicates never matter.

use std::collections::BTreeSet;

use tracing::warn;

use crate::engine::{Engine, EngineError, Handle};
use crate::error::IntrospectionFailure;

/// Currently open figures, or why they could not be listed
pub async fn try_list_handles(
    engine: &mut dyn Engine,
) -> Result<BTreeSet<Handle>, IntrospectionFailure> {
    let children = engine
        .get_property(Handle::ROOT, "Children")
        .await
        .map_err(|e| IntrospectionFailure::new("open figures", e))?;

    let handles = children.handles().ok_or_else(|| {
        IntrospectionFailure::new(
            "open figures",
            EngineError::host(format!("unexpected root children: {}", children)),
        )
    })?;

    Ok(handles.into_iter().collect())
}

/// Currently open figures; empty when they cannot be listed
pub async fn list_handles(engine: &mut dyn Engine) -> BTreeSet<Handle> {
    match try_list_handles(engine).await {
        Ok(handles) => handles,
        Err(e) => {
            warn!(error = %e, "figure listing failed, treating as no figures");
            BTreeSet::new()
        }
    }
}

/// Handles in `after` that are not in `before`
pub fn diff_new<B, A>(before: B, after: A) -> BTreeSet<Handle>
where
    B: IntoIterator<Item = Handle>,
    A: IntoIterator<Item = Handle>,
{
    let before: BTreeSet<Handle> = before.into_iter().collect();
    after.into_iter().filter(|h| !before.contains(h)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    fn hs(values: &[u32]) -> Vec<Handle> {
        values.iter().copied().map(Handle::from).collect()
    }

    #[test]
    fn test_diff_is_set_difference() {
        let new = diff_new(hs(&[1, 2]), hs(&[3, 1, 2, 4]));
        assert_eq!(new.into_iter().collect::<Vec<_>>(), hs(&[3, 4]));
    }

    #[test]
    fn test_diff_ignores_order_and_duplicates() {
        let a = diff_new(hs(&[2, 1, 1]), hs(&[4, 3, 3, 2]));
        let b = diff_new(hs(&[1, 2]), hs(&[2, 3, 4]));
        assert_eq!(a, b);
        assert!(diff_new(hs(&[1, 2]), hs(&[1])).is_empty());
        assert!(diff_new(Vec::new(), Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_list_handles_reads_root_children() {
        let mut engine = MockEngine::new();
        assert!(list_handles(&mut engine).await.is_empty());

        engine.eval("figure; figure; figure(7)", true).await.unwrap();
        let handles = list_handles(&mut engine).await;
        assert_eq!(handles.into_iter().collect::<Vec<_>>(), hs(&[1, 2, 7]));
    }

    #[tokio::test]
    async fn test_listing_failure_is_soft() {
        let mut engine = MockEngine::new();
        engine.eval("figure", true).await.unwrap();
        engine.fail_property("Children");

        assert!(try_list_handles(&mut engine).await.is_err());
        assert!(list_handles(&mut engine).await.is_empty());
    }
}
