//! Ledger-wide conflict resolution settings shared by every page.

use std::sync::{Arc, RwLock, Weak};

use folio_merge::{ConflictResolverFactory, CustomStrategy, LastOneWins, MergePolicy, MergeStrategy};
use folio_types::PageId;
use tracing::debug;

#[derive(Default)]
enum Registration {
    /// No factory registered: every page uses last-one-wins.
    #[default]
    Builtin,
    Factory(Weak<dyn ConflictResolverFactory>),
}

/// The resolver factory registered on a ledger.
///
/// The factory is held weakly: once its owner drops it, merges stop until a
/// new factory (or none) is set.
#[derive(Default)]
pub struct ConflictResolution {
    registration: RwLock<Registration>,
}

impl ConflictResolution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory`, or revert to last-one-wins with `None`.
    pub fn set_factory(&self, factory: Option<&Arc<dyn ConflictResolverFactory>>) {
        let registration = match factory {
            Some(factory) => Registration::Factory(Arc::downgrade(factory)),
            None => Registration::Builtin,
        };
        *self
            .registration
            .write()
            .expect("resolution lock poisoned") = registration;
    }

    /// The strategy to merge `page` with, or `None` if it must not be merged
    /// right now.
    pub fn strategy_for(&self, page: &PageId) -> Option<Box<dyn MergeStrategy>> {
        let factory = match &*self.registration.read().expect("resolution lock poisoned") {
            Registration::Builtin => return Some(Box::new(LastOneWins)),
            Registration::Factory(weak) => weak.upgrade(),
        };
        let Some(factory) = factory else {
            debug!(page = %page, "conflict resolver factory is gone");
            return None;
        };

        match factory.get_policy(page) {
            MergePolicy::None => None,
            MergePolicy::LastOneWins => Some(Box::new(LastOneWins)),
            MergePolicy::Custom => match factory.new_conflict_resolver(page) {
                Some(resolver) => Some(Box::new(CustomStrategy::new(resolver))),
                None => {
                    debug!(page = %page, "no conflict resolver available");
                    None
                }
            },
        }
    }
}

impl std::fmt::Debug for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &*self.registration.read().expect("resolution lock poisoned") {
            Registration::Builtin => "builtin",
            Registration::Factory(_) => "factory",
        };
        f.debug_struct("ConflictResolution").field("registration", &kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use folio_merge::ConflictResolver;

    use super::*;

    struct FixedPolicy(MergePolicy);

    impl ConflictResolverFactory for FixedPolicy {
        fn get_policy(&self, _page: &PageId) -> MergePolicy {
            self.0
        }

        fn new_conflict_resolver(&self, _page: &PageId) -> Option<Arc<dyn ConflictResolver>> {
            None
        }
    }

    #[test]
    fn builtin_merges_by_default() {
        assert!(ConflictResolution::new().strategy_for(&PageId::ROOT).is_some());
    }

    #[test]
    fn policy_none_disables_merging() {
        let resolution = ConflictResolution::new();
        let factory: Arc<dyn ConflictResolverFactory> = Arc::new(FixedPolicy(MergePolicy::None));
        resolution.set_factory(Some(&factory));
        assert!(resolution.strategy_for(&PageId::ROOT).is_none());
    }

    #[test]
    fn custom_without_resolver_does_not_merge() {
        let resolution = ConflictResolution::new();
        let factory: Arc<dyn ConflictResolverFactory> = Arc::new(FixedPolicy(MergePolicy::Custom));
        resolution.set_factory(Some(&factory));
        assert!(resolution.strategy_for(&PageId::ROOT).is_none());
    }

    #[test]
    fn dropped_factory_stops_merging_until_reset() {
        let resolution = ConflictResolution::new();
        let factory: Arc<dyn ConflictResolverFactory> =
            Arc::new(FixedPolicy(MergePolicy::LastOneWins));
        resolution.set_factory(Some(&factory));
        assert!(resolution.strategy_for(&PageId::ROOT).is_some());

        drop(factory);
        assert!(resolution.strategy_for(&PageId::ROOT).is_none());

        resolution.set_factory(None);
        assert!(resolution.strategy_for(&PageId::ROOT).is_some());
    }
}
