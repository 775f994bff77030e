//! Merge engine for Folio.
//!
//! A page whose commit DAG has more than one head has diverged, typically
//! because a commit from another device was ingested on top of an older
//! state. The [`MergeEngine`] reconciles the heads pairwise:
//!
//! 1. find the common ancestor of the two heads;
//! 2. diff each head against it, giving `change1` and `change2`;
//! 3. let a [`MergeStrategy`] produce the merged changes;
//! 4. append a merge commit with both heads as parents.
//!
//! # Policies
//!
//! - [`MergePolicy::None`] -- never merge; heads stay divergent
//! - [`MergePolicy::LastOneWins`] -- built in, see [`LastOneWins`]
//! - [`MergePolicy::Custom`] -- delegate to a [`ConflictResolver`] through
//!   [`CustomStrategy`], which validates the resolver's answer

pub mod engine;
pub mod error;
pub mod policy;
pub mod resolver;
pub mod strategy;

pub use engine::{MergeEngine, MergeReport};
pub use error::{MergeError, MergeResult};
pub use policy::MergePolicy;
pub use resolver::{ConflictResolver, ConflictResolverFactory, ResolverError};
pub use strategy::{CustomStrategy, LastOneWins, MergeSide, MergeStrategy, OrderKey, Origins};
