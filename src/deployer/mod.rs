//! Change-set based deployment of a single stack.

mod changeset;

pub use changeset::{
    is_no_changes_reason, ChangeSetCoordinator, ChangeSetInput, ChangeSetOutcome,
    ComputedChangeSet, CreatedChangeSet, DEFAULT_CHANGE_SET_POLL, DEFAULT_CHANGE_SET_PREFIX,
    NO_CHANGES_REASON_PREFIXES,
};
