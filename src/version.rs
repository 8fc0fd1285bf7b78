//! Upward propagation of subtree size summaries, independent of but
//! interleaved with the mutation protocol in `tree.rs`.

use std::sync::atomic::Ordering;

use crossbeam_epoch::{Guard, Owned, Shared};

use crate::node::{reclaim_version, retire_version, Node, Version};

/// Re-reads `child` and its version until a consistent `(pointer, version)`
/// pair is observed: the pointer is read, its version snapshotted, then the
/// pointer re-read; if the two reads of the pointer disagree a concurrent
/// structural change raced the snapshot and the pair is discarded.
fn stable_child_version<'g>(
    child: &crossbeam_epoch::Atomic<Node>,
    guard: &'g Guard,
) -> Shared<'g, Version> {
    loop {
        let before = child.load(Ordering::Acquire, guard);
        let version = unsafe { before.deref() }.version.load(Ordering::Acquire, guard);
        let after = child.load(Ordering::Acquire, guard);
        if before == after {
            return version;
        }
    }
}

/// Attempts to install a fresh [`Version`] for `x`, summing its children's
/// current versions. Returns whether the CAS succeeded; a failure means some
/// other thread refreshed `x` (or changed a child) first.
pub(crate) fn refresh(x: Shared<'_, Node>, guard: &Guard) -> bool {
    let node = unsafe { x.deref() };
    let old = node.version.load(Ordering::Acquire, guard);

    let vr = stable_child_version(&node.right, guard);
    let vl = stable_child_version(&node.left, guard);

    let new_version = Owned::new(Version {
        key: node.key,
        l: crossbeam_epoch::Atomic::from(vl),
        r: crossbeam_epoch::Atomic::from(vr),
        sum: unsafe { vl.deref() }.sum + unsafe { vr.deref() }.sum,
    })
    .into_shared(guard);

    match node
        .version
        .compare_exchange(old, new_version, Ordering::AcqRel, Ordering::Acquire, guard)
    {
        Ok(_) => {
            retire_version(guard, old);
            true
        }
        Err(_) => {
            reclaim_version(new_version);
            false
        }
    }
}

/// Refreshes every ancestor on `path` (as recorded by
/// [`crate::tree::Tree::search`]) from the node nearest the leaf up to the
/// root, discarding the leaf itself. Each refresh is retried exactly once on
/// failure; this bounded retry is what keeps propagation obstruction-free
/// even under contention (see the module-level design notes in `SPEC_FULL.md`).
pub(crate) fn propagate(path: &[Shared<'_, Node>], guard: &Guard) {
    let ancestors = &path[..path.len().saturating_sub(1)];
    for &ancestor in ancestors.iter().rev() {
        if !refresh(ancestor, guard) {
            refresh(ancestor, guard);
        }
    }
}
