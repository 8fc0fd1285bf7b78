//! The shape of the heap graph: leaf-oriented tree nodes, the immutable
//! version snapshots hung off every internal node, and the tagged `Update`
//! records that describe an in-flight structural change.

use std::sync::atomic::Ordering;

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};

/// The two permanent sentinel keys bounding the keyspace. No real value's
/// hash is expected to collide with either, the same assumption the original
/// `INT_MIN`/`INT_MAX` sentinels made.
pub(crate) const NEG_INF: i64 = i64::MIN;
pub(crate) const POS_INF: i64 = i64::MAX;

/// An immutable snapshot of a subtree's live-key count.
///
/// Versions are never mutated after publication; a new one is built by
/// [`crate::version::refresh`] and swapped in with a single CAS.
pub(crate) struct Version {
    #[allow(dead_code)] // kept for parity with the source record; not read by this crate
    pub(crate) key: i64,
    pub(crate) l: Atomic<Version>,
    pub(crate) r: Atomic<Version>,
    pub(crate) sum: usize,
}

impl Version {
    fn leaf(key: i64, sum: usize) -> Self {
        Version {
            key,
            l: Atomic::null(),
            r: Atomic::null(),
            sum,
        }
    }
}

/// A single tree vertex. Internal nodes route searches; leaves hold keys.
pub(crate) struct Node {
    pub(crate) internal: bool,
    pub(crate) key: i64,
    pub(crate) update: Atomic<Update>,
    pub(crate) left: Atomic<Node>,
    pub(crate) right: Atomic<Node>,
    pub(crate) version: Atomic<Version>,
}

impl Node {
    /// A fresh leaf with key `key` whose version already carries `sum` (1 for
    /// an ordinary user key, 0 for the two sentinels).
    pub(crate) fn new_leaf(key: i64, sum: usize) -> Owned<Node> {
        Owned::new(Node {
            internal: false,
            key,
            update: Atomic::null(),
            left: Atomic::null(),
            right: Atomic::null(),
            version: Atomic::new(Version::leaf(key, sum)),
        })
    }

    /// A fresh internal node routing on `key`, with `left_child`/`right_child`
    /// already placed correctly (`left_child.key < right_child.key`) and
    /// `left_sum`/`right_sum` their respective live-key counts.
    pub(crate) fn new_internal<'g>(
        key: i64,
        left_child: Shared<'g, Node>,
        right_child: Shared<'g, Node>,
        left_sum: usize,
        right_sum: usize,
        guard: &'g Guard,
    ) -> Owned<Node> {
        let left_key = unsafe { left_child.deref() }.key;
        let right_key = unsafe { right_child.deref() }.key;
        debug_assert!(
            left_key < right_key,
            "left child's key must sort strictly before the right child's"
        );

        let lv = unsafe { left_child.deref() }.version.load(Ordering::Acquire, guard);
        let rv = unsafe { right_child.deref() }.version.load(Ordering::Acquire, guard);
        let version = Version {
            key,
            l: Atomic::from(lv),
            r: Atomic::from(rv),
            sum: left_sum + right_sum,
        };
        Owned::new(Node {
            internal: true,
            key,
            update: Atomic::null(),
            left: Atomic::from(left_child),
            right: Atomic::from(right_child),
            version: Atomic::new(version),
        })
    }
}

/// An in-flight structural modification. Only the fields relevant to the
/// operation's kind are populated; this is the Rust analogue of the source's
/// single `Info` struct with unused fields left null, expressed as an enum so
/// the irrelevant fields simply can't be read.
pub(crate) enum Update {
    /// Installs `new_internal` in place of leaf `l`, a child of `p`.
    Insert {
        p: Atomic<Node>,
        new_internal: Atomic<Node>,
        l: Atomic<Node>,
    },
    /// Removes leaf `l` (a child of `p`, which is a child of `gp`), splicing
    /// `l`'s sibling into `p`'s place under `gp`. `pupdate` is the snapshot of
    /// `p.update` this delete was planned against.
    Delete {
        gp: Atomic<Node>,
        p: Atomic<Node>,
        l: Atomic<Node>,
        pupdate: Atomic<Update>,
    },
}

impl Update {
    pub(crate) fn new_insert<'g>(
        p: Shared<'g, Node>,
        new_internal: Shared<'g, Node>,
        l: Shared<'g, Node>,
    ) -> Owned<Update> {
        Owned::new(Update::Insert {
            p: Atomic::from(p),
            new_internal: Atomic::from(new_internal),
            l: Atomic::from(l),
        })
    }

    pub(crate) fn new_delete<'g>(
        gp: Shared<'g, Node>,
        p: Shared<'g, Node>,
        l: Shared<'g, Node>,
        pupdate: Shared<'g, Update>,
    ) -> Owned<Update> {
        Owned::new(Update::Delete {
            gp: Atomic::from(gp),
            p: Atomic::from(p),
            l: Atomic::from(l),
            pupdate: Atomic::from(pupdate),
        })
    }
}

/// Frees an allocation that was never linked into the tree (a CAS that would
/// have published it lost the race). No concurrent thread can hold a
/// reference to it, so this runs immediately rather than through the epoch,
/// and the `version` it owns is freed the same way: `Atomic<T>`'s `Drop`
/// impl does not follow the pointer, so the cascade has to be explicit.
pub(crate) fn reclaim_node(ptr: Shared<'_, Node>) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        // Safe: `ptr` was never published, so no other thread can be
        // reading its `version` field concurrently.
        let guard = crossbeam_epoch::unprotected();
        let version = ptr.deref().version.load(Ordering::Acquire, guard);
        reclaim_version(version);
        drop(ptr.into_owned());
    }
}

pub(crate) fn reclaim_update(ptr: Shared<'_, Update>) {
    if !ptr.is_null() {
        unsafe { drop(ptr.into_owned()) };
    }
}

pub(crate) fn reclaim_version(ptr: Shared<'_, Version>) {
    if !ptr.is_null() {
        unsafe { drop(ptr.into_owned()) };
    }
}

/// Schedules a previously-published, now-superseded allocation for
/// reclamation once no pinned thread can still observe it. Its `version` is
/// retired alongside it for the same reason `reclaim_node` cascades: nothing
/// else ever frees a node's `version` on its behalf.
pub(crate) fn retire_node(guard: &Guard, ptr: Shared<'_, Node>) {
    if ptr.is_null() {
        return;
    }
    let version = unsafe { ptr.deref() }.version.load(Ordering::Acquire, guard);
    retire_version(guard, version);
    unsafe { guard.defer_destroy(ptr) };
}

pub(crate) fn retire_update(guard: &Guard, ptr: Shared<'_, Update>) {
    if !ptr.is_null() {
        unsafe { guard.defer_destroy(ptr) };
    }
}

pub(crate) fn retire_version(guard: &Guard, ptr: Shared<'_, Version>) {
    if !ptr.is_null() {
        unsafe { guard.defer_destroy(ptr) };
    }
}
