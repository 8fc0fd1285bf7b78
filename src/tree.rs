//! `Search`, `Insert`, `Delete`, and the cooperative `Help*` routines that
//! make every in-flight modification atomic and obstruction-free.

use std::cmp;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{Atomic, Guard, Shared};

use crate::node::{
    reclaim_node, reclaim_update, retire_node, retire_update, Node, Update, NEG_INF, POS_INF,
};
use crate::tag::UpdateState;
use crate::version::propagate;

/// The result of descending from the root to a leaf: the last two internal
/// nodes visited (`gp`, `p`), the leaf itself, and the `update` snapshots
/// captured while passing through `gp` and `p`. `path` is the full descent
/// stack, root first, leaf last, consumed by [`propagate`].
pub(crate) struct SearchRecord<'g> {
    pub(crate) gp: Shared<'g, Node>,
    pub(crate) p: Shared<'g, Node>,
    pub(crate) l: Shared<'g, Node>,
    pub(crate) pupdate: Shared<'g, Update>,
    pub(crate) gpupdate: Shared<'g, Update>,
    pub(crate) path: Vec<Shared<'g, Node>>,
}

pub(crate) struct Tree {
    root: Atomic<Node>,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let guard = &crossbeam_epoch::pin();
        let neg_inf = Node::new_leaf(NEG_INF, 0).into_shared(guard);
        let pos_inf = Node::new_leaf(POS_INF, 0).into_shared(guard);
        let root = Node::new_internal(POS_INF, neg_inf, pos_inf, 0, 0, guard);
        Tree {
            root: Atomic::from(root.into_shared(guard)),
        }
    }

    /// Wait-free descent from the root to the first leaf reached while
    /// searching for `key`. Performs no CAS and never retries.
    pub(crate) fn search<'g>(&self, key: i64, guard: &'g Guard) -> SearchRecord<'g> {
        let mut l = self.root.load(Ordering::Acquire, guard);
        let mut path = vec![l];

        // `gp`/`p` start null exactly as the source's `SearchResult` does;
        // the root is always internal, so `p` is assigned before it is ever
        // read by a caller.
        let mut gp: Shared<'g, Node> = Shared::null();
        let mut p: Shared<'g, Node> = Shared::null();
        let mut gpupdate: Shared<'g, Update> = Shared::null();
        let mut pupdate: Shared<'g, Update> = Shared::null();

        while unsafe { l.deref() }.internal {
            gp = p;
            p = l;
            gpupdate = pupdate;

            let p_node = unsafe { p.deref() };
            pupdate = p_node.update.load(Ordering::Acquire, guard);
            l = if key < p_node.key {
                p_node.left.load(Ordering::Acquire, guard)
            } else {
                p_node.right.load(Ordering::Acquire, guard)
            };
            path.push(l);
        }

        SearchRecord {
            gp,
            p,
            l,
            pupdate,
            gpupdate,
            path,
        }
    }

    pub(crate) fn contains(&self, key: i64, guard: &Guard) -> bool {
        let search = self.search(key, guard);
        unsafe { search.l.deref() }.key == key
    }

    pub(crate) fn insert(&self, key: i64, guard: &Guard) -> bool {
        debug_assert!(key != NEG_INF && key != POS_INF, "sentinel keys are never inserted");
        loop {
            let search = self.search(key, guard);

            if unsafe { search.l.deref() }.key == key {
                propagate(&search.path, guard);
                return false;
            }

            if UpdateState::from_tag(search.pupdate.tag()) != UpdateState::Clean {
                self.help(search.pupdate, guard);
                continue;
            }

            let l_node = unsafe { search.l.deref() };
            let l_sum = unsafe { l_node.version.load(Ordering::Acquire, guard).deref() }.sum;

            let new_leaf = crate::node::Node::new_leaf(key, 1).into_shared(guard);
            let new_sibling = crate::node::Node::new_leaf(l_node.key, l_sum).into_shared(guard);

            let (left_child, right_child, left_sum, right_sum) = if key < l_node.key {
                (new_leaf, new_sibling, 1, l_sum)
            } else {
                (new_sibling, new_leaf, l_sum, 1)
            };
            let new_internal = Node::new_internal(
                cmp::max(key, l_node.key),
                left_child,
                right_child,
                left_sum,
                right_sum,
                guard,
            )
            .into_shared(guard);

            let op = Update::new_insert(search.p, new_internal, search.l).into_shared(guard);
            let tagged_op = op.with_tag(UpdateState::IFlag.tag());

            let p_node = unsafe { search.p.deref() };
            match p_node.update.compare_exchange(
                search.pupdate,
                tagged_op,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    self.help_insert(tagged_op, guard);
                    retire_update(guard, search.pupdate);
                    propagate(&search.path, guard);
                    return true;
                }
                Err(_) => {
                    reclaim_node(new_leaf);
                    reclaim_node(new_sibling);
                    reclaim_node(new_internal);
                    reclaim_update(op);
                    self.help(unsafe { search.p.deref() }.update.load(Ordering::Acquire, guard), guard);
                }
            }
        }
    }

    pub(crate) fn remove(&self, key: i64, guard: &Guard) -> bool {
        debug_assert!(key != NEG_INF && key != POS_INF, "sentinel keys are never removed");
        loop {
            let search = self.search(key, guard);

            if unsafe { search.l.deref() }.key != key {
                propagate(&search.path, guard);
                return false;
            }

            if UpdateState::from_tag(search.gpupdate.tag()) != UpdateState::Clean {
                self.help(search.gpupdate, guard);
                continue;
            }
            if UpdateState::from_tag(search.pupdate.tag()) != UpdateState::Clean {
                self.help(search.pupdate, guard);
                continue;
            }

            let op =
                Update::new_delete(search.gp, search.p, search.l, search.pupdate).into_shared(guard);
            let tagged_op = op.with_tag(UpdateState::DFlag.tag());

            let gp_node = unsafe { search.gp.deref() };
            match gp_node.update.compare_exchange(
                search.gpupdate,
                tagged_op,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    retire_update(guard, search.gpupdate);
                    if self.help_delete(tagged_op, guard) {
                        propagate(&search.path, guard);
                        return true;
                    }
                }
                Err(_) => {
                    reclaim_update(op);
                    self.help(unsafe { search.gp.deref() }.update.load(Ordering::Acquire, guard), guard);
                }
            }
        }
    }

    pub(crate) fn size(&self, guard: &Guard) -> usize {
        let root = self.root.load(Ordering::Acquire, guard);
        let version = unsafe { root.deref() }.version.load(Ordering::Acquire, guard);
        if version.is_null() {
            0
        } else {
            unsafe { version.deref() }.sum
        }
    }

    fn help(&self, u: Shared<'_, Update>, guard: &Guard) {
        match UpdateState::from_tag(u.tag()) {
            UpdateState::IFlag => self.help_insert(u, guard),
            UpdateState::Mark => self.help_marked(u, guard),
            UpdateState::DFlag => {
                self.help_delete(u, guard);
            }
            UpdateState::Clean => {}
        }
    }

    fn help_insert(&self, op: Shared<'_, Update>, guard: &Guard) {
        let (p, new_internal, l) = match unsafe { op.deref() } {
            Update::Insert { p, new_internal, l } => (
                p.load(Ordering::Acquire, guard),
                new_internal.load(Ordering::Acquire, guard),
                l.load(Ordering::Acquire, guard),
            ),
            Update::Delete { .. } => unreachable!("help_insert called with a delete update"),
        };

        self.cas_child(p, l, new_internal, guard);

        let p_node = unsafe { p.deref() };
        let _ = p_node.update.compare_exchange(
            op.with_tag(UpdateState::IFlag.tag()),
            op.with_tag(UpdateState::Clean.tag()),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        );
    }

    fn help_delete(&self, op: Shared<'_, Update>, guard: &Guard) -> bool {
        let (gp, p, pupdate) = match unsafe { op.deref() } {
            Update::Delete { gp, p, pupdate, .. } => (
                gp.load(Ordering::Acquire, guard),
                p.load(Ordering::Acquire, guard),
                pupdate.load(Ordering::Acquire, guard),
            ),
            Update::Insert { .. } => unreachable!("help_delete called with an insert update"),
        };

        let p_node = unsafe { p.deref() };
        let marked = op.with_tag(UpdateState::Mark.tag());

        match p_node.update.compare_exchange(
            pupdate,
            marked,
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => {
                retire_update(guard, pupdate);
                self.help_marked(op, guard);
                true
            }
            Err(e) => {
                if UpdateState::from_tag(e.current.tag()) == UpdateState::Mark
                    && e.current.with_tag(0) == op.with_tag(0)
                {
                    // Another helper already completed this exact step.
                    self.help_marked(op, guard);
                    true
                } else {
                    self.help(e.current, guard);
                    let gp_node = unsafe { gp.deref() };
                    let _ = gp_node.update.compare_exchange(
                        op.with_tag(UpdateState::DFlag.tag()),
                        op.with_tag(UpdateState::Clean.tag()),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    );
                    false
                }
            }
        }
    }

    fn help_marked(&self, op: Shared<'_, Update>, guard: &Guard) {
        let (gp, p, l) = match unsafe { op.deref() } {
            Update::Delete { gp, p, l, .. } => (
                gp.load(Ordering::Acquire, guard),
                p.load(Ordering::Acquire, guard),
                l.load(Ordering::Acquire, guard),
            ),
            Update::Insert { .. } => unreachable!("help_marked called with an insert update"),
        };

        let p_node = unsafe { p.deref() };
        let sibling = if p_node.left.load(Ordering::Acquire, guard) == l {
            p_node.right.load(Ordering::Acquire, guard)
        } else {
            p_node.left.load(Ordering::Acquire, guard)
        };
        debug_assert!(!sibling.is_null(), "an internal node always has two children");

        if self.cas_child(gp, p, sibling, guard) {
            // `p` is retired by `cas_child`; `l`, its other child, is spliced
            // out along with it and has no other path back to the root.
            retire_node(guard, l);
        }

        let gp_node = unsafe { gp.deref() };
        let _ = gp_node.update.compare_exchange(
            op.with_tag(UpdateState::DFlag.tag()),
            op.with_tag(UpdateState::Clean.tag()),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        );
    }

    /// Replaces `old` with `new` under `parent`, choosing the side by
    /// comparing `new.key` against `parent.key`. Returns whether this call
    /// performed the swap; a lost race means another helper already did, and
    /// the caller must not retire anything on that path.
    fn cas_child<'g>(
        &self,
        parent: Shared<'g, Node>,
        old: Shared<'g, Node>,
        new: Shared<'g, Node>,
        guard: &'g Guard,
    ) -> bool {
        let parent_node = unsafe { parent.deref() };
        let new_key = unsafe { new.deref() }.key;
        let slot = if new_key < parent_node.key {
            &parent_node.left
        } else {
            &parent_node.right
        };
        if slot
            .compare_exchange(old, new, Ordering::AcqRel, Ordering::Acquire, guard)
            .is_ok()
        {
            retire_node(guard, old);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::refresh;

    /// Calls `Refresh` at every internal node, children before parent, so a
    /// quiescent tree ends up with an exact (not merely eventually
    /// consistent) `sum` at every level.
    fn refresh_postorder(node: Shared<'_, Node>, guard: &Guard) {
        let n = unsafe { node.deref() };
        if n.internal {
            refresh_postorder(n.left.load(Ordering::Acquire, guard), guard);
            refresh_postorder(n.right.load(Ordering::Acquire, guard), guard);
            refresh(node, guard);
        }
    }

    fn count_real_leaves(node: Shared<'_, Node>, guard: &Guard) -> usize {
        let n = unsafe { node.deref() };
        if n.internal {
            count_real_leaves(n.left.load(Ordering::Acquire, guard), guard)
                + count_real_leaves(n.right.load(Ordering::Acquire, guard), guard)
        } else if n.key == NEG_INF || n.key == POS_INF {
            0
        } else {
            1
        }
    }

    #[test]
    fn quiescent_refresh_matches_true_leaf_count() {
        let tree = Tree::new();
        let guard = &crossbeam_epoch::pin();

        for key in [10, 3, 77, -4, 42, 8, 15, 1, 99, -30] {
            assert!(tree.insert(key, guard));
        }
        assert!(tree.remove(3, guard));
        assert!(tree.remove(42, guard));
        assert!(tree.remove(99, guard));

        let root = tree.root.load(Ordering::Acquire, guard);
        refresh_postorder(root, guard);

        let expected = count_real_leaves(root, guard);
        assert_eq!(expected, 7);
        assert_eq!(tree.size(guard), expected);
    }
}
