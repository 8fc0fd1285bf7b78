//! A non-blocking, leaf-oriented binary search tree set.
//!
//! `add`, `remove`, and `contains` are lock-free: any thread that is
//! preempted mid-operation cannot prevent other threads from making
//! progress, because any thread that observes a partially completed
//! modification finishes it on the original's behalf before proceeding
//! (the `Help*` routines in [`tree`]). Structural changes are published with
//! a single CAS on an `update` pointer tagged with the step currently in
//! flight; [`tag::UpdateState`] enumerates those steps.
//!
//! Membership queries never block on or interfere with a concurrent
//! mutation: [`Set::contains`] is a plain root-to-leaf descent. [`Set::len`]
//! reads a separately maintained, lazily propagated subtree summary
//! ([`version`]) that may lag a handful of in-flight mutations behind the
//! true membership at the instant it is read.

mod node;
mod set;
mod tag;
mod tree;
mod version;

pub use set::Set;
