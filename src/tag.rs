//! The 2-bit state tag embedded in the low bits of every `update` pointer.
//!
//! `crossbeam_epoch::Shared` reserves the low bits of a tagged pointer for
//! exactly this kind of use (`Shared::tag` / `Shared::with_tag`), so no manual
//! bit-packing is needed here: the tag values below are simply the `usize`
//! tags passed to those two calls.

/// The state of an in-flight (or absent) structural modification at a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UpdateState {
    /// No modification is in flight at this node.
    Clean,
    /// An insert has published its intent but not yet linked the new subtree.
    IFlag,
    /// A delete has published its intent at the grandparent but not yet
    /// flagged the parent.
    DFlag,
    /// The parent has been flagged for removal; only the splice remains.
    Mark,
}

impl UpdateState {
    pub(crate) fn from_tag(tag: usize) -> Self {
        match tag & 0b11 {
            0 => UpdateState::Clean,
            1 => UpdateState::IFlag,
            2 => UpdateState::DFlag,
            3 => UpdateState::Mark,
            _ => unreachable!("tag masked to two bits"),
        }
    }

    pub(crate) fn tag(self) -> usize {
        match self {
            UpdateState::Clean => 0,
            UpdateState::IFlag => 1,
            UpdateState::DFlag => 2,
            UpdateState::Mark => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UpdateState;

    #[test]
    fn round_trips_through_tag() {
        for state in [
            UpdateState::Clean,
            UpdateState::IFlag,
            UpdateState::DFlag,
            UpdateState::Mark,
        ] {
            assert_eq!(UpdateState::from_tag(state.tag()), state);
        }
    }

    #[test]
    fn only_the_low_two_bits_matter() {
        assert_eq!(UpdateState::from_tag(0b1101), UpdateState::IFlag);
    }
}
