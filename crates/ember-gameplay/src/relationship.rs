//! Mutual relationships between characters.
//!
//! A [`RelationSet`] can only be changed through [`link`] and [`unlink`],
//! which always touch both sides, so "A lists B" holds exactly when "B lists
//! A".

use serde::{Deserialize, Serialize};

use ember_common::EntityId;

/// Ordered set of related characters, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationSet {
    members: Vec<EntityId>,
}

impl RelationSet {
    /// Returns true if `id` is a member.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    /// Members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter().copied()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn insert(&mut self, id: EntityId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.members.push(id);
        true
    }

    pub(crate) fn remove(&mut self, id: EntityId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| *member != id);
        self.members.len() != before
    }
}

/// Something that holds one side of a mutual relationship.
pub trait Related {
    /// Identity used in the other side's set.
    fn relation_id(&self) -> EntityId;

    /// This side's set.
    fn relations_mut(&mut self) -> &mut RelationSet;
}

/// Which sides of a [`link`] actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOutcome {
    /// `b` was newly added to `a`
    pub a_added: bool,
    /// `a` was newly added to `b`
    pub b_added: bool,
}

/// Relates `a` and `b` in both directions.
pub fn link<T: Related>(a: &mut T, b: &mut T) -> LinkOutcome {
    let a_id = a.relation_id();
    let b_id = b.relation_id();
    LinkOutcome {
        a_added: a.relations_mut().insert(b_id),
        b_added: b.relations_mut().insert(a_id),
    }
}

/// Removes the relation between `a` and `b` in both directions. Returns true
/// if either side changed.
pub fn unlink<T: Related>(a: &mut T, b: &mut T) -> bool {
    let a_id = a.relation_id();
    let b_id = b.relation_id();
    let a_changed = a.relations_mut().remove(b_id);
    let b_changed = b.relations_mut().remove(a_id);
    a_changed || b_changed
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        id: EntityId,
        set: RelationSet,
    }

    impl Related for Node {
        fn relation_id(&self) -> EntityId {
            self.id
        }

        fn relations_mut(&mut self) -> &mut RelationSet {
            &mut self.set
        }
    }

    fn node(raw: u64) -> Node {
        Node {
            id: EntityId::from_raw(raw),
            set: RelationSet::default(),
        }
    }

    #[test]
    fn test_link_is_mutual_and_idempotent() {
        let mut a = node(1);
        let mut b = node(2);
        assert_eq!(
            link(&mut a, &mut b),
            LinkOutcome {
                a_added: true,
                b_added: true
            }
        );
        assert!(a.set.contains(b.id));
        assert!(b.set.contains(a.id));

        let again = link(&mut b, &mut a);
        assert!(!again.a_added && !again.b_added);
        assert_eq!(a.set.len(), 1);
    }

    #[test]
    fn test_unlink_clears_both_sides() {
        let mut a = node(1);
        let mut b = node(2);
        link(&mut a, &mut b);
        assert!(unlink(&mut b, &mut a));
        assert!(a.set.is_empty());
        assert!(b.set.is_empty());
        assert!(!unlink(&mut a, &mut b));
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut a = node(1);
        let mut c = node(3);
        let mut b = node(2);
        link(&mut a, &mut c);
        link(&mut a, &mut b);
        assert_eq!(
            a.set.iter().collect::<Vec<_>>(),
            vec![EntityId::from_raw(3), EntityId::from_raw(2)]
        );
    }
}
