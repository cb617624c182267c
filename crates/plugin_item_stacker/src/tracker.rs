//! # Group Tracker
//!
//! The authoritative store of merge groups, keyed by object identity.
//!
//! A merge group is a flat star: one *primary* that carries the visible label
//! and the combined amount, and any number of *associates* that ride along
//! hidden at the primary's location. The role of each record is a tagged
//! union, so a record can never be primary and associate at the same time.
//!
//! All mutation goes through the operations here, which keep three
//! properties true after every call:
//!
//! - every id in a primary's associate set is tracked as an associate of
//!   exactly that primary
//! - an id is never in two associate sets
//! - `total_amount` of a primary equals its own amount plus the own amounts of
//!   its associates
//!
//! The tracker never touches the world; callers project its outcomes onto the
//! host (teleports, tags, labels).

use stackcraft_events::EntityId;
use std::collections::{BTreeMap, BTreeSet};

/// Role of a tracked object within its merge group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRole {
    /// Visible head of a group.
    Primary {
        associates: BTreeSet<EntityId>,
        total_amount: u64,
    },
    /// Hidden rider whose amount is folded into `primary`.
    Associate { primary: EntityId },
}

/// Tracker record of one live object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedGroup {
    entity_id: EntityId,
    expires_at_ms: u64,
    display_name: String,
    own_amount: u64,
    role: GroupRole,
    absorbed: bool,
}

impl TrackedGroup {
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Absolute deadline after which the group is force-removed. Never
    /// changes after insertion.
    pub fn expires_at_ms(&self) -> u64 {
        self.expires_at_ms
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Last observed payload amount of this object alone.
    pub fn own_amount(&self) -> u64 {
        self.own_amount
    }

    pub fn role(&self) -> &GroupRole {
        &self.role
    }

    /// Whether this object was merged into another group.
    pub fn is_absorbed(&self) -> bool {
        self.absorbed
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.role, GroupRole::Primary { .. })
    }

    /// The primary this record rides on, if it is an associate.
    pub fn primary(&self) -> Option<EntityId> {
        match self.role {
            GroupRole::Associate { primary } => Some(primary),
            GroupRole::Primary { .. } => None,
        }
    }

    /// Associates of a primary; empty for associates.
    pub fn associates(&self) -> impl Iterator<Item = EntityId> + '_ {
        let set = match &self.role {
            GroupRole::Primary { associates, .. } => Some(associates),
            GroupRole::Associate { .. } => None,
        };
        set.into_iter().flatten().copied()
    }

    pub fn associate_count(&self) -> usize {
        match &self.role {
            GroupRole::Primary { associates, .. } => associates.len(),
            GroupRole::Associate { .. } => 0,
        }
    }

    /// Combined amount of a primary; the own amount for associates.
    pub fn total_amount(&self) -> u64 {
        match &self.role {
            GroupRole::Primary { total_amount, .. } => *total_amount,
            GroupRole::Associate { .. } => self.own_amount,
        }
    }

    fn become_primary(&mut self, associates: BTreeSet<EntityId>) {
        self.role = GroupRole::Primary {
            associates,
            total_amount: self.own_amount,
        };
        self.absorbed = false;
    }
}

/// Outcome of [`GroupTracker::detach_and_promote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    /// The id was not tracked; nothing happened
    NotTracked,
    /// The record was deleted and no group survives it
    Deleted,
    /// An associate took over the group
    Promoted {
        new_primary: EntityId,
        associates: usize,
    },
}

/// Errors reported by tracker mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Entity {0} is not tracked")]
    NotTracked(EntityId),
    #[error("Entity {0} is not a primary")]
    NotPrimary(EntityId),
    #[error("Entity {0} cannot be attached to itself")]
    SelfAttach(EntityId),
    #[error("Tracker invariant violated: {0}")]
    InvariantViolation(String),
}

/// The store of all tracked merge groups.
///
/// Objects observed before their payload was readable are kept in a separate
/// deferred set until a pass can classify them.
#[derive(Debug, Clone)]
pub struct GroupTracker {
    groups: BTreeMap<EntityId, TrackedGroup>,
    deferred: BTreeSet<EntityId>,
    expire_timeout_ms: u64,
}

impl GroupTracker {
    /// Creates an empty tracker whose new groups expire `expire_timeout_ms`
    /// after insertion.
    pub fn new(expire_timeout_ms: u64) -> Self {
        Self {
            groups: BTreeMap::new(),
            deferred: BTreeSet::new(),
            expire_timeout_ms,
        }
    }

    /// Changes the timeout applied to groups inserted from now on.
    pub fn set_expire_timeout(&mut self, expire_timeout_ms: u64) {
        self.expire_timeout_ms = expire_timeout_ms;
    }

    pub fn expire_timeout_ms(&self) -> u64 {
        self.expire_timeout_ms
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&TrackedGroup> {
        self.groups.get(&id)
    }

    /// Snapshot of all tracked ids in a stable order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.groups.keys().copied().collect()
    }

    /// Iterates all primary records.
    pub fn primaries(&self) -> impl Iterator<Item = &TrackedGroup> {
        self.groups.values().filter(|group| group.is_primary())
    }

    /// Remembers an object whose payload could not be read yet.
    pub fn defer(&mut self, id: EntityId) -> bool {
        !self.groups.contains_key(&id) && self.deferred.insert(id)
    }

    /// Takes all deferred objects for another attempt.
    pub fn take_deferred(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.deferred).into_iter().collect()
    }

    /// Forgets a deferred object. Returns true if it was deferred.
    pub fn forget_deferred(&mut self, id: EntityId) -> bool {
        self.deferred.remove(&id)
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Inserts a new primary group. Returns false and changes nothing if the
    /// id is already tracked.
    pub fn insert(
        &mut self,
        id: EntityId,
        display_name: impl Into<String>,
        amount: u64,
        now_ms: u64,
    ) -> bool {
        if self.groups.contains_key(&id) {
            return false;
        }
        self.deferred.remove(&id);
        self.groups.insert(
            id,
            TrackedGroup {
                entity_id: id,
                expires_at_ms: now_ms.saturating_add(self.expire_timeout_ms),
                display_name: display_name.into(),
                own_amount: amount,
                role: GroupRole::Primary {
                    associates: BTreeSet::new(),
                    total_amount: amount,
                },
                absorbed: false,
            },
        );
        true
    }

    /// Makes `child` an associate of the primary `parent`.
    ///
    /// If `child` is a primary its whole star moves over to `parent`; if it
    /// is an associate of another primary it leaves that group first.
    /// Returns every id that now rides on `parent` because of this call,
    /// `child` first.
    pub fn attach(&mut self, child: EntityId, parent: EntityId) -> Result<Vec<EntityId>, TrackerError> {
        if child == parent {
            return Err(TrackerError::SelfAttach(child));
        }
        match self.groups.get(&parent) {
            None => return Err(TrackerError::NotTracked(parent)),
            Some(group) if !group.is_primary() => return Err(TrackerError::NotPrimary(parent)),
            Some(_) => {}
        }
        let child_role = self
            .groups
            .get(&child)
            .map(|group| group.role.clone())
            .ok_or(TrackerError::NotTracked(child))?;

        let mut moved = vec![child];
        match child_role {
            GroupRole::Associate { primary } if primary == parent => return Ok(Vec::new()),
            GroupRole::Associate { primary } => {
                self.unlink_from(primary, child);
            }
            GroupRole::Primary { associates, .. } => {
                for id in associates {
                    if let Some(rider) = self.groups.get_mut(&id) {
                        rider.role = GroupRole::Associate { primary: parent };
                        moved.push(id);
                    }
                }
            }
        }

        if let Some(record) = self.groups.get_mut(&child) {
            record.role = GroupRole::Associate { primary: parent };
        }
        if let Some(GroupRole::Primary { associates, .. }) = self.groups.get_mut(&parent).map(|g| &mut g.role) {
            associates.extend(moved.iter().copied());
        }
        self.recompute_total(parent);
        Ok(moved)
    }

    /// Removes a primary that is gone from the world and hands its group to
    /// the first associate `is_alive` accepts.
    ///
    /// The promoted record keeps its own expiry and display name, becomes the
    /// primary of the remaining associates and loses its absorbed mark.
    /// Associates rejected by `is_alive` are dropped with the old primary.
    /// Called on an associate, this behaves like [`GroupTracker::remove`].
    pub fn detach_and_promote<F>(&mut self, id: EntityId, mut is_alive: F) -> Promotion
    where
        F: FnMut(EntityId) -> bool,
    {
        let Some(record) = self.groups.remove(&id) else {
            return Promotion::NotTracked;
        };
        let associates = match record.role {
            GroupRole::Associate { primary } => {
                self.unlink_from(primary, id);
                return Promotion::Deleted;
            }
            GroupRole::Primary { associates, .. } => associates,
        };

        let mut successor = None;
        let mut remaining = BTreeSet::new();
        for candidate in associates {
            if !self.groups.contains_key(&candidate) {
                continue;
            }
            match (successor, is_alive(candidate)) {
                (_, false) => {
                    self.groups.remove(&candidate);
                }
                (None, true) => successor = Some(candidate),
                (Some(_), true) => {
                    remaining.insert(candidate);
                }
            }
        }

        let Some(new_primary) = successor else {
            return Promotion::Deleted;
        };
        for rider in &remaining {
            if let Some(group) = self.groups.get_mut(rider) {
                group.role = GroupRole::Associate { primary: new_primary };
            }
        }
        let count = remaining.len();
        if let Some(group) = self.groups.get_mut(&new_primary) {
            group.become_primary(remaining);
        }
        self.recompute_total(new_primary);
        Promotion::Promoted {
            new_primary,
            associates: count,
        }
    }

    /// Deletes a record. An associate also leaves its primary's group.
    ///
    /// Removing a primary this way leaves its associates orphaned; they are
    /// repaired by [`GroupTracker::heal`]. Use
    /// [`GroupTracker::detach_and_promote`] when the group should survive.
    pub fn remove(&mut self, id: EntityId) -> Option<TrackedGroup> {
        let record = self.groups.remove(&id)?;
        if let GroupRole::Associate { primary } = record.role {
            self.unlink_from(primary, id);
        }
        Some(record)
    }

    /// Deletes a primary together with all of its associates and returns
    /// every deleted id, primary first.
    pub fn remove_group(&mut self, primary: EntityId) -> Vec<EntityId> {
        let Some(record) = self.groups.remove(&primary) else {
            return Vec::new();
        };
        let mut removed = vec![primary];
        match record.role {
            GroupRole::Primary { associates, .. } => {
                for id in associates {
                    if self.groups.remove(&id).is_some() {
                        removed.push(id);
                    }
                }
            }
            GroupRole::Associate { primary: parent } => self.unlink_from(parent, primary),
        }
        removed
    }

    /// Stores a freshly observed payload amount. Totals are not touched;
    /// call [`GroupTracker::recompute_total`] on the primary afterwards.
    pub fn refresh_amount(&mut self, id: EntityId, amount: u64) -> bool {
        match self.groups.get_mut(&id) {
            Some(group) => {
                group.own_amount = amount;
                true
            }
            None => false,
        }
    }

    /// Recomputes a primary's total from the own amounts of its members.
    pub fn recompute_total(&mut self, primary: EntityId) -> Option<u64> {
        let record = self.groups.get(&primary)?;
        let GroupRole::Primary { associates, .. } = &record.role else {
            return None;
        };
        let total = record.own_amount
            + associates
                .iter()
                .filter_map(|id| self.groups.get(id))
                .map(|group| group.own_amount)
                .sum::<u64>();
        if let Some(GroupRole::Primary { total_amount, .. }) = self.groups.get_mut(&primary).map(|g| &mut g.role) {
            *total_amount = total;
        }
        Some(total)
    }

    /// Sets or clears the absorbed mark of a record.
    pub fn set_absorbed(&mut self, id: EntityId, absorbed: bool) -> bool {
        match self.groups.get_mut(&id) {
            Some(group) => {
                group.absorbed = absorbed;
                true
            }
            None => false,
        }
    }

    /// Turns an orphaned associate into a primary of its own.
    ///
    /// An associate is orphaned when its primary is missing, is not a
    /// primary, or does not list it. Returns true if the record was healed.
    pub fn heal(&mut self, id: EntityId) -> bool {
        let Some(GroupRole::Associate { primary }) = self.groups.get(&id).map(|g| g.role.clone()) else {
            return false;
        };
        let listed = matches!(
            self.groups.get(&primary).map(|g| &g.role),
            Some(GroupRole::Primary { associates, .. }) if associates.contains(&id)
        );
        if listed {
            return false;
        }
        if let Some(group) = self.groups.get_mut(&id) {
            group.become_primary(BTreeSet::new());
        }
        true
    }

    /// Verifies the structural invariants of every group.
    pub fn check_invariants(&self) -> Result<(), TrackerError> {
        let mut seen = BTreeSet::new();
        for (id, group) in &self.groups {
            if group.entity_id != *id {
                return Err(TrackerError::InvariantViolation(format!(
                    "record {} stored under {}",
                    group.entity_id, id
                )));
            }
            match &group.role {
                GroupRole::Primary { associates, total_amount } => {
                    let mut expected = group.own_amount;
                    for member in associates {
                        if !seen.insert(*member) {
                            return Err(TrackerError::InvariantViolation(format!(
                                "{member} belongs to more than one group"
                            )));
                        }
                        match self.groups.get(member) {
                            Some(rider) if rider.primary() == Some(*id) => expected += rider.own_amount,
                            _ => {
                                return Err(TrackerError::InvariantViolation(format!(
                                    "{member} is listed by {id} but does not point back"
                                )))
                            }
                        }
                    }
                    if expected != *total_amount {
                        return Err(TrackerError::InvariantViolation(format!(
                            "{id} total is {total_amount}, members sum to {expected}"
                        )));
                    }
                }
                GroupRole::Associate { primary } => {
                    let listed = matches!(
                        self.groups.get(primary).map(|g| &g.role),
                        Some(GroupRole::Primary { associates, .. }) if associates.contains(id)
                    );
                    if !listed {
                        return Err(TrackerError::InvariantViolation(format!(
                            "{id} points to {primary} which does not list it"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn unlink_from(&mut self, primary: EntityId, member: EntityId) {
        if let Some(GroupRole::Primary { associates, .. }) = self.groups.get_mut(&primary).map(|g| &mut g.role) {
            associates.remove(&member);
        }
        self.recompute_total(primary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: u64 = 300_000;

    fn tracker_with(amounts: &[u64]) -> (GroupTracker, Vec<EntityId>) {
        let mut tracker = GroupTracker::new(TIMEOUT);
        let mut ids: Vec<EntityId> = amounts.iter().map(|_| EntityId::new()).collect();
        ids.sort();
        for (id, amount) in ids.iter().zip(amounts) {
            assert!(tracker.insert(*id, "Stone", *amount, 1_000));
        }
        (tracker, ids)
    }

    #[test]
    fn test_insert_is_noop_for_tracked_id() {
        let (mut tracker, ids) = tracker_with(&[4]);
        assert!(!tracker.insert(ids[0], "Dirt", 9, 50_000));

        let group = tracker.get(ids[0]).unwrap();
        assert_eq!(group.display_name(), "Stone");
        assert_eq!(group.total_amount(), 4);
        assert_eq!(group.expires_at_ms(), 1_000 + TIMEOUT);
    }

    #[test]
    fn test_attach_folds_amount_into_parent() {
        let (mut tracker, ids) = tracker_with(&[1, 2]);
        let moved = tracker.attach(ids[1], ids[0]).unwrap();

        assert_eq!(moved, vec![ids[1]]);
        assert_eq!(tracker.get(ids[0]).unwrap().total_amount(), 3);
        assert_eq!(tracker.get(ids[1]).unwrap().primary(), Some(ids[0]));
        tracker.check_invariants().unwrap();
    }

    #[test]
    fn test_attach_flattens_child_star() {
        // B(3) = b + b1, A(5) = a + a1 + a2
        let (mut tracker, ids) = tracker_with(&[1, 2, 2, 1, 2]);
        let (a, a1, a2, b, b1) = (ids[0], ids[1], ids[2], ids[3], ids[4]);
        tracker.attach(a1, a).unwrap();
        tracker.attach(a2, a).unwrap();
        tracker.attach(b1, b).unwrap();
        assert_eq!(tracker.get(a).unwrap().total_amount(), 5);
        assert_eq!(tracker.get(b).unwrap().total_amount(), 3);

        let moved = tracker.attach(a, b).unwrap();

        assert_eq!(moved.len(), 3);
        let survivor = tracker.get(b).unwrap();
        assert_eq!(survivor.total_amount(), 8);
        let members: BTreeSet<_> = survivor.associates().collect();
        assert_eq!(members, BTreeSet::from([a, a1, a2, b1]));
        for member in members {
            assert_eq!(tracker.get(member).unwrap().primary(), Some(b));
            assert_eq!(tracker.get(member).unwrap().associate_count(), 0);
        }
        tracker.check_invariants().unwrap();
    }

    #[test]
    fn test_attach_moves_associate_between_groups() {
        let (mut tracker, ids) = tracker_with(&[1, 1, 5]);
        tracker.attach(ids[2], ids[0]).unwrap();
        tracker.attach(ids[2], ids[1]).unwrap();

        assert_eq!(tracker.get(ids[0]).unwrap().total_amount(), 1);
        assert_eq!(tracker.get(ids[1]).unwrap().total_amount(), 6);
        tracker.check_invariants().unwrap();
    }

    #[test]
    fn test_attach_rejects_invalid_targets() {
        let (mut tracker, ids) = tracker_with(&[1, 1, 1]);
        tracker.attach(ids[1], ids[0]).unwrap();

        assert_eq!(tracker.attach(ids[0], ids[0]), Err(TrackerError::SelfAttach(ids[0])));
        assert_eq!(tracker.attach(ids[2], ids[1]), Err(TrackerError::NotPrimary(ids[1])));
        let stranger = EntityId::new();
        assert_eq!(tracker.attach(stranger, ids[0]), Err(TrackerError::NotTracked(stranger)));
        assert_eq!(tracker.attach(ids[2], stranger), Err(TrackerError::NotTracked(stranger)));
        assert_eq!(tracker.attach(ids[1], ids[0]), Ok(Vec::new()));
    }

    #[test]
    fn test_promotion_deletes_lonely_primary() {
        let (mut tracker, ids) = tracker_with(&[3]);
        assert_eq!(tracker.detach_and_promote(ids[0], |_| true), Promotion::Deleted);
        assert!(tracker.is_empty());
        assert_eq!(tracker.detach_and_promote(ids[0], |_| true), Promotion::NotTracked);
    }

    #[test]
    fn test_promotion_keeps_successor_expiry_and_name() {
        let mut tracker = GroupTracker::new(TIMEOUT);
        let mut ids = vec![EntityId::new(), EntityId::new(), EntityId::new()];
        ids.sort();
        let (old, heir, rider) = (ids[0], ids[1], ids[2]);
        tracker.insert(old, "Stone", 1, 0);
        tracker.insert(heir, "Named Rock", 2, 7_000);
        tracker.insert(rider, "Stone", 4, 9_000);
        tracker.attach(heir, old).unwrap();
        tracker.attach(rider, old).unwrap();
        tracker.set_absorbed(heir, true);

        let outcome = tracker.detach_and_promote(old, |_| true);

        assert_eq!(outcome, Promotion::Promoted { new_primary: heir, associates: 1 });
        assert!(!tracker.contains(old));
        let promoted = tracker.get(heir).unwrap();
        assert!(promoted.is_primary());
        assert!(!promoted.is_absorbed());
        assert_eq!(promoted.expires_at_ms(), 7_000 + TIMEOUT);
        assert_eq!(promoted.display_name(), "Named Rock");
        assert_eq!(promoted.total_amount(), 6);
        assert_eq!(tracker.get(rider).unwrap().primary(), Some(heir));
        tracker.check_invariants().unwrap();
    }

    #[test]
    fn test_promotion_skips_dead_associates() {
        let (mut tracker, ids) = tracker_with(&[1, 1, 1]);
        tracker.attach(ids[1], ids[0]).unwrap();
        tracker.attach(ids[2], ids[0]).unwrap();
        let dead = ids[1];

        let outcome = tracker.detach_and_promote(ids[0], |id| id != dead);

        assert_eq!(outcome, Promotion::Promoted { new_primary: ids[2], associates: 0 });
        assert!(!tracker.contains(dead));
        tracker.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_associate_updates_primary() {
        let (mut tracker, ids) = tracker_with(&[2, 3]);
        tracker.attach(ids[1], ids[0]).unwrap();

        assert!(tracker.remove(ids[1]).is_some());
        assert!(tracker.remove(ids[1]).is_none());
        let primary = tracker.get(ids[0]).unwrap();
        assert_eq!(primary.total_amount(), 2);
        assert_eq!(primary.associate_count(), 0);
        tracker.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_group_cascades() {
        let (mut tracker, ids) = tracker_with(&[1, 1, 1, 1]);
        tracker.attach(ids[1], ids[0]).unwrap();
        tracker.attach(ids[2], ids[0]).unwrap();

        let removed = tracker.remove_group(ids[0]);

        assert_eq!(removed[0], ids[0]);
        assert_eq!(removed.len(), 3);
        assert_eq!(tracker.ids(), vec![ids[3]]);
    }

    #[test]
    fn test_heal_turns_orphan_into_primary() {
        let (mut tracker, ids) = tracker_with(&[1, 2]);
        tracker.attach(ids[1], ids[0]).unwrap();
        tracker.set_absorbed(ids[1], true);
        tracker.remove(ids[0]);
        assert!(tracker.check_invariants().is_err());

        assert!(tracker.heal(ids[1]));
        assert!(!tracker.heal(ids[1]));
        let healed = tracker.get(ids[1]).unwrap();
        assert!(healed.is_primary());
        assert!(!healed.is_absorbed());
        assert_eq!(healed.total_amount(), 2);
        tracker.check_invariants().unwrap();
    }

    #[test]
    fn test_deferred_objects_are_retried_once() {
        let mut tracker = GroupTracker::new(TIMEOUT);
        let id = EntityId::new();
        assert!(tracker.defer(id));
        assert!(!tracker.defer(id));
        assert_eq!(tracker.take_deferred(), vec![id]);
        assert_eq!(tracker.deferred_count(), 0);

        tracker.defer(id);
        tracker.insert(id, "Stone", 1, 0);
        assert_eq!(tracker.deferred_count(), 0);
        assert!(!tracker.defer(id));
    }

    #[test]
    fn test_refresh_then_recompute() {
        let (mut tracker, ids) = tracker_with(&[1, 1]);
        tracker.attach(ids[1], ids[0]).unwrap();
        tracker.refresh_amount(ids[1], 10);
        assert!(tracker.check_invariants().is_err());

        assert_eq!(tracker.recompute_total(ids[0]), Some(11));
        assert_eq!(tracker.recompute_total(ids[1]), None);
        tracker.check_invariants().unwrap();
    }
}
