//! Minimal edit script between the displayed list and a fresh snapshot.
//!
//! Both sequences are walked in lockstep assuming the supervisor lists
//! services sorted by name, which gives an O(n) merge instead of a full
//! rebuild and keeps row identity for services that survive a poll.
//!
//! Edit positions refer to the list as already modified by the preceding
//! edits, so applying them front to back turns `current` into `incoming`.
//! If the supervisor ever emits unsorted output the script is still correct
//! but no longer minimal: a moved service shows up as a delete plus an
//! insert. The input is never re-sorted, because that would change the
//! order the supervisor intends to show.

use std::borrow::Borrow;
use std::cmp::Ordering;

use serde::Serialize;

use crate::model::{ServiceRecord, TriState};

/// One step of an edit script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    Insert { at: usize, record: ServiceRecord },
    Update { at: usize, record: ServiceRecord },
    Delete { at: usize },
}

/// Counts of each edit kind in a script.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EditSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl EditSummary {
    pub fn of(edits: &[Edit]) -> Self {
        let mut summary = Self::default();
        for edit in edits {
            match edit {
                Edit::Insert { .. } => summary.inserted += 1,
                Edit::Update { .. } => summary.updated += 1,
                Edit::Delete { .. } => summary.deleted += 1,
            }
        }
        summary
    }
}

/// Compute the edit script that turns `current` into `incoming`.
pub fn reconcile<C>(current: &[C], incoming: &[ServiceRecord]) -> Vec<Edit>
where
    C: Borrow<ServiceRecord>,
{
    let mut edits = Vec::with_capacity(current.len().max(incoming.len()));
    let (mut i, mut j, mut at) = (0, 0, 0);

    while i < current.len() && j < incoming.len() {
        let existing = Borrow::<ServiceRecord>::borrow(&current[i]);
        match existing.name.cmp(&incoming[j].name) {
            Ordering::Less => {
                edits.push(Edit::Delete { at });
                i += 1;
            }
            Ordering::Equal => {
                edits.push(Edit::Update {
                    at,
                    record: incoming[j].clone(),
                });
                i += 1;
                j += 1;
                at += 1;
            }
            Ordering::Greater => {
                edits.push(Edit::Insert {
                    at,
                    record: incoming[j].clone(),
                });
                j += 1;
                at += 1;
            }
        }
    }

    for _ in i..current.len() {
        edits.push(Edit::Delete { at });
    }
    for record in &incoming[j..] {
        edits.push(Edit::Insert {
            at,
            record: record.clone(),
        });
        at += 1;
    }

    edits
}

/// Stable identity of a displayed row; survives updates, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RowHandle(u64);

/// A service as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRow {
    pub handle: RowHandle,
    #[serde(flatten)]
    pub record: ServiceRecord,
    pub state: TriState,
    /// Whether the unprivileged toggle may act on this row.
    pub toggleable: bool,
}

impl Borrow<ServiceRecord> for DisplayRow {
    fn borrow(&self) -> &ServiceRecord {
        &self.record
    }
}

/// The most recently reconciled list of services.
///
/// Owned by exactly one task; only mutated by applying edit scripts.
#[derive(Debug, Clone)]
pub struct DisplayList {
    rows: Vec<DisplayRow>,
    next_handle: u64,
    current_user: String,
}

impl DisplayList {
    pub fn new(current_user: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            next_handle: 1,
            current_user: current_user.into(),
        }
    }

    pub fn rows(&self) -> &[DisplayRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    pub fn find(&self, name: &str) -> Option<&DisplayRow> {
        self.rows.iter().find(|row| row.record.name == name)
    }

    /// Reconcile against `incoming`, apply the result, and return it.
    pub fn sync(&mut self, incoming: &[ServiceRecord]) -> Vec<Edit> {
        let edits = reconcile(&self.rows, incoming);
        self.apply(&edits);
        edits
    }

    /// Apply an edit script produced by [`reconcile`] against this list.
    pub fn apply(&mut self, edits: &[Edit]) {
        for edit in edits {
            match edit {
                Edit::Insert { at, record } => {
                    let row = self.make_row(record.clone());
                    self.rows.insert(*at, row);
                }
                Edit::Update { at, record } => {
                    let handle = self.rows[*at].handle;
                    self.rows[*at] = self.row_with_handle(handle, record.clone());
                }
                Edit::Delete { at } => {
                    self.rows.remove(*at);
                }
            }
        }
    }

    fn make_row(&mut self, record: ServiceRecord) -> DisplayRow {
        let handle = RowHandle(self.next_handle);
        self.next_handle += 1;
        self.row_with_handle(handle, record)
    }

    fn row_with_handle(&self, handle: RowHandle, record: ServiceRecord) -> DisplayRow {
        DisplayRow {
            handle,
            state: record.status.tri_state(),
            toggleable: record.toggleable_by(&self.current_user),
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceStatus;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn rec(name: &str, status: ServiceStatus) -> ServiceRecord {
        ServiceRecord::new(name, status, "")
    }

    fn apply_to(current: &[ServiceRecord], edits: &[Edit]) -> Vec<ServiceRecord> {
        let mut out = current.to_vec();
        for edit in edits {
            match edit {
                Edit::Insert { at, record } => out.insert(*at, record.clone()),
                Edit::Update { at, record } => out[*at] = record.clone(),
                Edit::Delete { at } => {
                    out.remove(*at);
                }
            }
        }
        out
    }

    #[test]
    fn insert_update_delete_in_one_pass() {
        let current = vec![
            rec("mysql", ServiceStatus::Started),
            rec("redis", ServiceStatus::Stopped),
        ];
        let incoming = vec![
            rec("dnsmasq", ServiceStatus::None),
            rec("redis", ServiceStatus::Started),
            rec("unbound", ServiceStatus::Stopped),
        ];

        let edits = reconcile(&current, &incoming);
        assert_eq!(
            edits,
            vec![
                Edit::Insert {
                    at: 0,
                    record: rec("dnsmasq", ServiceStatus::None)
                },
                Edit::Delete { at: 1 },
                Edit::Update {
                    at: 1,
                    record: rec("redis", ServiceStatus::Started)
                },
                Edit::Insert {
                    at: 2,
                    record: rec("unbound", ServiceStatus::Stopped)
                },
            ]
        );
        assert_eq!(apply_to(&current, &edits), incoming);
    }

    #[test]
    fn empty_sides_drain_as_inserts_or_deletes() {
        let list = vec![rec("a", ServiceStatus::Started), rec("b", ServiceStatus::Stopped)];
        let empty: Vec<ServiceRecord> = Vec::new();

        let edits = reconcile(&empty, &list);
        assert_eq!(EditSummary::of(&edits).inserted, 2);
        assert_eq!(apply_to(&empty, &edits), list);

        let edits = reconcile(&list, &empty);
        assert_eq!(edits, vec![Edit::Delete { at: 0 }, Edit::Delete { at: 0 }]);
        assert!(apply_to(&list, &edits).is_empty());
    }

    #[test]
    fn unsorted_input_degrades_to_delete_insert_pairs() {
        let current = vec![rec("b", ServiceStatus::Started), rec("a", ServiceStatus::Started)];
        let incoming = vec![rec("a", ServiceStatus::Started), rec("b", ServiceStatus::Started)];

        let edits = reconcile(&current, &incoming);
        let summary = EditSummary::of(&edits);
        assert!(summary.inserted > 0 && summary.deleted > 0);
        assert_eq!(apply_to(&current, &edits), incoming);
    }

    #[test]
    fn display_list_keeps_handles_across_updates() {
        let mut list = DisplayList::new("andrew");
        list.sync(&[rec("mysql", ServiceStatus::Stopped), rec("redis", ServiceStatus::Stopped)]);
        let redis = list.find("redis").unwrap().handle;

        list.sync(&[
            rec("nginx", ServiceStatus::Started),
            rec("redis", ServiceStatus::Started),
        ]);

        let row = list.find("redis").unwrap();
        assert_eq!(row.handle, redis);
        assert_eq!(row.state, TriState::On);
        assert!(list.find("mysql").is_none());

        let nginx = list.find("nginx").unwrap().handle;
        assert_ne!(nginx, redis);
    }

    #[test]
    fn display_rows_carry_toggle_eligibility() {
        let mut list = DisplayList::new("andrew");
        list.sync(&[
            ServiceRecord::new("dnsmasq", ServiceStatus::Started, "root"),
            ServiceRecord::new("mysql", ServiceStatus::Error, "andrew"),
            ServiceRecord::new("redis", ServiceStatus::Started, "andrew"),
        ]);

        let toggleable: Vec<_> = list
            .rows()
            .iter()
            .map(|row| (row.record.name.as_str(), row.toggleable))
            .collect();
        assert_eq!(
            toggleable,
            vec![("dnsmasq", false), ("mysql", false), ("redis", true)]
        );
        assert_eq!(list.rows()[1].state, TriState::Indeterminate);
    }

    fn status() -> impl Strategy<Value = ServiceStatus> {
        prop_oneof![
            Just(ServiceStatus::Started),
            Just(ServiceStatus::Stopped),
            Just(ServiceStatus::None),
            Just(ServiceStatus::Error),
            Just(ServiceStatus::Unknown),
        ]
    }

    fn sorted_snapshot() -> impl Strategy<Value = Vec<ServiceRecord>> {
        prop::collection::btree_map("[a-f]{1,3}", (status(), "(|root|andrew)"), 0..16).prop_map(
            |map: BTreeMap<String, (ServiceStatus, String)>| {
                map.into_iter()
                    .map(|(name, (status, owner))| ServiceRecord::new(name, status, owner))
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn applying_edits_yields_incoming(
            current in sorted_snapshot(),
            incoming in sorted_snapshot(),
        ) {
            let edits = reconcile(&current, &incoming);
            prop_assert_eq!(apply_to(&current, &edits), incoming);
        }

        #[test]
        fn one_edit_per_name(current in sorted_snapshot(), incoming in sorted_snapshot()) {
            let edits = reconcile(&current, &incoming);
            let before: BTreeSet<_> = current.iter().map(|r| r.name.clone()).collect();
            let after: BTreeSet<_> = incoming.iter().map(|r| r.name.clone()).collect();

            let summary = EditSummary::of(&edits);
            prop_assert_eq!(summary.updated, before.intersection(&after).count());
            prop_assert_eq!(summary.inserted, after.difference(&before).count());
            prop_assert_eq!(summary.deleted, before.difference(&after).count());

            for edit in &edits {
                match edit {
                    Edit::Insert { record, .. } => prop_assert!(!before.contains(&record.name)),
                    Edit::Update { record, .. } => prop_assert!(before.contains(&record.name)),
                    Edit::Delete { .. } => {}
                }
            }
        }

        #[test]
        fn reconciling_with_itself_only_updates(current in sorted_snapshot()) {
            let edits = reconcile(&current, &current);
            prop_assert_eq!(edits.len(), current.len());
            let only_updates = edits.iter().all(|e| matches!(e, Edit::Update { .. }));
            prop_assert!(only_updates, "expected only updates, got {:?}", edits);
        }

        #[test]
        fn unsorted_snapshots_still_converge(
            current in sorted_snapshot().prop_shuffle(),
            incoming in sorted_snapshot().prop_shuffle(),
        ) {
            let edits = reconcile(&current, &incoming);
            prop_assert_eq!(apply_to(&current, &edits), incoming);
        }

        #[test]
        fn display_list_matches_last_snapshot(
            first in sorted_snapshot(),
            second in sorted_snapshot(),
        ) {
            let mut list = DisplayList::new("andrew");
            list.sync(&first);
            list.sync(&second);
            let shown: Vec<_> = list.rows().iter().map(|row| row.record.clone()).collect();
            prop_assert_eq!(shown, second);
        }
    }
}
