//! Assignment engine: protocol snapshots bound to subjects.
//!
//! Assigning copies the protocol's current steps and fixes every injection
//! date at that moment. Later edits to the protocol never reach existing
//! assignments, and completion flags only move from false to true.

use crate::calendar;
use crate::protocol::{required, ProtocolStore};
use crate::{Assignment, AssignmentId, Error, ProtocolId, Result, ScheduledStep, SubjectId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Per-subject assignment lists.
///
/// Serialized as `{ subjectId: [assignment, ...] }`. Subjects iterate in
/// ascending id order; each list keeps creation order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<SubjectId, Vec<Assignment>>",
    into = "BTreeMap<SubjectId, Vec<Assignment>>"
)]
pub struct AssignmentEngine {
    subjects: BTreeMap<SubjectId, Vec<Assignment>>,
}

impl AssignmentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot a protocol onto a subject starting at `start_date`
    ///
    /// Nothing is stored unless every injection date can be computed.
    pub fn assign(
        &mut self,
        subject_id: &str,
        protocols: &ProtocolStore,
        protocol_id: &ProtocolId,
        start_date: &str,
    ) -> Result<Assignment> {
        let subject_id = SubjectId::from(required("subject id", subject_id)?);
        let protocol = protocols.get(protocol_id)?;
        let start_date = calendar::parse(start_date)?;

        let steps = protocol
            .steps
            .iter()
            .map(|step| -> Result<ScheduledStep> {
                Ok(ScheduledStep {
                    day_offset: step.day_offset,
                    hormone_name: step.hormone_name.clone(),
                    dosage: step.dosage.clone(),
                    note: step.note.clone(),
                    injection_date: calendar::add_days(&start_date, i64::from(step.day_offset))?,
                    done: false,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut id = AssignmentId::generate();
        while self.find_assignment(&id).is_some() {
            id = AssignmentId::generate();
        }

        let assignment = Assignment {
            id,
            subject_id: subject_id.clone(),
            protocol_id: protocol_id.clone(),
            protocol_name: protocol.name.clone(),
            start_date,
            steps,
        };

        tracing::debug!(
            "Assigned protocol {} to subject {} from {} as {}",
            protocol_id,
            subject_id,
            start_date,
            assignment.id
        );
        self.subjects
            .entry(subject_id)
            .or_default()
            .push(assignment.clone());
        Ok(assignment)
    }

    /// Mark one scheduled step as done
    ///
    /// Returns `true` when the step changed, `false` when it was already done.
    pub fn mark_step_done(
        &mut self,
        subject_id: &SubjectId,
        assignment_id: &AssignmentId,
        day_offset: i32,
    ) -> Result<bool> {
        let assignment = self
            .subjects
            .get_mut(subject_id)
            .ok_or_else(|| Error::NotFound(format!("subject {}", subject_id)))?
            .iter_mut()
            .find(|a| &a.id == assignment_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "assignment {} for subject {}",
                    assignment_id, subject_id
                ))
            })?;
        let step = assignment
            .steps
            .iter_mut()
            .find(|s| s.day_offset == day_offset)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "day {} step in assignment {}",
                    day_offset, assignment_id
                ))
            })?;

        if step.done {
            return Ok(false);
        }
        step.done = true;
        tracing::debug!(
            "Marked day {} of {} done for subject {}",
            day_offset,
            assignment_id,
            subject_id
        );
        Ok(true)
    }

    /// Delete every assignment owned by a subject
    ///
    /// Returns the removed assignments; unknown subjects remove nothing.
    pub fn remove_subject(&mut self, subject_id: &SubjectId) -> Vec<Assignment> {
        let removed = self.subjects.remove(subject_id).unwrap_or_default();
        if !removed.is_empty() {
            tracing::debug!(
                "Removed {} assignments of subject {}",
                removed.len(),
                subject_id
            );
        }
        removed
    }

    /// Assignments of one subject in creation order
    pub fn assignments_for(&self, subject_id: &SubjectId) -> &[Assignment] {
        self.subjects
            .get(subject_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn get(&self, subject_id: &SubjectId, assignment_id: &AssignmentId) -> Result<&Assignment> {
        self.assignments_for(subject_id)
            .iter()
            .find(|a| &a.id == assignment_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "assignment {} for subject {}",
                    assignment_id, subject_id
                ))
            })
    }

    /// Subjects holding at least one assignment, ascending
    pub fn subjects(&self) -> impl Iterator<Item = &SubjectId> {
        self.subjects
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(id, _)| id)
    }

    pub fn active_subject_count(&self) -> usize {
        self.subjects().count()
    }

    /// Every assignment: subjects ascending, then creation order
    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.subjects.values().flatten()
    }

    fn find_assignment(&self, id: &AssignmentId) -> Option<&Assignment> {
        self.iter().find(|a| &a.id == id)
    }
}

impl Assignment {
    pub fn done_count(&self) -> usize {
        self.steps.iter().filter(|s| s.done).count()
    }

    /// Completion percentage, rounded half up; 100 for an empty protocol
    pub fn progress(&self) -> u32 {
        let total = self.steps.len();
        if total == 0 {
            return 100;
        }
        ((self.done_count() * 100 + total / 2) / total) as u32
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.done)
    }
}

impl TryFrom<BTreeMap<SubjectId, Vec<Assignment>>> for AssignmentEngine {
    type Error = Error;

    fn try_from(mut subjects: BTreeMap<SubjectId, Vec<Assignment>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for (subject_id, assignments) in subjects.iter_mut() {
            required("subject id", subject_id.as_str())?;
            for assignment in assignments.iter_mut() {
                if assignment.subject_id.as_str().is_empty() {
                    assignment.subject_id = subject_id.clone();
                } else if &assignment.subject_id != subject_id {
                    return Err(Error::State(format!(
                        "assignment {} stored under subject {} claims subject {}",
                        assignment.id, subject_id, assignment.subject_id
                    )));
                }
                if !seen.insert(assignment.id.clone()) {
                    return Err(Error::DuplicateKey(format!("assignment {}", assignment.id)));
                }
                check_schedule(assignment)?;
            }
        }
        Ok(Self { subjects })
    }
}

/// Day offsets must be unique within an assignment
///
/// Stored injection dates are kept as written. Documents from older
/// releases carry dates shifted by a conversion fault in months 7 to 12,
/// so a mismatch with `start_date + day_offset` is only logged.
fn check_schedule(assignment: &Assignment) -> Result<()> {
    let mut offsets = HashSet::new();
    for step in &assignment.steps {
        if !offsets.insert(step.day_offset) {
            return Err(Error::DuplicateKey(format!(
                "day {} scheduled twice in assignment {}",
                step.day_offset, assignment.id
            )));
        }
        match calendar::add_days(&assignment.start_date, i64::from(step.day_offset)) {
            Ok(expected) if expected == step.injection_date => {}
            _ => tracing::warn!(
                "Assignment {} day {} is dated {} but starts {}; keeping stored date",
                assignment.id,
                step.day_offset,
                step.injection_date,
                assignment.start_date
            ),
        }
    }
    Ok(())
}

impl From<AssignmentEngine> for BTreeMap<SubjectId, Vec<Assignment>> {
    fn from(engine: AssignmentEngine) -> Self {
        engine.subjects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_protocol() -> (ProtocolStore, ProtocolId) {
        let mut store = ProtocolStore::new();
        let id = store.create("Sync").unwrap();
        store.add_step(&id, 0, "GnRH", "2ml", None).unwrap();
        store.add_step(&id, 7, "PGF", "5ml", Some("morning")).unwrap();
        store.add_step(&id, 9, "GnRH", "2ml", None).unwrap();
        (store, id)
    }

    #[test]
    fn test_assign_materializes_dates() {
        crate::logging::init_test();
        let (store, pid) = sync_protocol();
        let mut engine = AssignmentEngine::new();

        let assignment = engine.assign("101", &store, &pid, "1404/01/10").unwrap();

        let dates: Vec<String> = assignment
            .steps
            .iter()
            .map(|s| s.injection_date.to_string())
            .collect();
        assert_eq!(dates, vec!["1404/01/10", "1404/01/17", "1404/01/19"]);
        assert!(assignment.steps.iter().all(|s| !s.done));
        assert_eq!(assignment.protocol_name, "Sync");
        assert_eq!(assignment.subject_id, SubjectId::from("101"));
        assert!(assignment.id.as_str().starts_with("asgn_"));
        assert_eq!(engine.assignments_for(&"101".into()).len(), 1);
    }

    #[test]
    fn test_assign_validation_order() {
        let (store, pid) = sync_protocol();
        let mut engine = AssignmentEngine::new();

        assert!(matches!(
            engine.assign("  ", &store, &pid, "1404/01/10"),
            Err(Error::EmptyInput("subject id"))
        ));
        assert!(matches!(
            engine.assign("101", &store, &"proto_missing".into(), "1404/01/10"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            engine.assign("101", &store, &pid, "1404/13/10"),
            Err(Error::InvalidDate(_))
        ));
        assert_eq!(engine.active_subject_count(), 0);
    }

    #[test]
    fn test_assign_rejects_schedule_leaving_domain() {
        let (store, pid) = sync_protocol();
        let mut engine = AssignmentEngine::new();
        assert!(matches!(
            engine.assign("101", &store, &pid, "1878/12/25"),
            Err(Error::InvalidDate(_))
        ));
        assert!(engine.assignments_for(&"101".into()).is_empty());
    }

    #[test]
    fn test_snapshot_isolation() {
        let (mut store, pid) = sync_protocol();
        store.remove_step(&pid, 9).unwrap();
        let mut engine = AssignmentEngine::new();
        let assignment = engine.assign("S", &store, &pid, "1404/01/10").unwrap();

        store.add_step(&pid, 14, "eCG", "400IU", None).unwrap();
        store.delete(&pid).unwrap();

        let stored = engine.get(&"S".into(), &assignment.id).unwrap();
        assert_eq!(stored.steps.len(), 2);
        assert_eq!(stored.protocol_name, "Sync");
    }

    #[test]
    fn test_subject_accumulates_assignments() {
        let (store, pid) = sync_protocol();
        let mut engine = AssignmentEngine::new();
        let first = engine.assign("101", &store, &pid, "1404/01/10").unwrap();
        let second = engine.assign("101", &store, &pid, "1404/01/10").unwrap();

        assert_ne!(first.id, second.id);
        let ids: Vec<_> = engine
            .assignments_for(&"101".into())
            .iter()
            .map(|a| a.id.clone())
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn test_mark_step_done_is_idempotent() {
        let (store, pid) = sync_protocol();
        let mut engine = AssignmentEngine::new();
        let subject = SubjectId::from("101");
        let a = engine.assign("101", &store, &pid, "1404/01/10").unwrap();

        assert!(engine.mark_step_done(&subject, &a.id, 7).unwrap());
        let once = engine.clone();
        assert!(!engine.mark_step_done(&subject, &a.id, 7).unwrap());
        assert_eq!(engine, once);

        let stored = engine.get(&subject, &a.id).unwrap();
        assert_eq!(
            stored.steps.iter().map(|s| s.done).collect::<Vec<_>>(),
            vec![false, true, false]
        );
    }

    #[test]
    fn test_mark_step_done_not_found() {
        let (store, pid) = sync_protocol();
        let mut engine = AssignmentEngine::new();
        let subject = SubjectId::from("101");
        let a = engine.assign("101", &store, &pid, "1404/01/10").unwrap();

        assert!(matches!(
            engine.mark_step_done(&"102".into(), &a.id, 0),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            engine.mark_step_done(&subject, &"asgn_missing".into(), 0),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            engine.mark_step_done(&subject, &a.id, 3),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_subject_cascades() {
        let (store, pid) = sync_protocol();
        let mut engine = AssignmentEngine::new();
        engine.assign("101", &store, &pid, "1404/01/10").unwrap();
        engine.assign("101", &store, &pid, "1404/02/01").unwrap();
        engine.assign("102", &store, &pid, "1404/01/10").unwrap();

        assert_eq!(engine.remove_subject(&"101".into()).len(), 2);
        assert!(engine.assignments_for(&"101".into()).is_empty());
        assert_eq!(engine.active_subject_count(), 1);
        assert!(engine.remove_subject(&"101".into()).is_empty());
    }

    #[test]
    fn test_progress() {
        let (store, pid) = sync_protocol();
        let mut engine = AssignmentEngine::new();
        let subject = SubjectId::from("101");
        let a = engine.assign("101", &store, &pid, "1404/01/10").unwrap();
        assert_eq!(a.progress(), 0);

        engine.mark_step_done(&subject, &a.id, 0).unwrap();
        assert_eq!(engine.get(&subject, &a.id).unwrap().progress(), 33);
        engine.mark_step_done(&subject, &a.id, 7).unwrap();
        assert_eq!(engine.get(&subject, &a.id).unwrap().progress(), 67);
        engine.mark_step_done(&subject, &a.id, 9).unwrap();
        assert_eq!(engine.get(&subject, &a.id).unwrap().progress(), 100);
        assert!(engine.get(&subject, &a.id).unwrap().is_complete());
    }

    #[test]
    fn test_progress_of_empty_protocol_is_complete() {
        let mut store = ProtocolStore::new();
        let pid = store.create("Empty").unwrap();
        let mut engine = AssignmentEngine::new();
        let a = engine.assign("101", &store, &pid, "1404/01/10").unwrap();
        assert_eq!(a.progress(), 100);
    }

    #[test]
    fn test_deserialize_restores_subject_ids() {
        let json = r#"{
            "101": [{
                "id": "asgn_1",
                "protocolId": "proto_1",
                "protocolName": "Sync",
                "startDate": "1404/01/10",
                "steps": [
                    {"dayOffset": 0, "hormoneName": "GnRH", "dosage": "2ml", "note": "",
                     "injectionDate": "1404/01/10", "done": true},
                    {"dayOffset": 7, "hormoneName": "PGF", "dosage": "5ml", "note": "",
                     "injectionDate": "1404/01/17", "done": false}
                ]
            }]
        }"#;
        let engine: AssignmentEngine = serde_json::from_str(json).unwrap();
        let a = engine.get(&"101".into(), &"asgn_1".into()).unwrap();
        assert_eq!(a.subject_id, SubjectId::from("101"));
        assert_eq!(a.progress(), 50);
    }

    #[test]
    fn test_deserialize_keeps_stored_dates() {
        crate::logging::init_test();
        // Day 0 dated through the old months 7-12 conversion
        let json = r#"{
            "101": [{
                "id": "asgn_1727000000000", "protocolId": "p", "protocolName": "Sync",
                "startDate": "1404/07/10",
                "steps": [
                    {"dayOffset": 0, "hormoneName": "GnRH", "dosage": "2ml",
                     "injectionDate": "1404/01/16", "done": false},
                    {"dayOffset": 7, "hormoneName": "PGF", "dosage": "5ml",
                     "injectionDate": "1404/01/23", "done": false}
                ]
            }]
        }"#;
        let engine: AssignmentEngine = serde_json::from_str(json).unwrap();
        let a = engine
            .get(&"101".into(), &"asgn_1727000000000".into())
            .unwrap();
        let dates: Vec<String> = a.steps.iter().map(|s| s.injection_date.to_string()).collect();
        assert_eq!(dates, vec!["1404/01/16", "1404/01/23"]);

        let json_out = serde_json::to_value(&engine).unwrap();
        assert_eq!(json_out["101"][0]["steps"][0]["injectionDate"], "1404/01/16");
    }

    #[test]
    fn test_deserialize_rejects_duplicate_offsets() {
        let json = r#"{
            "101": [{
                "id": "asgn_1", "protocolId": "p", "protocolName": "Sync",
                "startDate": "1404/01/10",
                "steps": [
                    {"dayOffset": 7, "hormoneName": "PGF", "dosage": "5ml",
                     "injectionDate": "1404/01/17", "done": false},
                    {"dayOffset": 7, "hormoneName": "GnRH", "dosage": "2ml",
                     "injectionDate": "1404/01/17", "done": false}
                ]
            }]
        }"#;
        assert!(matches!(
            serde_json::from_str::<AssignmentEngine>(json),
            Err(e) if e.to_string().contains("scheduled twice")
        ));
    }

    #[test]
    fn test_deserialize_rejects_duplicate_assignment_ids() {
        let json = r#"{
            "101": [{"id": "asgn_1", "protocolId": "p", "protocolName": "A",
                     "startDate": "1404/01/10", "steps": []}],
            "102": [{"id": "asgn_1", "protocolId": "p", "protocolName": "A",
                     "startDate": "1404/01/10", "steps": []}]
        }"#;
        assert!(serde_json::from_str::<AssignmentEngine>(json).is_err());
    }
}
