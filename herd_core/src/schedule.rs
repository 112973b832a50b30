//! Read-only schedule queries across all assignments.
//!
//! Answers "what is due" for a reference date:
//! - Undone steps inside a day window, ordered by injection date
//! - Grouping by (hormone, dosage) in first-seen order
//! - Grouping by date, then by (hormone, dosage)

use crate::assignment::AssignmentEngine;
use crate::calendar::{self, JalaliDate};
use crate::{DateGroup, DueStep, HormoneGroup};
use std::collections::{BTreeMap, HashMap};

/// Undone steps dated `reference ..= reference + window_days`
///
/// Ordered by injection date. Steps sharing a date keep scan order:
/// subject id ascending, then assignment creation order, then day offset.
pub fn upcoming_injections(
    assignments: &AssignmentEngine,
    window_days: u32,
    reference: &JalaliDate,
) -> Vec<DueStep> {
    let window = i64::from(window_days);
    let mut due: Vec<DueStep> = assignments
        .iter()
        .flat_map(|assignment| {
            assignment
                .steps
                .iter()
                .filter(|step| !step.done)
                .map(move |step| (assignment, step))
        })
        .filter_map(|(assignment, step)| {
            let days_from_now = calendar::diff_days(reference, &step.injection_date);
            (0..=window).contains(&days_from_now).then(|| DueStep {
                subject_id: assignment.subject_id.clone(),
                assignment_id: assignment.id.clone(),
                protocol_name: assignment.protocol_name.clone(),
                day_offset: step.day_offset,
                hormone_name: step.hormone_name.clone(),
                dosage: step.dosage.clone(),
                note: step.note.clone(),
                injection_date: step.injection_date,
                days_from_now,
            })
        })
        .collect();

    due.sort_by(|a, b| calendar::compare(&a.injection_date, &b.injection_date));
    tracing::debug!(
        "{} injections due within {} days of {}",
        due.len(),
        window_days,
        reference
    );
    due
}

/// Undone steps dated exactly `reference`
pub fn due_today(assignments: &AssignmentEngine, reference: &JalaliDate) -> Vec<DueStep> {
    upcoming_injections(assignments, 0, reference)
}

/// Partition by `(hormone_name, dosage)`
///
/// Groups appear in the order their key was first seen; members keep
/// their relative order.
pub fn group_by_hormone_dosage(items: impl IntoIterator<Item = DueStep>) -> Vec<HormoneGroup> {
    let mut groups: Vec<HormoneGroup> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for item in items {
        let key = (item.hormone_name.clone(), item.dosage.clone());
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(HormoneGroup {
                hormone_name: item.hormone_name.clone(),
                dosage: item.dosage.clone(),
                items: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].items.push(item);
    }

    groups
}

/// Bucket by injection date (ascending), then group each bucket by hormone
pub fn group_by_date_then_hormone(items: impl IntoIterator<Item = DueStep>) -> Vec<DateGroup> {
    let mut buckets: BTreeMap<JalaliDate, Vec<DueStep>> = BTreeMap::new();
    for item in items {
        buckets.entry(item.injection_date).or_default().push(item);
    }

    buckets
        .into_iter()
        .map(|(date, bucket)| {
            // every member shares the date, so any one gives days_from_now
            let days_from_now = bucket.first().map_or(0, |item| item.days_from_now);
            DateGroup {
                date,
                days_from_now,
                groups: group_by_hormone_dosage(bucket),
            }
        })
        .collect()
}
