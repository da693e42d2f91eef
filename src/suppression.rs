//! Suppression state machine and the cascade that withdraws dependents of a
//! suppressed record.
//!
//! The dependency graph has fixed edges:
//!
//! ```text
//! Study -> Sample (membership)      Study -> Run / Assembly (only when detached from any sample)
//! Sample -> Run, Sample -> Assembly
//! Run -> AnalysisJob, Assembly -> AnalysisJob
//! ```
//!
//! A dependent is withdrawn only when every parent it could be reached through
//! is suppressed. Un-suppressing never restores descendants.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{EnaStatus, SuppressionReason};
use crate::model::{AnalysisTarget, EntityRef, SuppressionState};
use crate::store::{Catalog, ChangeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: SuppressionState,
    pub entered_suppression: bool,
}

pub fn apply_upstream_status(
    current: &SuppressionState,
    status: EnaStatus,
    now: DateTime<Utc>,
) -> Option<Transition> {
    let mut next = current.clone();
    match status {
        EnaStatus::Public => next.is_private = false,
        EnaStatus::Private => next.is_private = true,
        terminal => {
            let reason = terminal.suppression_reason()?;
            if current.is_suppressed {
                if current.suppression_reason != Some(reason) {
                    debug!(
                        current = ?current.suppression_reason,
                        upstream = %reason,
                        "already suppressed, keeping existing reason"
                    );
                }
                return None;
            }
            next.is_suppressed = true;
            next.suppression_reason = Some(reason);
            next.suppressed_at = Some(now);
        }
    }
    if next == *current {
        return None;
    }
    let entered_suppression = next.is_suppressed && !current.is_suppressed;
    Some(Transition {
        next,
        entered_suppression,
    })
}

pub fn suppress_by_ancestor(current: &SuppressionState, now: DateTime<Utc>) -> SuppressionState {
    SuppressionState {
        is_private: current.is_private,
        is_suppressed: true,
        suppression_reason: Some(SuppressionReason::AncestorSuppressed),
        suppressed_at: Some(now),
    }
}

pub fn unsuppress(current: &SuppressionState) -> SuppressionState {
    SuppressionState {
        is_private: current.is_private,
        is_suppressed: false,
        suppression_reason: None,
        suppressed_at: None,
    }
}

#[derive(Debug, Default)]
pub struct DependencyIndex {
    children: HashMap<EntityRef, Vec<EntityRef>>,
}

impl DependencyIndex {
    pub fn build(catalog: &Catalog) -> Self {
        let mut index = Self::default();

        for sample in catalog.samples.values() {
            for study in &sample.studies {
                index.link(EntityRef::Study(*study), EntityRef::Sample(sample.id));
            }
        }
        for run in catalog.runs.values() {
            match (run.sample, run.study) {
                (Some(sample), _) => index.link(EntityRef::Sample(sample), EntityRef::Run(run.id)),
                (None, Some(study)) => index.link(EntityRef::Study(study), EntityRef::Run(run.id)),
                (None, None) => {}
            }
        }
        for assembly in catalog.assemblies.values() {
            if assembly.samples.is_empty() {
                if let Some(study) = assembly.study {
                    index.link(EntityRef::Study(study), EntityRef::Assembly(assembly.id));
                }
            }
            for sample in &assembly.samples {
                index.link(EntityRef::Sample(*sample), EntityRef::Assembly(assembly.id));
            }
        }
        for job in catalog.analyses.values() {
            let parent = match job.target {
                AnalysisTarget::Run(id) => EntityRef::Run(id),
                AnalysisTarget::Assembly(id) => EntityRef::Assembly(id),
            };
            index.link(parent, EntityRef::AnalysisJob(job.id));
        }

        for children in index.children.values_mut() {
            children.sort();
            children.dedup();
        }
        index
    }

    fn link(&mut self, parent: EntityRef, child: EntityRef) {
        self.children.entry(parent).or_default().push(child);
    }

    pub fn children(&self, parent: EntityRef) -> &[EntityRef] {
        self.children
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn parents(catalog: &Catalog, entity: EntityRef) -> Vec<EntityRef> {
    match entity {
        EntityRef::Study(_) => Vec::new(),
        EntityRef::Sample(id) => catalog
            .samples
            .get(&id)
            .map(|sample| sample.studies.iter().map(|s| EntityRef::Study(*s)).collect())
            .unwrap_or_default(),
        EntityRef::Run(id) => catalog
            .runs
            .get(&id)
            .and_then(|run| match (run.sample, run.study) {
                (Some(sample), _) => Some(EntityRef::Sample(sample)),
                (None, Some(study)) => Some(EntityRef::Study(study)),
                (None, None) => None,
            })
            .into_iter()
            .collect(),
        EntityRef::Assembly(id) => catalog
            .assemblies
            .get(&id)
            .map(|assembly| {
                if assembly.samples.is_empty() {
                    assembly.study.map(EntityRef::Study).into_iter().collect()
                } else {
                    assembly.samples.iter().map(|s| EntityRef::Sample(*s)).collect()
                }
            })
            .unwrap_or_default(),
        EntityRef::AnalysisJob(id) => catalog
            .analyses
            .get(&id)
            .map(|job| match job.target {
                AnalysisTarget::Run(run) => vec![EntityRef::Run(run)],
                AnalysisTarget::Assembly(assembly) => vec![EntityRef::Assembly(assembly)],
            })
            .unwrap_or_default(),
    }
}

/// Descendants of `root` that lose their last non-suppressed path once `root`
/// is suppressed, in breadth-first order. `pending` holds suppressions queued
/// earlier in the same page; they count as already applied.
pub fn cascade(
    catalog: &Catalog,
    index: &DependencyIndex,
    pending: &ChangeSet,
    root: EntityRef,
) -> Vec<EntityRef> {
    let mut withdrawn = BTreeSet::from([root]);
    let mut order = Vec::new();
    let mut queue = VecDeque::from([root]);

    let is_suppressed = |entity: EntityRef, withdrawn: &BTreeSet<EntityRef>| {
        withdrawn.contains(&entity)
            || catalog
                .effective_state(entity, pending)
                .is_some_and(|state| state.is_suppressed)
    };

    while let Some(parent) = queue.pop_front() {
        for child in index.children(parent) {
            if is_suppressed(*child, &withdrawn) {
                continue;
            }
            let reachable = parents(catalog, *child)
                .into_iter()
                .any(|other| !is_suppressed(other, &withdrawn));
            if reachable {
                debug!(
                    kind = %child.kind(),
                    id = child.id(),
                    "still reachable through another parent"
                );
                continue;
            }
            withdrawn.insert(*child);
            order.push(*child);
            queue.push_back(*child);
        }
    }

    order
}

pub fn queue_cascade(
    catalog: &Catalog,
    index: &DependencyIndex,
    pending: &mut ChangeSet,
    root: EntityRef,
    now: DateTime<Utc>,
) -> Vec<EntityRef> {
    let withdrawn = cascade(catalog, index, pending, root);
    for entity in &withdrawn {
        if let Some(current) = catalog.effective_state(*entity, pending) {
            let next = suppress_by_ancestor(current, now);
            pending.set_state(*entity, next);
        }
    }
    withdrawn
}
