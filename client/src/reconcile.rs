// src/reconcile.rs

//! Rules for merging one incremental change into a cached window.
//!
//! Push events can arrive after a newer full refresh, so every lifecycle
//! change is checked against the cached state before it is applied.

use crate::channel::events::EnrollmentCount;
use crate::models::{ExamWindow, LifecycleState, WindowPatch};

/// A change for a single window, as extracted from a channel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    State(LifecycleState),
    Enrollment {
        count: Option<EnrollmentCount>,
        state: Option<LifecycleState>,
    },
    Visibility(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Only a full refresh may introduce windows.
    UnknownWindow,
    /// Lifecycle regression from an out-of-order event.
    StaleTransition,
    /// Visibility toggled on a window that already started.
    VisibilityLocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Apply(WindowPatch),
    /// Apply, then schedule a debounced background refresh.
    ApplyAndRefresh(WindowPatch),
    Discard(DiscardReason),
}

impl Decision {
    pub fn patch(&self) -> Option<&WindowPatch> {
        match self {
            Decision::Apply(patch) | Decision::ApplyAndRefresh(patch) => Some(patch),
            Decision::Discard(_) => None,
        }
    }

    pub fn wants_refresh(&self) -> bool {
        matches!(self, Decision::ApplyAndRefresh(_))
    }
}

/// Whether moving from `current` to `incoming` goes against the lifecycle.
///
/// `enrollment_closed -> scheduled` is the one permitted step back (capacity
/// raised before the start time).
pub fn is_backward(current: LifecycleState, incoming: LifecycleState) -> bool {
    incoming < current
        && !(current == LifecycleState::EnrollmentClosed && incoming == LifecycleState::Scheduled)
}

pub fn decide(window: Option<&ExamWindow>, incoming: &Incoming) -> Decision {
    let Some(window) = window else {
        return Decision::Discard(DiscardReason::UnknownWindow);
    };

    match *incoming {
        Incoming::State(state) => {
            if is_backward(window.state, state) {
                Decision::Discard(DiscardReason::StaleTransition)
            } else {
                Decision::ApplyAndRefresh(WindowPatch::state(state))
            }
        }
        Incoming::Enrollment { count, state } => {
            let state = state.filter(|s| {
                let stale = is_backward(window.state, *s);
                if stale {
                    tracing::debug!(
                        "Ignoring stale state {} for window {} (cached {})",
                        s,
                        window.id,
                        window.state
                    );
                }
                !stale
            });
            Decision::Apply(WindowPatch {
                state,
                enrolled_count: count.map(|c| resolve_count(window, c)),
                is_active: None,
            })
        }
        Incoming::Visibility(active) => {
            if window.state.allows_visibility_edit() {
                Decision::Apply(WindowPatch::visibility(active))
            } else {
                Decision::Discard(DiscardReason::VisibilityLocked)
            }
        }
    }
}

/// Absolute counts come from the server and are taken as-is; deltas are
/// optimistic and never push the count past capacity or below zero.
fn resolve_count(window: &ExamWindow, count: EnrollmentCount) -> u32 {
    match count {
        EnrollmentCount::Absolute(n) => n,
        EnrollmentCount::Delta(delta) => {
            let ceiling = i64::from(window.max_capacity.max(window.enrolled_count));
            let next = i64::from(window.enrolled_count)
                .saturating_add(delta)
                .clamp(0, ceiling);
            next as u32
        }
    }
}
