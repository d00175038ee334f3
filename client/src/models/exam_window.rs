// src/models/exam_window.rs

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Server-authoritative stage of an exam window's life.
///
/// Variants are declared in lifecycle order, so `Ord` follows
/// `scheduled < enrollment_closed < in_progress < finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[serde(alias = "programada")]
    Scheduled,
    #[serde(alias = "cerrada", alias = "inscripciones_cerradas", alias = "enrollmentClosed")]
    EnrollmentClosed,
    #[serde(alias = "en_curso", alias = "inProgress")]
    InProgress,
    #[serde(alias = "finalizada")]
    Finished,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 4] = [
        LifecycleState::Scheduled,
        LifecycleState::EnrollmentClosed,
        LifecycleState::InProgress,
        LifecycleState::Finished,
    ];

    /// Parses a wire value, accepting the same aliases as deserialization.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" | "programada" => Some(Self::Scheduled),
            "enrollment_closed" | "enrollmentclosed" | "cerrada" | "inscripciones_cerradas" => {
                Some(Self::EnrollmentClosed)
            }
            "in_progress" | "inprogress" | "en_curso" => Some(Self::InProgress),
            "finished" | "finalizada" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Visibility (`is_active`) can only be edited before the window starts.
    pub fn allows_visibility_edit(self) -> bool {
        matches!(self, Self::Scheduled | Self::EnrollmentClosed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scheduled => "scheduled",
            Self::EnrollmentClosed => "enrollment_closed",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// One enrollment record as embedded in the window list (`inscripciones[]`).
#[derive(Debug, Clone, Deserialize)]
pub struct Inscription {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub estado: Option<String>,
}

impl Inscription {
    pub fn is_cancelled(&self) -> bool {
        self.estado
            .as_deref()
            .map(|s| {
                let s = s.trim().to_ascii_lowercase();
                s == "cancelada" || s == "cancelled" || s == "canceled"
            })
            .unwrap_or(false)
    }
}

/// Counts enrollments that still hold a seat.
pub fn count_active(inscriptions: &[Inscription]) -> u32 {
    inscriptions.iter().filter(|i| !i.is_cancelled()).count() as u32
}

/// Wire shape of `GET /exam-windows/professor` items.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExamWindowRecord {
    id: i64,
    #[serde(default, alias = "examId")]
    examen_id: Option<i64>,
    estado: LifecycleState,
    #[serde(default)]
    fecha_inicio: Option<DateTime<Utc>>,
    #[serde(default)]
    duracion: Option<u32>,
    #[serde(default)]
    sin_tiempo: bool,
    cupo_maximo: u32,
    #[serde(default)]
    inscritos_count: Option<u32>,
    #[serde(default)]
    inscripciones: Option<Vec<Inscription>>,
    #[serde(default)]
    activa: bool,
    #[serde(default, rename = "usaSEB")]
    usa_seb: bool,
    #[serde(default)]
    kiosk_mode: bool,
    #[serde(default)]
    requiere_presente: bool,
}

/// A scheduled offering of one exam, as cached by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ExamWindowRecord")]
pub struct ExamWindow {
    pub id: i64,
    pub exam_id: Option<i64>,
    /// Filled from the exam catalog on refresh.
    pub exam_title: Option<String>,
    pub state: LifecycleState,
    pub starts_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
    pub is_untimed: bool,
    pub max_capacity: u32,
    pub enrolled_count: u32,
    pub is_active: bool,
    pub requires_lockdown_browser: bool,
    pub full_screen_mode: bool,
    pub requires_attendance_marking: bool,
}

impl From<ExamWindowRecord> for ExamWindow {
    fn from(raw: ExamWindowRecord) -> Self {
        // The explicit counter wins when both representations are sent.
        let enrolled_count = raw
            .inscritos_count
            .or_else(|| raw.inscripciones.as_deref().map(count_active))
            .unwrap_or(0);

        ExamWindow {
            id: raw.id,
            exam_id: raw.examen_id,
            exam_title: None,
            state: raw.estado,
            starts_at: raw.fecha_inicio,
            duration_minutes: raw.duracion.filter(|d| *d > 0),
            is_untimed: raw.sin_tiempo,
            max_capacity: raw.cupo_maximo,
            enrolled_count,
            is_active: raw.activa,
            requires_lockdown_browser: raw.usa_seb,
            full_screen_mode: raw.kiosk_mode,
            requires_attendance_marking: raw.requiere_presente && !raw.sin_tiempo,
        }
    }
}

impl ExamWindow {
    /// Minimal scheduled window, mostly useful for tests and fixtures.
    pub fn new(id: i64, state: LifecycleState, enrolled_count: u32, max_capacity: u32) -> Self {
        ExamWindow {
            id,
            exam_id: None,
            exam_title: None,
            state,
            starts_at: None,
            duration_minutes: None,
            is_untimed: false,
            max_capacity,
            enrolled_count,
            is_active: true,
            requires_lockdown_browser: false,
            full_screen_mode: false,
            requires_attendance_marking: false,
        }
    }

    /// Seats left for display. Never negative, even if the server over-enrolled.
    pub fn slots_available(&self) -> u32 {
        self.max_capacity.saturating_sub(self.enrolled_count)
    }

    pub fn is_full(&self) -> bool {
        self.slots_available() == 0
    }

    /// Kiosk mode only applies inside the lockdown browser.
    pub fn effective_full_screen(&self) -> bool {
        self.requires_lockdown_browser && self.full_screen_mode
    }

    /// End of the window, when it is timed and fully scheduled.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        if self.is_untimed {
            return None;
        }
        let start = self.starts_at?;
        let minutes = self.duration_minutes?;
        Some(start + Duration::minutes(i64::from(minutes)))
    }

    /// Whether a student could be taking the exam at `now`.
    pub fn is_available_now(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            LifecycleState::InProgress => true,
            LifecycleState::Scheduled if self.is_untimed => true,
            LifecycleState::Scheduled => match (self.starts_at, self.ends_at()) {
                (Some(start), Some(end)) => now >= start && now < end,
                _ => false,
            },
            LifecycleState::EnrollmentClosed | LifecycleState::Finished => false,
        }
    }

    /// Re-establishes the field-level invariants after a merge.
    pub(crate) fn normalize(&mut self) {
        if self.is_untimed {
            self.requires_attendance_marking = false;
        }
    }
}

/// Shallow set of fields an incremental event may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowPatch {
    pub state: Option<LifecycleState>,
    pub enrolled_count: Option<u32>,
    pub is_active: Option<bool>,
}

impl WindowPatch {
    pub fn state(state: LifecycleState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn enrolled(count: u32) -> Self {
        Self {
            enrolled_count: Some(count),
            ..Self::default()
        }
    }

    pub fn visibility(active: bool) -> Self {
        Self {
            is_active: Some(active),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.enrolled_count.is_none() && self.is_active.is_none()
    }

    /// Merges the present fields into `window`.
    pub fn merge_into(&self, window: &mut ExamWindow) {
        if let Some(state) = self.state {
            window.state = state;
        }
        if let Some(count) = self.enrolled_count {
            window.enrolled_count = count;
        }
        if let Some(active) = self.is_active {
            window.is_active = active;
        }
        window.normalize();
    }
}
