// src/models/attempt.rs

use serde::{Deserialize, Serialize};

/// One graded attempt, as returned by `GET /exam-windows/{id}/ranking`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    #[serde(alias = "userId", alias = "estudianteId")]
    pub student_id: i64,
    #[serde(default, alias = "nombre", alias = "username")]
    pub student_name: Option<String>,
    #[serde(alias = "puntaje", alias = "calificacion")]
    pub score: f64,
    #[serde(default, alias = "fechaFin")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub cancelled: bool,
}

/// Aggregated row for displaying the ranking of one exam window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    /// Standard competition rank (1, 2, 2, 4).
    pub position: u32,
    pub student_id: i64,
    pub student_name: Option<String>,
    pub score: f64,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}
