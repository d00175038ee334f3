// src/models/exam.rs

use serde::{Deserialize, Serialize};

/// Exam catalog entry (`GET /exams`). Only what the windows view displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    #[serde(alias = "titulo", alias = "nombre")]
    pub title: String,
}
