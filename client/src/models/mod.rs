// src/models/mod.rs

pub mod attempt;
pub mod exam;
pub mod exam_window;

pub use exam_window::{ExamWindow, LifecycleState, WindowPatch};
