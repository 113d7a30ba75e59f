use serde::Serialize;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionProgress {
    /// One-based position of the current question.
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    pub remaining_seconds: u32,
    pub percent: f64,
    pub is_submitted: bool,
}
