use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::model::ids::{AttemptId, ExamId, QuestionId, UserId};

/// Recorded answers, keyed by question id. Values are stored verbatim.
pub type Answers = BTreeMap<QuestionId, String>;

/// Why an attempt was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitReason {
    UserRequested,
    TimeExpired,
}

impl SubmitReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitReason::UserRequested => "user_requested",
            SubmitReason::TimeExpired => "time_expired",
        }
    }
}

impl fmt::Display for SubmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_requested" => Ok(SubmitReason::UserRequested),
            "time_expired" => Ok(SubmitReason::TimeExpired),
            other => Err(format!("invalid submit reason: {other}")),
        }
    }
}

/// Lifecycle state of an exam attempt. `Submitted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Submitted,
}

/// Frozen result of submitting an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub answered_count: usize,
    pub total_count: usize,
    pub reason: SubmitReason,
}

/// Payload handed to a submission sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub attempt_id: AttemptId,
    pub exam_id: ExamId,
    pub user_id: UserId,
    pub answers: Answers,
    pub reason: SubmitReason,
    pub submitted_at: DateTime<Utc>,
    pub total_questions: usize,
}

impl Submission {
    #[must_use]
    pub fn summary(&self) -> SubmissionSummary {
        SubmissionSummary {
            answered_count: self.answers.len(),
            total_count: self.total_questions,
            reason: self.reason,
        }
    }
}

/// Acknowledgement returned by a sink once a submission is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub id: i64,
    pub attempt_id: AttemptId,
    pub received_at: DateTime<Utc>,
}
