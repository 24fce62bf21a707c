//! Exam form state and the submission collaborator.

use serde::{Deserialize, Serialize};

use crate::api::{Principal, SUBMIT_PATH};
use crate::bait::{BAIT_FIELD_NAME, BaitField};
use crate::credential::TokenStorage;
use crate::error::Result;
use crate::navigation::Navigator;
use crate::transport::{ApiRequest, AuthenticatedTransport, Dispatch};

/// Body of `POST /exam/submit`.
///
/// `phone_extension_secondary` is the bait field value, forwarded untouched.
/// Any non-empty value is an automation signal for the grading backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub student_id: i64,
    pub exam_id: String,
    pub question_id: String,
    pub answer_text: String,
    pub time_taken_seconds: u64,
    #[serde(rename = "phone_extension_secondary", default)]
    pub bait_value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamStatus {
    Passed,
    Flagged,
    ReviewRequired,
}

/// Response of `POST /exam/submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub student_id: i64,
    pub status: ExamStatus,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_remarks: Option<String>,
}

impl ExamResult {
    /// User-facing outcome line.
    pub fn summary(&self) -> String {
        match self.status {
            ExamStatus::Flagged => format!(
                "Exam Flagged: {}",
                self.security_remarks.as_deref().unwrap_or("no remarks")
            ),
            ExamStatus::ReviewRequired => "Exam submitted for review.".to_string(),
            ExamStatus::Passed => "Exam Passed!".to_string(),
        }
    }
}

/// Form state for a single question.
///
/// Visible controls only ever touch `answer`. The bait binding is reachable
/// solely through [`ExamForm::set_field`] by name, which is what a heuristic
/// form-filler does.
#[derive(Debug, Clone)]
pub struct ExamForm {
    exam_id: String,
    question_id: String,
    answer: String,
    bait: BaitField,
    opened_at_ms: f64,
}

impl ExamForm {
    pub fn open(exam_id: impl Into<String>, question_id: impl Into<String>, now_ms: f64) -> Self {
        Self {
            exam_id: exam_id.into(),
            question_id: question_id.into(),
            answer: String::new(),
            bait: BaitField::default(),
            opened_at_ms: now_ms,
        }
    }

    pub fn exam_id(&self) -> &str {
        &self.exam_id
    }

    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn bait(&self) -> &BaitField {
        &self.bait
    }

    /// Append typed text to the visible answer control.
    pub fn type_answer(&mut self, text: &str) {
        self.answer.push_str(text);
    }

    pub fn backspace(&mut self) {
        self.answer.pop();
    }

    /// Set a field by its form name. Unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: &str) {
        match name {
            "answer_text" => self.answer = value.to_string(),
            BAIT_FIELD_NAME => self.bait.fill(value),
            other => log::debug!("ignoring unknown form field {other:?}"),
        }
    }

    /// Build the submission, computing elapsed whole seconds since open.
    pub fn into_submission(self, principal: &Principal, now_ms: f64) -> Submission {
        let elapsed = ((now_ms - self.opened_at_ms) / 1000.0).max(0.0);
        if self.bait.is_tripped() {
            log::debug!("bait field populated on {}/{}", self.exam_id, self.question_id);
        }
        Submission {
            student_id: principal.id,
            exam_id: self.exam_id,
            question_id: self.question_id,
            answer_text: self.answer,
            time_taken_seconds: elapsed.floor() as u64,
            bait_value: self.bait.into_value(),
        }
    }
}

/// Post a submission through the authenticated transport.
pub async fn submit_exam<D, S, N>(
    transport: &AuthenticatedTransport<D, S, N>,
    submission: &Submission,
) -> Result<ExamResult>
where
    D: Dispatch,
    S: TokenStorage,
    N: Navigator,
{
    let request = ApiRequest::post_json(SUBMIT_PATH, submission)?;
    let result: ExamResult = transport.send_json(request).await?;
    log::info!(
        "submission for {}/{} graded {:?}",
        submission.exam_id,
        submission.question_id,
        result.status
    );
    Ok(result)
}
