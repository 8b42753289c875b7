//! Check-in review of a captured ticket
//!
//! The review form borrows the session while a ticket is captured. It edits
//! the session's [`ReviewDraft`], validates it locally, and on a valid
//! submission calls the [`CheckinService`]. A successful check-in resets the
//! session; a failed one leaves both the capture and the draft in place so
//! the operator can resubmit without scanning again.

use crate::error::{Error, Result, ValidationError};
use crate::service::{CheckinAck, CheckinRequest, CheckinService};
use crate::session::{DecodedPayload, ScanSession};
use serde::{Deserialize, Serialize};

/// Reviewer-entered fields for a captured ticket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDraft {
    /// Full name of the staff member checking the attendee in
    pub reviewer_name: String,
    /// Email of the staff member
    pub reviewer_email: String,
    /// Attendee was seen in person
    pub presence_confirmed: bool,
}

/// Partial edit applied to a [`ReviewDraft`]; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct DraftUpdate {
    /// New reviewer name
    pub reviewer_name: Option<String>,
    /// New reviewer email
    pub reviewer_email: Option<String>,
    /// New presence confirmation
    pub presence_confirmed: Option<bool>,
}

impl DraftUpdate {
    /// Set the reviewer name
    pub fn reviewer_name(mut self, name: impl Into<String>) -> Self {
        self.reviewer_name = Some(name.into());
        self
    }

    /// Set the reviewer email
    pub fn reviewer_email(mut self, email: impl Into<String>) -> Self {
        self.reviewer_email = Some(email.into());
        self
    }

    /// Set presence confirmation
    pub fn presence_confirmed(mut self, confirmed: bool) -> Self {
        self.presence_confirmed = Some(confirmed);
        self
    }
}

impl ReviewDraft {
    fn apply(&mut self, update: DraftUpdate) {
        if let Some(name) = update.reviewer_name {
            self.reviewer_name = name;
        }
        if let Some(email) = update.reviewer_email {
            self.reviewer_email = email;
        }
        if let Some(confirmed) = update.presence_confirmed {
            self.presence_confirmed = confirmed;
        }
    }

    /// Check the draft is submittable
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !self.presence_confirmed {
            return Err(ValidationError::PresenceNotConfirmed);
        }
        if self.reviewer_name.trim().is_empty() {
            return Err(ValidationError::MissingReviewerName);
        }

        let email = self.reviewer_email.trim();
        if email.is_empty() {
            return Err(ValidationError::MissingReviewerEmail);
        }
        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
            _ => return Err(ValidationError::InvalidReviewerEmail(email.to_string())),
        }

        Ok(())
    }
}

/// Review step for the ticket currently captured by a [`ScanSession`]
pub struct CheckinReviewForm<'a> {
    session: &'a mut ScanSession,
}

impl<'a> CheckinReviewForm<'a> {
    pub(crate) fn new(session: &'a mut ScanSession) -> Self {
        Self { session }
    }

    /// The captured payload
    pub fn payload(&self) -> Option<&DecodedPayload> {
        self.session.state().payload()
    }

    /// Current draft
    pub fn draft(&self) -> Option<&ReviewDraft> {
        self.session.review_draft()
    }

    /// Edit the draft
    pub fn update_draft(&mut self, update: DraftUpdate) {
        self.session.draft_mut().apply(update);
    }

    /// Validate locally and submit. On success the session is reset to `Idle`.
    ///
    /// Validation failures issue no request. Service failures leave the
    /// session captured and the draft unchanged.
    pub async fn submit(&mut self, service: &dyn CheckinService) -> Result<CheckinAck> {
        let request = self.request()?;

        tracing::info!(ticket = %request.ticket_id, reviewer = %request.reviewer_name, "Submitting check-in");
        match service.check_in(&request).await {
            Ok(ack) => {
                tracing::info!(ticket = %request.ticket_id, "Check-in recorded");
                self.session.reset();
                Ok(ack)
            }
            Err(err) => {
                tracing::warn!(ticket = %request.ticket_id, error = %err, "Check-in submission failed");
                Err(err)
            }
        }
    }

    /// Abandon the review and return the session to `Idle`
    pub fn cancel(self) {
        tracing::info!("Review cancelled");
        self.session.reset();
    }

    fn request(&self) -> Result<CheckinRequest> {
        let payload = self.payload().ok_or(Error::InvalidTransition {
            from: self.session.state().name(),
            action: "submit",
        })?;
        let draft = self.draft().cloned().unwrap_or_default();
        draft.validate()?;

        let ticket_id = payload.ticket_id();
        if ticket_id.is_empty() {
            return Err(ValidationError::EmptyTicketId.into());
        }

        Ok(CheckinRequest {
            ticket_id: ticket_id.to_string(),
            reviewer_name: draft.reviewer_name.trim().to_string(),
            reviewer_email: draft.reviewer_email.trim().to_string(),
        })
    }
}
