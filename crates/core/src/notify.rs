use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::org::UserProfile;
use crate::domain::outbox::OutboundEmail;
use crate::domain::request::FundRequest;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("template rendering failed: {0}")]
    Template(#[from] tera::Error),
}

/// Builds outbound messages for approval transitions. Pure message
/// construction: rows land in the outbox elsewhere and delivery is someone
/// else's job entirely. Recipients without a usable address are skipped
/// silently; this is best-effort fan-out, not guaranteed delivery.
pub struct Notifications {
    templates: Tera,
}

impl Notifications {
    pub fn new() -> Result<Self, NotifyError> {
        let mut templates = Tera::default();
        templates.add_raw_template(
            "request_initiated.html",
            include_str!("../templates/request_initiated.html"),
        )?;
        templates.add_raw_template(
            "action_required.html",
            include_str!("../templates/action_required.html"),
        )?;
        templates
            .add_raw_template("step_approved.html", include_str!("../templates/step_approved.html"))?;
        templates.add_raw_template(
            "request_rejected.html",
            include_str!("../templates/request_rejected.html"),
        )?;
        templates.add_raw_template(
            "request_sent_back.html",
            include_str!("../templates/request_sent_back.html"),
        )?;
        templates.add_raw_template(
            "request_completed.html",
            include_str!("../templates/request_completed.html"),
        )?;
        Ok(Self { templates })
    }

    /// Initiation fan-out: an acknowledgement to the initiator and an
    /// action-required notice to the level-0 approver. Zero to two
    /// messages depending on which addresses are usable.
    pub fn request_initiated(
        &self,
        request: &FundRequest,
        initiator: &UserProfile,
        approver: &UserProfile,
    ) -> Result<Vec<OutboundEmail>, NotifyError> {
        let mut messages = Vec::new();

        if initiator.has_usable_email() {
            let context = message_context(request, initiator, initiator);
            messages.push(OutboundEmail {
                to_address: initiator.email.clone(),
                cc_address: None,
                subject: format!("Fund request submitted: {}", request.title),
                html_body: self.templates.render("request_initiated.html", &context)?,
            });
        }

        if approver.has_usable_email() && approver.id != initiator.id {
            messages.push(self.action_required(request, initiator, approver)?);
        }

        Ok(messages)
    }

    /// A mid-chain approval: progress note to the initiator, action-required
    /// notice to the next approver.
    pub fn step_approved(
        &self,
        request: &FundRequest,
        initiator: &UserProfile,
        next_approver: &UserProfile,
    ) -> Result<Vec<OutboundEmail>, NotifyError> {
        let mut messages = Vec::new();

        if initiator.has_usable_email() {
            let context = message_context(request, initiator, initiator);
            messages.push(OutboundEmail {
                to_address: initiator.email.clone(),
                cc_address: None,
                subject: format!("Fund request progressing: {}", request.title),
                html_body: self.templates.render("step_approved.html", &context)?,
            });
        }

        if next_approver.has_usable_email() {
            messages.push(self.action_required(request, initiator, next_approver)?);
        }

        Ok(messages)
    }

    pub fn request_rejected(
        &self,
        request: &FundRequest,
        initiator: &UserProfile,
        reason: Option<&str>,
    ) -> Result<Vec<OutboundEmail>, NotifyError> {
        if !initiator.has_usable_email() {
            return Ok(Vec::new());
        }

        let mut context = message_context(request, initiator, initiator);
        context.insert("reason", &reason);
        Ok(vec![OutboundEmail {
            to_address: initiator.email.clone(),
            cc_address: None,
            subject: format!("Fund request rejected: {}", request.title),
            html_body: self.templates.render("request_rejected.html", &context)?,
        }])
    }

    pub fn request_sent_back(
        &self,
        request: &FundRequest,
        initiator: &UserProfile,
        comment: Option<&str>,
    ) -> Result<Vec<OutboundEmail>, NotifyError> {
        if !initiator.has_usable_email() {
            return Ok(Vec::new());
        }

        let mut context = message_context(request, initiator, initiator);
        context.insert("comment", &comment);
        Ok(vec![OutboundEmail {
            to_address: initiator.email.clone(),
            cc_address: None,
            subject: format!("Fund request sent back: {}", request.title),
            html_body: self.templates.render("request_sent_back.html", &context)?,
        }])
    }

    /// Terminal-approval fan-out: one message per final receiver with a
    /// usable address.
    pub fn request_completed(
        &self,
        request: &FundRequest,
        initiator: &UserProfile,
        receivers: &[UserProfile],
    ) -> Result<Vec<OutboundEmail>, NotifyError> {
        receivers
            .iter()
            .filter(|receiver| receiver.has_usable_email())
            .map(|receiver| {
                let context = message_context(request, initiator, receiver);
                Ok(OutboundEmail {
                    to_address: receiver.email.clone(),
                    cc_address: None,
                    subject: format!("Fund request approved: {}", request.title),
                    html_body: self.templates.render("request_completed.html", &context)?,
                })
            })
            .collect()
    }

    fn action_required(
        &self,
        request: &FundRequest,
        initiator: &UserProfile,
        approver: &UserProfile,
    ) -> Result<OutboundEmail, NotifyError> {
        let context = message_context(request, initiator, approver);
        Ok(OutboundEmail {
            to_address: approver.email.clone(),
            cc_address: None,
            subject: format!("Approval required: {}", request.title),
            html_body: self.templates.render("action_required.html", &context)?,
        })
    }
}

fn message_context(
    request: &FundRequest,
    initiator: &UserProfile,
    recipient: &UserProfile,
) -> Context {
    let mut context = Context::new();
    context.insert("title", &request.title);
    context.insert("amount", &request.amount.to_string());
    context.insert("level", &request.current_level);
    context.insert("initiator_name", &initiator.name);
    context.insert("recipient_name", &recipient.name);
    context
}
