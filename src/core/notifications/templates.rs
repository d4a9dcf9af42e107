//! Firewall notice rendering with Handlebars.
//!
//! Templates are compiled once at startup. Output is plain text, so HTML
//! escaping is turned off.

use super::notification_models::{EmailMessage, FirewallNotice, NotifyError};
use crate::core::firewall::FirewallRule;
use handlebars::Handlebars;
use serde_json::json;

const SUBJECT_TEMPLATE: &str = "{{subject}}";

const BODY_TEMPLATE: &str = "Hello {{username}},

{{reason}}

The following {{item_label}} were blocked and are waiting for review by our moderation team:
{{#each items}}
- {{#if title}}{{title}} ({{id}}){{else}}{{id}}{{/if}}
{{/each}}

If this was a mistake there is nothing you need to do. A moderator will restore them.

Reference: {{event_id}}
";

/// Human-readable wording for each rule.
struct RuleWording {
    subject: &'static str,
    reason: &'static str,
    item_label: &'static str,
}

fn wording(rule: FirewallRule) -> RuleWording {
    match rule {
        FirewallRule::CreateUser => RuleWording {
            subject: "Your account was blocked",
            reason: "Several accounts were created from the same network \
                     in a short period of time.",
            item_label: "accounts",
        },
        FirewallRule::CreateContentTextRoot => RuleWording {
            subject: "Your publications were blocked",
            reason: "Several publications were created in a short period of time.",
            item_label: "publications",
        },
        FirewallRule::CreateContentTextChild => RuleWording {
            subject: "Your comments were blocked",
            reason: "Several comments were created in a short period of time.",
            item_label: "comments",
        },
    }
}

pub struct NoticeTemplates {
    handlebars: Handlebars<'static>,
}

impl NoticeTemplates {
    pub fn new() -> Result<Self, NotifyError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string("subject", SUBJECT_TEMPLATE)
            .map_err(|e| NotifyError::TemplateError(e.to_string()))?;
        handlebars
            .register_template_string("body", BODY_TEMPLATE)
            .map_err(|e| NotifyError::TemplateError(e.to_string()))?;
        Ok(Self { handlebars })
    }

    pub fn render(&self, notice: &FirewallNotice) -> Result<EmailMessage, NotifyError> {
        let wording = wording(notice.rule);
        let vars = json!({
            "username": notice.username,
            "subject": wording.subject,
            "reason": wording.reason,
            "item_label": wording.item_label,
            "items": notice.items,
            "event_id": notice.event_id,
            "from_rule": notice.rule,
        });

        let subject = self
            .handlebars
            .render("subject", &vars)
            .map_err(|e| NotifyError::TemplateError(e.to_string()))?;
        let text_body = self
            .handlebars
            .render("body", &vars)
            .map_err(|e| NotifyError::TemplateError(e.to_string()))?;

        Ok(EmailMessage {
            to: notice.email.clone(),
            subject,
            text_body,
        })
    }
}
