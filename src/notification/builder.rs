//! Renders a [`WebhookMessage`] into a DingTalk markdown notification.

use crate::config::{Config, Target};
use crate::models::{At, DingTalkNotification, WebhookMessage};
use crate::template::TemplateSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to render template: {0}")]
    Render(#[from] handlebars::RenderError),
    #[error("rendered message text is empty")]
    EmptyText,
}

/// Builds notifications for one target out of one configuration generation.
///
/// Building is pure: nothing here touches the network.
pub struct NotificationBuilder<'a> {
    templates: &'a TemplateSet,
    config: &'a Config,
    target: &'a Target,
}

impl<'a> NotificationBuilder<'a> {
    pub fn new(templates: &'a TemplateSet, config: &'a Config, target: &'a Target) -> Self {
        Self {
            templates,
            config,
            target,
        }
    }

    pub fn build(&self, message: &WebhookMessage) -> Result<DingTalkNotification, BuildError> {
        let rendered = self.templates.render(self.target, message)?;
        if rendered.text.is_empty() {
            return Err(BuildError::EmptyText);
        }

        let text = truncate_utf8(rendered.text, self.config.max_message_bytes);
        let mut notification = DingTalkNotification::markdown(rendered.title, text);

        if let Some(mention) = &self.target.mention {
            notification.at = Some(At {
                at_mobiles: mention.mobiles.clone(),
                is_at_all: mention.all,
            });
        }

        Ok(notification)
    }
}

/// Cuts `text` to at most `max_bytes`, backing off to a char boundary.
fn truncate_utf8(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}
