//! Template Loader: turns an [`AdvisorSpec`] into the messages that open a
//! conversation.

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use counsel_core::{AdvisorSpec, Conversation, Message, ResolvedPrompt, TemplateError};

use crate::resolver::TagResolver;

const HISTORY_TAG: &str = "<$conversation_history$>";

#[derive(Debug, Clone)]
pub struct TemplateLoader {
    resolver: TagResolver,
}

impl TemplateLoader {
    pub fn new(resolver: TagResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TagResolver {
        &self.resolver
    }

    /// The advisor's resolved system instruction.
    pub fn render(
        &self,
        spec: &AdvisorSpec,
        now: &DateTime<FixedOffset>,
    ) -> Result<ResolvedPrompt, TemplateError> {
        Ok(self.resolver.resolve(&spec.template_text, now)?)
    }

    /// The resolved system message.
    pub fn load(
        &self,
        spec: &AdvisorSpec,
        now: &DateTime<FixedOffset>,
    ) -> Result<Message, TemplateError> {
        Ok(Message::system(self.render(spec, now)?.text))
    }

    /// `[system, ...primer]`, every message resolved, with
    /// `<$conversation_history$>` replaced by the `role: content` transcript
    /// of `history`.
    pub fn load_prompt(
        &self,
        spec: &AdvisorSpec,
        now: &DateTime<FixedOffset>,
        history: &[Message],
    ) -> Result<Vec<Message>, TemplateError> {
        let transcript = Conversation::transcript(history);
        let fill = |text: String| {
            if text.contains(HISTORY_TAG) {
                text.replace(HISTORY_TAG, &transcript)
            } else {
                text
            }
        };

        let mut messages = Vec::with_capacity(1 + spec.primer.len());
        messages.push(Message::system(fill(self.render(spec, now)?.text)));

        for primer in &spec.primer {
            let resolved = self.resolver.resolve(&primer.content, now)?;
            let mut msg = Message::with_content(primer.role, fill(resolved.text));
            msg.metadata = primer.metadata.clone();
            messages.push(msg);
        }

        debug!(
            advisor = %spec.name,
            messages = messages.len(),
            history = history.len(),
            "Assembled advisor prompt"
        );
        Ok(messages)
    }
}
