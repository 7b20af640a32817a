//! Upstream reply providers and the ordered fallback chain.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::messages::SessionContext;
use crate::{BanterError, Result};

/// Instruction prefixed to every prompt so replies stay short enough to be
/// spoken aloud.
const VOICE_STYLE_INSTRUCTION: &str = "Always keep your responses concise, conversational, \
    and to the point, like a real person in a voice chat. Limit your answers to 2-3 sentences \
    unless the user asks for more detail. Avoid long monologues.";

/// Persona used when the session carries none.
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful voice assistant. Answer naturally and briefly.";

/// Prompt assembled for one upstream attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

impl ChatPrompt {
    /// Build the prompt for a user message. The persona instruction from the
    /// session context (or the default persona) is appended after the voice
    /// style instruction by plain concatenation.
    pub fn assemble(message: &str, context: &SessionContext) -> Self {
        let persona = context
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        Self {
            system: format!("{VOICE_STYLE_INSTRUCTION}\n\n{persona}"),
            user: message.to_string(),
        }
    }
}

/// A normalized reply from whichever variant answered.
#[derive(Clone, Debug)]
pub struct ProviderReply {
    pub text: String,
    pub provider_id: String,
}

/// One upstream model variant.
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    /// Identifier reported to clients when this variant answers.
    fn id(&self) -> &str;

    /// Run one completion attempt. No internal retry; the chain decides
    /// what happens on failure.
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String>;
}

/// Ordered list of model variants, attempted until one succeeds.
pub struct FallbackChain {
    providers: Vec<Box<dyn ReplyProvider>>,
}

impl FallbackChain {
    pub fn new(providers: Vec<Box<dyn ReplyProvider>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Identifiers of the configured variants, in attempt order
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    /// Validate the message and answer it through the first variant that
    /// succeeds.
    ///
    /// An empty or whitespace-only message fails with
    /// [`BanterError::InvalidInput`] before any upstream call is made.
    /// When every attempt fails the chain surfaces
    /// [`BanterError::UpstreamError`]; callers are responsible for
    /// replacing it with a safe user-facing reply.
    pub async fn reply(&self, message: &str, context: &SessionContext) -> Result<ProviderReply> {
        if message.trim().is_empty() {
            return Err(BanterError::InvalidInput(
                "message must be a non-empty string".into(),
            ));
        }

        let prompt = ChatPrompt::assemble(message, context);

        for provider in &self.providers {
            match provider.complete(&prompt).await {
                Ok(text) => {
                    debug!(provider = provider.id(), "upstream attempt succeeded");
                    return Ok(ProviderReply {
                        text,
                        provider_id: provider.id().to_string(),
                    });
                }
                Err(e) => {
                    warn!(provider = provider.id(), error = %e, "upstream attempt failed");
                }
            }
        }

        Err(BanterError::UpstreamError(
            "all configured model variants failed".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedProvider {
        id: String,
        reply: Result<String>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        fn succeeding(id: &str, text: &str) -> (Box<dyn ReplyProvider>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let provider = Self {
                id: id.to_string(),
                reply: Ok(text.to_string()),
                calls: Arc::clone(&calls),
            };
            (Box::new(provider), calls)
        }

        fn failing(id: &str) -> (Box<dyn ReplyProvider>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let provider = Self {
                id: id.to_string(),
                reply: Err(BanterError::UpstreamError("boom".into())),
                calls: Arc::clone(&calls),
            };
            (Box::new(provider), calls)
        }
    }

    #[async_trait]
    impl ReplyProvider for ScriptedProvider {
        fn id(&self) -> &str {
            &self.id
        }

        async fn complete(&self, _prompt: &ChatPrompt) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    #[test]
    fn test_prompt_prepends_voice_style() {
        let prompt = ChatPrompt::assemble("hi", &SessionContext::default());
        assert!(prompt.system.starts_with(VOICE_STYLE_INSTRUCTION));
        assert!(prompt.system.contains(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(prompt.user, "hi");
    }

    #[test]
    fn test_prompt_uses_session_persona() {
        let context = SessionContext::new().with_persona("You are a career mentor.");
        let prompt = ChatPrompt::assemble("hi", &context);
        assert!(prompt.system.contains("You are a career mentor."));
        assert!(!prompt.system.contains(DEFAULT_SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_empty_message_never_reaches_upstream() {
        let (provider, calls) = ScriptedProvider::succeeding("m1", "reply");
        let chain = FallbackChain::new(vec![provider]);

        for message in ["", "   ", "\n\t"] {
            let err = chain
                .reply(message, &SessionContext::default())
                .await
                .expect_err("blank message must be rejected");
            assert!(matches!(err, BanterError::InvalidInput(_)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let (first, first_calls) = ScriptedProvider::failing("m1");
        let (second, second_calls) = ScriptedProvider::succeeding("m2", "answer");
        let (third, third_calls) = ScriptedProvider::succeeding("m3", "unused");
        let chain = FallbackChain::new(vec![first, second, third]);

        let reply = chain
            .reply("hello", &SessionContext::default())
            .await
            .expect("second variant should answer");

        assert_eq!(reply.text, "answer");
        assert_eq!(reply.provider_id, "m2");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        // The chain stops at the first success
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failures_surface_upstream_error() {
        let (first, _) = ScriptedProvider::failing("m1");
        let (second, _) = ScriptedProvider::failing("m2");
        let chain = FallbackChain::new(vec![first, second]);

        let err = chain
            .reply("hello", &SessionContext::default())
            .await
            .expect_err("chain with no healthy variant must fail");
        assert!(matches!(err, BanterError::UpstreamError(_)));
    }

    #[test]
    fn test_provider_ids_in_attempt_order() {
        let (first, _) = ScriptedProvider::failing("m1");
        let (second, _) = ScriptedProvider::succeeding("m2", "x");
        let chain = FallbackChain::new(vec![first, second]);
        assert_eq!(chain.provider_ids(), vec!["m1", "m2"]);
    }
}
