//! HTTP chat gateway: rate limiting, provider fallback, response shaping.

pub mod limiter;
pub mod openai;
pub mod provider;
pub mod routes;

pub use limiter::{Clock, RateLimiter, SystemClock};
pub use openai::OpenAiProvider;
pub use provider::{ChatPrompt, FallbackChain, ProviderReply, ReplyProvider};
pub use routes::{build_router, AppState, FALLBACK_REPLIES};
