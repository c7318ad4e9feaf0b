//! Streaming LLM endpoint benchmarking core.
//!
//! Issues one streaming chat-completions request, rides out throttling with
//! governed retries, and records time-to-first-token, inter-token and end-to-end
//! latency in a [`StatsRecord`]. A load harness calls [`Requester::call`] many
//! times concurrently; each call owns its record.
//!
//! # Example
//! ```no_run
//! use llm_stream_bench::{ChatRequest, ManagedEndpoint, Message, Requester, ReqwestTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), llm_stream_bench::Error> {
//!     let transport = ReqwestTransport::new()?;
//!     let requester = Requester::builder(ManagedEndpoint::new(
//!         "https://bench.example/chat/completions",
//!         "api-key",
//!         "blue",
//!     ))
//!     .backoff(true)
//!     .build();
//!
//!     let body = ChatRequest::new(vec![Message::user("Hello!")])
//!         .max_tokens(64)
//!         .into_body();
//!     let stats = requester.call(&transport, body).await;
//!
//!     if stats.is_success() {
//!         println!("ttft={:?} tokens={:?}", stats.ttft(), stats.generated_tokens);
//!     } else {
//!         println!("failed: {:?}", stats.last_exception);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod headers;
pub mod providers;
pub mod requester;
pub mod retry;
pub mod sse;
pub mod stats;
pub mod stream;
pub mod transport;
pub mod types;

pub use error::Error;
pub use providers::{Endpoint, EndpointKind, ManagedEndpoint, OpenAiCompatEndpoint};
pub use requester::{Requester, RequesterBuilder};
pub use retry::{RetryDecision, RetryPolicy};
pub use stats::{RequestSummary, StatsRecord};
pub use stream::StreamParser;
pub use transport::{HttpRequest, HttpResponse, LineStream, ReqwestTransport, Transport};
pub use types::*;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
