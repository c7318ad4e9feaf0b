//! Fan out concurrent streaming calls and print one JSON summary per request.
//!
//! Run with:
//! LLM_BENCH_URL=... LLM_BENCH_API_KEY=... LLM_BENCH_DEPLOYMENT=... \
//!     cargo run --example bench -- 8
//!
//! Set `RUST_LOG=llm_stream_bench=debug` to see retry decisions.

use llm_stream_bench::{
    providers, ChatRequest, Message, Requester, RequesterBuilder, ReqwestTransport,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let concurrency: usize = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(4);

    let endpoint = providers::from_env()?;
    let requester: Requester = RequesterBuilder::from_arc(endpoint.into())
        .backoff(true)
        .build();
    let transport = ReqwestTransport::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let body = ChatRequest::new(vec![
        Message::system("You are a helpful assistant."),
        Message::user("Write a long essay about life in at least 200 tokens."),
    ])
    .max_tokens(200)
    .temperature(0.8)
    .into_body();

    let calls = (0..concurrency).map(|_| requester.call(&transport, body.clone()));
    let results = futures::future::join_all(calls).await;

    for stats in &results {
        println!("{}", serde_json::to_string(&stats.summary())?);
    }

    let ok = results.iter().filter(|s| s.is_success()).count();
    tracing::info!(ok, total = results.len(), "benchmark finished");
    Ok(())
}
