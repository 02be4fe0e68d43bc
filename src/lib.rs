pub mod compose;
pub mod config;
pub mod dedup;
pub mod fetcher;
pub mod filter;
pub mod pipeline;
pub mod retry;
pub mod scorer;
pub mod selector;
pub mod sinks;
pub mod types;

pub use compose::{compose, DigestPayload};
pub use config::{Config, Secrets};
pub use fetcher::{FeedFetcher, FeedSource};
pub use pipeline::{DigestPipeline, RunReport};
pub use retry::RetryPolicy;
pub use scorer::{OpenAiScorer, Scorer};
pub use sinks::{dispatch, DeliveryReport, SheetsSink, Sink, SlackSink};
pub use types::*;
