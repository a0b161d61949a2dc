//! Publish executor (C6): stash-uploads a draft's files then publishes it
//! upstream, gated by the circuit breaker (C2) and adaptive rate limiter (C3)
//! and authenticated through the token manager (C1).

mod executor;
mod http_client;
mod tags;

pub use executor::PublishExecutor;
pub use http_client::{
    ReqwestUpstreamClient, StashPublishRequest, StashPublishResult, StashSubmitResult, UpstreamClient,
};
pub use tags::{sanitize_tag, sanitize_tags};
