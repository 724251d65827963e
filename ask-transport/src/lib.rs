//! Bounded retry transport shared by the agent and platform clients.
//!
//! Every outbound call is raced against a fixed timeout, classified as
//! transient or permanent on failure, and retried with capped exponential
//! backoff only when transient.

mod error;
mod http;
mod policy;
mod retry;

pub use error::{Classification, Result, TransportError, classify_default};
pub use http::HttpTransport;
pub use policy::RetryPolicy;
pub use retry::RetryTransport;
