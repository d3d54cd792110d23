/*!
Stats wrapper: fetch from distccd `--stats`, rewrite, re-emit.

The crate root re-exports the entry points with `pub use server::*;`.
*/

pub mod http;
pub mod proxy;
pub mod rewrite;
pub mod upstream;

pub use proxy::{start_proxy, ProxyConfig, ServerState, DEFAULT_HOST};
pub use rewrite::{rewrite, Outcome, Rewritten, END_MARKER, METRIC_NAME, START_MARKER};
pub use upstream::{UpstreamClient, UpstreamResponse};
