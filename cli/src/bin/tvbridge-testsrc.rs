//! Synthetic helper backend for tvbridge.
//!
//! Spawned by the supervisor with piped stdio; not meant to be run by hand.
//! Logs go to stderr, which the supervisor keeps as a crash tail.

use anyhow::Result;
use tvbridge::helper::{self, HelperOptions};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_timestamp_millis()
        .init();

    let options = HelperOptions::from_env();
    log::info!(
        "[TestSrc] Starting (reject={:?}, buffer={:?}, duration={}s)",
        options.reject_extensions,
        options.buffer_time,
        options.duration
    );
    helper::run(options).await
}
