//! Shared HTTP client construction.

use std::time::Duration;

use tracing::warn;

/// Browser User-Agent sent with page fetches; live pages serve reduced
/// markup to unknown clients.
pub const DEFAULT_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Build the shared client. `timeout` caps each navigation attempt;
/// exceeding it surfaces as a navigation failure to the caller.
pub fn build_client(timeout: Duration) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().user_agent(DEFAULT_UA);

    if timeout > Duration::ZERO {
        builder = builder.timeout(timeout);
    }

    builder.build().unwrap_or_else(|error| {
        warn!(
            error = %error,
            "Failed to create configured HTTP client; falling back to reqwest defaults"
        );
        reqwest::Client::new()
    })
}
