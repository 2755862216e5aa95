//! When a request to the API under test may be sent a second time.
//!
//! Authentication and fixture creation change server state, so they go out
//! exactly once: a timeout can mean the record was stored and the answer was
//! lost. Listing queries are read-only and are resent only when the TCP
//! connection was never established. A timed-out listing is reported, not
//! repeated.

use std::future::Future;
use std::time::Duration;

/// Resend policy for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resend {
    Never,
    /// Resend while the connection is refused, up to [`CONNECT_ATTEMPTS`] sends.
    OnConnectFailure,
}

/// Total sends for a call that keeps failing to connect.
pub(crate) const CONNECT_ATTEMPTS: u32 = 3;

/// Pause before send `n + 1` is `n * CONNECT_PAUSE_MS`.
const CONNECT_PAUSE_MS: u64 = 250;

/// Send the request built by `send`, applying `policy`.
pub(crate) async fn send_with<F, Fut>(
    endpoint: &str,
    policy: Resend,
    send: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut sent = 1;
    loop {
        match send().await {
            Err(e) if policy == Resend::OnConnectFailure && e.is_connect() && sent < CONNECT_ATTEMPTS => {
                let pause = Duration::from_millis(CONNECT_PAUSE_MS * u64::from(sent));
                tracing::warn!(endpoint, sent, "connection failed, resending in {pause:?}: {e}");
                tokio::time::sleep(pause).await;
                sent += 1;
            }
            outcome => return outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn http(timeout_ms: u64) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap()
    }

    async fn count_sends(policy: Resend, url: &str, timeout_ms: u64) -> (bool, u32) {
        let sends = AtomicU32::new(0);
        let client = http(timeout_ms);
        let result = send_with("PATCH /channels", policy, || {
            sends.fetch_add(1, Ordering::SeqCst);
            client.patch(url).send()
        })
        .await;
        (result.is_err(), sends.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn refused_connections_are_resent_for_listings() {
        // Nothing listens on port 1.
        let (failed, sends) = count_sends(Resend::OnConnectFailure, "http://127.0.0.1:1/", 200).await;
        assert!(failed);
        assert_eq!(sends, CONNECT_ATTEMPTS);
    }

    #[tokio::test]
    async fn never_policy_sends_once() {
        let (failed, sends) = count_sends(Resend::Never, "http://127.0.0.1:1/", 200).await;
        assert!(failed);
        assert_eq!(sends, 1);
    }

    #[tokio::test]
    async fn timeouts_are_not_resent() {
        // Accepted by the kernel backlog, never answered.
        let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", silent.local_addr().unwrap());
        let (failed, sends) = count_sends(Resend::OnConnectFailure, &url, 200).await;
        assert!(failed);
        assert_eq!(sends, 1);
    }
}
