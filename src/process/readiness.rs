//! Upstream readiness probing.
//!
//! # Responsibilities
//! - Poll the upstream with TCP connects until it accepts connections
//! - Bound the wait with an overall timeout

use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time;

use crate::config::ReadinessConfig;
use crate::proxy::Upstream;

/// Error type for readiness probing.
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("{upstream} did not accept connections within {timeout:?}")]
    TimedOut { upstream: String, timeout: Duration },
}

/// Wait until a TCP connection to the upstream succeeds.
///
/// Returns the time spent waiting.
pub async fn wait_until_ready(
    upstream: &Upstream,
    config: &ReadinessConfig,
) -> Result<Duration, ReadinessError> {
    let started = Instant::now();
    let timeout = Duration::from_secs(config.timeout_secs);
    let interval = Duration::from_millis(config.interval_ms.max(1));
    let target = (upstream.host().to_string(), upstream.port());

    let probe = async {
        let mut ticker = time::interval(interval);
        let mut attempts: u32 = 0;
        loop {
            ticker.tick().await;
            attempts += 1;
            match TcpStream::connect((target.0.as_str(), target.1)).await {
                Ok(_) => return attempts,
                Err(e) => {
                    tracing::trace!(upstream = %upstream, attempt = attempts, error = %e, "Upstream not ready");
                }
            }
        }
    };

    match time::timeout(timeout, probe).await {
        Ok(attempts) => {
            let elapsed = started.elapsed();
            tracing::debug!(upstream = %upstream, attempts, elapsed = ?elapsed, "Upstream ready");
            Ok(elapsed)
        }
        Err(_) => Err(ReadinessError::TimedOut {
            upstream: upstream.to_string(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn fast() -> ReadinessConfig {
        ReadinessConfig {
            enabled: true,
            timeout_secs: 1,
            interval_ms: 20,
        }
    }

    #[tokio::test]
    async fn test_ready_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream = Upstream::parse(&listener.local_addr().unwrap().to_string()).unwrap();

        assert!(wait_until_ready(&upstream, &fast()).await.is_ok());
    }

    #[tokio::test]
    async fn test_times_out_when_nothing_listens() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let upstream = Upstream::parse(&addr.to_string()).unwrap();

        let err = wait_until_ready(&upstream, &fast()).await.unwrap_err();
        assert!(matches!(err, ReadinessError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_ready_once_listener_appears() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let upstream = Upstream::parse(&addr.to_string()).unwrap();

        let late = tokio::spawn(async move {
            time::sleep(Duration::from_millis(150)).await;
            let listener = TcpListener::bind(addr).await.unwrap();
            time::sleep(Duration::from_secs(2)).await;
            drop(listener);
        });

        let waited = wait_until_ready(&upstream, &fast()).await.unwrap();
        assert!(waited >= Duration::from_millis(100));
        late.abort();
    }
}
