//! Reachability of the portal under test

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};
use url::Url;

use crate::error::{E2eError, E2eResult};

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Wait until the portal answers with anything but a server error
pub async fn wait_for_reachable(base_url: &Url, timeout_duration: Duration) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(base_url.clone()).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                info!("Target {} is reachable ({})", base_url, resp.status());
                return Ok(());
            }
            Ok(resp) => {
                warn!("Target returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to respond...", base_url);
                }
                if !e.is_connect() && !e.is_timeout() {
                    warn!("Reachability check error: {}", e);
                }
            }
        }

        if start.elapsed() + RETRY_DELAY > timeout_duration {
            break;
        }
        sleep(RETRY_DELAY).await;
    }

    Err(E2eError::TargetUnreachable {
        url: base_url.to_string(),
        attempts,
    })
}
