use std::net::SocketAddr;
use std::time::Duration;

use bookcache_service::config::Config;

/// Asks a running server for its health and prints the outcome.
pub fn healthcheck(config: &Config, addr: Option<SocketAddr>, timeout: u64) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()?;

    let addr = match addr {
        Some(addr) => addr,
        None => config.bind.parse()?,
    };

    let url = format!("http://{addr}/healthcheck");
    tracing::debug!("Sending request to: {url}");

    match client.get(url).send() {
        Ok(response) if response.status().is_success() => {
            println!("OK");
            Ok(())
        }
        Ok(response) => {
            println!("ERROR");
            anyhow::bail!("bookcache ({addr}) is unhealthy. Status: {}", response.status())
        }
        Err(error) => {
            println!("ERROR");
            anyhow::bail!("failed to check bookcache ({addr}) health: {error}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_healthcheck_command() {
        bookcache_test::setup();
        let server = test::server_with_service(test::default_service());
        let addr = server.addr();

        let result =
            tokio::task::spawn_blocking(move || healthcheck(&Config::default(), Some(addr), 5))
                .await
                .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_unreachable_server() {
        // nothing listens on a port right after its listener is dropped
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        assert!(healthcheck(&Config::default(), Some(addr), 1).is_err());
    }
}
