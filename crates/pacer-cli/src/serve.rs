//! Serve command implementation for Pacer CLI.

use std::time::Duration;

use pacer_core::Isolation;
use pacer_server::ServerConfig;

use crate::colors;

/// Build the server configuration from command-line values.
pub fn config(
    host: String,
    port: u16,
    isolation: Isolation,
    grace_ms: u64,
    telemetry_ms: u64,
    cycle_ms: f64,
    gui_cycle_ms: f64,
) -> ServerConfig {
    ServerConfig {
        host,
        port,
        isolation,
        grace_period: Duration::from_millis(grace_ms),
        telemetry_interval: Duration::from_millis(telemetry_ms.max(1)),
        brain_cycle_ms: cycle_ms,
        gui_cycle_ms,
    }
}

/// Run the session host until Ctrl+C.
pub async fn execute(config: ServerConfig) -> anyhow::Result<()> {
    println!(
        "\n{}Pacer{} session host on {}ws://{}:{}/ws{}",
        colors::BOLD,
        colors::RESET,
        colors::CYAN,
        config.host,
        config.port,
        colors::RESET
    );
    println!(
        "{}isolation: {}, cycle: {} ms, grace: {:?}{}\n",
        colors::DIM,
        config.isolation,
        config.brain_cycle_ms,
        config.grace_period,
        colors::RESET
    );

    pacer_server::serve(config).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_arguments() {
        let config = config("127.0.0.1".into(), 9000, Isolation::Thread, 250, 0, 40.0, 50.0);
        assert_eq!(config.port, 9000);
        assert_eq!(config.isolation, Isolation::Thread);
        assert_eq!(config.grace_period, Duration::from_millis(250));
        // A zero interval would make tokio's interval panic.
        assert_eq!(config.telemetry_interval, Duration::from_millis(1));
        assert_eq!(config.brain_cycle_ms, 40.0);
        assert_eq!(config.gui_cycle_ms, 50.0);
    }
}
