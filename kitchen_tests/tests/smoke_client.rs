use std::time::Duration;

use kitchen_client::{
    connection::{ConnectionManager, ConnectionState},
    session::HttpSessionApi,
};
use kitchen_shared::{net::DefaultConnector, prelude::*};

/// Smoke test: a partial config file fills the rest with defaults.
#[test]
fn partial_config_parses() -> anyhow::Result<()> {
    let cfg = ClientConfig::from_json_str(
        r#"{"server_url": "http://study.local:5000", "player_count": 2, "interpolation": {"remote_speed": 6.0}}"#,
    )?;
    assert_eq!(cfg.server_url, "http://study.local:5000");
    assert_eq!(cfg.player_count, 2);
    assert_eq!(cfg.interpolation.remote_speed, 6.0);
    assert_eq!(cfg.interpolation.snap_distance, 0.05);
    assert_eq!(cfg.frame_hz, 60);
    Ok(())
}

/// Smoke test: an unreachable session server fails the handshake in phase 1.
#[tokio::test]
async fn unreachable_session_server_closes_connection() -> anyhow::Result<()> {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };
    let cfg = ClientConfig {
        server_url: format!("http://127.0.0.1:{port}"),
        request_timeout_ms: 500,
        ..ClientConfig::default()
    };
    let session = HttpSessionApi::new(&cfg.server_url, Duration::from_millis(cfg.request_timeout_ms))?;
    let mut conn = ConnectionManager::new(cfg, Box::new(session), Box::new(DefaultConnector));

    let err = conn.connect().await.unwrap_err();
    assert!(err.is_transport(), "{err}");
    assert_eq!(conn.state(), ConnectionState::Closed);
    Ok(())
}
