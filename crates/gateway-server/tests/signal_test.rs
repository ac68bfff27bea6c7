//! Process-level shutdown: the real binary, a real SIGTERM
#![cfg(unix)]

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A loopback port that was free a moment ago
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_until_live(url: &str) {
    for _ in 0..100 {
        if let Ok(response) = reqwest::get(url).await {
            if response.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("gateway never answered {url}");
}

#[tokio::test]
async fn test_sigterm_logs_and_exits_zero() {
    let port = free_port();
    let health = format!("http://127.0.0.1:{port}/health");

    let child = Command::new(env!("CARGO_BIN_EXE_mcp-gateway"))
        .env("GATEWAY_PORT", port.to_string())
        .env("RUST_LOG", "info")
        .env_remove("GATEWAY_CONFIG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let pid = child.id().unwrap();

    wait_until_live(&health).await;

    let kill = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .await
        .unwrap();
    assert!(kill.success());

    let output = tokio::time::timeout(Duration::from_secs(15), child.wait_with_output())
        .await
        .expect("gateway did not exit after SIGTERM")
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let logs = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(
        logs.contains("SIGTERM received, shutting down gracefully"),
        "missing shutdown line in:\n{logs}"
    );

    let after = reqwest::Client::new()
        .get(&health)
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(after.is_err_and(|e| e.is_connect()));
}
