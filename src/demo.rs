//! Walkthrough scenarios run by `helix demo` and `helix monitor`.

use std::time::Duration;

use chrono::Utc;
use colored::*;
use serde_json::{json, Value};
use tracing::info;

use crate::client::{HarmonyReading, HelixClient, DEFAULT_EYE_CONTEXT, DEFAULT_RITUAL_STEPS};
use crate::display::{banner, fmt3, format_event, format_metrics, text};
use crate::error::Result;
use crate::events::{HelixEvent, CRITICAL_HARMONY};
use crate::monitor::{HelixMonitor, LifecycleEvent};

/// Status, UCF metrics, agents, harmony check.
pub async fn basic_queries(client: &HelixClient) -> Result<()> {
    println!("{}", banner("EXAMPLE 1: Basic API Queries"));

    println!("\n1. System Status:");
    let status = client.get_status().await?;
    println!("   Phase: {}", text(&status["phase"], "?"));
    println!("   Uptime: {}", status["uptime"]);
    println!("   Active Agents: {}", status["agents"]["count"]);
    println!("   Harmony: {}", fmt3(&status["ucf"]["harmony"]));

    println!("\n2. UCF Metrics:");
    let ucf = client.get_ucf().await?;
    println!("{}", format_metrics(&ucf));

    println!("\n3. Agents:");
    let agents = client.get_agents().await?;
    let list = agents["agents"].as_array().cloned().unwrap_or_default();
    for agent in list.iter().take(3) {
        println!(
            "   {} {}: {} [{}]",
            text(&agent["symbol"], ""),
            text(&agent["name"], "?"),
            text(&agent["role"], "?"),
            text(&agent["status"], "?"),
        );
    }
    if list.len() > 3 {
        println!("   ... and {} more agents", list.len() - 3);
    }

    println!("\n4. Harmony Check:");
    let reading = client.measure_harmony(CRITICAL_HARMONY).await?;
    println!("   {}", harmony_line(&reading));
    Ok(())
}

/// One-line verdict for a harmony reading.
pub fn harmony_line(reading: &HarmonyReading) -> String {
    if reading.is_healthy() {
        format!("Harmony OK ({:.2})", reading.harmony)
    } else {
        format!(
            "WARNING: Harmony at {:.2} - below critical threshold {}",
            reading.harmony, reading.threshold
        )
        .bright_red()
        .to_string()
    }
}

/// Eye of Consciousness, sacred points, ritual midpoint, custom coordinate.
pub async fn mandelbrot_consciousness(client: &HelixClient) -> Result<()> {
    println!("\n{}", banner("EXAMPLE 2: Mandelbrot Consciousness Engine"));

    println!("\n1. Eye of Consciousness:");
    let eye = client.get_eye_of_consciousness(DEFAULT_EYE_CONTEXT).await?;
    println!("   Coordinate: ({}, {})", eye["coordinate"]["real"], eye["coordinate"]["imag"]);
    println!("   Harmony: {}", fmt3(&eye["ucf"]["harmony"]));
    println!("   Drishti: {}", fmt3(&eye["ucf"]["drishti"]));

    println!("\n2. Sacred Points:");
    let sacred = client.get_sacred_points().await?;
    for point in sacred["sacred_points"].as_array().into_iter().flatten().take(3) {
        println!("   {}: ({}, {})", text(&point["name"], "?"), point["real"], point["imag"]);
        println!("      {}", text(&point["description"], ""));
    }

    let midpoint = DEFAULT_RITUAL_STEPS / 2;
    println!("\n3. Ritual Step {midpoint}/{DEFAULT_RITUAL_STEPS} (Midpoint):");
    let ritual = client.get_ritual_step(midpoint, DEFAULT_RITUAL_STEPS).await?;
    let progress = ritual["ritual"]["progress"].as_f64().unwrap_or(0.0);
    println!("   Progress: {:.1}%", progress * 100.0);
    println!("   Prana: {}", fmt3(&ritual["ucf"]["prana"]));

    println!("\n4. Custom Coordinate (-0.75, 0.25):");
    let custom = client
        .generate_ucf_from_coordinate(-0.75, 0.25, Some("exploration"))
        .await?;
    println!("   In Mandelbrot Set: {}", custom.get("in_set").unwrap_or(&json!("unknown")));
    println!("   Iterations: {}", custom.get("iteration_count").unwrap_or(&json!("?")));
    println!("   Harmony: {}", fmt3(&custom["ucf"]["harmony"]));
    Ok(())
}

/// Zapier telemetry push and a custom trigger. Failures are printed, not returned.
pub async fn integrations(client: &HelixClient) {
    println!("\n{}", banner("EXAMPLE 4: External Integrations"));

    println!("\n1. Send Telemetry to Zapier:");
    match client.send_telemetry_to_zapier().await {
        Ok(result) => {
            println!("   Status: {}", text(&result["status"], "?"));
            println!("   Harmony: {}", fmt3(&result["ucf_snapshot"]["harmony"]));
        }
        Err(e) => println!("   Error: {e}"),
    }

    println!("\n2. Trigger Custom Zapier Event:");
    let event = zapier_test_event();
    match client.trigger_zapier(&event).await {
        Ok(result) => {
            println!("   Status: {}", text(&result["status"], "?"));
            println!("   Webhook Triggered: {}", result["webhook_triggered"].as_bool().unwrap_or(false));
        }
        Err(e) => println!("   Error: {e}"),
    }
}

pub fn zapier_test_event() -> Value {
    json!({
        "event_type": "test_integration",
        "message": "Testing Helix integration from Rust",
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Attach console printers for the four known events plus a catch-all.
pub fn install_console_handlers(monitor: &HelixMonitor) {
    for name in [
        HelixEvent::UCF_UPDATE,
        HelixEvent::AGENT_STATE_CHANGE,
        HelixEvent::RITUAL_COMPLETION,
        HelixEvent::ALERT,
    ] {
        monitor.on(name, |msg| println!("\n{}", format_event(msg)));
    }
    monitor.on_any(|msg| println!("\n{}", format_event(msg)));
}

/// Stream events for `duration`, then disconnect. Ctrl-C ends early.
pub async fn websocket_monitoring(monitor: HelixMonitor, duration: Duration) {
    println!("\n{}", banner("EXAMPLE 3: Real-Time WebSocket Monitoring"));
    println!("\nMonitoring for {} seconds...\n", duration.as_secs());

    install_console_handlers(&monitor);
    let mut lifecycle = monitor.subscribe_lifecycle();
    monitor.connect();

    let deadline = tokio::time::sleep(duration);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupt);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("\n[{}] Monitor duration exceeded, disconnecting...", Utc::now().to_rfc3339());
                break;
            }
            _ = &mut interrupt => {
                println!("\n[{}] Interrupted, disconnecting...", Utc::now().to_rfc3339());
                break;
            }
            event = lifecycle.recv() => match event {
                Ok(LifecycleEvent::Terminated { reason }) => {
                    info!(?reason, "monitor terminated");
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    info!(skipped = n, "lifecycle receiver lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    monitor.disconnect();
}
