use std::io;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use colored::*;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use helix_client::cli::{resolve_config, Args, Command};
use helix_client::client::{HelixClient, MusicRequest};
use helix_client::demo;
use helix_client::display::banner;
use helix_client::monitor::HelixMonitor;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("helix_client=info,helix=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_demo(client: &HelixClient) -> Result<(), Box<dyn std::error::Error>> {
    demo::basic_queries(client).await?;
    demo::mandelbrot_consciousness(client).await?;
    demo::integrations(client).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    if let Command::Completions { shell } = args.command {
        clap_complete::generate(shell, &mut Args::command(), "helix", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config = resolve_config(&args)?;
    let client = HelixClient::from_config(&config);
    let monitor_duration = args.command.monitor_duration();
    let is_demo = matches!(args.command, Command::Demo { .. });

    match args.command {
        Command::Status => print_json(&client.get_status().await?)?,
        Command::Ucf => print_json(&client.get_ucf().await?)?,
        Command::Agents => print_json(&client.get_agents().await?)?,
        Command::Manifest => print_json(&client.get_manifest().await?)?,
        Command::Eye { context } => print_json(&client.get_eye_of_consciousness(&context).await?)?,
        Command::Sacred { name: None, .. } => print_json(&client.get_sacred_points().await?)?,
        Command::Sacred { name: Some(name), context } => {
            print_json(&client.get_sacred_point(&name, context.as_deref()).await?)?
        }
        Command::Ritual { step, total_steps } => {
            print_json(&client.get_ritual_step(step, total_steps).await?)?
        }
        Command::Generate { real, imag, context } => print_json(
            &client
                .generate_ucf_from_coordinate(real, imag, context.as_deref())
                .await?,
        )?,
        Command::Music { prompt, duration, model_id } => {
            let request = MusicRequest { prompt, duration, model_id };
            print_json(&client.generate_music(&request).await?)?
        }
        Command::ZapierTelemetry => print_json(&client.send_telemetry_to_zapier().await?)?,
        Command::ZapierTrigger { data } => {
            let data: Value = serde_json::from_str(&data)
                .map_err(|e| format!("zapier payload is not valid JSON: {e}"))?;
            print_json(&client.trigger_zapier(&data).await?)?
        }
        Command::Harmony { threshold } => {
            let reading = client.measure_harmony(threshold).await?;
            println!("{}", demo::harmony_line(&reading));
            if !reading.is_healthy() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Monitor { .. } | Command::Demo { .. } => {
            println!("{}\n", "HELIX COLLECTIVE - RUST INTEGRATION".bright_cyan().bold());

            if is_demo {
                if let Err(e) = run_demo(&client).await {
                    eprintln!("\n{} {}", "Error:".bright_red(), e);
                    return Ok(ExitCode::FAILURE);
                }
            }

            if let Some(duration) = monitor_duration {
                let monitor = HelixMonitor::builder(config.ws_url.clone())
                    .reconnect(config.reconnect)
                    .build()?;
                demo::websocket_monitoring(monitor, duration).await;
            }

            if is_demo {
                println!("\n{}", banner("All examples completed successfully!"));
            }
        }
        // Printed before configuration was resolved.
        Command::Completions { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}
