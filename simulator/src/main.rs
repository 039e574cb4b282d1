mod telemetry;

use chrono::Utc;
use clap::Parser;
use rand::Rng;
use std::time::Duration;
use telemetry::{next_moisture, Reading};
use tracing::{error, info, warn};

/// Writes synthetic moisture readings into the telemetry database
#[derive(Debug, Parser)]
#[command(name = "simulator")]
struct Args {
    #[arg(long, env = "FIREBASE_DATABASE")]
    firebase_database: String,

    #[arg(long, env = "FIREBASE_AUTH", hide_env_values = true)]
    firebase_auth: Option<String>,

    #[arg(long, env = "DEVICES", default_value_t = 5)]
    devices: usize,

    #[arg(long, env = "INTERVAL_SECS", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..))]
    interval_secs: u64,

    #[arg(long, env = "DEVICE_PREFIX", default_value = "soil")]
    device_prefix: String,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting moisture simulator");
    info!(
        "Database: {}, Devices: {}, Interval: {}s",
        args.firebase_database, args.devices, args.interval_secs
    );

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    let base_url = args.firebase_database.trim_end_matches('/').to_string();

    let devices: Vec<String> = (1..=args.devices)
        .map(|n| format!("{}-{}", args.device_prefix, n))
        .collect();

    let mut rng = rand::thread_rng();
    let mut moisture: Vec<f64> = devices.iter().map(|_| rng.gen_range(40.0..90.0)).collect();
    let mut counter = 0u64;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal after {} readings", counter);
                break;
            }
        }

        let timestamp = Utc::now().timestamp();

        for (device, level) in devices.iter().zip(moisture.iter_mut()) {
            *level = next_moisture(&mut rng, *level);
            let reading = Reading {
                timestamp,
                moisture: (*level * 10.0).round() / 10.0,
            };
            if !reading.is_valid() {
                warn!("Skipping invalid reading for {}: {:?}", device, reading);
                continue;
            }

            // POST appends under a chronologically ordered push key
            let url = format!("{}/{}.json", base_url, device);
            let mut request = client.post(&url).json(&reading);
            if let Some(auth) = &args.firebase_auth {
                request = request.query(&[("auth", auth.as_str())]);
            }

            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => {
                    counter += 1;
                }
                Err(e) => {
                    warn!("Failed to write reading for {}: {}", device, e);
                }
            }
        }

        info!("Published {} readings", counter);
    }
}
