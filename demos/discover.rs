use lifx_lan::util::init_tracing;
use lifx_lan::{ClientConfig, LanClient};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

#[tokio::main]
async fn main() {
    init_tracing(LevelFilter::INFO);

    // Optional first argument: number of devices expected on the network
    let expected_devices = std::env::args().nth(1).and_then(|arg| arg.parse().ok());

    let config = ClientConfig {
        discovery_timeout: Duration::from_millis(500),
        expected_devices,
        ..Default::default()
    };

    println!("Discovering devices:");
    println!("- Broadcast targets: {:?}", config.broadcast_targets());
    println!("- Attempts: {} x {:?}", config.discovery_attempts, config.discovery_timeout);
    if let Some(count) = expected_devices {
        println!("- Stopping early at {} device(s)", count);
    }

    let client = match LanClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            return;
        }
    };

    let devices = match client.discover().await {
        Ok(devices) => devices,
        Err(e) => {
            eprintln!("Discovery failed: {}", e);
            return;
        }
    };
    println!("\nFound {} device(s)", devices.len());

    for device in &devices {
        match client.refresh(device).await {
            Ok(snapshot) => {
                println!("\n{}", device);
                println!("- Label: {}", snapshot.label);
                println!("- Power: {:?}", snapshot.power);
                println!(
                    "- Product: vendor {} product {}",
                    snapshot.version.vendor, snapshot.version.product
                );
                println!(
                    "- Host firmware: {}.{} built {}",
                    snapshot.host_firmware.major,
                    snapshot.host_firmware.minor,
                    snapshot.host_firmware.build
                );
                println!("- Group: {}", snapshot.group.label);
                println!("- Location: {}", snapshot.location.label);
            }
            Err(e) => eprintln!("\n{}: refresh failed: {}", device, e),
        }
    }
}
