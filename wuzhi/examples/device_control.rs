//! Output control example

use std::time::Duration;
use tokio::time::sleep;
use wuzhi::Device;

#[tokio::main]
async fn main() -> wuzhi::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let bridge = std::env::var("WUZHI_BRIDGE").unwrap_or_else(|_| "127.0.0.1:8231".to_string());

    let mut device = Device::new_udp(bridge).with_timeout(Duration::from_secs(2));
    device.connect().await?;

    println!("Setting 5.00 V / 0.50 A...");
    device.set_voltage(5.0).await?;
    device.set_current(0.5).await?;

    println!("Output on for 3 seconds...");
    device.set_on().await?;
    sleep(Duration::from_secs(3)).await;
    device.set_off().await?;

    println!("Done!");

    device.disconnect().await?;
    Ok(())
}
