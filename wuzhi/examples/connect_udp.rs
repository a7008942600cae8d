//! Read status and limits through a UDP bridge

use wuzhi::Device;

#[tokio::main]
async fn main() -> wuzhi::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let bridge = std::env::var("WUZHI_BRIDGE").unwrap_or_else(|_| "127.0.0.1:8231".to_string());

    println!("Connecting to {} via UDP...", bridge);

    let mut device = Device::new_udp(bridge);
    device.connect().await?;

    for reply in [device.get_status().await?, device.get_limits().await?] {
        match reply.report() {
            Some(report) => {
                println!("{}:", report.kind);
                for (name, value) in report.fields() {
                    println!("  {:<12} {}", name, value);
                }
            }
            None => println!("Raw reply: {:?}", reply),
        }
    }

    device.disconnect().await?;
    Ok(())
}
