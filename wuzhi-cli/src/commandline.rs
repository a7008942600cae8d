use clap::Parser;
use std::time::Duration;

use wuzhi::Command;
use wuzhi_core::constants::DEFAULT_ADDRESS;

const fn about_text() -> &'static str {
    "wuzhi power supply command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about = about_text(), long_about = None)]
pub struct CliArgs {
    /// Bluetooth address of the supply
    #[arg(short = 'm', long, default_value = DEFAULT_ADDRESS)]
    pub address: String,

    /// UDP endpoint of the BLE bridge (e.g., "127.0.0.1:8231")
    #[arg(long, default_value = "127.0.0.1:8231")]
    pub bridge: String,

    /// Show status
    #[arg(short, long)]
    pub status: bool,

    /// Show limits
    #[arg(short, long)]
    pub limits: bool,

    /// Turn output off
    #[arg(long)]
    pub off: bool,

    /// Turn output on
    #[arg(long)]
    pub on: bool,

    /// Set output voltage in volts (clamped to 0-125)
    #[arg(short, long, allow_negative_numbers = true)]
    pub volt: Option<f64>,

    /// Set output current in amperes (clamped to 0-22)
    #[arg(short, long, allow_negative_numbers = true)]
    pub amps: Option<f64>,

    /// Set backlight level (clamped to 0-5)
    #[arg(short, long, allow_negative_numbers = true)]
    pub backlight: Option<i64>,

    /// Set buzzer, 0 or 1
    #[arg(short = 'z', long, allow_negative_numbers = true)]
    pub buzzer: Option<i64>,

    /// Set auto-off timeout in minutes
    #[arg(short, long, allow_negative_numbers = true)]
    pub timeout: Option<i64>,

    /// Restart the supply
    #[arg(short, long)]
    pub restart: bool,

    /// Program run as `PROGRAM <address>` before connecting, to drop a stale session
    #[arg(long, value_name = "PROGRAM")]
    pub pre_connect: Option<String>,

    /// Reply timeout per attempt (e.g., "1s", "500ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "1s")]
    pub reply_timeout: Duration,

    /// Number of attempts per command
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Delay between attempts (e.g., "100ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "100ms")]
    pub backoff: Duration,

    /// Show debug output
    #[arg(short, long)]
    pub debug: bool,
}

impl CliArgs {
    /// Requested commands in execution order: writes first, reads last
    pub fn commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.off {
            commands.push(Command::Output(false));
        }
        if self.on {
            commands.push(Command::Output(true));
        }
        if let Some(volts) = self.volt {
            commands.push(Command::SetVoltage(volts));
        }
        if let Some(amps) = self.amps {
            commands.push(Command::SetCurrent(amps));
        }
        if let Some(level) = self.backlight {
            commands.push(Command::SetBacklight(level));
        }
        if let Some(level) = self.buzzer {
            commands.push(Command::SetBuzzer(level));
        }
        if let Some(minutes) = self.timeout {
            commands.push(Command::SetTimeout(minutes));
        }
        if self.restart {
            commands.push(Command::Restart);
        }
        if self.status {
            commands.push(Command::ReadStatus);
        }
        if self.limits {
            commands.push(Command::ReadLimits);
        }
        commands
    }
}
