//! High-level device interface

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use wuzhi_core::{
    constants::{DEFAULT_TIMEOUT, DEVICE_ADDRESS, MAX_ATTEMPTS, RETRY_BACKOFF},
    Command, Reply,
};
use wuzhi_transport::{Transport, UdpTransport};

use crate::correlation::Correlator;
use crate::error::{Error, Result};
use crate::events::{Event, EventSink, TracingSink};

/// Best-effort step run before the transport connects
///
/// Typically clears a session the supply still holds from an earlier
/// client. A failure is reported and the connection proceeds anyway.
#[async_trait]
pub trait PreConnectHook: Send + Sync {
    async fn run(&self) -> std::result::Result<(), String>;
}

/// Wuzhi power supply
///
/// High-level interface: every operation is one query, retried on timeout.
///
/// # Examples
///
/// ```no_run
/// use wuzhi::Device;
///
/// #[tokio::main]
/// async fn main() -> wuzhi::Result<()> {
///     let mut device = Device::new_udp("127.0.0.1:8231");
///
///     device.connect().await?;
///     device.set_voltage(12.0).await?;
///
///     let status = device.get_status().await?;
///     println!("{:?}", status);
///
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Device {
    transport: Box<dyn Transport>,
    correlator: Arc<Correlator>,
    pre_connect: Option<Box<dyn PreConnectHook>>,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl Device {
    /// Create a device on top of any transport
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            correlator: Arc::new(Correlator::new(Arc::new(TracingSink))),
            pre_connect: None,
            timeout: DEFAULT_TIMEOUT,
            retries: MAX_ATTEMPTS,
            backoff: RETRY_BACKOFF,
        }
    }

    /// Create a device reached through a UDP frame bridge
    pub fn new_udp(bridge: impl Into<String>) -> Self {
        Self::new(UdpTransport::new(bridge))
    }

    /// Set per-attempt reply timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set number of attempts per command (at least one)
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Set pause between attempts
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Route engine events to `sink` instead of `tracing`
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.correlator = Arc::new(Correlator::new(sink));
        self
    }

    /// Run `hook` before every connect
    pub fn with_pre_connect(mut self, hook: impl PreConnectHook + 'static) -> Self {
        self.pre_connect = Some(Box::new(hook));
        self
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Requests still waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Connect to the supply and subscribe to its notifications
    ///
    /// # Errors
    ///
    /// Returns error if the transport cannot connect or subscribe. The
    /// pre-connect hook never fails the connection.
    pub async fn connect(&mut self) -> Result<()> {
        let remote = self.transport.remote_addr();

        if let Some(hook) = &self.pre_connect {
            debug!("Running pre-connect step for {}...", remote);
            if let Err(reason) = hook.run().await {
                self.sink().record(Event::PreConnectFailed {
                    address: remote.clone(),
                    reason,
                });
            }
        }

        info!("Connecting to {}...", remote);
        self.transport.connect().await?;
        self.transport.subscribe(self.correlator.handler()).await?;

        self.sink().record(Event::Connected {
            remote: self.transport.remote_addr(),
        });
        Ok(())
    }

    /// Disconnect from the supply
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }

        info!("Disconnecting from {}...", self.transport.remote_addr());
        self.transport.disconnect().await?;
        Ok(())
    }

    /// Send one attempt of `command` and wait for its reply
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no reply arrives within the configured
    /// timeout, or the transport error if the write itself fails. Either way
    /// the pending slot is cleared.
    pub async fn write(&mut self, command: Command, attempt: u32) -> Result<Reply> {
        self.ensure_connected()?;

        let frame = command.frame()?;
        let key = frame.key().unwrap_or(DEVICE_ADDRESS);
        let pending = self.correlator.register(key, attempt, self.timeout)?;

        let data = frame.encode().freeze();
        self.sink().record(Event::FrameSent {
            key,
            attempt,
            frame: data.clone(),
        });
        self.transport.write(&data).await?;

        pending.wait().await
    }

    /// Send `command`, retrying until a reply arrives or attempts run out
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] once every attempt has timed out or
    /// hit a recoverable transport error. Other errors end the query at once.
    pub async fn query(&mut self, command: Command) -> Result<Reply> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.write(command, attempt).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_recoverable() => err,
                Err(err) => return Err(err),
            };

            if attempt >= self.retries {
                self.sink().record(Event::CommandFailed {
                    command: command.to_string(),
                    attempts: attempt,
                });
                return Err(Error::CommandFailed {
                    command: command.to_string(),
                    attempts: attempt,
                });
            }

            self.sink().record(Event::Retrying {
                command: command.to_string(),
                attempt,
                reason: err.to_string(),
            });
            tokio::time::sleep(self.backoff).await;
        }
    }

    /// Read live readings and settings
    pub async fn get_status(&mut self) -> Result<Reply> {
        self.query(Command::ReadStatus).await
    }

    /// Read protection limits
    pub async fn get_limits(&mut self) -> Result<Reply> {
        self.query(Command::ReadLimits).await
    }

    /// Switch the output on or off
    pub async fn set_output(&mut self, on: bool) -> Result<Reply> {
        self.query(Command::Output(on)).await
    }

    pub async fn set_on(&mut self) -> Result<Reply> {
        self.set_output(true).await
    }

    pub async fn set_off(&mut self) -> Result<Reply> {
        self.set_output(false).await
    }

    /// Set output voltage, clamped to 0-125 V
    pub async fn set_voltage(&mut self, volts: f64) -> Result<Reply> {
        self.query(Command::SetVoltage(volts)).await
    }

    /// Set output current, clamped to 0-22 A
    pub async fn set_current(&mut self, amps: f64) -> Result<Reply> {
        self.query(Command::SetCurrent(amps)).await
    }

    /// Set backlight level, clamped to 0-5
    pub async fn set_backlight(&mut self, level: i64) -> Result<Reply> {
        self.query(Command::SetBacklight(level)).await
    }

    /// Switch the buzzer, clamped to 0-1
    pub async fn set_buzzer(&mut self, level: i64) -> Result<Reply> {
        self.query(Command::SetBuzzer(level)).await
    }

    /// Set auto-off timeout in minutes
    pub async fn set_timeout(&mut self, minutes: i64) -> Result<Reply> {
        self.query(Command::SetTimeout(minutes)).await
    }

    /// Restart the supply
    pub async fn restart(&mut self) -> Result<Reply> {
        warn!("Restarting device...");
        self.query(Command::Restart).await
    }

    // Helper methods

    fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    fn sink(&self) -> &Arc<dyn EventSink> {
        self.correlator.sink()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;
    use wuzhi_core::{crc, Frame, ReportKind};
    use wuzhi_transport::FrameHandler;

    type Script = Box<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>;

    /// In-memory transport that answers each write from a script
    struct ScriptedTransport {
        connected: bool,
        handler: Option<FrameHandler>,
        script: Script,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl ScriptedTransport {
        fn new(script: impl Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync + 'static) -> Self {
            Self {
                connected: false,
                handler: None,
                script: Box::new(script),
                writes: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn silent() -> Self {
            Self::new(|_| Vec::new())
        }

        fn writes(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
            Arc::clone(&self.writes)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&mut self) -> wuzhi_transport::Result<()> {
            self.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) -> wuzhi_transport::Result<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn subscribe(&mut self, handler: FrameHandler) -> wuzhi_transport::Result<()> {
            self.handler = Some(handler);
            Ok(())
        }

        async fn write(&mut self, data: &[u8]) -> wuzhi_transport::Result<()> {
            if !self.connected {
                return Err(wuzhi_transport::Error::NotConnected);
            }
            self.writes.lock().push(data.to_vec());
            if let Some(handler) = &self.handler {
                for reply in (self.script)(data) {
                    handler(Bytes::from(reply));
                }
            }
            Ok(())
        }

        fn remote_addr(&self) -> String {
            "scripted".to_string()
        }
    }

    struct FailingHook;

    #[async_trait]
    impl PreConnectHook for FailingHook {
        async fn run(&self) -> std::result::Result<(), String> {
            Err("no stale session".to_string())
        }
    }

    fn settings_reply() -> Vec<u8> {
        let mut body = vec![0u8; 63];
        body[..3].copy_from_slice(&[0x01, 0x03, 0x3c]);
        body[3..5].copy_from_slice(&[0x0B, 0xB8]);
        Frame::new(body).encode().to_vec()
    }

    /// Supply that echoes writes and answers reads with a settings frame
    fn echo_supply(request: &[u8]) -> Vec<Vec<u8>> {
        if request[1] == 0x03 {
            vec![settings_reply()]
        } else {
            vec![request.to_vec()]
        }
    }

    async fn connected(transport: ScriptedTransport) -> (Device, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let mut device = Device::new(transport).with_event_sink(sink.clone());
        device.connect().await.unwrap();
        (device, sink)
    }

    #[tokio::test]
    async fn test_device_create() {
        let device = Device::new_udp("127.0.0.1:8231");
        assert!(!device.is_connected());
        assert_eq!(device.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_query_requires_connection() {
        let mut device = Device::new(ScriptedTransport::silent());
        assert!(matches!(device.get_status().await, Err(Error::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_decodes_voltage_setpoint() {
        let (mut device, sink) = connected(ScriptedTransport::new(echo_supply)).await;

        let reply = device.get_status().await.unwrap();
        let report = reply.report().unwrap();
        assert_eq!(report.kind, ReportKind::Settings);
        assert_eq!(report.get("volt_set").unwrap().to_string(), "30.00");

        assert_eq!(sink.count(|e| matches!(e, Event::Resolved { key: 0x01 })), 1);
        assert_eq!(device.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setter_returns_echo() {
        let transport = ScriptedTransport::new(echo_supply);
        let writes = transport.writes();
        let (mut device, _sink) = connected(transport).await;

        let reply = device.set_on().await.unwrap();
        assert_eq!(
            reply,
            Reply::Raw(Bytes::from_static(&[0x01, 0x06, 0x00, 0x12, 0x00, 0x01]))
        );
        assert_eq!(
            writes.lock()[0],
            crc::append(&[0x01, 0x06, 0x00, 0x12, 0x00, 0x01])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_voltage_is_clamped_on_the_wire() {
        let transport = ScriptedTransport::new(echo_supply);
        let writes = transport.writes();
        let (mut device, _sink) = connected(transport).await;

        device.set_voltage(-5.0).await.unwrap();
        device.set_voltage(0.0).await.unwrap();
        device.set_voltage(999.0).await.unwrap();
        device.set_voltage(125.0).await.unwrap();

        let writes = writes.lock();
        assert_eq!(writes[0], writes[1]);
        assert_eq!(writes[2], writes[3]);
        assert_eq!(&writes[2][4..6], &12500u16.to_be_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_fails_after_three_attempts() {
        let transport = ScriptedTransport::silent();
        let writes = transport.writes();
        let (mut device, sink) = connected(transport).await;

        let start = Instant::now();
        let result = device.get_limits().await;

        assert!(matches!(
            result,
            Err(Error::CommandFailed { attempts: 3, .. })
        ));
        assert_eq!(writes.lock().len(), 3);
        // Three 1 s deadlines and two 100 ms pauses
        assert_eq!(Instant::now() - start, Duration::from_millis(3200));
        assert_eq!(sink.count(|e| matches!(e, Event::Retrying { .. })), 2);
        assert_eq!(device.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_configurable() {
        let sink = Arc::new(MemorySink::new());
        let mut device = Device::new(ScriptedTransport::silent())
            .with_event_sink(sink.clone())
            .with_retries(5)
            .with_timeout(Duration::from_millis(200))
            .with_backoff(Duration::ZERO);
        device.connect().await.unwrap();

        let start = Instant::now();
        assert!(matches!(
            device.restart().await,
            Err(Error::CommandFailed { attempts: 5, .. })
        ));
        assert_eq!(Instant::now() - start, Duration::from_secs(1));
        assert_eq!(
            sink.count(|e| matches!(e, Event::AttemptTimedOut { .. })),
            5
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_reply_then_retry_succeeds() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        let transport = ScriptedTransport::new(move |request| {
            let mut calls = counter.lock();
            *calls += 1;
            let mut reply = request.to_vec();
            if *calls == 1 {
                reply[4] ^= 0xff;
            }
            vec![reply]
        });
        let (mut device, sink) = connected(transport).await;

        assert!(device.set_backlight(3).await.is_ok());
        assert_eq!(*calls.lock(), 2);
        assert_eq!(sink.count(|e| matches!(e, Event::CrcMismatch { .. })), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_command_does_not_poison_next() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        let transport = ScriptedTransport::new(move |request| {
            let mut calls = counter.lock();
            *calls += 1;
            if *calls <= 3 { Vec::new() } else { echo_supply(request) }
        });
        let (mut device, _sink) = connected(transport).await;

        assert!(device.set_buzzer(1).await.is_err());
        assert!(device.get_status().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_wide_timeout_is_not_sent() {
        let transport = ScriptedTransport::new(echo_supply);
        let writes = transport.writes();
        let (mut device, _sink) = connected(transport).await;

        assert!(matches!(
            device.set_timeout(250_000).await,
            Err(Error::Core(wuzhi_core::Error::ValueTooWide { .. }))
        ));
        assert!(writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_pre_connect_failure_is_tolerated() {
        let sink = Arc::new(MemorySink::new());
        let mut device = Device::new(ScriptedTransport::silent())
            .with_event_sink(sink.clone())
            .with_pre_connect(FailingHook);

        device.connect().await.unwrap();
        assert!(device.is_connected());
        assert_eq!(
            sink.count(|e| matches!(e, Event::PreConnectFailed { .. })),
            1
        );

        device.disconnect().await.unwrap();
        assert!(!device.is_connected());
    }
}
