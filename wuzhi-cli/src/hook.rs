//! External pre-connect program

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use wuzhi::PreConnectHook;

/// Runs `PROGRAM <address>` and expects a zero exit status
pub struct CommandHook {
    program: String,
    address: String,
}

impl CommandHook {
    pub fn new(program: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            address: address.into(),
        }
    }
}

#[async_trait]
impl PreConnectHook for CommandHook {
    async fn run(&self) -> Result<(), String> {
        debug!("Running {} {}", self.program, self.address);

        let status = Command::new(&self.program)
            .arg(&self.address)
            .status()
            .await
            .map_err(|e| format!("cannot run {}: {}", self.program, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("{} exited with {}", self.program, status))
        }
    }
}
