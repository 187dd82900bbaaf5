//! The remote-control capability used to reach the device.
//!
//! Everything the session needs from the device bridge is expressed by
//! [`RemoteControl`]; [`Adb`] implements it by running the `adb`
//! executable. Tests substitute an in-memory implementation.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{DroidlinkError, Result};

/// A remote process started through [`RemoteControl::spawn_shell`].
#[async_trait]
pub trait RemoteProcess: Send {
    /// Wait for the process to exit and return its exit code, if any.
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Forcibly terminate the process.
    async fn kill(&mut self) -> Result<()>;
}

/// Device bridge operations used by the tunnel and the server launcher.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    async fn start_server(&self) -> Result<()>;

    async fn push(&self, local: &Path, remote: &str) -> Result<()>;

    /// Map a local TCP port to `localabstract:<device_socket>`.
    ///
    /// With `local_port == None` the bridge picks a free port; the bound
    /// port is returned in both cases.
    async fn forward(&self, local_port: Option<u16>, device_socket: &str) -> Result<u16>;

    async fn forward_remove(&self, local_port: u16) -> Result<()>;

    /// Map `localabstract:<device_socket>` on the device to a local port.
    async fn reverse(&self, device_socket: &str, local_port: u16) -> Result<()>;

    async fn reverse_remove(&self, device_socket: &str) -> Result<()>;

    /// Start `adb <args...>` in the background.
    async fn spawn_shell(&self, args: &[String]) -> Result<Box<dyn RemoteProcess>>;
}

pub fn local_abstract(device_socket: &str) -> String {
    format!("localabstract:{device_socket}")
}

pub fn local_tcp(port: u16) -> String {
    format!("tcp:{port}")
}

// ── Adb ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Adb {
    program: String,
    serial: Option<String>,
}

impl Default for Adb {
    fn default() -> Self {
        Self::new("adb")
    }
}

impl Adb {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            serial: None,
        }
    }

    /// Target a specific device (`adb -s <serial>`).
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Serial of the selected device; empty when adb reports `unknown`.
    pub async fn get_serialno(&self) -> Result<String> {
        let stdout = self.output(&["get-serialno".to_string()]).await?;
        let serial = stdout.trim();
        Ok(if serial == "unknown" {
            String::new()
        } else {
            serial.to_string()
        })
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            command.arg("-s").arg(serial);
        }
        command.args(args);
        command
    }

    fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.program.clone()];
        if let Some(serial) = &self.serial {
            parts.push("-s".into());
            parts.push(serial.clone());
        }
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    /// Run to completion and return stdout; non-zero exit is an error.
    async fn output(&self, args: &[String]) -> Result<String> {
        debug!(command = %self.describe(args), "running adb");
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| DroidlinkError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        check_status(&self.describe(args), output.status, &output.stderr)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run(&self, args: &[&str]) -> Result<()> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.output(&args).await.map(drop)
    }
}

fn check_status(command: &str, status: ExitStatus, stderr: &[u8]) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    Err(DroidlinkError::RemoteCommand {
        command: command.to_string(),
        status: status.code(),
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    })
}

/// Parse the port printed by `adb forward tcp:0 ...`.
fn parse_forward_port(stdout: &str) -> Result<u16> {
    stdout
        .trim()
        .parse()
        .map_err(|_| DroidlinkError::Other(format!("unexpected adb forward output: {stdout:?}")))
}

#[async_trait]
impl RemoteControl for Adb {
    async fn start_server(&self) -> Result<()> {
        self.run(&["start-server"]).await
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<()> {
        let local = local.to_string_lossy();
        self.run(&["push", &*local, remote]).await
    }

    async fn forward(&self, local_port: Option<u16>, device_socket: &str) -> Result<u16> {
        let local = local_tcp(local_port.unwrap_or(0));
        let remote = local_abstract(device_socket);
        let stdout = self
            .output(&["forward".to_string(), local, remote])
            .await?;
        match local_port {
            Some(port) => Ok(port),
            None => parse_forward_port(&stdout),
        }
    }

    async fn forward_remove(&self, local_port: u16) -> Result<()> {
        self.run(&["forward", "--remove", local_tcp(local_port).as_str()])
            .await
    }

    async fn reverse(&self, device_socket: &str, local_port: u16) -> Result<()> {
        self.run(&[
            "reverse",
            local_abstract(device_socket).as_str(),
            local_tcp(local_port).as_str(),
        ])
        .await
    }

    async fn reverse_remove(&self, device_socket: &str) -> Result<()> {
        self.run(&["reverse", "--remove", local_abstract(device_socket).as_str()])
            .await
    }

    async fn spawn_shell(&self, args: &[String]) -> Result<Box<dyn RemoteProcess>> {
        debug!(command = %self.describe(args), "spawning adb");
        let child = self
            .command(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DroidlinkError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        Ok(Box::new(AdbProcess { child }))
    }
}

/// A running `adb` child process.
#[derive(Debug)]
pub struct AdbProcess {
    child: Child,
}

#[async_trait]
impl RemoteProcess for AdbProcess {
    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}
