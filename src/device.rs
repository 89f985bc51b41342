//! Compute target selection.
//!
//! The device is resolved once at startup and stored in the session. A probe
//! that cannot confirm an accelerator falls back to the CPU silently.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};

const NVIDIA_DRIVER_VERSION: &str = "/proc/driver/nvidia/version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Accelerator,
}

impl Device {
    /// Pipeline device index: `0` for the first accelerator, `-1` for CPU.
    pub fn device_index(self) -> i32 {
        match self {
            Self::Cpu => -1,
            Self::Accelerator => 0,
        }
    }

    pub fn is_accelerator(self) -> bool {
        matches!(self, Self::Accelerator)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator => write!(f, "cuda"),
        }
    }
}

/// How the device should be chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DevicePolicy {
    /// Prefer the accelerator when one is available.
    #[default]
    Auto,
    /// Always use the CPU.
    Cpu,
}

impl std::str::FromStr for DevicePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "cuda" | "gpu" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            other => anyhow::bail!("unknown device policy: {other} (expected auto or cpu)"),
        }
    }
}

/// Reports whether an accelerator is usable on this host.
pub trait AcceleratorProbe {
    fn accelerator_available(&self) -> bool;
}

/// Probes the local machine for an NVIDIA GPU.
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        Self
    }
}

impl AcceleratorProbe for SystemProbe {
    fn accelerator_available(&self) -> bool {
        if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
            if cuda_devices_hidden(&visible) {
                tracing::debug!(visible = %visible, "CUDA_VISIBLE_DEVICES hides all devices");
                return false;
            }
        }

        if Path::new(NVIDIA_DRIVER_VERSION).exists() {
            return true;
        }

        let Ok(nvidia_smi) = which::which("nvidia-smi") else {
            return false;
        };
        Command::new(nvidia_smi)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

fn cuda_devices_hidden(visible: &str) -> bool {
    let visible = visible.trim();
    visible.is_empty() || visible == "-1" || visible.eq_ignore_ascii_case("none")
}

/// Resolve the device once. Only `Auto` consults the probe.
pub fn select_device(policy: DevicePolicy, probe: &dyn AcceleratorProbe) -> Device {
    let device = match policy {
        DevicePolicy::Cpu => Device::Cpu,
        DevicePolicy::Auto if probe.accelerator_available() => Device::Accelerator,
        DevicePolicy::Auto => Device::Cpu,
    };
    tracing::info!(policy = ?policy, device = %device, "device selected");
    device
}
