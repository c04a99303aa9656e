//! Compute device strategy, resolved once when a provider is constructed.

use serde::{Deserialize, Serialize};

/// User preference from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    #[serde(alias = "mps", alias = "metal", alias = "cuda")]
    Gpu,
}

/// Resolved device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            // `mps`, `metal` and `cuda` are accepted as aliases for an accelerator.
            "gpu" | "mps" | "metal" | "cuda" => Ok(Self::Gpu),
            other => Err(format!("unknown device: {other}")),
        }
    }
}

impl DevicePreference {
    #[must_use]
    pub fn resolve(self) -> Device {
        self.resolve_with(std::env::var("CUDA_VISIBLE_DEVICES").ok().as_deref())
    }

    fn resolve_with(self, cuda_visible: Option<&str>) -> Device {
        match self {
            Self::Cpu => Device::Cpu,
            Self::Gpu => Device::Gpu,
            Self::Auto => {
                if cfg!(all(target_os = "macos", target_arch = "aarch64"))
                    || cuda_visible.is_some_and(cuda_device_listed)
                {
                    Device::Gpu
                } else {
                    Device::Cpu
                }
            }
        }
    }
}

fn cuda_device_listed(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "-1" && value != "NoDevFiles"
}
