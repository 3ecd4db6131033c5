//! Compute device selection.
//!
//! The device is chosen exactly once, when the pipeline is built, and the resulting
//! [`ComputeDevice`] is handed to every model constructor.

use facelens_utils::config::DevicePreference;
use log::{info, warn};
use std::fmt;

/// Device a loaded model executes on.
///
/// tract evaluates graphs on the CPU, so this is the only variant the runtime can produce today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeDevice {
    Cpu,
}

impl ComputeDevice {
    /// Resolve a configured preference into the device models will run on.
    pub fn resolve(preference: DevicePreference) -> Self {
        match preference {
            DevicePreference::Auto => {
                info!("No accelerator backend available; running inference on the CPU.");
            }
            DevicePreference::Cpu => {}
            DevicePreference::Accelerator => {
                warn!(
                    "Accelerator inference requested but the tract runtime is CPU-only; falling back to CPU."
                );
            }
        }
        ComputeDevice::Cpu
    }

    pub fn label(self) -> &'static str {
        match self {
            ComputeDevice::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
