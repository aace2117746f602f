//! Execution device selection
//!
//! Devices are plain values that the ONNX backend turns into execution
//! providers when a session is built.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device a model session runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Device {
    /// CPU with an intra-op thread count; `0` leaves the choice to ONNX Runtime
    Cpu(usize),
    /// CUDA device with device ID
    #[cfg(feature = "cuda")]
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu(0)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu(0) => write!(f, "cpu"),
            Self::Cpu(i) => write!(f, "cpu:{i}"),
            #[cfg(feature = "cuda")]
            Self::Cuda(i) => write!(f, "cuda:{i}"),
        }
    }
}

impl std::str::FromStr for Device {
    type Err = crate::AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (device_type, id_part) = s
            .trim()
            .split_once(':')
            .map_or_else(|| (s.trim(), None), |(device, id)| (device, Some(id)));

        let id = match id_part {
            None => 0,
            Some(id) => id.trim().parse::<usize>().map_err(|_| {
                crate::AdapterError::config(format!("Invalid device index in '{s}'"))
            })?,
        };

        match device_type.to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu(id)),
            #[cfg(feature = "cuda")]
            "cuda" => Ok(Self::Cuda(id)),
            _ => Err(crate::AdapterError::config(format!(
                "Unsupported device: {s}"
            ))),
        }
    }
}

impl Device {
    /// Get the device ID if applicable
    pub fn id(&self) -> Option<usize> {
        match self {
            Self::Cpu(i) => Some(*i),
            #[cfg(feature = "cuda")]
            Self::Cuda(i) => Some(*i),
        }
    }

    /// Check if the device is available on the system
    pub fn is_available(&self) -> bool {
        match self {
            Self::Cpu(_) => true,
            #[cfg(feature = "cuda")]
            Self::Cuda(_) => {
                use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
                CUDAExecutionProvider::default()
                    .with_device_id(self.id().unwrap_or(0) as i32)
                    .is_available()
                    .unwrap_or(false)
            }
        }
    }
}

pub fn cpu() -> Device {
    Device::Cpu(0)
}

pub fn cpu_with_threads(threads: usize) -> Device {
    Device::Cpu(threads)
}

#[cfg(feature = "cuda")]
pub fn cuda(device_id: usize) -> Device {
    Device::Cuda(device_id)
}
