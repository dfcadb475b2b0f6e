//! Bluetooth Module
//!
//! Provides the BLE link to the TOWER grow-tower controller.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      TowerWorker                          │
//! │   (Bluetooth thread - command loop, cancellation)         │
//! └─────────────────────┬────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                      TowerService                         │
//! │   (Lifecycle state machine, owns session + mirror)        │
//! └─────────────────────┬────────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌───────────┐  ┌─────────────┐  ┌───────────┐
//! │  Scanner  │  │ Connection  │  │ Protocol  │
//! │           │  │             │  │           │
//! │ - bounded │  │ - timeout   │  │ - target  │
//! │   scans   │  │ - stabilize │  │   name    │
//! │           │  │ - retry     │  │ - timing  │
//! └─────┬─────┘  └──────┬──────┘  └───────────┘
//!       └───────┬───────┘
//!               ▼
//!        LinkTransport
//!     (WinRT or simulated)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Discovery filter and default timing
//! - [`transport`] - The platform seam and its opaque handles
//! - [`scanner`] - Bounded, non-restartable scan sessions
//! - [`retry`] - Fixed-delay retry around group resolution
//! - [`connection`] - Individual connection steps and the bound session
//! - [`service`] - Lifecycle coordinator
//! - [`worker`] - Bluetooth thread and command loop
//! - [`simulated`] - In-process TOWER for `--simulate` and tests

pub mod connection;
pub mod protocol;
pub mod retry;
pub mod scanner;
pub mod service;
pub mod simulated;
pub mod transport;
pub mod worker;
#[cfg(windows)]
pub mod winrt;

pub use service::TowerService;

use crate::domain::error::TowerError;
use std::sync::Arc;
use transport::LinkTransport;

/// The radio transport for this platform
pub fn native_transport() -> Result<Arc<dyn LinkTransport>, TowerError> {
    #[cfg(windows)]
    {
        Ok(Arc::new(winrt::WinRtTransport::new()))
    }
    #[cfg(not(windows))]
    {
        Err(TowerError::Unsupported(
            "no native BLE transport on this platform".to_string(),
        ))
    }
}
