//! BLE Scanner Module
//!
//! Bounded discovery on top of a [`LinkTransport`]. A scan session ends on
//! its deadline or, for a name filter, on the first match. It cannot be
//! restarted; start a new session instead.

use crate::domain::error::TowerError;
use crate::domain::models::{Advertisement, DeviceId, DeviceIdentity};
use crate::infrastructure::bluetooth::protocol::DiscoveryFilter;
use crate::infrastructure::bluetooth::transport::LinkTransport;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct ScanSession<'a> {
    transport: &'a dyn LinkTransport,
    receiver: mpsc::UnboundedReceiver<Advertisement>,
    filter: DiscoveryFilter,
    deadline: Instant,
    seen: HashSet<DeviceId>,
    stopped: bool,
}

impl<'a> ScanSession<'a> {
    /// Start scanning with `filter` for at most `timeout`
    pub fn start(
        transport: &'a dyn LinkTransport,
        filter: DiscoveryFilter,
        timeout: Duration,
    ) -> Result<Self, TowerError> {
        info!("Starting BLE scan ({:?}, {:?})", filter, timeout);
        let receiver = transport.start_scan()?;
        Ok(Self {
            transport,
            receiver,
            filter,
            deadline: Instant::now() + timeout,
            seen: HashSet::new(),
            stopped: false,
        })
    }

    /// Next matching device, or `None` once the scan has ended.
    ///
    /// Each device is reported at most once per session.
    pub async fn next_match(&mut self) -> Option<DeviceIdentity> {
        while !self.stopped {
            let adv = match tokio::time::timeout_at(self.deadline, self.receiver.recv()).await {
                Ok(Some(adv)) => adv,
                Ok(None) => {
                    debug!("Advertisement stream closed");
                    self.stop();
                    return None;
                }
                Err(_) => {
                    debug!("Scan window elapsed");
                    self.stop();
                    return None;
                }
            };

            debug!(
                "Found: [{} / {}] ({}) {:?} dBm",
                adv.cached_name.as_deref().unwrap_or("NULL"),
                adv.advertised_name.as_deref().unwrap_or("NULL"),
                adv.id,
                adv.rssi
            );

            if !self.filter.matches(&adv) || !self.seen.insert(adv.id.clone()) {
                continue;
            }

            if self.filter.stops_on_first_match() {
                info!("Target found: {}", adv.id);
                self.stop();
            }
            return Some(adv.identity());
        }
        None
    }

    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.receiver.close();
        if let Err(e) = self.transport.stop_scan() {
            warn!("Failed to stop scan: {}", e);
        }
    }
}

impl Drop for ScanSession<'_> {
    fn drop(&mut self) {
        self.stop();
    }
}
