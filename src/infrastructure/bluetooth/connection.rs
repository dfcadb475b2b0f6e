//! BLE Connection Module
//!
//! The individual steps of bringing a TOWER link up: connect with a
//! deadline, wait out the stabilization window, resolve the attribute group
//! and bind the six attributes.

use crate::domain::attributes::{Attribute, GROUP_CANDIDATES};
use crate::domain::error::TowerError;
use crate::domain::mirror::AttributeIo;
use crate::domain::models::DeviceIdentity;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::retry::RetryPolicy;
use crate::infrastructure::bluetooth::transport::{
    AttributeHandle, DropSignal, GroupHandle, LinkHandle, LinkTransport,
};
use crate::infrastructure::event_log::EventLog;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub target_name: String,
    pub scan_all: bool,
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
    pub stabilization_delay: Duration,
    pub group_retry: RetryPolicy,
    /// Refresh the mirror right after reaching `Ready`
    pub read_after_connect: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            target_name: protocol::TARGET_DEVICE_NAME.to_string(),
            scan_all: false,
            scan_timeout: Duration::from_millis(protocol::SCAN_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(protocol::CONNECT_TIMEOUT_MS),
            stabilization_delay: Duration::from_millis(protocol::STABILIZATION_DELAY_MS),
            group_retry: RetryPolicy::new(
                protocol::GROUP_RESOLVE_ATTEMPTS,
                Duration::from_millis(protocol::GROUP_RETRY_DELAY_MS),
            ),
            read_after_connect: true,
        }
    }
}

impl From<&Settings> for ConnectionConfig {
    fn from(s: &Settings) -> Self {
        Self {
            target_name: s.target_device_name.clone(),
            scan_all: s.scan_all_devices,
            scan_timeout: s.scan_timeout(),
            connect_timeout: s.connect_timeout(),
            stabilization_delay: s.stabilization_delay(),
            group_retry: RetryPolicy::new(s.group_resolve_attempts, s.group_retry_delay()),
            read_after_connect: s.read_after_connect,
        }
    }
}

/// The six bound handles in [`Attribute::ALL`] order
#[derive(Debug, Clone, Copy)]
pub struct BoundAttributes([AttributeHandle; 6]);

impl BoundAttributes {
    pub fn handle(&self, attribute: Attribute) -> AttributeHandle {
        self.0[attribute.index()]
    }
}

/// Everything owned by a `Ready` link
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub identity: DeviceIdentity,
    pub link: LinkHandle,
    pub attributes: BoundAttributes,
}

/// [`AttributeIo`] over the bound handles of a live session
pub struct SessionIo<'a> {
    pub transport: &'a dyn LinkTransport,
    pub attributes: &'a BoundAttributes,
}

#[async_trait]
impl AttributeIo for SessionIo<'_> {
    async fn read(&self, attribute: Attribute) -> Result<u8, TowerError> {
        self.transport.read(self.attributes.handle(attribute)).await
    }

    async fn write(&self, attribute: Attribute, value: u8) -> Result<(), TowerError> {
        self.transport
            .write(self.attributes.handle(attribute), value)
            .await
    }
}

/// BLE Connection handler
pub struct BleConnection {
    transport: Arc<dyn LinkTransport>,
    config: ConnectionConfig,
    log: EventLog,
}

impl BleConnection {
    pub fn new(transport: Arc<dyn LinkTransport>, config: ConnectionConfig, log: EventLog) -> Self {
        Self {
            transport,
            config,
            log,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a link, racing the handshake against the connect timeout
    pub async fn open_link(&self, device: &DeviceIdentity) -> Result<LinkHandle, TowerError> {
        info!("Connecting to {} ({})", device.display_name(), device.id);
        self.log
            .info(format!("Connecting to {}...", device.display_name()));

        match tokio::time::timeout(self.config.connect_timeout, self.transport.connect(device)).await
        {
            Ok(result) => result,
            Err(_) => Err(TowerError::ConnectionTimeout(self.config.connect_timeout)),
        }
    }

    /// Wait out the stabilization delay, failing if the link drops meanwhile
    /// or is no longer connected afterwards.
    pub async fn stabilize(
        &self,
        link: LinkHandle,
        dropped: &mut DropSignal,
    ) -> Result<(), TowerError> {
        debug!("Stabilizing for {:?}", self.config.stabilization_delay);
        tokio::select! {
            _ = tokio::time::sleep(self.config.stabilization_delay) => {}
            signal = dropped => {
                // A closed signal means the link was released under us
                let _ = signal;
                return Err(TowerError::UnexpectedDrop);
            }
        }

        if !self.transport.is_connected(link) {
            return Err(TowerError::UnexpectedDrop);
        }
        Ok(())
    }

    /// Resolve the attribute group, trying every identifier candidate on
    /// each attempt.
    pub async fn resolve_group(&self, link: LinkHandle) -> Result<GroupHandle, TowerError> {
        let attempts = self.config.group_retry.max_attempts.max(1);
        let log = &self.log;
        let on_miss = |index: usize, candidate: Uuid, e: &TowerError| {
            if index + 1 < GROUP_CANDIDATES.len() {
                log.info(format!(
                    "Attribute group {} not found ({}), trying alternative identifier",
                    candidate, e
                ));
            }
        };

        self.config
            .group_retry
            .run(
                |attempt| {
                    log.info(format!(
                        "Looking up attribute group (attempt {}/{})",
                        attempt, attempts
                    ));
                    self.transport
                        .resolve_attribute_group(link, &GROUP_CANDIDATES, &on_miss)
                },
                |attempt, e, delay| {
                    log.warning(format!(
                        "Attribute group lookup failed (attempt {}/{}): {}",
                        attempt, attempts, e
                    ));
                    log.info(format!("Waiting {} ms before retrying", delay.as_millis()));
                },
            )
            .await
    }

    /// Bind the six attributes in fixed order, stopping at the first failure
    pub async fn bind_all(&self, group: GroupHandle) -> Result<BoundAttributes, TowerError> {
        let mut handles = [AttributeHandle(0); 6];
        for attribute in Attribute::ALL {
            let handle = self
                .transport
                .bind_attribute(group, attribute.descriptor())
                .await?;
            debug!("Bound {} -> {:?}", attribute, handle);
            handles[attribute.index()] = handle;
        }
        Ok(BoundAttributes(handles))
    }
}
