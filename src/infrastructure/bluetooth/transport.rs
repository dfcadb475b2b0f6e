//! Link transport seam
//!
//! Platform discovery and GATT primitives. Handles are opaque numbers owned by
//! the transport; everything bound under a link is released when that link is
//! disconnected.

use crate::domain::attributes::AttributeDescriptor;
use crate::domain::error::TowerError;
use crate::domain::models::{Advertisement, DeviceIdentity};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeHandle(pub u64);

/// Fires `Ok(())` when the link drops on its own. The sender is dropped
/// without firing when the link is closed through [`LinkTransport::disconnect`].
pub type DropSignal = oneshot::Receiver<()>;

#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// Start reporting advertisements. Only one scan runs at a time.
    fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<Advertisement>, TowerError>;

    /// Stop the running scan, if any
    fn stop_scan(&self) -> Result<(), TowerError>;

    /// Open a link to a discovered device.
    async fn connect(&self, device: &DeviceIdentity) -> Result<LinkHandle, TowerError>;

    /// Subscribe to unsolicited drops of `link`.
    fn on_unsolicited_disconnect(&self, link: LinkHandle) -> Result<DropSignal, TowerError>;

    fn is_connected(&self, link: LinkHandle) -> bool;

    /// Look up a primary service by one identifier.
    async fn find_group(&self, link: LinkHandle, group_id: Uuid) -> Result<GroupHandle, TowerError>;

    async fn bind_attribute(
        &self,
        group: GroupHandle,
        descriptor: &AttributeDescriptor,
    ) -> Result<AttributeHandle, TowerError>;

    async fn read(&self, handle: AttributeHandle) -> Result<u8, TowerError>;

    async fn write(&self, handle: AttributeHandle, value: u8) -> Result<(), TowerError>;

    /// Close the link and release its group and attribute handles. Closing
    /// an unknown or already closed link succeeds.
    async fn disconnect(&self, link: LinkHandle) -> Result<(), TowerError>;

    /// Try each candidate in order and return the first group found.
    ///
    /// `on_miss` sees the index, identifier and error of every candidate that
    /// did not answer before the next one is tried.
    async fn resolve_attribute_group(
        &self,
        link: LinkHandle,
        candidates: &[Uuid],
        on_miss: &(dyn for<'e> Fn(usize, Uuid, &'e TowerError) + Send + Sync),
    ) -> Result<GroupHandle, TowerError> {
        for (index, candidate) in candidates.iter().enumerate() {
            match self.find_group(link, *candidate).await {
                Ok(group) => {
                    debug!("Attribute group resolved via candidate {} ({})", index, candidate);
                    return Ok(group);
                }
                Err(TowerError::Disconnected) => return Err(TowerError::Disconnected),
                Err(e) => {
                    warn!("Group {} not available: {}", candidate, e);
                    on_miss(index, *candidate, &e);
                }
            }
        }
        Err(TowerError::AttributeGroupNotFound)
    }
}
