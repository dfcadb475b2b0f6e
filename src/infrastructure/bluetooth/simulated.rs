//! Simulated TOWER
//!
//! An in-process stand-in for the grow-tower firmware behind the
//! [`LinkTransport`] seam. Used by `--simulate` and by the tests, with knobs
//! for the failure modes seen on real hardware.

use crate::domain::attributes::{Attribute, AttributeDescriptor, SERVICE_UUID};
use crate::domain::error::TowerError;
use crate::domain::models::{Advertisement, DeviceId, DeviceIdentity};
use crate::infrastructure::bluetooth::transport::{
    AttributeHandle, DropSignal, GroupHandle, LinkHandle, LinkTransport,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Firmware power-up values in [`Attribute::ALL`] order
pub const FIRMWARE_DEFAULTS: [u8; 6] = [0, 15, 0, 100, 18, 14];

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub device_id: DeviceId,
    pub device_name: String,
    /// Whether the tower itself shows up in scans
    pub advertising: bool,
    /// Other devices reported alongside the tower
    pub nearby: Vec<Advertisement>,
    /// Service identifier the firmware exposes (primary or byte-reversed)
    pub advertised_group: Uuid,
    /// Group lookups that fail before the attribute table answers
    pub group_unavailable_lookups: u32,
    /// Characteristic left out of the attribute table
    pub missing_attribute: Option<Attribute>,
    /// Error returned when a scan is started, as with the radio switched off
    pub scan_error: Option<TowerError>,
    /// Error returned by every connect attempt
    pub connect_error: Option<TowerError>,
    pub connect_delay: Duration,
    pub initial_values: [u8; 6],
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            device_id: DeviceId("24:0A:C4:47:00:01".to_string()),
            device_name: "TOWER".to_string(),
            advertising: true,
            nearby: Vec::new(),
            advertised_group: SERVICE_UUID,
            group_unavailable_lookups: 0,
            missing_attribute: None,
            scan_error: None,
            connect_error: None,
            connect_delay: Duration::from_millis(200),
            initial_values: FIRMWARE_DEFAULTS,
        }
    }
}

#[derive(Default)]
struct LinkEntry {
    drop_sender: Option<oneshot::Sender<()>>,
}

struct SimState {
    scan_sender: Option<mpsc::UnboundedSender<Advertisement>>,
    values: [u8; 6],
    links: HashMap<u64, LinkEntry>,
    groups: HashMap<u64, u64>,
    attributes: HashMap<u64, (u64, Attribute)>,
    next_handle: u64,
    group_lookups_to_fail: u32,
    failing_reads: HashSet<Attribute>,
    failing_writes: HashSet<Attribute>,
    writes: Vec<(Attribute, u8)>,
}

impl SimState {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn release_link(&mut self, link: u64) -> Option<LinkEntry> {
        let entry = self.links.remove(&link);
        self.groups.retain(|_, owner| *owner != link);
        self.attributes.retain(|_, (owner, _)| *owner != link);
        entry
    }

    fn attribute(&self, handle: AttributeHandle) -> Result<Attribute, TowerError> {
        match self.attributes.get(&handle.0) {
            Some((link, attribute)) if self.links.contains_key(link) => Ok(*attribute),
            _ => Err(TowerError::Disconnected),
        }
    }
}

pub struct SimulatedTower {
    config: SimulationConfig,
    state: Mutex<SimState>,
}

impl SimulatedTower {
    pub fn new(config: SimulationConfig) -> Self {
        let state = SimState {
            scan_sender: None,
            values: config.initial_values,
            links: HashMap::new(),
            groups: HashMap::new(),
            attributes: HashMap::new(),
            next_handle: 0,
            group_lookups_to_fail: config.group_unavailable_lookups,
            failing_reads: HashSet::new(),
            failing_writes: HashSet::new(),
            writes: Vec::new(),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>, TowerError> {
        self.state
            .lock()
            .map_err(|_| TowerError::Transport("simulator state poisoned".to_string()))
    }

    fn advertisement(&self) -> Advertisement {
        Advertisement {
            id: self.config.device_id.clone(),
            cached_name: None,
            advertised_name: Some(self.config.device_name.clone()),
            rssi: Some(-58),
        }
    }
}

#[cfg(test)]
impl SimulatedTower {
    pub fn is_scanning(&self) -> bool {
        self.lock().map(|s| s.scan_sender.is_some()).unwrap_or(false)
    }

    /// Current device-side value
    pub fn value(&self, attribute: Attribute) -> u8 {
        self.lock()
            .map(|s| s.values[attribute.index()])
            .unwrap_or_default()
    }

    /// Change a value on the device side, as the firmware's own timer or
    /// another client would.
    pub fn set_value(&self, attribute: Attribute, value: u8) {
        if let Ok(mut s) = self.lock() {
            s.values[attribute.index()] = value;
        }
    }

    /// Every successful write in order
    pub fn writes(&self) -> Vec<(Attribute, u8)> {
        self.lock().map(|s| s.writes.clone()).unwrap_or_default()
    }

    pub fn fail_reads(&self, attribute: Attribute) {
        if let Ok(mut s) = self.lock() {
            s.failing_reads.insert(attribute);
        }
    }

    pub fn fail_writes(&self, attribute: Attribute) {
        if let Ok(mut s) = self.lock() {
            s.failing_writes.insert(attribute);
        }
    }

    pub fn open_links(&self) -> usize {
        self.lock().map(|s| s.links.len()).unwrap_or_default()
    }

    pub fn bound_attributes(&self) -> usize {
        self.lock().map(|s| s.attributes.len()).unwrap_or_default()
    }

    /// Drop every open link as if the tower went out of range
    pub fn drop_links(&self) {
        let Ok(mut s) = self.lock() else {
            return;
        };
        let links: Vec<u64> = s.links.keys().copied().collect();
        for link in links {
            debug!("Simulated link {} dropped", link);
            if let Some(sender) = s.release_link(link).and_then(|mut e| e.drop_sender.take()) {
                let _ = sender.send(());
            }
        }
    }
}

#[async_trait]
impl LinkTransport for SimulatedTower {
    fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<Advertisement>, TowerError> {
        if let Some(e) = &self.config.scan_error {
            return Err(e.clone());
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        for adv in &self.config.nearby {
            let _ = sender.send(adv.clone());
        }
        if self.config.advertising {
            let _ = sender.send(self.advertisement());
        }
        // Keep the sender so the scan stays open until stopped
        self.lock()?.scan_sender = Some(sender);
        Ok(receiver)
    }

    fn stop_scan(&self) -> Result<(), TowerError> {
        self.lock()?.scan_sender = None;
        Ok(())
    }

    async fn connect(&self, device: &DeviceIdentity) -> Result<LinkHandle, TowerError> {
        tokio::time::sleep(self.config.connect_delay).await;

        if let Some(e) = &self.config.connect_error {
            return Err(e.clone());
        }
        if device.id != self.config.device_id {
            return Err(TowerError::DeviceUnreachable(format!(
                "{} is not a TOWER",
                device.id
            )));
        }

        let mut s = self.lock()?;
        let link = s.allocate();
        s.links.insert(link, LinkEntry::default());
        debug!("Simulated link {} open", link);
        Ok(LinkHandle(link))
    }

    fn on_unsolicited_disconnect(&self, link: LinkHandle) -> Result<DropSignal, TowerError> {
        let mut s = self.lock()?;
        let entry = s.links.get_mut(&link.0).ok_or(TowerError::Disconnected)?;
        let (sender, receiver) = oneshot::channel();
        entry.drop_sender = Some(sender);
        Ok(receiver)
    }

    fn is_connected(&self, link: LinkHandle) -> bool {
        self.lock()
            .map(|s| s.links.contains_key(&link.0))
            .unwrap_or(false)
    }

    async fn find_group(&self, link: LinkHandle, group_id: Uuid) -> Result<GroupHandle, TowerError> {
        let mut s = self.lock()?;
        if !s.links.contains_key(&link.0) {
            return Err(TowerError::Disconnected);
        }
        if group_id != self.config.advertised_group {
            return Err(TowerError::AttributeGroupNotFound);
        }
        if s.group_lookups_to_fail > 0 {
            s.group_lookups_to_fail -= 1;
            return Err(TowerError::Transport(
                "attribute table not ready".to_string(),
            ));
        }
        let group = s.allocate();
        s.groups.insert(group, link.0);
        Ok(GroupHandle(group))
    }

    async fn bind_attribute(
        &self,
        group: GroupHandle,
        descriptor: &AttributeDescriptor,
    ) -> Result<AttributeHandle, TowerError> {
        let mut s = self.lock()?;
        let link = *s.groups.get(&group.0).ok_or(TowerError::Disconnected)?;
        // Looked up by wire id, as a GATT server would
        let attribute = Attribute::from_wire_id(descriptor.wire_id)
            .filter(|a| self.config.missing_attribute != Some(*a))
            .ok_or(TowerError::AttributeNotFound(descriptor.attribute))?;
        let handle = s.allocate();
        s.attributes.insert(handle, (link, attribute));
        Ok(AttributeHandle(handle))
    }

    async fn read(&self, handle: AttributeHandle) -> Result<u8, TowerError> {
        let s = self.lock()?;
        let attribute = s.attribute(handle)?;
        if s.failing_reads.contains(&attribute) {
            return Err(TowerError::Transport(format!("read of {} failed", attribute)));
        }
        Ok(s.values[attribute.index()])
    }

    async fn write(&self, handle: AttributeHandle, value: u8) -> Result<(), TowerError> {
        let mut s = self.lock()?;
        let attribute = s.attribute(handle)?;
        if s.failing_writes.contains(&attribute) {
            return Err(TowerError::Transport(format!("write of {} failed", attribute)));
        }
        s.values[attribute.index()] = value;
        s.writes.push((attribute, value));
        Ok(())
    }

    async fn disconnect(&self, link: LinkHandle) -> Result<(), TowerError> {
        let mut s = self.lock()?;
        if s.release_link(link.0).is_some() {
            debug!("Simulated link {} closed", link.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attributes::{GROUP_CANDIDATES, SERVICE_UUID_ALT};

    fn tower_identity(tower: &SimulatedTower) -> DeviceIdentity {
        tower.advertisement().identity()
    }

    #[tokio::test(start_paused = true)]
    async fn test_alternate_group_identifier() {
        let tower = SimulatedTower::new(SimulationConfig {
            advertised_group: SERVICE_UUID_ALT,
            ..Default::default()
        });
        let link = tower.connect(&tower_identity(&tower)).await.unwrap();

        assert!(matches!(
            tower.find_group(link, SERVICE_UUID).await,
            Err(TowerError::AttributeGroupNotFound)
        ));
        let misses = Mutex::new(Vec::new());
        let group = tower
            .resolve_attribute_group(link, &GROUP_CANDIDATES, &|index, id, _| {
                misses.lock().unwrap().push((index, id));
            })
            .await
            .unwrap();
        assert_eq!(*misses.lock().unwrap(), vec![(0, SERVICE_UUID)]);
        let light = tower
            .bind_attribute(group, Attribute::Light.descriptor())
            .await
            .unwrap();
        assert_eq!(tower.read(light).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_releases_handles() {
        let tower = SimulatedTower::new(SimulationConfig::default());
        let link = tower.connect(&tower_identity(&tower)).await.unwrap();
        let group = tower
            .resolve_attribute_group(link, &GROUP_CANDIDATES, &|_, _, _| {})
            .await
            .unwrap();
        let fan = tower
            .bind_attribute(group, Attribute::Fan.descriptor())
            .await
            .unwrap();
        assert_eq!(tower.bound_attributes(), 1);

        tower.disconnect(link).await.unwrap();
        tower.disconnect(link).await.unwrap();
        assert_eq!(tower.open_links(), 0);
        assert_eq!(tower.bound_attributes(), 0);
        assert!(matches!(tower.read(fan).await, Err(TowerError::Disconnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_signal() {
        let tower = SimulatedTower::new(SimulationConfig::default());
        let link = tower.connect(&tower_identity(&tower)).await.unwrap();
        let dropped = tower.on_unsolicited_disconnect(link).unwrap();
        tower.drop_links();
        assert!(dropped.await.is_ok());
        assert!(!tower.is_connected(link));

        // Explicit disconnect closes the signal without firing it
        let link = tower.connect(&tower_identity(&tower)).await.unwrap();
        let closed = tower.on_unsolicited_disconnect(link).unwrap();
        tower.disconnect(link).await.unwrap();
        assert!(closed.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_device_is_unreachable() {
        let tower = SimulatedTower::new(SimulationConfig::default());
        let stranger = DeviceIdentity {
            id: DeviceId("00:11:22:33:44:55".into()),
            name: Some("LAMP".into()),
        };
        assert!(matches!(
            tower.connect(&stranger).await,
            Err(TowerError::DeviceUnreachable(_))
        ));
    }
}
