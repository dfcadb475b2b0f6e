//! Windows BLE transport
//!
//! [`LinkTransport`] on top of the WinRT Bluetooth LE APIs. Advertisements
//! only carry the payload name, so `cached_name` is always `None` here.

use crate::domain::attributes::AttributeDescriptor;
use crate::domain::error::TowerError;
use crate::domain::models::{Advertisement, DeviceId, DeviceIdentity};
use crate::infrastructure::bluetooth::transport::{
    AttributeHandle, DropSignal, GroupHandle, LinkHandle, LinkTransport,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;
use windows::core::GUID;
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCommunicationStatus, GattDeviceService, GattSession, GattWriteOption,
};
use windows::Devices::Bluetooth::{BluetoothCacheMode, BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter};

impl From<windows::core::Error> for TowerError {
    fn from(e: windows::core::Error) -> Self {
        TowerError::Transport(e.to_string())
    }
}

fn guid(id: Uuid) -> GUID {
    GUID::from_u128(id.as_u128())
}

type SharedDropSender = Arc<Mutex<Option<oneshot::Sender<()>>>>;

struct WinRtLink {
    device: BluetoothLEDevice,
    session: Option<GattSession>,
    status_token: i64,
    drop_sender: SharedDropSender,
}

#[derive(Default)]
struct WinRtState {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
    links: HashMap<u64, WinRtLink>,
    groups: HashMap<u64, (u64, GattDeviceService)>,
    attributes: HashMap<u64, (u64, GattCharacteristic)>,
    next_handle: u64,
}

impl WinRtState {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

#[derive(Default)]
pub struct WinRtTransport {
    state: Mutex<WinRtState>,
}

impl WinRtTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, WinRtState>, TowerError> {
        self.state
            .lock()
            .map_err(|_| TowerError::Transport("transport state poisoned".to_string()))
    }

    fn characteristic(&self, handle: AttributeHandle) -> Result<GattCharacteristic, TowerError> {
        let state = self.lock()?;
        state
            .attributes
            .get(&handle.0)
            .filter(|(link, _)| state.links.contains_key(link))
            .map(|(_, c)| c.clone())
            .ok_or(TowerError::Disconnected)
    }
}

#[async_trait]
impl LinkTransport for WinRtTransport {
    fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<Advertisement>, TowerError> {
        self.stop_scan()?;

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let name = args.Advertisement()?.LocalName()?.to_string();
                    let adv = Advertisement {
                        id: DeviceId::from_address(args.BluetoothAddress()?),
                        cached_name: None,
                        advertised_name: (!name.is_empty()).then_some(name),
                        rssi: args.RawSignalStrengthInDBm().ok(),
                    };
                    let _ = sender.send(adv);
                }
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        self.lock()?.watcher = Some(watcher);
        Ok(receiver)
    }

    fn stop_scan(&self) -> Result<(), TowerError> {
        let watcher = self.lock()?.watcher.take();
        if let Some(watcher) = watcher {
            info!("Stopping BLE scan...");
            watcher.Stop()?;
        }
        Ok(())
    }

    async fn connect(&self, device: &DeviceIdentity) -> Result<LinkHandle, TowerError> {
        let address = device.id.bluetooth_address().ok_or_else(|| {
            TowerError::DeviceUnreachable(format!("{} is not a Bluetooth address", device.id))
        })?;

        let ble = BluetoothLEDevice::FromBluetoothAddressAsync(address)?
            .await
            .map_err(|e| TowerError::DeviceUnreachable(e.to_string()))?;

        // Touch the GATT table so the link is actually up before returning
        let services = ble
            .GetGattServicesWithCacheModeAsync(BluetoothCacheMode::Uncached)?
            .await?;
        match services.Status()? {
            GattCommunicationStatus::Success => {}
            GattCommunicationStatus::AccessDenied => {
                return Err(TowerError::ConnectionRefused("access denied".to_string()))
            }
            status => return Err(TowerError::DeviceUnreachable(format!("{:?}", status))),
        }

        let session = match GattSession::FromDeviceIdAsync(&ble.BluetoothDeviceId()?)?.await {
            Ok(session) => {
                session.SetMaintainConnection(true)?;
                Some(session)
            }
            Err(e) => {
                warn!("Failed to create GattSession, continuing anyway: {}", e);
                None
            }
        };

        let drop_sender = SharedDropSender::default();
        let signal = drop_sender.clone();
        let status_handler =
            TypedEventHandler::new(move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
                if let Some(dev) = dev.as_ref() {
                    if dev.ConnectionStatus()? == BluetoothConnectionStatus::Disconnected {
                        let sender = signal.lock().ok().and_then(|mut s| s.take());
                        if let Some(sender) = sender {
                            let _ = sender.send(());
                        }
                    }
                }
                Ok(())
            });
        let status_token = ble.ConnectionStatusChanged(&status_handler)?;

        let mut state = self.lock()?;
        let link = state.allocate();
        state.links.insert(
            link,
            WinRtLink {
                device: ble,
                session,
                status_token,
                drop_sender,
            },
        );
        info!("Link {} open to {}", link, device.id);
        Ok(LinkHandle(link))
    }

    fn on_unsolicited_disconnect(&self, link: LinkHandle) -> Result<DropSignal, TowerError> {
        let state = self.lock()?;
        let entry = state.links.get(&link.0).ok_or(TowerError::Disconnected)?;
        let (sender, receiver) = oneshot::channel();
        let mut slot = entry
            .drop_sender
            .lock()
            .map_err(|_| TowerError::Transport("drop signal poisoned".to_string()))?;
        *slot = Some(sender);
        Ok(receiver)
    }

    fn is_connected(&self, link: LinkHandle) -> bool {
        let Ok(state) = self.lock() else {
            return false;
        };
        state
            .links
            .get(&link.0)
            .and_then(|l| l.device.ConnectionStatus().ok())
            .map(|s| s == BluetoothConnectionStatus::Connected)
            .unwrap_or(false)
    }

    async fn find_group(&self, link: LinkHandle, group_id: Uuid) -> Result<GroupHandle, TowerError> {
        let device = self
            .lock()?
            .links
            .get(&link.0)
            .map(|l| l.device.clone())
            .ok_or(TowerError::Disconnected)?;

        let result = device
            .GetGattServicesForUuidWithCacheModeAsync(guid(group_id), BluetoothCacheMode::Uncached)?
            .await?;
        let status = result.Status()?;
        if status != GattCommunicationStatus::Success {
            return Err(TowerError::Transport(format!(
                "service lookup returned {:?}",
                status
            )));
        }
        let services = result.Services()?;
        if services.Size()? == 0 {
            return Err(TowerError::AttributeGroupNotFound);
        }
        let service = services.GetAt(0)?;

        let mut state = self.lock()?;
        let group = state.allocate();
        state.groups.insert(group, (link.0, service));
        Ok(GroupHandle(group))
    }

    async fn bind_attribute(
        &self,
        group: GroupHandle,
        descriptor: &AttributeDescriptor,
    ) -> Result<AttributeHandle, TowerError> {
        let (link, service) = self
            .lock()?
            .groups
            .get(&group.0)
            .cloned()
            .ok_or(TowerError::Disconnected)?;

        let result = service
            .GetCharacteristicsForUuidWithCacheModeAsync(
                guid(descriptor.wire_id),
                BluetoothCacheMode::Uncached,
            )?
            .await?;
        if result.Status()? != GattCommunicationStatus::Success {
            return Err(TowerError::AttributeNotFound(descriptor.attribute));
        }
        let characteristics = result.Characteristics()?;
        if characteristics.Size()? == 0 {
            return Err(TowerError::AttributeNotFound(descriptor.attribute));
        }
        let characteristic = characteristics.GetAt(0)?;

        let mut state = self.lock()?;
        let handle = state.allocate();
        state.attributes.insert(handle, (link, characteristic));
        debug!("Bound {} as {}", descriptor.logical_name, handle);
        Ok(AttributeHandle(handle))
    }

    async fn read(&self, handle: AttributeHandle) -> Result<u8, TowerError> {
        let characteristic = self.characteristic(handle)?;
        let result = characteristic
            .ReadValueWithCacheModeAsync(BluetoothCacheMode::Uncached)?
            .await?;
        let status = result.Status()?;
        if status != GattCommunicationStatus::Success {
            return Err(TowerError::Transport(format!("read returned {:?}", status)));
        }

        let reader = DataReader::FromBuffer(&result.Value()?)?;
        if reader.UnconsumedBufferLength()? == 0 {
            return Err(TowerError::Transport("empty value".to_string()));
        }
        Ok(reader.ReadByte()?)
    }

    async fn write(&self, handle: AttributeHandle, value: u8) -> Result<(), TowerError> {
        let characteristic = self.characteristic(handle)?;
        let writer = DataWriter::new()?;
        writer.WriteByte(value)?;
        let buffer = writer.DetachBuffer()?;

        let status = characteristic
            .WriteValueWithOptionAsync(&buffer, GattWriteOption::WriteWithResponse)?
            .await?;
        if status != GattCommunicationStatus::Success {
            return Err(TowerError::Transport(format!("write returned {:?}", status)));
        }
        Ok(())
    }

    async fn disconnect(&self, link: LinkHandle) -> Result<(), TowerError> {
        let mut state = self.lock()?;
        let Some(entry) = state.links.remove(&link.0) else {
            return Ok(());
        };

        // Disarm before closing so the status handler cannot fire
        if let Ok(mut slot) = entry.drop_sender.lock() {
            slot.take();
        }
        let _ = entry.device.RemoveConnectionStatusChanged(entry.status_token);

        state.attributes.retain(|_, (owner, _)| *owner != link.0);
        let groups: Vec<u64> = state
            .groups
            .iter()
            .filter(|(_, (owner, _))| *owner == link.0)
            .map(|(id, _)| *id)
            .collect();
        for id in groups {
            if let Some((_, service)) = state.groups.remove(&id) {
                let _ = service.Close();
            }
        }
        drop(state);

        if let Some(session) = entry.session {
            let _ = session.Close();
        }
        entry.device.Close()?;
        info!("Link {} closed", link.0);
        Ok(())
    }
}
