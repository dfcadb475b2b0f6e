//! Device State Mirror
//!
//! Client-side copy of the six device values. Every mutation writes through to
//! the device first and only touches the mirror once the write succeeded.

use crate::domain::attributes::{self, Attribute};
use crate::domain::error::TowerError;
use crate::domain::models::DeviceStateSnapshot;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// Byte-level access to the bound attributes of a live session
#[async_trait]
pub trait AttributeIo: Send + Sync {
    async fn read(&self, attribute: Attribute) -> Result<u8, TowerError>;
    async fn write(&self, attribute: Attribute, value: u8) -> Result<(), TowerError>;
}

/// Change notifications; dropping the handle unsubscribes
pub struct Subscription {
    receiver: broadcast::Receiver<DeviceStateSnapshot>,
}

impl Subscription {
    /// Wait for the next snapshot. Returns `None` once the mirror is gone.
    /// Skips ahead if this subscriber fell behind.
    pub async fn recv(&mut self) -> Option<DeviceStateSnapshot> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Subscriber lagged, skipped {} snapshots", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<DeviceStateSnapshot> {
        self.receiver.try_recv().ok()
    }
}

pub struct DeviceStateMirror {
    snapshot: DeviceStateSnapshot,
    changes: broadcast::Sender<DeviceStateSnapshot>,
}

impl Default for DeviceStateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStateMirror {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            snapshot: DeviceStateSnapshot::default(),
            changes,
        }
    }

    /// Last known state
    pub fn get(&self) -> DeviceStateSnapshot {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.changes.subscribe(),
        }
    }

    pub fn mark_connected(&mut self, device_name: Option<String>) {
        self.snapshot.connected = true;
        self.snapshot.device_name = device_name;
        self.notify();
    }

    /// Back to defaults with `connected == false`
    pub fn reset(&mut self) {
        self.snapshot = DeviceStateSnapshot::default();
        self.notify();
    }

    pub async fn set_light(&mut self, io: &dyn AttributeIo, on: bool) -> Result<(), TowerError> {
        io.write(Attribute::Light, attributes::encode_light(on)).await?;
        self.snapshot.light.on = on;
        self.notify();
        Ok(())
    }

    /// Read the light byte and write its complement.
    ///
    /// Not atomic: a change made by another client between the read and the
    /// write is overwritten. Returns the new light state.
    pub async fn toggle_light(&mut self, io: &dyn AttributeIo) -> Result<bool, TowerError> {
        let current = attributes::decode_light(io.read(Attribute::Light).await?);
        let target = !current;
        debug!("Light reads {}, writing {}", current, target);
        io.write(Attribute::Light, attributes::encode_light(target)).await?;
        self.snapshot.light.on = target;
        self.notify();
        Ok(target)
    }

    pub async fn set_fan_speed(&mut self, io: &dyn AttributeIo, speed: i32) -> Result<u8, TowerError> {
        let speed = attributes::clamp_percent(speed);
        io.write(Attribute::Fan, speed).await?;
        self.snapshot.fan.speed = speed;
        self.notify();
        Ok(speed)
    }

    /// Write min then max. `min > max` is passed through unchanged; rejecting
    /// it is up to the caller. If the max write fails the mirror keeps the
    /// new min and the old max.
    pub async fn set_fan_range(
        &mut self,
        io: &dyn AttributeIo,
        min: i32,
        max: i32,
    ) -> Result<(u8, u8), TowerError> {
        let min = attributes::clamp_percent(min);
        let max = attributes::clamp_percent(max);

        io.write(Attribute::FanMin, min).await?;
        self.snapshot.fan.min = min;

        let second = io.write(Attribute::FanMax, max).await;
        if second.is_ok() {
            self.snapshot.fan.max = max;
        }
        self.notify();
        second.map(|()| (min, max))
    }

    /// Same write order and partial-failure behaviour as [`Self::set_fan_range`].
    pub async fn set_schedule(
        &mut self,
        io: &dyn AttributeIo,
        on_hour: i32,
        off_hour: i32,
    ) -> Result<(u8, u8), TowerError> {
        let on_hour = attributes::clamp_hour(on_hour);
        let off_hour = attributes::clamp_hour(off_hour);

        io.write(Attribute::LightOnHour, on_hour).await?;
        self.snapshot.schedule.light_on_hour = on_hour;

        let second = io.write(Attribute::LightOffHour, off_hour).await;
        if second.is_ok() {
            self.snapshot.schedule.light_off_hour = off_hour;
        }
        self.notify();
        second.map(|()| (on_hour, off_hour))
    }

    /// Read all six values in [`Attribute::ALL`] order, stopping at the first
    /// failure. Fields read before the failure keep their new values.
    pub async fn read_all(&mut self, io: &dyn AttributeIo) -> Result<(), TowerError> {
        let mut changed = false;
        for attribute in Attribute::ALL {
            let raw = match io.read(attribute).await {
                Ok(raw) => raw,
                Err(e) => {
                    if changed {
                        self.notify();
                    }
                    return Err(e);
                }
            };
            self.apply(attribute, raw);
            changed = true;
        }
        self.notify();
        Ok(())
    }

    fn apply(&mut self, attribute: Attribute, raw: u8) {
        let kind = attribute.descriptor().kind;
        let s = &mut self.snapshot;
        match attribute {
            Attribute::Light => s.light.on = attributes::decode_light(raw),
            Attribute::Fan => s.fan.speed = kind.clamp(i32::from(raw)),
            Attribute::FanMin => s.fan.min = kind.clamp(i32::from(raw)),
            Attribute::FanMax => s.fan.max = kind.clamp(i32::from(raw)),
            Attribute::LightOnHour => s.schedule.light_on_hour = kind.clamp(i32::from(raw)),
            Attribute::LightOffHour => s.schedule.light_off_hour = kind.clamp(i32::from(raw)),
        }
    }

    fn notify(&self) {
        // No receivers is fine
        let _ = self.changes.send(self.snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryIo {
        values: Mutex<[u8; 6]>,
        writes: Mutex<Vec<(Attribute, u8)>>,
        failing: Mutex<HashSet<Attribute>>,
    }

    impl MemoryIo {
        fn with_values(values: [u8; 6]) -> Self {
            let io = Self::default();
            *io.values.lock().unwrap() = values;
            io
        }

        fn fail(&self, attribute: Attribute) {
            self.failing.lock().unwrap().insert(attribute);
        }

        fn writes(&self) -> Vec<(Attribute, u8)> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AttributeIo for MemoryIo {
        async fn read(&self, attribute: Attribute) -> Result<u8, TowerError> {
            if self.failing.lock().unwrap().contains(&attribute) {
                return Err(TowerError::Transport("read failed".into()));
            }
            Ok(self.values.lock().unwrap()[attribute.index()])
        }

        async fn write(&self, attribute: Attribute, value: u8) -> Result<(), TowerError> {
            if self.failing.lock().unwrap().contains(&attribute) {
                return Err(TowerError::Transport("write failed".into()));
            }
            self.values.lock().unwrap()[attribute.index()] = value;
            self.writes.lock().unwrap().push((attribute, value));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_read_all_maps_every_field() {
        let io = MemoryIo::with_values([1, 55, 10, 90, 18, 6]);
        let mut mirror = DeviceStateMirror::new();
        mirror.read_all(&io).await.unwrap();

        let s = mirror.get();
        assert!(s.light.on);
        assert_eq!(s.fan.speed, 55);
        assert_eq!(s.fan.min, 10);
        assert_eq!(s.fan.max, 90);
        assert_eq!(s.schedule.light_on_hour, 18);
        assert_eq!(s.schedule.light_off_hour, 6);
    }

    #[tokio::test]
    async fn test_read_all_fails_fast() {
        let io = MemoryIo::with_values([1, 55, 10, 90, 18, 6]);
        io.fail(Attribute::FanMax);
        let mut mirror = DeviceStateMirror::new();

        assert!(mirror.read_all(&io).await.is_err());
        let s = mirror.get();
        // Read before the failure
        assert!(s.light.on);
        assert_eq!(s.fan.speed, 55);
        assert_eq!(s.fan.min, 10);
        // Stale defaults from here on
        assert_eq!(s.fan.max, 100);
        assert_eq!(s.schedule.light_on_hour, 18);
        assert_eq!(s.schedule.light_off_hour, 14);
    }

    #[tokio::test]
    async fn test_fan_range_is_not_cross_validated() {
        let io = MemoryIo::default();
        let mut mirror = DeviceStateMirror::new();

        let stored = mirror.set_fan_range(&io, 30, 20).await.unwrap();
        assert_eq!(stored, (30, 20));
        assert_eq!(mirror.get().fan.min, 30);
        assert_eq!(mirror.get().fan.max, 20);
        assert_eq!(
            io.writes(),
            vec![(Attribute::FanMin, 30), (Attribute::FanMax, 20)]
        );
    }

    #[tokio::test]
    async fn test_values_are_clamped_before_write() {
        let io = MemoryIo::default();
        let mut mirror = DeviceStateMirror::new();

        assert_eq!(mirror.set_fan_speed(&io, 150).await.unwrap(), 100);
        mirror.set_fan_range(&io, -20, 250).await.unwrap();
        mirror.set_schedule(&io, 30, -2).await.unwrap();

        assert_eq!(
            io.writes(),
            vec![
                (Attribute::Fan, 100),
                (Attribute::FanMin, 0),
                (Attribute::FanMax, 100),
                (Attribute::LightOnHour, 23),
                (Attribute::LightOffHour, 0),
            ]
        );
        let s = mirror.get();
        assert_eq!(s.fan.speed, 100);
        assert_eq!(s.schedule.light_on_hour, 23);
        assert_eq!(s.schedule.light_off_hour, 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_mirror_unchanged() {
        let io = MemoryIo::default();
        io.fail(Attribute::Light);
        io.fail(Attribute::Fan);
        let mut mirror = DeviceStateMirror::new();
        let before = mirror.get();

        assert!(mirror.set_light(&io, true).await.is_err());
        assert!(mirror.set_fan_speed(&io, 80).await.is_err());
        assert_eq!(mirror.get(), before);
    }

    #[tokio::test]
    async fn test_partial_range_write_keeps_new_min() {
        let io = MemoryIo::default();
        io.fail(Attribute::FanMax);
        let mut mirror = DeviceStateMirror::new();

        assert!(mirror.set_fan_range(&io, 25, 75).await.is_err());
        assert_eq!(mirror.get().fan.min, 25);
        assert_eq!(mirror.get().fan.max, 100);

        io.fail(Attribute::LightOffHour);
        assert!(mirror.set_schedule(&io, 7, 21).await.is_err());
        assert_eq!(mirror.get().schedule.light_on_hour, 7);
        assert_eq!(mirror.get().schedule.light_off_hour, 14);
    }

    #[tokio::test]
    async fn test_toggle_inverts_stored_value() {
        let io = MemoryIo::with_values([1, 0, 0, 0, 0, 0]);
        let mut mirror = DeviceStateMirror::new();
        assert!(!mirror.toggle_light(&io).await.unwrap());
        assert_eq!(io.writes(), vec![(Attribute::Light, 0)]);

        // Nonzero counts as on
        let io = MemoryIo::with_values([3, 0, 0, 0, 0, 0]);
        assert!(!mirror.toggle_light(&io).await.unwrap());
        assert_eq!(io.writes(), vec![(Attribute::Light, 0)]);

        let io = MemoryIo::with_values([0, 0, 0, 0, 0, 0]);
        assert!(mirror.toggle_light(&io).await.unwrap());
        assert_eq!(io.writes(), vec![(Attribute::Light, 1)]);
        assert!(mirror.get().light.on);
    }

    #[tokio::test]
    async fn test_subscribers_get_full_snapshots() {
        let io = MemoryIo::default();
        let mut mirror = DeviceStateMirror::new();
        let mut sub = mirror.subscribe();

        mirror.set_fan_speed(&io, 42).await.unwrap();
        let snapshot = sub.recv().await.unwrap();
        assert_eq!(snapshot.fan.speed, 42);
        assert_eq!(snapshot.fan.max, 100);

        // Nothing is sent for a rejected write
        io.fail(Attribute::Light);
        assert!(mirror.set_light(&io, true).await.is_err());
        assert!(sub.try_recv().is_none());

        drop(sub);
        mirror.set_fan_speed(&io, 43).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_clears_connection() {
        let mut mirror = DeviceStateMirror::new();
        mirror.mark_connected(Some("TOWER".into()));
        assert!(mirror.get().connected);
        mirror.reset();
        assert_eq!(mirror.get(), DeviceStateSnapshot::default());
    }
}
