//! Bluetooth Service Module
//!
//! Main service that owns the TOWER link and drives it through its
//! lifecycle: `Idle → Scanning → Connecting → Stabilizing →
//! ResolvingAttributes → Binding → Ready`. Any failing step passes through
//! `Failed(kind)` back to `Idle`; an explicit disconnect passes through
//! `Disconnecting`.

use crate::domain::error::TowerError;
use crate::domain::mirror::{DeviceStateMirror, Subscription};
use crate::domain::models::{
    AppEvent, DeviceIdentity, DeviceStateSnapshot, FailureKind, LinkState,
};
use crate::infrastructure::bluetooth::connection::{
    BleConnection, BoundAttributes, ConnectionConfig, ConnectionSession, SessionIo,
};
use crate::infrastructure::bluetooth::protocol::DiscoveryFilter;
use crate::infrastructure::bluetooth::scanner::ScanSession;
use crate::infrastructure::bluetooth::transport::{DropSignal, LinkHandle, LinkTransport};
use crate::infrastructure::event_log::EventLog;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TowerService {
    transport: Arc<dyn LinkTransport>,
    connection: BleConnection,
    log: EventLog,
    state: LinkState,
    session: Option<ConnectionSession>,
    /// Link opened by an attempt that has not reached `Ready` yet
    pending_link: Option<LinkHandle>,
    link_drop: Option<DropSignal>,
    mirror: DeviceStateMirror,
}

impl TowerService {
    pub fn new(transport: Arc<dyn LinkTransport>, config: ConnectionConfig, log: EventLog) -> Self {
        let connection = BleConnection::new(transport.clone(), config, log.clone());
        Self {
            transport,
            connection,
            log,
            state: LinkState::Idle,
            session: None,
            pending_link: None,
            link_drop: None,
            mirror: DeviceStateMirror::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn config(&self) -> &ConnectionConfig {
        self.connection.config()
    }

    pub fn snapshot(&self) -> DeviceStateSnapshot {
        self.mirror.get()
    }

    pub fn subscribe(&self) -> Subscription {
        self.mirror.subscribe()
    }

    /// Scan for the target name and bring the first match up to `Ready`.
    ///
    /// A no-op when already `Ready`; rejected with [`TowerError::Busy`] while
    /// another attempt is in flight.
    pub async fn connect(&mut self) -> Result<(), TowerError> {
        if self.state == LinkState::Ready {
            self.log.info("Already connected");
            return Ok(());
        }
        self.check_not_busy()?;

        let target = self.config().target_name.clone();
        let timeout = self.config().scan_timeout;
        self.set_state(LinkState::Scanning);
        self.log.info(format!("Scanning for {}...", target));

        let transport = self.transport.clone();
        let filter = DiscoveryFilter::Name(target);
        let found = match ScanSession::start(transport.as_ref(), filter, timeout) {
            Ok(mut scan) => scan.next_match().await,
            Err(e) => return self.fail(e).await,
        };

        match found {
            Some(device) => {
                self.log.success(format!("Found {} ({})", device.display_name(), device.id));
                self.establish(device).await
            }
            None => self.fail(TowerError::ScanTimeout(timeout)).await,
        }
    }

    /// Scan for the full window and report every distinct device
    pub async fn discover_all(&mut self) -> Result<Vec<DeviceIdentity>, TowerError> {
        self.check_not_busy()?;
        if self.state == LinkState::Ready {
            return Err(TowerError::Busy(self.state));
        }

        let timeout = self.config().scan_timeout;
        self.set_state(LinkState::Scanning);
        self.log.info("Scanning for all devices...");

        let transport = self.transport.clone();
        let mut scan = match ScanSession::start(transport.as_ref(), DiscoveryFilter::All, timeout) {
            Ok(scan) => scan,
            Err(e) => return self.fail(e).await,
        };

        let mut found = Vec::new();
        while let Some(device) = scan.next_match().await {
            self.log
                .info(format!("Found {} ({})", device.display_name(), device.id));
            self.log.emit(AppEvent::DeviceFound(device.clone()));
            found.push(device);
        }
        drop(scan);

        if found.is_empty() {
            return self.fail(TowerError::ScanTimeout(timeout)).await;
        }
        self.log.info(format!("Scan finished, {} device(s) found", found.len()));
        self.set_state(LinkState::Idle);
        Ok(found)
    }

    /// Connect to a device picked from a scan-all listing
    pub async fn connect_to(&mut self, device: DeviceIdentity) -> Result<(), TowerError> {
        if self.state == LinkState::Ready {
            if self.session.as_ref().map(|s| &s.identity.id) == Some(&device.id) {
                self.log.info("Already connected");
                return Ok(());
            }
            return Err(TowerError::Busy(self.state));
        }
        self.check_not_busy()?;
        self.establish(device).await
    }

    /// Tear down whatever exists and return to `Idle`. Safe from any state.
    pub async fn disconnect(&mut self) {
        self.set_state(LinkState::Disconnecting);
        let had_link = self.session.is_some() || self.pending_link.is_some();
        self.release().await;
        self.set_state(LinkState::Idle);
        if had_link {
            self.log.info("Disconnected");
        }
        self.log.emit(AppEvent::Disconnected { unsolicited: false });
    }

    /// Resolves when the `Ready` link drops on its own. Pending forever while
    /// there is no such link.
    pub async fn wait_for_link_drop(&mut self) {
        if let Some(signal) = self.link_drop.as_mut() {
            let fired = signal.await.is_ok();
            self.link_drop = None;
            if fired {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    pub async fn handle_unsolicited_drop(&mut self) {
        let name = self
            .session
            .as_ref()
            .map(|s| s.identity.display_name().to_string())
            .unwrap_or_else(|| "device".to_string());
        self.log.warning(format!("Connection to {} lost", name));
        self.release().await;
        self.set_state(LinkState::Idle);
        self.log.emit(AppEvent::Disconnected { unsolicited: true });
    }

    pub async fn read_all(&mut self) -> Result<DeviceStateSnapshot, TowerError> {
        let result = match self.ready_attributes() {
            Ok(attributes) => {
                let io = SessionIo {
                    transport: self.transport.as_ref(),
                    attributes: &attributes,
                };
                self.mirror.read_all(&io).await.map(|()| self.mirror.get())
            }
            Err(e) => Err(e),
        };
        self.report("Read", result, |_| "Device state refreshed".to_string())
    }

    pub async fn set_light(&mut self, on: bool) -> Result<(), TowerError> {
        let result = match self.ready_attributes() {
            Ok(attributes) => {
                let io = SessionIo {
                    transport: self.transport.as_ref(),
                    attributes: &attributes,
                };
                self.mirror.set_light(&io, on).await
            }
            Err(e) => Err(e),
        };
        self.report("Set light", result, |_| light_label(on))
    }

    /// Read-then-invert toggle; returns the new light state
    pub async fn toggle_light(&mut self) -> Result<bool, TowerError> {
        let result = match self.ready_attributes() {
            Ok(attributes) => {
                let io = SessionIo {
                    transport: self.transport.as_ref(),
                    attributes: &attributes,
                };
                self.mirror.toggle_light(&io).await
            }
            Err(e) => Err(e),
        };
        self.report("Toggle light", result, |on| light_label(*on))
    }

    pub async fn set_fan_speed(&mut self, speed: i32) -> Result<u8, TowerError> {
        let result = match self.ready_attributes() {
            Ok(attributes) => {
                let io = SessionIo {
                    transport: self.transport.as_ref(),
                    attributes: &attributes,
                };
                self.mirror.set_fan_speed(&io, speed).await
            }
            Err(e) => Err(e),
        };
        self.report("Set fan speed", result, |speed| {
            format!("Fan speed set to {}%", speed)
        })
    }

    pub async fn set_fan_range(&mut self, min: i32, max: i32) -> Result<(u8, u8), TowerError> {
        let result = match self.ready_attributes() {
            Ok(attributes) => {
                let io = SessionIo {
                    transport: self.transport.as_ref(),
                    attributes: &attributes,
                };
                self.mirror.set_fan_range(&io, min, max).await
            }
            Err(e) => Err(e),
        };
        self.report("Set fan range", result, |(min, max)| {
            format!("Fan range set to {}-{}%", min, max)
        })
    }

    pub async fn set_schedule(&mut self, on_hour: i32, off_hour: i32) -> Result<(u8, u8), TowerError> {
        let result = match self.ready_attributes() {
            Ok(attributes) => {
                let io = SessionIo {
                    transport: self.transport.as_ref(),
                    attributes: &attributes,
                };
                self.mirror.set_schedule(&io, on_hour, off_hour).await
            }
            Err(e) => Err(e),
        };
        self.report("Set schedule", result, |(on, off)| {
            format!("Light schedule set to {:02}:00 on, {:02}:00 off", on, off)
        })
    }

    fn check_not_busy(&self) -> Result<(), TowerError> {
        if self.state.is_attempt_in_progress() || self.state == LinkState::Disconnecting {
            warn!("Rejecting request while {}", self.state);
            return Err(TowerError::Busy(self.state));
        }
        Ok(())
    }

    fn ready_attributes(&self) -> Result<BoundAttributes, TowerError> {
        match (&self.session, self.state) {
            (Some(session), LinkState::Ready) => Ok(session.attributes),
            _ => Err(TowerError::Disconnected),
        }
    }

    async fn establish(&mut self, device: DeviceIdentity) -> Result<(), TowerError> {
        if let Err(e) = self.bring_up(&device).await {
            return self.fail(e).await;
        }

        self.mirror.mark_connected(device.name.clone());
        self.set_state(LinkState::Ready);
        self.log
            .success(format!("Connected to {}", device.display_name()));

        if self.config().read_after_connect {
            if let Err(e) = self.read_all().await {
                self.log
                    .warning(format!("Initial read failed, showing defaults: {}", e));
            }
        }
        Ok(())
    }

    async fn bring_up(&mut self, device: &DeviceIdentity) -> Result<(), TowerError> {
        self.set_state(LinkState::Connecting);
        let link = self.connection.open_link(device).await?;
        self.pending_link = Some(link);
        let mut dropped = self.transport.on_unsolicited_disconnect(link)?;

        self.set_state(LinkState::Stabilizing);
        self.connection.stabilize(link, &mut dropped).await?;

        self.set_state(LinkState::ResolvingAttributes);
        let group = self.connection.resolve_group(link).await?;

        self.set_state(LinkState::Binding);
        let attributes = self.connection.bind_all(group).await?;

        self.pending_link = None;
        self.link_drop = Some(dropped);
        self.session = Some(ConnectionSession {
            identity: device.clone(),
            link,
            attributes,
        });
        Ok(())
    }

    async fn fail<T>(&mut self, error: TowerError) -> Result<T, TowerError> {
        let kind = match (&error, self.state.failure_kind()) {
            (TowerError::ScanTimeout(_), _) => FailureKind::ScanTimeout,
            // The radio refused to scan at all
            (_, FailureKind::ScanTimeout) => FailureKind::ConnectionError,
            (_, kind) => kind,
        };
        self.set_state(LinkState::Failed(kind));
        self.log.error(format!("{} failed: {}", phase_label(kind), error));
        self.release().await;
        self.set_state(LinkState::Idle);
        Err(error)
    }

    /// Close the link, forget all handles and reset the mirror
    async fn release(&mut self) {
        self.link_drop = None;
        let link = self
            .session
            .take()
            .map(|s| s.link)
            .or(self.pending_link.take());

        if let Some(link) = link {
            if let Err(e) = self.transport.disconnect(link).await {
                warn!("Error while closing link: {}", e);
            }
        }
        if self.mirror.get().connected {
            self.mirror.reset();
        }
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state == state {
            return;
        }
        debug!("Link state: {} -> {}", self.state, state);
        self.state = state;
        self.log.emit(AppEvent::LinkState(state));
    }

    fn report<T>(
        &self,
        action: &str,
        result: Result<T, TowerError>,
        describe: impl FnOnce(&T) -> String,
    ) -> Result<T, TowerError> {
        match &result {
            Ok(value) => self.log.success(describe(value)),
            Err(e) => {
                self.log.error(format!("{} failed: {}", action, e));
                self.log
                    .emit(AppEvent::CommandFailed(format!("{}: {}", action, e)));
            }
        }
        result
    }
}

fn light_label(on: bool) -> String {
    format!("Light {}", if on { "on" } else { "off" })
}

fn phase_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::ScanTimeout => "Scan",
        FailureKind::ConnectionError => "Connection",
        FailureKind::UnexpectedDrop => "Stabilization",
        FailureKind::AttributeGroupNotFound => "Attribute group lookup",
        FailureKind::AttributeNotFound => "Attribute binding",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attributes::{Attribute, SERVICE_UUID_ALT};
    use crate::domain::models::MessageSeverity;
    use crate::infrastructure::bluetooth::simulated::{SimulatedTower, SimulationConfig};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        tower: Arc<SimulatedTower>,
        service: TowerService,
        events: mpsc::UnboundedReceiver<AppEvent>,
    }

    impl Harness {
        fn new(sim: SimulationConfig) -> Self {
            Self::with_config(sim, ConnectionConfig::default())
        }

        fn with_config(sim: SimulationConfig, config: ConnectionConfig) -> Self {
            let tower = Arc::new(SimulatedTower::new(sim));
            let (tx, events) = mpsc::unbounded_channel();
            let service = TowerService::new(tower.clone(), config, EventLog::new(tx));
            Self {
                tower,
                service,
                events,
            }
        }

        fn drain(&mut self) -> Vec<AppEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }

        fn states(&mut self) -> Vec<LinkState> {
            self.drain()
                .into_iter()
                .filter_map(|e| match e {
                    AppEvent::LinkState(s) => Some(s),
                    _ => None,
                })
                .collect()
        }
    }

    fn tower_identity() -> DeviceIdentity {
        DeviceIdentity {
            id: SimulationConfig::default().device_id,
            name: Some("TOWER".into()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_walks_every_state() {
        let mut h = Harness::new(SimulationConfig::default());
        h.service.connect().await.unwrap();

        assert_eq!(
            h.states(),
            vec![
                LinkState::Scanning,
                LinkState::Connecting,
                LinkState::Stabilizing,
                LinkState::ResolvingAttributes,
                LinkState::Binding,
                LinkState::Ready,
            ]
        );
        let snapshot = h.service.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.device_name.as_deref(), Some("TOWER"));
        // Initial read picks up the firmware values
        assert_eq!(snapshot.fan.speed, 15);
        assert_eq!(snapshot.schedule.light_off_hour, 14);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_timeout_returns_to_idle() {
        let mut h = Harness::new(SimulationConfig {
            advertising: false,
            ..Default::default()
        });
        let result = h.service.connect().await;

        assert!(matches!(result, Err(TowerError::ScanTimeout(_))));
        assert_eq!(h.service.state(), LinkState::Idle);
        assert!(!h.tower.is_scanning());
        assert_eq!(
            h.states(),
            vec![
                LinkState::Scanning,
                LinkState::Failed(FailureKind::ScanTimeout),
                LinkState::Idle,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_start_error_is_a_connection_error() {
        let mut h = Harness::new(SimulationConfig {
            scan_error: Some(TowerError::Transport("radio off".into())),
            ..Default::default()
        });
        let result = h.service.connect().await;

        assert!(matches!(result, Err(TowerError::Transport(_))));
        assert_eq!(
            h.states(),
            vec![
                LinkState::Scanning,
                LinkState::Failed(FailureKind::ConnectionError),
                LinkState::Idle,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_read_failure_keeps_session_ready() {
        let mut h = Harness::new(SimulationConfig::default());
        h.tower.set_value(Attribute::Light, 1);
        h.tower.set_value(Attribute::FanMax, 80);
        h.tower.fail_reads(Attribute::FanMin);

        h.service.connect().await.unwrap();
        assert_eq!(h.service.state(), LinkState::Ready);

        let snapshot = h.service.snapshot();
        assert!(snapshot.connected);
        // Read in fixed order up to the failing attribute
        assert!(snapshot.light.on);
        assert_eq!(snapshot.fan.speed, 15);
        assert_eq!(snapshot.fan.max, 100);

        assert!(h.drain().iter().any(|e| matches!(
            e,
            AppEvent::LogMessage(m)
                if m.severity == MessageSeverity::Warning
                    && m.message.starts_with("Initial read failed")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_alternate_group_connects_cleanly() {
        let mut h = Harness::new(SimulationConfig {
            advertised_group: SERVICE_UUID_ALT,
            ..Default::default()
        });
        h.service.connect().await.unwrap();
        assert_eq!(h.service.state(), LinkState::Ready);

        let events = h.drain();
        assert!(!events.iter().any(|e| matches!(e, AppEvent::LinkState(LinkState::Failed(_)))));
        assert!(!events.iter().any(|e| matches!(
            e,
            AppEvent::LogMessage(m) if m.severity == MessageSeverity::Error
        )));

        h.service.set_fan_speed(70).await.unwrap();
        assert_eq!(h.tower.value(Attribute::Fan), 70);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connection() {
        let mut h = Harness::new(SimulationConfig {
            connect_error: Some(TowerError::ConnectionRefused("busy".into())),
            ..Default::default()
        });
        let result = h.service.connect().await;
        assert!(matches!(result, Err(TowerError::ConnectionRefused(_))));
        assert!(h
            .states()
            .contains(&LinkState::Failed(FailureKind::ConnectionError)));
        assert_eq!(h.service.state(), LinkState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_not_found_releases_link() {
        let mut h = Harness::new(SimulationConfig {
            group_unavailable_lookups: 5,
            ..Default::default()
        });
        let started = tokio::time::Instant::now();
        let result = h.service.connect().await;

        assert!(matches!(
            result,
            Err(TowerError::RetriesExhausted { attempts: 3, .. })
        ));
        assert!(h
            .states()
            .contains(&LinkState::Failed(FailureKind::AttributeGroupNotFound)));
        assert_eq!(h.tower.open_links(), 0);
        // connect delay + stabilization + two retry pauses
        assert!(started.elapsed() >= Duration::from_millis(200 + 1500 + 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_attribute_fails_binding() {
        let mut h = Harness::new(SimulationConfig {
            missing_attribute: Some(Attribute::LightOffHour),
            ..Default::default()
        });
        let result = h.service.connect().await;

        assert!(matches!(
            result,
            Err(TowerError::AttributeNotFound(Attribute::LightOffHour))
        ));
        assert!(h
            .states()
            .contains(&LinkState::Failed(FailureKind::AttributeNotFound)));
        assert_eq!(h.tower.open_links(), 0);
        assert_eq!(h.tower.bound_attributes(), 0);
        assert!(!h.service.snapshot().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_during_stabilization() {
        let mut h = Harness::new(SimulationConfig::default());
        let tower = h.tower.clone();
        tokio::spawn(async move {
            // After connect (200ms), inside the stabilization window
            tokio::time::sleep(Duration::from_millis(700)).await;
            tower.drop_links();
        });

        let result = h.service.connect().await;
        assert!(matches!(result, Err(TowerError::UnexpectedDrop)));
        assert!(h
            .states()
            .contains(&LinkState::Failed(FailureKind::UnexpectedDrop)));
        assert_eq!(h.service.state(), LinkState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsolicited_drop_clears_session() {
        let mut h = Harness::new(SimulationConfig::default());
        h.service.connect().await.unwrap();
        h.drain();

        h.tower.drop_links();
        h.service.wait_for_link_drop().await;
        h.service.handle_unsolicited_drop().await;

        assert_eq!(h.service.state(), LinkState::Idle);
        assert!(!h.service.snapshot().connected);
        assert_eq!(h.tower.bound_attributes(), 0);
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, AppEvent::Disconnected { unsolicited: true })));

        assert!(matches!(
            h.service.set_fan_speed(10).await,
            Err(TowerError::Disconnected)
        ));
        assert!(matches!(
            h.service.read_all().await,
            Err(TowerError::Disconnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_require_ready() {
        let mut h = Harness::new(SimulationConfig::default());
        assert!(matches!(
            h.service.set_light(true).await,
            Err(TowerError::Disconnected)
        ));
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, AppEvent::CommandFailed(_))));
        assert!(h.tower.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_guards() {
        let mut h = Harness::new(SimulationConfig::default());
        h.service.connect().await.unwrap();
        let links = h.tower.open_links();

        // Already ready: no second session
        h.service.connect().await.unwrap();
        assert_eq!(h.tower.open_links(), links);

        h.service.state = LinkState::Stabilizing;
        assert!(matches!(
            h.service.connect().await,
            Err(TowerError::Busy(LinkState::Stabilizing))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_disconnect() {
        let mut h = Harness::new(SimulationConfig::default());
        h.service.connect().await.unwrap();
        h.drain();

        h.service.disconnect().await;
        assert_eq!(h.service.state(), LinkState::Idle);
        assert_eq!(h.tower.open_links(), 0);
        assert!(!h.service.snapshot().connected);
        let events = h.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, AppEvent::LinkState(LinkState::Disconnecting))));
        assert!(events
            .iter()
            .any(|e| matches!(e, AppEvent::Disconnected { unsolicited: false })));

        // From Idle it still converges and reports
        h.service.disconnect().await;
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, AppEvent::Disconnected { unsolicited: false })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_treats_nonzero_as_on() {
        let mut h = Harness::new(SimulationConfig::default());
        h.service.connect().await.unwrap();

        h.tower.set_value(Attribute::Light, 3);
        assert!(!h.service.toggle_light().await.unwrap());
        assert_eq!(h.tower.value(Attribute::Light), 0);

        assert!(h.service.toggle_light().await.unwrap());
        assert_eq!(h.tower.value(Attribute::Light), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_reports_and_keeps_mirror() {
        let mut h = Harness::new(SimulationConfig::default());
        h.service.connect().await.unwrap();
        h.tower.fail_writes(Attribute::LightOffHour);
        h.drain();

        let result = h.service.set_schedule(6, 22).await;
        assert!(matches!(result, Err(TowerError::Transport(_))));
        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.schedule.light_on_hour, 6);
        assert_eq!(snapshot.schedule.light_off_hour, 14);
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, AppEvent::CommandFailed(_))));
        // Session survives a failed write
        assert_eq!(h.service.state(), LinkState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_read_can_be_disabled() {
        let config = ConnectionConfig {
            read_after_connect: false,
            ..Default::default()
        };
        let mut h = Harness::with_config(SimulationConfig::default(), config);
        h.service.connect().await.unwrap();
        // Mirror defaults, not the firmware's
        assert_eq!(h.service.snapshot().fan.speed, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_all_then_connect_to() {
        let lamp = crate::domain::models::Advertisement {
            id: crate::domain::models::DeviceId("11:22:33:44:55:66".into()),
            cached_name: None,
            advertised_name: Some("LAMP".into()),
            rssi: Some(-80),
        };
        let mut h = Harness::new(SimulationConfig {
            nearby: vec![lamp],
            ..Default::default()
        });

        let found = h.service.discover_all().await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(h.service.state(), LinkState::Idle);
        let reported = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, AppEvent::DeviceFound(_)))
            .count();
        assert_eq!(reported, 2);

        h.service.connect_to(tower_identity()).await.unwrap();
        assert_eq!(h.service.state(), LinkState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_all_without_devices_times_out() {
        let mut h = Harness::new(SimulationConfig {
            advertising: false,
            ..Default::default()
        });
        let result = h.service.discover_all().await;

        assert!(matches!(result, Err(TowerError::ScanTimeout(_))));
        assert!(!h.tower.is_scanning());
        assert_eq!(
            h.states(),
            vec![
                LinkState::Scanning,
                LinkState::Failed(FailureKind::ScanTimeout),
                LinkState::Idle,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_to_other_device_while_ready_is_busy() {
        let mut h = Harness::new(SimulationConfig::default());
        h.service.connect().await.unwrap();
        let links = h.tower.open_links();

        let lamp = DeviceIdentity {
            id: crate::domain::models::DeviceId("11:22:33:44:55:66".into()),
            name: Some("LAMP".into()),
        };
        assert!(matches!(
            h.service.connect_to(lamp).await,
            Err(TowerError::Busy(LinkState::Ready))
        ));
        assert_eq!(h.service.state(), LinkState::Ready);
        assert_eq!(h.tower.open_links(), links);

        // The device already connected is a no-op
        h.service.connect_to(tower_identity()).await.unwrap();
        assert_eq!(h.tower.open_links(), links);
    }
}
