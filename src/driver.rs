//! Driver host: owns devices, dispatches events, sends updates
//!
//! A [`Driver`] aggregates [`Device`]s and the sending primitives;
//! user code implements [`DriverLogic`] to react to events and to run
//! the instrument. The event callbacks and the periodic [`DriverLogic::poll`]
//! run on one task, so vector members have a single writer by
//! construction.

use crate::comms::{queue_put, Shutdown};
use crate::error::{Error, Result};
use crate::event::{ClientEvent, SnoopEvent};
use crate::message::{DelProperty, GetProperties, MessageElement, ProtocolMessage};
use crate::property::{Device, SetOptions};
use crate::snoop::SnoopState;
use crate::timestamp::Timestamp;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Default re-request window for vector snoop subscriptions.
pub const DEFAULT_SNOOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Smallest accepted snoop window.
pub const MIN_SNOOP_TIMEOUT: Duration = Duration::from_secs(5);

/// User-supplied device control logic.
///
/// All three callbacks run on the driver's own task; they may freely
/// mutate the driver's vectors and send updates.
#[async_trait]
pub trait DriverLogic: Send + 'static {
    /// A client addressed one of this driver's devices.
    async fn rx_event(&mut self, driver: &mut Driver, event: ClientEvent) -> Result<()> {
        let _ = (driver, event);
        Ok(())
    }

    /// Traffic arrived from a device this driver snoops on.
    async fn snoop_event(&mut self, driver: &mut Driver, event: SnoopEvent) -> Result<()> {
        let _ = (driver, event);
        Ok(())
    }

    /// Invoked on the driver's poll interval to operate the
    /// instrument and push updates.
    async fn poll(&mut self, driver: &mut Driver) -> Result<()> {
        let _ = driver;
        Ok(())
    }
}

/// A driver: a set of devices plus its link to the router.
#[derive(Debug)]
pub struct Driver {
    devices: Vec<Device>,
    auto_send_def: bool,
    poll_interval: Duration,
    debug_xml: bool,
    snoop: Arc<SnoopState>,
    outbox: Option<mpsc::Sender<ProtocolMessage>>,
    shutdown: Shutdown,
}

impl Driver {
    /// Build a driver from its devices; device names must be unique.
    pub fn new(devices: Vec<Device>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for device in &devices {
            if !seen.insert(device.name().to_string()) {
                return Err(Error::InvalidArgument(format!(
                    "device name {} duplicated in this driver",
                    device.name()
                )));
            }
        }
        Ok(Self {
            devices,
            auto_send_def: true,
            poll_interval: Duration::from_secs(1),
            debug_xml: false,
            snoop: Arc::new(SnoopState::new()),
            outbox: None,
            shutdown: Shutdown::new(),
        })
    }

    /// Answer `getProperties` with definitions automatically (the
    /// default); when off, [`DriverLogic::rx_event`] sees the request.
    pub fn set_auto_send_def(&mut self, enabled: bool) {
        self.auto_send_def = enabled;
    }

    /// How often [`DriverLogic::poll`] runs. Default one second.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// Log this driver's XML traffic at DEBUG level.
    pub fn set_debug_xml(&mut self, enabled: bool) {
        self.debug_xml = enabled;
    }

    /// Does this driver own `device`?
    pub fn contains(&self, device: &str) -> bool {
        self.devices.iter().any(|d| d.name() == device)
    }

    /// A device by name.
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == name)
    }

    /// A device by name, mutably.
    pub fn device_mut(&mut self, name: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.name() == name)
    }

    /// All devices.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub(crate) fn device_names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name().to_string()).collect()
    }

    pub(crate) fn snoop_state(&self) -> Arc<SnoopState> {
        Arc::clone(&self.snoop)
    }

    pub(crate) fn attach(&mut self, outbox: mpsc::Sender<ProtocolMessage>, shutdown: Shutdown) {
        self.outbox = Some(outbox);
        self.shutdown = shutdown;
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn auto_send_def(&self) -> bool {
        self.auto_send_def
    }

    /// Transmit one element towards the router.
    pub(crate) async fn send(&self, msg: ProtocolMessage) -> Result<()> {
        let Some(outbox) = &self.outbox else {
            return Err(Error::InvalidArgument(
                "driver is not attached to a server".to_string(),
            ));
        };
        if self.debug_xml {
            debug!("TX:: {}", msg.to_log_string());
        }
        if !queue_put(outbox, msg, &self.shutdown).await {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "driver outbox closed",
            )));
        }
        Ok(())
    }

    /// Send commentary, device-scoped when `device` is given.
    ///
    /// A disabled device swallows its messages; an unknown device is
    /// refused.
    pub async fn send_message(
        &self,
        device: Option<&str>,
        text: &str,
        timestamp: Option<Timestamp>,
    ) -> Result<()> {
        if let Some(name) = device {
            let device = self
                .device(name)
                .ok_or_else(|| Error::InvalidArgument(format!("unknown device {name}")))?;
            if !device.is_enabled() {
                return Ok(());
            }
        }
        self.send(ProtocolMessage::Message(MessageElement {
            device: device.map(str::to_string),
            timestamp: Some(timestamp.unwrap_or_default()),
            message: Some(text.to_string()),
        }))
        .await
    }

    /// Withdraw a vector, or a whole device when `vector` is `None`,
    /// and mark the target disabled.
    pub async fn send_del_property(
        &mut self,
        device: &str,
        vector: Option<&str>,
        message: Option<&str>,
        timestamp: Option<Timestamp>,
    ) -> Result<()> {
        let owned = self
            .device_mut(device)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown device {device}")))?;
        match vector {
            Some(name) => {
                owned
                    .vector_mut(name)
                    .ok_or_else(|| Error::InvalidArgument(format!("unknown vector {name}")))?
                    .set_enabled(false);
            }
            None => owned.set_enabled(false),
        }
        self.send(ProtocolMessage::DelProperty(DelProperty {
            device: device.to_string(),
            name: vector.map(str::to_string),
            timestamp: Some(timestamp.unwrap_or_default()),
            message: message.map(str::to_string),
        }))
        .await
    }

    /// Send one vector's definition.
    pub async fn send_def_vector(
        &self,
        device: &str,
        vector: &str,
        message: Option<&str>,
        timestamp: Option<Timestamp>,
    ) -> Result<()> {
        let owned = self
            .device(device)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown device {device}")))?;
        if !owned.is_enabled() {
            return Ok(());
        }
        let def = owned
            .vector(vector)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown vector {vector}")))?
            .def_message(message, timestamp);
        if let Some(def) = def {
            self.send(def).await?;
        }
        Ok(())
    }

    /// Send definitions for every enabled vector of every enabled
    /// device.
    pub async fn send_def_all(&self) -> Result<()> {
        for device in &self.devices {
            for def in device.def_messages(None) {
                self.send(def).await?;
            }
        }
        Ok(())
    }

    /// Send a vector's values per `opts`; nothing goes out when the
    /// filter selects no members.
    pub async fn send_set_vector(
        &mut self,
        device: &str,
        vector: &str,
        opts: SetOptions<'_>,
    ) -> Result<()> {
        let owned = self
            .device_mut(device)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown device {device}")))?;
        if !owned.is_enabled() {
            return Ok(());
        }
        let set = owned
            .vector_mut(vector)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown vector {vector}")))?
            .set_message(&opts)?;
        if let Some(set) = set {
            self.send(set).await?;
        }
        Ok(())
    }

    /// Subscribe to traffic from devices this driver does not own:
    /// everything, one device, or one vector. A vector subscription is
    /// re-requested every [`DEFAULT_SNOOP_TIMEOUT`] until traffic for
    /// it arrives; use [`Driver::snoop`] to pick the window.
    pub async fn send_get_properties(
        &self,
        device: Option<&str>,
        vector: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = device {
            if self.contains(name) {
                return Err(Error::InvalidArgument(format!(
                    "cannot snoop on own device {name}"
                )));
            }
        }
        match (device, vector) {
            (Some(device), Some(vector)) => {
                self.snoop
                    .add_vector(device, vector, Some(DEFAULT_SNOOP_TIMEOUT));
            }
            _ => self.snoop.record_get_properties(device, vector),
        }
        self.send(ProtocolMessage::GetProperties(GetProperties::new(
            device, vector,
        )))
        .await
    }

    /// Subscribe to one vector with an explicit re-request window
    /// (minimum [`MIN_SNOOP_TIMEOUT`]).
    pub async fn snoop(&self, device: &str, vector: &str, timeout: Duration) -> Result<()> {
        if self.contains(device) {
            return Err(Error::InvalidArgument(format!(
                "cannot snoop on own device {device}"
            )));
        }
        if timeout < MIN_SNOOP_TIMEOUT {
            return Err(Error::InvalidArgument(format!(
                "snoop timeout must be at least {MIN_SNOOP_TIMEOUT:?}"
            )));
        }
        self.snoop.add_vector(device, vector, Some(timeout));
        self.send(ProtocolMessage::GetProperties(GetProperties::new(
            Some(device),
            Some(vector),
        )))
        .await
    }

    /// Re-request expired vector subscriptions.
    pub(crate) async fn check_snoop_timers(&self) -> Result<()> {
        for (device, vector) in self.snoop.due() {
            debug!(%device, %vector, "snoop window expired, re-requesting");
            self.send(ProtocolMessage::GetProperties(GetProperties::new(
                Some(&device),
                Some(&vector),
            )))
            .await?;
        }
        Ok(())
    }
}

/// Owns a driver and its logic for the life of the server.
pub(crate) struct DriverRunner {
    pub(crate) driver: Driver,
    logic: Box<dyn DriverLogic>,
    inbox: mpsc::Receiver<ProtocolMessage>,
}

impl DriverRunner {
    pub(crate) fn new(
        driver: Driver,
        logic: Box<dyn DriverLogic>,
        inbox: mpsc::Receiver<ProtocolMessage>,
    ) -> Self {
        Self {
            driver,
            logic,
            inbox,
        }
    }

    /// The driver's event loop: inbound dispatch, the poll tick and
    /// the snoop re-request tick, all on one task.
    pub(crate) async fn run(mut self, shutdown: Shutdown) {
        let mut poll = tokio::time::interval(self.driver.poll_interval());
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut snoop_tick = tokio::time::interval(Duration::from_secs(1));
        snoop_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stop = shutdown.subscribe();
        info!("driver started");
        loop {
            tokio::select! {
                _ = stop.recv() => break,
                received = self.inbox.recv() => {
                    match received {
                        Some(msg) => {
                            if self.driver.debug_xml {
                                debug!("RX:: {}", msg.to_log_string());
                            }
                            dispatch(&mut self.driver, &mut *self.logic, msg).await;
                        }
                        None => break,
                    }
                }
                _ = poll.tick() => {
                    if let Err(e) = self.logic.poll(&mut self.driver).await {
                        warn!("driver poll failed: {e}");
                    }
                }
                _ = snoop_tick.tick() => {
                    if let Err(e) = self.driver.check_snoop_timers().await {
                        warn!("snoop re-request failed: {e}");
                    }
                }
            }
        }
        info!("driver stopped");
    }
}

async fn dispatch(driver: &mut Driver, logic: &mut dyn DriverLogic, msg: ProtocolMessage) {
    let result = match msg {
        ProtocolMessage::GetProperties(request) => {
            handle_get_properties(driver, logic, request).await
        }
        ProtocolMessage::EnableBlob(_) => Ok(()), // absorbed at the client reader
        msg if msg.is_new() => handle_new(driver, logic, msg).await,
        msg => handle_snoopable(driver, logic, msg).await,
    };
    if let Err(e) = result {
        warn!("driver event handling failed: {e}");
    }
}

async fn handle_get_properties(
    driver: &mut Driver,
    logic: &mut dyn DriverLogic,
    request: GetProperties,
) -> Result<()> {
    if request.version.as_deref() != Some(crate::PROTOCOL_VERSION) {
        debug!("ignoring getProperties with version {:?}", request.version);
        return Ok(());
    }
    // collect targets first; the callbacks need the driver mutably
    let mut targets: Vec<(String, String)> = Vec::new();
    match &request.device {
        None => {
            for device in driver.devices() {
                if !device.is_enabled() {
                    continue;
                }
                for vector in device.vectors() {
                    if vector.is_enabled() {
                        targets.push((device.name().to_string(), vector.name().to_string()));
                    }
                }
            }
        }
        Some(name) => {
            let Some(device) = driver.device(name) else {
                return Ok(()); // not ours, the router broadcast it
            };
            if !device.is_enabled() {
                return Ok(());
            }
            match &request.name {
                None => {
                    for vector in device.vectors() {
                        if vector.is_enabled() {
                            targets.push((name.clone(), vector.name().to_string()));
                        }
                    }
                }
                Some(vector) => {
                    match device.vector(vector) {
                        Some(v) if v.is_enabled() => {
                            targets.push((name.clone(), vector.clone()));
                        }
                        _ => return Ok(()),
                    }
                }
            }
        }
    }
    for (device, vector) in targets {
        if driver.auto_send_def() {
            driver.send_def_vector(&device, &vector, None, None).await?;
        } else {
            let event = ClientEvent::GetProperties(GetProperties {
                version: request.version.clone(),
                device: Some(device),
                name: Some(vector),
            });
            logic.rx_event(driver, event).await?;
        }
    }
    Ok(())
}

async fn handle_new(
    driver: &mut Driver,
    logic: &mut dyn DriverLogic,
    msg: ProtocolMessage,
) -> Result<()> {
    let Some(device) = msg.device() else {
        return Ok(());
    };
    let Some(owned) = driver.device(device) else {
        return Ok(()); // not ours
    };
    if !owned.is_enabled() {
        return Ok(());
    }
    let Some(name) = msg.name() else {
        return Ok(());
    };
    match owned.vector(name) {
        Some(vector) if vector.is_enabled() => {}
        _ => return Ok(()), // a client cannot set an undefined vector
    }
    let event = match msg {
        ProtocolMessage::NewSwitch(m) => ClientEvent::NewSwitch(m),
        ProtocolMessage::NewText(m) => ClientEvent::NewText(m),
        ProtocolMessage::NewNumber(m) => ClientEvent::NewNumber(m),
        ProtocolMessage::NewBlob(m) => ClientEvent::NewBlob(m),
        _ => return Ok(()),
    };
    logic.rx_event(driver, event).await
}

async fn handle_snoopable(
    driver: &mut Driver,
    logic: &mut dyn DriverLogic,
    msg: ProtocolMessage,
) -> Result<()> {
    let device = msg.device().map(str::to_string);
    let name = msg.name().map(str::to_string);
    if let Some(device) = &device {
        if driver.contains(device) {
            error!("cannot snoop on own device {device}");
            return Ok(());
        }
    }
    if !driver.snoop.matches(device.as_deref(), name.as_deref()) {
        return Ok(());
    }
    if let (Some(device), Some(name)) = (&device, &name) {
        driver.snoop.note_heard(device, name);
    }
    let Some(event) = SnoopEvent::from_message(msg) else {
        return Ok(());
    };
    logic.snoop_event(driver, event).await
}
