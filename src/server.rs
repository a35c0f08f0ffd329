//! The router: multiplexes clients, drivers, externals and remotes
//!
//! Structure mirrors the INDI server fabric: an accept loop feeding a
//! fixed pool of client slots, a single ingress channel fanned in from
//! every producer, a dispatch task applying the routing and snooping
//! rules, and an egress channel broadcast to every connected client
//! behind its BLOB gate. A duplicate device definition is the one
//! fatal condition and stops the whole server.

use crate::comms::{queue_put, write_message, ActivityTimer, Shutdown, CHANNEL_CAPACITY};
use crate::driver::{Driver, DriverLogic, DriverRunner};
use crate::error::{Error, Result};
use crate::exdriver::{ExDriver, ExDriverConfig};
use crate::framer::MessageReader;
use crate::message::{EnableBlob, MessageElement, ProtocolMessage};
use crate::policy::BlobGate;
use crate::remote::{RemoteConfig, RemoteConnection};
use crate::snoop::SnoopState;
use crate::timestamp::Timestamp;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default INDI server port
pub const DEFAULT_PORT: u16 = 7624;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Concurrent client connections accepted, 1..=10
    pub max_connections: usize,
    /// Idle window after which a quiet client link is refreshed with
    /// every cached definition, surfacing dead sockets
    pub keepalive_idle: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            max_connections: 5,
            keepalive_idle: Duration::from_secs(15),
        }
    }
}

/// Who produced an ingress element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// A client slot
    Client(usize),
    /// A driver, external driver or remote connection
    Endpoint(usize),
}

/// One element on the server ingress channel.
#[derive(Debug)]
pub(crate) struct Ingress {
    pub(crate) origin: Origin,
    pub(crate) msg: ProtocolMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointKind {
    Driver,
    External,
    Remote,
}

/// Device-name membership for an endpoint.
enum DeviceTable {
    Static(HashSet<String>),
    Learned(Arc<Mutex<HashSet<String>>>),
    LearnedVectors(Arc<Mutex<HashMap<String, HashSet<String>>>>),
}

impl DeviceTable {
    fn contains(&self, device: &str) -> bool {
        match self {
            DeviceTable::Static(set) => set.contains(device),
            DeviceTable::Learned(set) => set.lock().expect("device table lock").contains(device),
            DeviceTable::LearnedVectors(map) => {
                map.lock().expect("device table lock").contains_key(device)
            }
        }
    }
}

/// The router's view of one producer/consumer of driver-side traffic.
struct Endpoint {
    kind: EndpointKind,
    label: String,
    sender: mpsc::Sender<ProtocolMessage>,
    devices: DeviceTable,
    snoop: Arc<SnoopState>,
    connected: Option<Arc<AtomicBool>>,
}

impl Endpoint {
    fn contains(&self, device: &str) -> bool {
        self.devices.contains(device)
    }

    fn is_connected(&self) -> bool {
        self.connected
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(true)
    }
}

/// Router-owned device knowledge: ownership, BLOB vectors, cached
/// definitions for the keepalive pass.
#[derive(Default)]
pub(crate) struct Registry {
    owners: HashMap<String, usize>,
    blob_vectors: HashSet<(String, String)>,
    defs: HashMap<(String, String), ProtocolMessage>,
    def_order: Vec<(String, String)>,
}

impl Registry {
    fn owner(&self, device: &str) -> Option<usize> {
        self.owners.get(device).copied()
    }

    fn claim(&mut self, device: &str, endpoint: usize) {
        self.owners.insert(device.to_string(), endpoint);
    }

    pub(crate) fn device_known(&self, device: &str) -> bool {
        self.owners.contains_key(device)
    }

    pub(crate) fn is_blob_vector(&self, device: &str, name: &str) -> bool {
        self.blob_vectors
            .contains(&(device.to_string(), name.to_string()))
    }

    fn cache_def(&mut self, device: &str, name: &str, def: ProtocolMessage) {
        let key = (device.to_string(), name.to_string());
        if !self.defs.contains_key(&key) {
            self.def_order.push(key.clone());
        }
        self.defs.insert(key, def);
    }

    fn evict(&mut self, device: &str, name: Option<&str>) {
        match name {
            Some(name) => {
                let key = (device.to_string(), name.to_string());
                self.defs.remove(&key);
                self.def_order.retain(|k| *k != key);
                self.blob_vectors.remove(&key);
            }
            None => {
                self.defs.retain(|(dev, _), _| dev != device);
                self.def_order.retain(|(dev, _)| dev != device);
                self.blob_vectors.retain(|(dev, _)| dev != device);
            }
        }
    }

    fn cached_defs(&self) -> Vec<ProtocolMessage> {
        self.def_order
            .iter()
            .filter_map(|key| self.defs.get(key).cloned())
            .collect()
    }
}

/// One slot in the fixed client pool.
pub(crate) struct ClientSlot {
    id: usize,
    connected: AtomicBool,
    sender: Mutex<Option<mpsc::Sender<Arc<ProtocolMessage>>>>,
    gate: Mutex<BlobGate>,
    last_rx: Mutex<ActivityTimer>,
    last_tx: Mutex<ActivityTimer>,
}

impl ClientSlot {
    fn new(id: usize, idle: Duration) -> Arc<Self> {
        Arc::new(Self {
            id,
            connected: AtomicBool::new(false),
            sender: Mutex::new(None),
            gate: Mutex::new(BlobGate::new()),
            last_rx: Mutex::new(ActivityTimer::new(idle)),
            last_tx: Mutex::new(ActivityTimer::new(idle)),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Claim a free slot for a fresh connection.
    fn claim(&self, sender: mpsc::Sender<Arc<ProtocolMessage>>) -> bool {
        if self.connected.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.sender.lock().expect("slot sender lock") = Some(sender);
        *self.gate.lock().expect("slot gate lock") = BlobGate::new();
        self.reset_idle();
        true
    }

    /// Return the slot to Idle.
    fn release(&self) {
        *self.sender.lock().expect("slot sender lock") = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn sender(&self) -> Option<mpsc::Sender<Arc<ProtocolMessage>>> {
        self.sender.lock().expect("slot sender lock").clone()
    }

    fn touch_rx(&self) {
        self.last_rx.lock().expect("slot rx lock").update();
    }

    fn touch_tx(&self) {
        self.last_tx.lock().expect("slot tx lock").update();
    }

    /// Idle means nothing was sent and nothing was received for the
    /// whole window.
    fn is_idle(&self) -> bool {
        self.last_rx.lock().expect("slot rx lock").is_expired()
            && self.last_tx.lock().expect("slot tx lock").is_expired()
    }

    fn reset_idle(&self) {
        self.last_rx.lock().expect("slot rx lock").update();
        self.last_tx.lock().expect("slot tx lock").update();
    }
}

/// A handle for controlling a running server.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Shutdown,
    egress: mpsc::Sender<Arc<ProtocolMessage>>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl ServerHandle {
    /// Stop the whole server; every task terminates promptly.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// The bound listen address once the server is running; useful
    /// when the configuration asked for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("local addr lock")
    }

    /// Send a system-wide message to every connected client.
    pub async fn send_message(&self, text: &str, timestamp: Option<Timestamp>) -> Result<()> {
        let msg = ProtocolMessage::Message(MessageElement {
            device: None,
            timestamp: Some(timestamp.unwrap_or_default()),
            message: Some(text.to_string()),
        });
        queue_put(&self.egress, Arc::new(msg), &self.shutdown).await;
        Ok(())
    }
}

/// The INDI server.
pub struct Server {
    config: ServerConfig,
    shutdown: Shutdown,
    registry: Arc<Mutex<Registry>>,
    endpoints: Vec<Endpoint>,
    runners: Vec<DriverRunner>,
    driver_outboxes: Vec<(usize, mpsc::Receiver<ProtocolMessage>)>,
    externals: Vec<(usize, ExDriver, mpsc::Receiver<ProtocolMessage>)>,
    remotes: Vec<(usize, RemoteConnection, mpsc::Receiver<ProtocolMessage>)>,
    ingress_tx: mpsc::Sender<Ingress>,
    ingress_rx: Option<mpsc::Receiver<Ingress>>,
    egress_tx: mpsc::Sender<Arc<ProtocolMessage>>,
    egress_rx: Option<mpsc::Receiver<Arc<ProtocolMessage>>>,
    fatal: Arc<Mutex<Option<Error>>>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl Server {
    /// Build a server; `max_connections` outside 1..=10 is refused.
    pub fn new(config: ServerConfig) -> Result<Self> {
        if !(1..=10).contains(&config.max_connections) {
            return Err(Error::InvalidArgument(format!(
                "max_connections must be between 1 and 10, got {}",
                config.max_connections
            )));
        }
        let (ingress_tx, ingress_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (egress_tx, egress_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Ok(Self {
            config,
            shutdown: Shutdown::new(),
            registry: Arc::new(Mutex::new(Registry::default())),
            endpoints: Vec::new(),
            runners: Vec::new(),
            driver_outboxes: Vec::new(),
            externals: Vec::new(),
            remotes: Vec::new(),
            ingress_tx,
            ingress_rx: Some(ingress_rx),
            egress_tx,
            egress_rx: Some(egress_rx),
            fatal: Arc::new(Mutex::new(None)),
            local_addr: Arc::new(Mutex::new(None)),
        })
    }

    /// A control handle usable while the server runs.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
            egress: self.egress_tx.clone(),
            local_addr: Arc::clone(&self.local_addr),
        }
    }

    /// Register an in-process driver with its control logic. Device
    /// names must be unique across the whole server.
    pub fn add_driver(&mut self, mut driver: Driver, logic: Box<dyn DriverLogic>) -> Result<()> {
        let names = driver.device_names();
        {
            let registry = self.registry.lock().expect("registry lock");
            for name in &names {
                if registry.device_known(name) {
                    return Err(Error::DuplicateDevice(name.clone()));
                }
            }
        }
        let index = self.endpoints.len();
        let (inbox_tx, inbox_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbox_tx, outbox_rx) = mpsc::channel(CHANNEL_CAPACITY);
        driver.attach(outbox_tx, self.shutdown.clone());
        {
            let mut registry = self.registry.lock().expect("registry lock");
            for name in &names {
                registry.claim(name, index);
            }
            for device in driver.devices() {
                for vector in device.vectors() {
                    if vector.is_blob() {
                        registry
                            .blob_vectors
                            .insert((device.name().to_string(), vector.name().to_string()));
                    }
                }
                // seed the keepalive cache so an idle link can be
                // refreshed before any client asked for definitions
                for def in device.def_messages(None) {
                    if let (Some(dev), Some(name)) = (def.device(), def.name()) {
                        let (dev, name) = (dev.to_string(), name.to_string());
                        registry.cache_def(&dev, &name, def);
                    }
                }
            }
        }
        self.endpoints.push(Endpoint {
            kind: EndpointKind::Driver,
            label: format!("driver[{}]", names.join(",")),
            sender: inbox_tx,
            devices: DeviceTable::Static(names.into_iter().collect()),
            snoop: driver.snoop_state(),
            connected: None,
        });
        self.driver_outboxes.push((index, outbox_rx));
        self.runners.push(DriverRunner::new(driver, logic, inbox_rx));
        Ok(())
    }

    /// Register an external subprocess driver.
    pub fn add_exdriver(&mut self, config: ExDriverConfig) {
        let index = self.endpoints.len();
        let label = format!("exdriver[{}]", config.program.display());
        let (inbox_tx, inbox_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let exdriver = ExDriver::new(config);
        self.endpoints.push(Endpoint {
            kind: EndpointKind::External,
            label,
            sender: inbox_tx,
            devices: DeviceTable::LearnedVectors(exdriver.devices()),
            snoop: exdriver.snoop_state(),
            connected: Some(exdriver.alive_flag()),
        });
        self.externals.push((index, exdriver, inbox_rx));
    }

    /// Register a link to an upstream INDI server.
    pub fn add_remote(&mut self, config: RemoteConfig) {
        let index = self.endpoints.len();
        let label = format!("remote[{}:{}]", config.host, config.port);
        let (inbox_tx, inbox_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let remote = RemoteConnection::new(config);
        self.endpoints.push(Endpoint {
            kind: EndpointKind::Remote,
            label,
            sender: inbox_tx,
            devices: DeviceTable::Learned(remote.devices()),
            snoop: remote.snoop_state(),
            connected: Some(remote.connected_flag()),
        });
        self.remotes.push((index, remote, inbox_rx));
    }

    /// Run the server until shutdown. Returns the fatal error if a
    /// duplicate device stopped it.
    pub async fn run(mut self) -> Result<()> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let bound = listener.local_addr()?;
        *self.local_addr.lock().expect("local addr lock") = Some(bound);
        info!("listening on {bound}");

        let endpoints = Arc::new(std::mem::take(&mut self.endpoints));
        let slots: Arc<Vec<Arc<ClientSlot>>> = Arc::new(
            (0..self.config.max_connections)
                .map(|id| ClientSlot::new(id, self.config.keepalive_idle))
                .collect(),
        );

        let mut tasks = JoinSet::new();

        for runner in self.runners.drain(..) {
            tasks.spawn(runner.run(self.shutdown.clone()));
        }
        for (index, outbox_rx) in self.driver_outboxes.drain(..) {
            tasks.spawn(pump_outbox(
                outbox_rx,
                self.ingress_tx.clone(),
                Origin::Endpoint(index),
                self.shutdown.clone(),
            ));
        }
        for (index, exdriver, inbox_rx) in self.externals.drain(..) {
            tasks.spawn(exdriver.run(
                inbox_rx,
                self.ingress_tx.clone(),
                Origin::Endpoint(index),
                self.shutdown.clone(),
            ));
        }
        for (index, remote, inbox_rx) in self.remotes.drain(..) {
            tasks.spawn(remote.run(
                inbox_rx,
                self.ingress_tx.clone(),
                Origin::Endpoint(index),
                self.shutdown.clone(),
            ));
        }

        let dispatcher = Dispatcher {
            endpoints: Arc::clone(&endpoints),
            slots: Arc::clone(&slots),
            registry: Arc::clone(&self.registry),
            egress: self.egress_tx.clone(),
            shutdown: self.shutdown.clone(),
            fatal: Arc::clone(&self.fatal),
        };
        let ingress_rx = self.ingress_rx.take().expect("ingress receiver");
        tasks.spawn(dispatch_loop(dispatcher, ingress_rx));

        let egress_rx = self.egress_rx.take().expect("egress receiver");
        tasks.spawn(broadcast_loop(
            egress_rx,
            Arc::clone(&slots),
            self.shutdown.clone(),
        ));

        tasks.spawn(accept_loop(
            listener,
            Arc::clone(&slots),
            self.ingress_tx.clone(),
            Arc::clone(&self.registry),
            self.config.keepalive_idle,
            self.shutdown.clone(),
        ));

        self.shutdown.wait().await;
        info!("shutting down");

        // drain and join; anything wedged past the deadline is aborted
        let deadline = Instant::now() + Duration::from_secs(1);
        while !tasks.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, tasks.join_next()).await {
                Ok(Some(_)) => continue,
                _ => {
                    tasks.abort_all();
                    break;
                }
            }
        }
        while tasks.join_next().await.is_some() {}

        let fatal = self.fatal.lock().expect("fatal lock").take();
        match fatal {
            Some(e) => {
                error!("server stopped: {e}");
                Err(e)
            }
            None => Ok(()),
        }
    }
}

/// Forward one driver's outbox into the shared ingress channel.
async fn pump_outbox(
    mut outbox: mpsc::Receiver<ProtocolMessage>,
    ingress: mpsc::Sender<Ingress>,
    origin: Origin,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            msg = outbox.recv() => {
                let Some(msg) = msg else { break };
                if !queue_put(&ingress, Ingress { origin, msg }, &shutdown).await {
                    break;
                }
            }
        }
    }
}

/// Applies the routing rules to each ingress element.
struct Dispatcher {
    endpoints: Arc<Vec<Endpoint>>,
    slots: Arc<Vec<Arc<ClientSlot>>>,
    registry: Arc<Mutex<Registry>>,
    egress: mpsc::Sender<Arc<ProtocolMessage>>,
    shutdown: Shutdown,
    fatal: Arc<Mutex<Option<Error>>>,
}

impl Dispatcher {
    async fn route(&self, item: Ingress) {
        let Ingress { origin, msg } = item;
        match origin {
            Origin::Client(_) => self.route_from_client(msg).await,
            Origin::Endpoint(index) => self.route_from_endpoint(index, msg).await,
        }
    }

    /// The endpoint currently hosting `device`, judged on the live
    /// device tables so a reconnecting remote's set stays accurate.
    fn find_owner(&self, device: &str) -> Option<usize> {
        self.endpoints.iter().position(|ep| ep.contains(device))
    }

    async fn route_from_client(&self, msg: ProtocolMessage) {
        match &msg {
            // gates are client-reader local; nothing to forward
            ProtocolMessage::EnableBlob(_) => {}
            ProtocolMessage::GetProperties(_) => {
                let owner = msg.device().and_then(|dev| self.find_owner(dev));
                match owner {
                    Some(index) => self.send_to(index, msg).await,
                    None => {
                        // any endpoint might host it, remotes included
                        self.send_to_all(None, &msg).await;
                    }
                }
            }
            m if m.is_new() => {
                let Some(device) = m.device() else { return };
                match self.find_owner(device) {
                    Some(index) => self.send_to(index, msg).await,
                    None => debug!("dropping {} for unowned device {device}", msg.tag()),
                }
            }
            _ => {
                // def/set/message/delProperty arriving on a client
                // link: deliver to whoever snoops it, never back to
                // other clients
                self.send_to_snoopers(None, &msg).await;
            }
        }
    }

    async fn route_from_endpoint(&self, index: usize, msg: ProtocolMessage) {
        let label = &self.endpoints[index].label;
        if msg.is_new() {
            error!("{label} transmitted invalid tag {}", msg.tag());
            return;
        }
        if let ProtocolMessage::EnableBlob(_) = msg {
            return;
        }
        if msg.is_def() && self.learn_definition(index, &msg).is_err() {
            return; // fatal path already triggered
        }
        if let ProtocolMessage::DelProperty(del) = &msg {
            self.registry
                .lock()
                .expect("registry lock")
                .evict(&del.device, del.name.as_deref());
        }
        if let ProtocolMessage::GetProperties(_) = &msg {
            // the endpoint is snooping; target the owner if one is
            // known, otherwise ask everyone else
            let owner = msg
                .device()
                .and_then(|dev| self.find_owner(dev))
                .filter(|owner| *owner != index);
            match owner {
                Some(owner) => self.send_to(owner, msg).await,
                None => self.send_to_all(Some(index), &msg).await,
            }
            return;
        }
        // def/set/message/delProperty: snoop fan-out, then clients
        self.send_to_snoopers(Some(index), &msg).await;
        if self.slots.iter().any(|slot| slot.is_connected()) {
            queue_put(&self.egress, Arc::new(msg), &self.shutdown).await;
        }
    }

    /// Claim the device or stop the server on a duplicate definition.
    fn learn_definition(&self, index: usize, msg: &ProtocolMessage) -> Result<()> {
        let (Some(device), Some(name)) = (msg.device(), msg.name()) else {
            return Ok(());
        };
        let mut registry = self.registry.lock().expect("registry lock");
        match registry.owner(device) {
            None => registry.claim(device, index),
            Some(owner) if owner != index => {
                let claimant = &self.endpoints[index];
                let incumbent = &self.endpoints[owner];
                if claimant.kind != EndpointKind::Remote && incumbent.kind != EndpointKind::Remote {
                    error!(
                        "duplicate device {device}: defined by {} and {}",
                        incumbent.label, claimant.label
                    );
                    *self.fatal.lock().expect("fatal lock") =
                        Some(Error::DuplicateDevice(device.to_string()));
                    self.shutdown.trigger();
                    return Err(Error::DuplicateDevice(device.to_string()));
                }
            }
            _ => {}
        }
        if let ProtocolMessage::DefBlob(_) = msg {
            registry
                .blob_vectors
                .insert((device.to_string(), name.to_string()));
        }
        registry.cache_def(device, name, msg.clone());
        Ok(())
    }

    async fn send_to(&self, index: usize, msg: ProtocolMessage) {
        let endpoint = &self.endpoints[index];
        if !endpoint.is_connected() {
            return;
        }
        if !queue_put(&endpoint.sender, msg, &self.shutdown).await {
            debug!("{} inbox closed", endpoint.label);
        }
    }

    async fn send_to_all(&self, except: Option<usize>, msg: &ProtocolMessage) {
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if Some(i) == except || !endpoint.is_connected() {
                continue;
            }
            if !queue_put(&endpoint.sender, msg.clone(), &self.shutdown).await {
                debug!("{} inbox closed", endpoint.label);
            }
        }
    }

    async fn send_to_snoopers(&self, except: Option<usize>, msg: &ProtocolMessage) {
        let device = msg.device().map(str::to_string);
        let name = msg.name().map(str::to_string);
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if Some(i) == except || !endpoint.is_connected() {
                continue;
            }
            if endpoint.snoop.matches(device.as_deref(), name.as_deref())
                && !queue_put(&endpoint.sender, msg.clone(), &self.shutdown).await
            {
                debug!("{} inbox closed", endpoint.label);
            }
        }
    }
}

async fn dispatch_loop(dispatcher: Dispatcher, mut ingress: mpsc::Receiver<Ingress>) {
    let mut stop = dispatcher.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            item = ingress.recv() => {
                let Some(item) = item else { break };
                dispatcher.route(item).await;
            }
        }
    }
}

/// Drain the egress channel into every connected client slot.
async fn broadcast_loop(
    mut egress: mpsc::Receiver<Arc<ProtocolMessage>>,
    slots: Arc<Vec<Arc<ClientSlot>>>,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            msg = egress.recv() => {
                let Some(msg) = msg else { break };
                for slot in slots.iter() {
                    if !slot.is_connected() {
                        continue;
                    }
                    if let Some(sender) = slot.sender() {
                        queue_put(&sender, Arc::clone(&msg), &shutdown).await;
                    }
                }
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    slots: Arc<Vec<Arc<ClientSlot>>>,
    ingress: mpsc::Sender<Ingress>,
    registry: Arc<Mutex<Registry>>,
    keepalive_idle: Duration,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            accepted = listener.accept() => {
                let Ok((socket, addr)) = accepted else { continue };
                let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
                let Some(slot) = slots.iter().find(|slot| slot.claim(sender.clone())) else {
                    // pool exhausted: refuse by closing immediately
                    info!("refusing connection from {addr}: all slots busy");
                    drop(socket);
                    continue;
                };
                info!("connection received from {addr}");
                tokio::spawn(handle_client(
                    Arc::clone(slot),
                    socket,
                    addr,
                    receiver,
                    ingress.clone(),
                    Arc::clone(&registry),
                    keepalive_idle,
                    shutdown.clone(),
                ));
            }
        }
    }
}

/// One client connection: reader, writer and liveness tasks bound to
/// a slot. Any failure returns the slot to Idle without disturbing the
/// rest of the server.
#[allow(clippy::too_many_arguments)]
async fn handle_client(
    slot: Arc<ClientSlot>,
    socket: TcpStream,
    addr: SocketAddr,
    receiver: mpsc::Receiver<Arc<ProtocolMessage>>,
    ingress: mpsc::Sender<Ingress>,
    registry: Arc<Mutex<Registry>>,
    keepalive_idle: Duration,
    shutdown: Shutdown,
) {
    let (read_half, write_half) = socket.into_split();

    let mut reader = tokio::spawn(client_reader(
        Arc::clone(&slot),
        read_half,
        ingress,
        Arc::clone(&registry),
        shutdown.clone(),
    ));
    let mut writer = tokio::spawn(client_writer(Arc::clone(&slot), write_half, receiver));
    let mut keepalive = tokio::spawn(client_keepalive(
        Arc::clone(&slot),
        registry,
        keepalive_idle,
        shutdown.clone(),
    ));

    // the first task to finish (EOF, write error, shutdown) tears the
    // whole connection down
    tokio::select! {
        _ = shutdown.wait() => {}
        _ = &mut reader => {}
        _ = &mut writer => {}
        _ = &mut keepalive => {}
    }
    slot.release();
    reader.abort();
    writer.abort();
    keepalive.abort();
    info!("connection from {addr} closed");
}

async fn client_reader(
    slot: Arc<ClientSlot>,
    read_half: tokio::net::tcp::OwnedReadHalf,
    ingress: mpsc::Sender<Ingress>,
    registry: Arc<Mutex<Registry>>,
    shutdown: Shutdown,
) {
    let mut reader = MessageReader::new(read_half);
    loop {
        match reader.next_message().await {
            Ok(Some(msg)) => {
                slot.touch_rx();
                if let ProtocolMessage::EnableBlob(request) = &msg {
                    apply_enable_blob(&slot, &registry, request);
                    continue;
                }
                let item = Ingress {
                    origin: Origin::Client(slot.id),
                    msg,
                };
                if !queue_put(&ingress, item, &shutdown).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("client read failed: {e}");
                break;
            }
        }
    }
}

fn apply_enable_blob(slot: &ClientSlot, registry: &Mutex<Registry>, request: &EnableBlob) {
    let (device_known, known_blob_vector) = {
        let registry = registry.lock().expect("registry lock");
        let known = registry.device_known(&request.device);
        let blob = request
            .name
            .as_deref()
            .map(|name| registry.is_blob_vector(&request.device, name))
            .unwrap_or(false);
        (known, blob)
    };
    slot.gate
        .lock()
        .expect("slot gate lock")
        .apply(request, device_known, known_blob_vector);
}

async fn client_writer(
    slot: Arc<ClientSlot>,
    mut write_half: OwnedWriteHalf,
    mut receiver: mpsc::Receiver<Arc<ProtocolMessage>>,
) {
    while let Some(msg) = receiver.recv().await {
        let allowed = slot.gate.lock().expect("slot gate lock").allowed(&msg);
        if !allowed {
            continue;
        }
        if let Err(e) = write_message(&mut write_half, &msg).await {
            warn!("client write failed: {e}");
            break;
        }
        slot.touch_tx();
    }
}

/// Refresh an idle link with every cached definition; a dead socket
/// surfaces as a write error in the writer task.
async fn client_keepalive(
    slot: Arc<ClientSlot>,
    registry: Arc<Mutex<Registry>>,
    keepalive_idle: Duration,
    shutdown: Shutdown,
) {
    let period = keepalive_idle
        .min(Duration::from_secs(5))
        .max(Duration::from_millis(100));
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        if shutdown.is_stopped() || !slot.is_connected() {
            break;
        }
        if !slot.is_idle() {
            continue;
        }
        slot.reset_idle();
        let defs = registry.lock().expect("registry lock").cached_defs();
        debug!(
            "keepalive: refreshing idle client with {} definitions",
            defs.len()
        );
        let Some(sender) = slot.sender() else { break };
        for def in defs {
            if !queue_put(&sender, Arc::new(def), &shutdown).await {
                return;
            }
        }
    }
}
