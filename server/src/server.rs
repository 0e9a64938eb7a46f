//! The server context: owns sessions, levels, registries and the transport,
//! and drives them from one loop.
//!
//! Every state change happens on `&mut self` from either a transport event
//! or a tick, so sessions and dimensions have a single writer. The only data
//! read elsewhere is the announce snapshot, published through a watch channel.

use crate::chunk::ChunkIndex;
use crate::config::ServerConfig;
use crate::crypto::ServerKeys;
use crate::dimension::{chunks_around, DimensionId};
use crate::error::{ServerError, ServerResult};
use crate::level::{Level, LevelManager};
use crate::network::{ConnectionHandle, Transport, TransportEvent};
use crate::session::{CommandSender, EncryptionState, Location, Session, SessionState};
use crate::session_manager::{ConnectOutcome, SessionManager};
use crate::status::{self, AnnounceData, QueryRequest, ENGINE_NAME};
use crate::tick::{tick_interval, TickSchedule};
use log::{debug, error, info, warn};
use protocol::{
    split_batch, AddEntity, Attribute, AttributeMap, CodecError, Disconnect, EntityDataMap,
    EntityDataValue, GamePacket, Login, MovePlayer, PacketRegistry, PlayStatus, PlayerList,
    PlayerListEntry, ProtocolRegistry, ProtocolVersion, RemoveEntity, Rotation,
    ServerToClientHandshake, Text, Vector3,
};
use std::fmt::Write as _;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Network type id of a player entity.
pub const PLAYER_ENTITY_TYPE: u32 = 63;
/// Entity data key holding the name tag.
const DATA_NAMETAG: u32 = 4;

/// Picks the session's registry, or the newest one before negotiation.
fn registry_for(
    protocols: &ProtocolRegistry,
    version: Option<ProtocolVersion>,
) -> Option<&PacketRegistry> {
    let version = version.or_else(|| protocols.latest())?;
    protocols.registry(version).ok()
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn player_entry(session: &Session) -> PlayerListEntry {
    PlayerListEntry {
        unique_id: session.unique_id(),
        name: session.display_name().to_string(),
    }
}

fn player_entity(session: &Session, location: &Location) -> AddEntity {
    let mut attributes = AttributeMap::new();
    attributes.insert(
        "minecraft:health".to_string(),
        Attribute::new(0.0, 20.0, 20.0, 20.0),
    );
    attributes.insert(
        "minecraft:movement".to_string(),
        Attribute::new(0.0, f32::MAX, 0.1, 0.1),
    );
    let mut entity_data = EntityDataMap::new();
    entity_data.insert(
        DATA_NAMETAG,
        EntityDataValue::String(session.display_name().to_string()),
    );

    AddEntity {
        unique_id: session.unique_id(),
        runtime_id: session.runtime_id(),
        entity_type: PLAYER_ENTITY_TYPE,
        position: location.position,
        motion: Vector3::ZERO,
        rotation: location.rotation,
        attributes,
        entity_data,
        links: Vec::new(),
    }
}

fn same_dimension(a: &Location, b: &Location) -> bool {
    a.level == b.level && a.dimension == b.dimension
}

pub struct Server<T: Transport> {
    config: ServerConfig,
    protocols: ProtocolRegistry,
    keys: Option<Arc<ServerKeys>>,
    sessions: SessionManager,
    levels: LevelManager,
    schedule: TickSchedule,
    running: bool,
    server_id: u64,
    announce: AnnounceData,
    announce_tx: watch::Sender<AnnounceData>,
    transport: T,
}

impl<T: Transport> Server<T> {
    /// Builds the managers and registries and, when encryption is enabled,
    /// the server key material. Nothing touches the network yet.
    pub fn new(config: ServerConfig, transport: T) -> ServerResult<Self> {
        config.validate()?;
        let protocols = ProtocolRegistry::with_defaults()?;

        let keys = if config.use_encryption {
            let keys = ServerKeys::generate()?;
            info!("Generated server key pair for encrypted sessions");
            Some(Arc::new(keys))
        } else {
            None
        };

        let sessions = SessionManager::new(config.max_players);
        let schedule = TickSchedule::new(config.announce_interval);
        let (announce_tx, _) = watch::channel(AnnounceData::default());

        let mut server = Self {
            config,
            protocols,
            keys,
            sessions,
            levels: LevelManager::new(),
            schedule,
            running: false,
            server_id: rand::random(),
            announce: AnnounceData::default(),
            announce_tx,
            transport,
        };
        server.refresh_announce();
        Ok(server)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    pub fn keys(&self) -> Option<&ServerKeys> {
        self.keys.as_deref()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    pub fn levels(&self) -> &LevelManager {
        &self.levels
    }

    pub fn levels_mut(&mut self) -> &mut LevelManager {
        &mut self.levels
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_tick(&self) -> u64 {
        self.schedule.current()
    }

    pub fn announce(&self) -> &AnnounceData {
        &self.announce
    }

    pub fn subscribe_announce(&self) -> watch::Receiver<AnnounceData> {
        self.announce_tx.subscribe()
    }

    /// Loads the default level and starts the transport.
    pub fn start(&mut self) -> ServerResult<()> {
        if self.running {
            return Err(ServerError::AlreadyStarted);
        }

        let name = self.config.default_level.clone();
        if self.levels.level(&name).is_none() {
            let mut level = Level::new(name.as_str());
            level.create_dimension(DimensionId::Overworld, self.config.data_dir.as_deref())?;
            self.levels.add_level(level);
        }
        self.levels.set_default_level(&name);

        self.transport.start(self.announce_tx.subscribe())?;
        self.running = true;
        self.refresh_announce();

        info!(
            "{} started for protocols {:?} (encryption {})",
            ENGINE_NAME,
            self.protocols.versions().map(|v| v.0).collect::<Vec<_>>(),
            if self.keys.is_some() { "on" } else { "off" }
        );
        Ok(())
    }

    /// Disconnects every session, saves chunks and stops the transport.
    pub fn shutdown(&mut self) -> ServerResult<()> {
        if !self.running {
            return Ok(());
        }
        info!("Server shutting down");

        let handles: Vec<ConnectionHandle> = self.sessions.all().map(Session::handle).collect();
        for handle in handles {
            self.kick(handle, "Server closed");
        }

        let saved = self.levels.save_all()?;
        debug!("Saved {} chunks", saved);

        self.transport.stop();
        self.running = false;
        Ok(())
    }

    /// Runs until Ctrl+C or until the transport closes its event channel.
    pub async fn run(&mut self, events: mpsc::UnboundedReceiver<TransportEvent>) -> ServerResult<()> {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                Err(e) => {
                    error!("Unable to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        self.run_until(events, ctrl_c).await
    }

    /// Main server loop: transport events and ticks until `shutdown`
    /// completes or the event channel closes.
    pub async fn run_until<F>(
        &mut self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: F,
    ) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        if !self.running {
            self.start()?;
        }

        let mut timer = tick_interval(self.config.tick_duration());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("Transport closed");
                        break;
                    }
                },
                _ = timer.tick() => self.tick(),
                _ = &mut shutdown => break,
            }
        }

        self.shutdown()
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { handle, addr } => self.on_connect(handle, Some(addr)),
            TransportEvent::Disconnected { handle } => self.on_disconnect(handle),
            TransportEvent::Packet { handle, bytes } => self.handle_packet(handle, &bytes),
            TransportEvent::Raw { bytes, addr } => self.handle_raw(&bytes, addr),
        }
    }

    /// One server tick: periodic announce refresh, session maintenance and
    /// dimension flushes, in that order. Does nothing unless running.
    ///
    /// Maintenance covers Active sessions plus Handshaking ones that still
    /// hold queued replies; see [`Session::needs_tick`].
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        let plan = self.schedule.advance();

        if plan.refresh_announce {
            self.refresh_announce();
        }

        for session in self.sessions.all_mut().filter(|s| s.needs_tick()) {
            if let Some(registry) = registry_for(&self.protocols, session.version()) {
                session.tick(plan.tick, registry, &self.transport);
            }
        }

        self.levels.flush(&self.protocols, &self.transport);
    }

    fn generate_announce(&self) -> AnnounceData {
        let latest = self.protocols.latest().unwrap_or(ProtocolVersion::LATEST);
        let game_version = self
            .protocols
            .registry(latest)
            .map(|registry| registry.info().game_version.to_string())
            .unwrap_or_default();

        AnnounceData {
            engine: ENGINE_NAME.to_string(),
            server_name: self.config.server_name.clone(),
            motd: self.config.motd.clone(),
            protocol: latest,
            game_version,
            online_players: self.sessions.active_count(),
            max_players: self.config.max_players,
            player_names: self.sessions.names(),
            world_name: self
                .levels
                .default_level_name()
                .unwrap_or(self.config.default_level.as_str())
                .to_string(),
            address: self.config.server_ip.clone(),
            port: self.config.server_port,
            server_id: self.server_id,
            generated_at: self.schedule.current(),
        }
    }

    fn refresh_announce(&mut self) {
        self.announce = self.generate_announce();
        self.announce_tx.send_replace(self.announce.clone());
    }

    pub fn on_connect(&mut self, handle: ConnectionHandle, addr: Option<SocketAddr>) {
        if self.sessions.on_connect(handle, addr) != ConnectOutcome::Full {
            return;
        }
        if let Some(registry) = registry_for(&self.protocols, None) {
            let reply = protocol::Batch::from(vec![GamePacket::Disconnect(Disconnect::new(
                "Server is full",
            ))]);
            match reply.encode(registry) {
                Ok(bytes) => self.transport.send_batch(handle, bytes),
                Err(e) => warn!("Failed to encode full-server reply: {}", e),
            }
        }
        self.transport.close(handle);
    }

    /// Tears down the session bound to `handle`, if any. Spawned sessions
    /// are announced as leaving; others disappear silently.
    pub fn on_disconnect(&mut self, handle: ConnectionHandle) {
        let Some(session) = self.sessions.on_disconnect(handle) else {
            return;
        };
        self.levels.remove_session(handle);

        let Some(location) = session.location() else {
            return;
        };

        let remove_list = PlayerList::remove([session.unique_id()]);
        let remove_entity = RemoveEntity {
            unique_id: session.unique_id(),
        };
        for other in self.sessions.active_mut() {
            other.queue(remove_list.clone());
            if other.location().is_some_and(|l| same_dimension(l, location)) {
                other.queue(remove_entity.clone());
            }
        }

        self.broadcast_message(&format!("{} has left the server", session.display_name()));
    }

    /// Handles an unframed datagram: query requests when enabled, anything
    /// else is logged.
    pub fn handle_raw(&mut self, bytes: &[u8], addr: SocketAddr) {
        if status::is_query(bytes) {
            if !self.config.allow_query {
                return;
            }
            match QueryRequest::parse(bytes) {
                Some(request) => self
                    .transport
                    .send_to(addr, request.respond(&self.announce)),
                None => debug!("Malformed query from {}", addr),
            }
            return;
        }
        debug!("Unhandled raw packet from {}: {}", addr, to_hex(bytes));
    }

    /// Decodes one batch from a connection and dispatches each packet.
    ///
    /// Decode failures drop only the offending packet; the session survives.
    pub fn handle_packet(&mut self, handle: ConnectionHandle, datagram: &[u8]) {
        if self.sessions.lookup(handle).is_none() {
            debug!("Packet from unknown connection {}", handle);
            return;
        }

        let payloads = match split_batch(datagram) {
            Ok(payloads) => payloads,
            Err(e) => {
                warn!("Malformed batch from {}: {}", handle, e);
                return;
            }
        };

        for payload in payloads {
            let Some(session) = self.sessions.lookup(handle) else {
                return;
            };
            if session.state() == SessionState::Disconnected {
                return;
            }
            let (id, version) = (session.id(), session.version());

            let Some(version) = version else {
                self.handle_login_payload(handle, &payload);
                continue;
            };

            let decoded = self
                .protocols
                .registry(version)
                .and_then(|registry| registry.decode(&payload));
            match decoded {
                Ok(packet) => self.dispatch(handle, packet),
                Err(e @ CodecError::UnknownPacket { .. }) => {
                    info!("Session {}: {}", id, e);
                }
                Err(e) => warn!("Failed to decode packet from session {}: {}", id, e),
            }
        }
    }

    fn handle_login_payload(&mut self, handle: ConnectionHandle, payload: &[u8]) {
        let requested = match ProtocolRegistry::peek_login_protocol(payload) {
            Ok(requested) => requested,
            Err(e) => {
                warn!("Expected login from {}: {}", handle, e);
                return;
            }
        };

        if !self.protocols.contains(requested) {
            self.reject_version(handle, requested);
            return;
        }

        let decoded = self
            .protocols
            .registry(requested)
            .and_then(|registry| registry.decode(payload));
        match decoded {
            Ok(GamePacket::Login(login)) => self.handle_login(handle, requested, login),
            Ok(other) => warn!("Expected login from {}, got {}", handle, other.kind()),
            Err(e) => warn!("Failed to decode login from {}: {}", handle, e),
        }
    }

    fn reject_version(&mut self, handle: ConnectionHandle, requested: ProtocolVersion) {
        let too_old = self
            .protocols
            .oldest()
            .is_some_and(|oldest| requested < oldest);
        let (status, reason) = if too_old {
            (PlayStatus::LOGIN_FAILED_CLIENT, "Outdated client")
        } else {
            (PlayStatus::LOGIN_FAILED_SERVER, "Outdated server")
        };
        info!("Rejecting protocol {} from {}: {}", requested, handle, reason);

        if let Some(session) = self.sessions.lookup_mut(handle) {
            session.queue(PlayStatus::new(status));
        }
        self.kick(handle, reason);
    }

    fn handle_login(&mut self, handle: ConnectionHandle, version: ProtocolVersion, login: Login) {
        if login.display_name.trim().is_empty() {
            self.kick(handle, "Invalid name");
            return;
        }

        let keys = self.keys.clone();
        let Some(session) = self.sessions.lookup_mut(handle) else {
            return;
        };
        if !session.begin_handshake(version, &login.display_name) {
            debug!("Ignoring repeated login from {}", handle);
            return;
        }
        info!(
            "{} logged in with protocol {} ({})",
            login.display_name, version, handle
        );

        let Some(keys) = keys else {
            self.activate(handle);
            return;
        };

        match keys.derive_session_key(&login.client_key) {
            Ok(key) => {
                session.set_encryption(EncryptionState::Pending { key });
                session.queue(ServerToClientHandshake {
                    public_key: keys.public_key().to_vec(),
                    token: keys.token().to_vec(),
                });
            }
            Err(e) => {
                warn!("Login from {} failed: {}", handle, e);
                self.kick(handle, "Invalid client key");
            }
        }
    }

    fn dispatch(&mut self, handle: ConnectionHandle, packet: GamePacket) {
        let Some(session) = self.sessions.lookup(handle) else {
            return;
        };
        let (id, state) = (session.id(), session.state());
        let active = state == SessionState::Active;

        match packet {
            GamePacket::ClientToServerHandshake(_) => {
                let established = self
                    .sessions
                    .lookup_mut(handle)
                    .is_some_and(Session::establish_encryption);
                if established {
                    info!("Encryption established for session {}", id);
                    self.activate(handle);
                } else {
                    debug!("Unexpected handshake from session {}", id);
                }
            }
            GamePacket::Text(text) if active => self.handle_chat(handle, &text.message),
            GamePacket::MovePlayer(movement) if active => self.handle_move(handle, movement),
            GamePacket::Disconnect(_) => self.transport.close(handle),
            other => debug!(
                "Ignoring {} from session {} in state {:?}",
                other.kind(),
                id,
                state
            ),
        }
    }

    /// Spawns a handshaken session into the default dimension.
    fn activate(&mut self, handle: ConnectionHandle) {
        let spawn_point = self.levels.default_level().map(|level| {
            (
                level.name().to_string(),
                level.default_dimension(),
                level.spawn(),
            )
        });
        let Some((level, dimension, position)) = spawn_point else {
            warn!("No default level to spawn {} into", handle);
            self.kick(handle, "No world loaded");
            return;
        };

        let Some(session) = self.sessions.lookup_mut(handle) else {
            return;
        };
        if !session.activate() {
            return;
        }
        let location = Location {
            level,
            dimension,
            position,
            rotation: Rotation::with_head_yaw(0.0, 0.0, 0.0),
        };
        session.spawn(location.clone());
        session.queue(PlayStatus::new(PlayStatus::LOGIN_SUCCESS));
        let newcomer_entry = player_entry(session);
        let newcomer_entity = player_entity(session, &location);
        let name = session.display_name().to_string();

        self.update_interest(handle);

        let mut entries = vec![newcomer_entry.clone()];
        let mut entities = Vec::new();
        for other in self.sessions.active_mut() {
            if other.handle() == handle {
                continue;
            }
            other.queue(PlayerList::add(vec![newcomer_entry.clone()]));
            entries.push(player_entry(other));
            if let Some(other_location) = other.location() {
                if same_dimension(other_location, &location) {
                    entities.push(player_entity(other, other_location));
                    other.queue(newcomer_entity.clone());
                }
            }
        }

        if let Some(session) = self.sessions.lookup_mut(handle) {
            session.queue(PlayerList::add(entries));
            for entity in entities {
                session.queue(entity);
            }
        }

        self.broadcast_message(&format!("{} joined the game", name));

        if let Some(session) = self.sessions.lookup_mut(handle) {
            session.queue(PlayStatus::new(PlayStatus::PLAYER_SPAWN));
        }
    }

    /// Recomputes which chunks `handle` watches from its current position.
    fn update_interest(&mut self, handle: ConnectionHandle) {
        let Some(session) = self.sessions.lookup_mut(handle) else {
            return;
        };
        let (Some(location), Some(version)) = (session.location().cloned(), session.version())
        else {
            return;
        };

        let wanted = chunks_around(location.chunk(), self.config.view_radius);
        let (entered, left) = session.replace_interest(wanted);

        if let Some(dimension) = self.levels.dimension_mut(&location.level, location.dimension) {
            for index in entered {
                let (x, z) = index.unpack();
                dimension.add_interest(x, z, handle, version);
            }
            for index in left {
                let (x, z) = index.unpack();
                dimension.remove_interest(x, z, handle);
            }
        }
    }

    fn handle_move(&mut self, handle: ConnectionHandle, movement: MovePlayer) {
        let Some(session) = self.sessions.lookup_mut(handle) else {
            return;
        };
        let crossed = session.move_to(movement.position, movement.rotation);
        let runtime_id = session.runtime_id();
        let Some(location) = session.location().cloned() else {
            return;
        };

        if crossed {
            self.update_interest(handle);
        }

        let (cx, cz) = location.chunk();
        let chunk = ChunkIndex::pack(cx, cz);
        let relay = MovePlayer {
            runtime_id,
            ..movement
        };
        for other in self.sessions.active_mut() {
            if other.handle() == handle || !other.interest().contains(&chunk) {
                continue;
            }
            if other.location().is_some_and(|l| same_dimension(l, &location)) {
                other.queue(relay.clone());
            }
        }
    }

    fn handle_chat(&mut self, handle: ConnectionHandle, message: &str) {
        let Some(session) = self.sessions.lookup(handle) else {
            return;
        };
        let source = session.display_name().to_string();
        info!("<{}> {}", source, message);

        let line = Text::chat(source, message);
        for session in self.sessions.active_mut() {
            session.queue(line.clone());
        }
    }

    /// Queues a disconnect message, flushes the session and asks the
    /// transport to close the connection. The session ignores further
    /// packets until the transport reports the closure.
    pub fn kick(&mut self, handle: ConnectionHandle, reason: &str) {
        if let Some(session) = self.sessions.lookup_mut(handle) {
            session.queue(Disconnect::new(reason));
            if let Some(registry) = registry_for(&self.protocols, session.version()) {
                session.flush(registry, &self.transport);
            }
            session.mark_disconnected();
        }
        self.transport.close(handle);
    }

    /// Sends a message to every active session and the console.
    pub fn broadcast_message(&mut self, message: &str) {
        for session in self.sessions.active_mut() {
            session.send_message(message);
        }
        self.send_message(message);
    }

    /// Sends a message to the given sessions and the console.
    pub fn broadcast_message_to(&mut self, receivers: &[ConnectionHandle], message: &str) {
        for handle in receivers {
            if let Some(session) = self.sessions.lookup_mut(*handle) {
                session.send_message(message);
            }
        }
        self.send_message(message);
    }
}

/// The console: logs messages and holds every permission.
impl<T: Transport> CommandSender for Server<T> {
    fn send_message(&mut self, message: &str) {
        info!("{}", message);
    }

    fn has_permission(&self, _permission: &str) -> bool {
        true
    }
}
