//! Cached status data for discovery pings and the query sub-protocol.

use protocol::ProtocolVersion;

pub const ENGINE_NAME: &str = "Chunkwire";

/// Two-byte prefix identifying a query datagram.
pub const QUERY_MAGIC: [u8; 2] = [0xfe, 0xfd];
pub const QUERY_HANDSHAKE: u8 = 0x09;
pub const QUERY_STATISTICS: u8 = 0x00;

/// Snapshot of everything discovery clients can ask about.
///
/// Rebuilt by the tick loop every `announce_interval` ticks and published to
/// the transport, so answering a ping never touches live session state.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnounceData {
    pub engine: String,
    pub server_name: String,
    pub motd: String,
    pub protocol: ProtocolVersion,
    pub game_version: String,
    pub online_players: usize,
    pub max_players: usize,
    pub player_names: Vec<String>,
    pub world_name: String,
    pub address: String,
    pub port: u16,
    pub server_id: u64,
    /// Tick at which this snapshot was generated.
    pub generated_at: u64,
}

impl Default for AnnounceData {
    fn default() -> Self {
        Self {
            engine: ENGINE_NAME.to_string(),
            server_name: String::new(),
            motd: String::new(),
            protocol: ProtocolVersion::LATEST,
            game_version: String::new(),
            online_players: 0,
            max_players: 0,
            player_names: Vec::new(),
            world_name: String::new(),
            address: String::new(),
            port: 0,
            server_id: 0,
            generated_at: 0,
        }
    }
}

impl AnnounceData {
    /// Discovery line returned in unconnected pongs.
    pub fn pong_string(&self) -> String {
        format!(
            "MCPE;{};{};{};{};{};{};{};Creative;",
            self.motd,
            self.protocol,
            self.game_version,
            self.online_players,
            self.max_players,
            self.server_id,
            self.engine
        )
    }

    /// Full statistics body: null-terminated key/value pairs followed by the
    /// player name section.
    pub fn encode_query(&self) -> Vec<u8> {
        let online = self.online_players.to_string();
        let max = self.max_players.to_string();
        let port = self.port.to_string();
        let pairs: [(&str, &str); 12] = [
            ("hostname", self.motd.as_str()),
            ("gametype", "SMP"),
            ("game_id", "MINECRAFTPE"),
            ("version", self.game_version.as_str()),
            ("server_engine", self.engine.as_str()),
            ("plugins", ""),
            ("map", self.world_name.as_str()),
            ("numplayers", online.as_str()),
            ("maxplayers", max.as_str()),
            ("whitelist", "off"),
            ("hostip", self.address.as_str()),
            ("hostport", port.as_str()),
        ];

        let mut out = Vec::with_capacity(256);
        for (key, value) in pairs {
            push_terminated(&mut out, key);
            push_terminated(&mut out, value);
        }
        out.push(0x00);
        out.push(0x01);
        push_terminated(&mut out, "player_");
        out.push(0x00);
        for name in &self.player_names {
            push_terminated(&mut out, name);
        }
        out.push(0x00);
        out
    }
}

fn push_terminated(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(text.as_bytes());
    out.push(0x00);
}

pub fn is_query(datagram: &[u8]) -> bool {
    datagram.len() >= 2 && datagram[..2] == QUERY_MAGIC
}

/// A parsed query request: magic, type byte, 4-byte session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRequest {
    pub kind: u8,
    pub session_id: [u8; 4],
}

impl QueryRequest {
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        if !is_query(datagram) || datagram.len() < 7 {
            return None;
        }
        let kind = datagram[2];
        if kind != QUERY_HANDSHAKE && kind != QUERY_STATISTICS {
            return None;
        }
        let mut session_id = [0u8; 4];
        session_id.copy_from_slice(&datagram[3..7]);
        Some(Self { kind, session_id })
    }

    /// Builds the reply datagram. Handshakes receive a fixed challenge token;
    /// statistics requests receive the full snapshot.
    pub fn respond(&self, data: &AnnounceData) -> Vec<u8> {
        let mut out = vec![self.kind];
        out.extend_from_slice(&self.session_id);
        match self.kind {
            QUERY_HANDSHAKE => push_terminated(&mut out, "0"),
            _ => {
                out.extend_from_slice(b"splitnum\x00\x80\x00");
                out.extend_from_slice(&data.encode_query());
            }
        }
        out
    }
}
