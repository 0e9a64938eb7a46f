//! Protocol revisions understood by the server.

use std::fmt;

/// Protocol number negotiated once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion(pub u32);

impl ProtocolVersion {
    pub const V160: ProtocolVersion = ProtocolVersion(160);
    pub const V200: ProtocolVersion = ProtocolVersion(200);
    pub const V201: ProtocolVersion = ProtocolVersion(201);
    pub const V220: ProtocolVersion = ProtocolVersion(220);

    /// Newest revision the server speaks; advertised in discovery data.
    pub const LATEST: ProtocolVersion = ProtocolVersion::V220;
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Layout switches that differ between revisions.
///
/// Packets consult these while encoding and decoding; a packet instance
/// never carries them itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features {
    /// Entity rotations carry a separate head yaw.
    pub head_yaw: bool,
    /// AddEntity ends with an entity link count.
    pub entity_links: bool,
}

/// Static description of one protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: ProtocolVersion,
    /// Client game version, e.g. "1.2.10".
    pub game_version: &'static str,
    pub features: Features,
}

impl VersionInfo {
    pub fn new(version: ProtocolVersion, game_version: &'static str, features: Features) -> Self {
        Self {
            version,
            game_version,
            features,
        }
    }
}
