//! # Chunkwire Server Library
//!
//! Server core for a versioned block-world game protocol. It accepts client
//! connections over UDP, negotiates a protocol revision per session, keeps
//! the world partitioned into chunks, and fans block changes out to exactly
//! the sessions watching each chunk.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! Every connection gets a session that moves through
//! `Connecting → Handshaking → Active → Disconnected`. The login packet picks
//! the protocol version; when encryption is enabled an ECDH key exchange
//! sits between login and spawn.
//!
//! ### Chunk Interest
//! Each dimension tracks which sessions watch which chunk and which block
//! mutations are pending there. Once per tick the pending mutations of a
//! chunk leave as one batch, encoded at most once per protocol version.
//!
//! ### Status Announcements
//! Unconnected pings and query requests are answered from a snapshot that
//! the tick loop refreshes periodically.
//!
//! ## Architecture Design
//!
//! ### Single Writer
//! [`server::Server`] owns sessions, levels and registries. Transport events
//! and ticks are handled one at a time on `&mut self`, so no session or
//! dimension is ever shared across tasks.
//!
//! ### Transport Tasks
//! [`network::UdpTransport`] runs a receiver, a sender and an idle checker as
//! tokio tasks and talks to the core through channels only.
//!
//! ## Module Organization
//!
//! - `config`: TOML and command-line configuration
//! - `crypto`: server key pair and session key derivation
//! - `chunk`: chunk storage and chunk providers
//! - `dimension`, `level`: chunk partition, interest and pending mutations
//! - `session`, `session_manager`: per-connection state
//! - `status`: pong and query responses
//! - `network`: transport contract, UDP and in-memory transports
//! - `tick`: tick counter and periodic work
//! - `server`: the orchestrator
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::UdpTransport;
//! use server::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let (transport, events) = UdpTransport::bind(&config.bind_address()).await?;
//!
//!     let mut server = Server::new(config, transport)?;
//!     server.start()?;
//!
//!     // Handles events and ticks until Ctrl+C, then disconnects everyone.
//!     server.run(events).await?;
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod config;
pub mod crypto;
pub mod dimension;
pub mod error;
pub mod level;
pub mod network;
pub mod server;
pub mod session;
pub mod session_manager;
pub mod status;
pub mod tick;

pub use error::{ServerError, ServerResult};
