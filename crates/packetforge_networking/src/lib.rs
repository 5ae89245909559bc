//! # PacketForge Networking
//!
//! Dual-threaded packet transport for protocols generated by
//! `packetforge_codegen`.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         Coordinator                            │
//! │        NetworkLibrary · client factory · server factory        │
//! └───────────────┬─────────────────────────────────┬──────────────┘
//!                 │                                 │
//!        ┌────────▼────────┐               ┌────────▼────────┐
//!        │  GameClient<P>  │               │  GameServer<P>  │
//!        │ handlers, drain │               │ handlers, drain │
//!        └────────┬────────┘               └────────┬────────┘
//!          crossbeam queues                  crossbeam queues
//!        ┌────────▼────────┐               ┌────────▼────────┐
//!        │ worker thread   │◀── UDP ──────▶│ worker thread   │
//!        │ Host (client)   │               │ Host (server)   │
//!        └─────────────────┘               └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let library = NetworkLibrary::initialize_or_disabled();
//! let mut client = GameClient::<GameProtocol>::new(&library, &TransportConfig::default());
//! client.register_packet_handler(|pong: SPacketPong| tracing::info!(?pong, "pong"));
//! client.connect(server_addr).wait(Duration::from_secs(5))?;
//!
//! loop {
//!     client.send(&CPacketPing::default())?;
//!     client.drain();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod host;
pub mod library;
pub mod queue;
pub mod reason;
pub mod server;
pub mod state;
pub mod stats;
pub mod ticket;

pub use client::GameClient;
pub use config::TransportConfig;
pub use coordinator::{ClientFactory, Coordinator, ServerFactory};
pub use error::{TransportError, TransportResult};
pub use handlers::HandlerTable;
pub use host::{Host, HostEvent, PeerId, MAX_DATAGRAM_FRAME};
pub use library::{LibraryLease, NetworkLibrary};
pub use queue::{ClientEvent, DrainSummary, ServerEvent, WorkerCommand};
pub use reason::DisconnectReason;
pub use server::GameServer;
pub use state::{CancellationToken, ConnectionState};
pub use stats::TransportStats;
pub use ticket::StartTicket;
