//! # Fishing Server Library
//!
//! This library provides the authoritative session core for the multiplayer
//! fishing game. It tracks who is connected, which fish are in the water and
//! who is fishing where, and it decides when a fish bites.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Fishing
//! Clients only ask to cast, cancel or land a fish. The server computes where
//! each line lands, arbitrates fishing spots between players and rolls every
//! bite. Clients render whatever the server tells them.
//!
//! ### Spot Arbitration
//! The water is divided into grid cells. At most one line may be in a cell
//! at any time, and a cast into an occupied cell is rejected with the name
//! of the player already fishing there.
//!
//! ### Hook Resolution
//! Every accepted cast starts a background task that checks for a bite once
//! per second for a bounded number of rounds. Cancelling, disconnecting or
//! casting again makes the running task stale and it stops at its next
//! check without side effects.
//!
//! ## Architecture Design
//!
//! ### Single Lock
//! All mutable state lives in one `FishingCoordinator` behind a single
//! `tokio::sync::Mutex`. Coordinator operations are synchronous and short,
//! so requests and bite checks simply serialize on the lock.
//!
//! ### Event Sink
//! The core never touches sockets. It publishes `ServerEvent`s tagged with a
//! `Delivery` mode (one connection, everyone but one, or everyone) into an
//! `EventSink`, and the transport resolves those to addresses.
//!
//! ### UDP-Based Communication
//! The reference transport uses UDP sockets and bincode-encoded packets,
//! with a connection table, a timeout checker and a fixed-rate world tick.
//!
//! ## Module Organization
//!
//! ### Player Registry (`player_registry`)
//! Per-connection player records: state, facing, position, fishing target.
//!
//! ### World (`world`)
//! The fish catalog: spawning, removal and radius queries.
//!
//! ### Fishing (`fishing`)
//! The state machine: cast geometry, spot occupancy, attempts, bite rolls
//! and landing hooked fish.
//!
//! ### Hook (`hook`)
//! The timed resolution task and its supervisor.
//!
//! ### Session (`session`)
//! Async, cloneable entry points that lock the coordinator and start
//! resolution tasks.
//!
//! ### Network (`network`) and Client Manager (`client_manager`)
//! The UDP transport and its connection table.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use fishing_server::config::ServerConfig;
//! use fishing_server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 9000,
//!         initial_fish: 40,
//!         ..ServerConfig::default()
//!     };
//!     let mut server = Server::new(&config).await?;
//!
//!     // Runs until the process is stopped:
//!     // - Receives client packets and forwards them to the session
//!     // - Sends queued events to the connections they target
//!     // - Drops clients that stay silent for too long
//!     // - Ticks fish motion at the configured rate
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod error;
pub mod events;
pub mod fishing;
pub mod hook;
pub mod network;
pub mod player_registry;
pub mod session;
pub mod world;
