//! seatd - seat reservation daemon
//!
//! This crate provides the concurrency core of the booking system:
//! - `show` - per-show actor owning the hold registry and booking coordinator
//! - `directory` - lazily started show actors
//! - `session` - which connection owns what, for disconnect clean-up
//! - `storage` - durable storage contract and the in-memory snapshot store
//! - `server` - Unix socket server for client connections
//! - `config` - daemon configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        seatd daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   SeatServer    │────▶│   ShowActor (one per show)  │    │
//! │  │ (Unix Socket)   │     │ holds, room, coordinator    │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │                   │
//! │           │ connections                 │ commit            │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │ConnectionHandler│     │   Storage (MemoryStore)     │    │
//! │  │  (per client)   │     │   atomic transactions       │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod directory;
pub mod server;
pub mod session;
pub mod show;
pub mod storage;
