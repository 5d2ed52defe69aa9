//! Networking module
//!
//! This module handles all network-facing functionality for the Duskmere
//! server:
//! - WebSocket gateway for game clients
//! - Connection lifecycle and the identify handshake
//! - HTTP status API

pub mod api;
pub mod gateway;
