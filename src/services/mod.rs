//! Domain services used by the HTTP and websocket routes.
//!
//! ARCHITECTURE
//! ============
//! Services own sessions, prompt composition and the turn state machine so
//! route handlers stay focused on protocol translation and auth plumbing.

pub mod chat;
pub mod prompt;
pub mod session;
pub mod session_log;
