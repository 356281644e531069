//! Core library for the impostor party game: word generation, the word pool
//! cache and the session engine.
//!
//! - [`agents`] configures AI providers and runs the request/fallback loop.
//! - [`api`] exposes the HTTP routes served by the game server.
//! - [`db`] initialises the SQLite database and applies migrations.
//! - [`errors`] keeps the error catalogue with stable codes.
//! - [`generation`] validates requests and filters generated batches.
//! - [`logging`] writes structured diagnostics to the event log table.
//! - [`session`] drives the game phases and role assignment.
//! - [`snapshot`] persists session settings across restarts.
//! - [`word_pool`] and [`word_service`] serve words without repeats.

pub mod agents;
pub mod api;
pub mod db;
pub mod errors;
pub mod generation;
pub mod logging;
pub mod model;
pub mod prompts;
pub mod session;
pub mod snapshot;
pub mod word_pool;
pub mod word_service;
