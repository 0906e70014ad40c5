//! Job status tracking client for the anclora ingestion service.
//!
//! Submits documents through the [`gateway`], then follows the
//! resulting job with a [`tracker::JobTracker`] that prefers the
//! WebSocket [`push`] channel and falls back to HTTP [`poll`]ing.
//! Both transports implement [`session::StatusSource`] and report
//! through the same [`events::SessionSignal`] stream.

pub mod api;
pub mod client;
pub mod config;
pub mod events;
pub mod gateway;
pub mod manager;
pub mod messages;
pub mod observer;
pub mod poll;
pub mod push;
pub mod reconnect;
pub mod session;
pub mod tracker;
