// src/lib.rs

//! mangawatch: periodic manga update checks with downloads and notifications.
//!
//! A [`pipeline::Scheduler`] periodically fetches chapter lists from the
//! registered [`source::Source`]s, reconciles them against the
//! [`storage::StateStore`], optionally queues new chapters on the
//! [`download::DownloadCoordinator`] and sends one aggregated message per
//! cycle through every configured [`notify::Notifier`].

pub mod download;
pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod service;
pub mod source;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
