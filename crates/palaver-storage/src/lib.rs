// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for Palaver.
//!
//! A single [`Database`] handle wraps a `tokio-rusqlite` connection; all
//! writes funnel through it so SQLite's single-writer model is never
//! contended from our side. Schema evolution is handled by embedded
//! `refinery` migrations applied at open time.
//!
//! [`SqliteStore`] implements the `palaver_core::Store` trait on top of the
//! typed query modules in [`queries`].

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

pub use database::Database;
pub use store::SqliteStore;
