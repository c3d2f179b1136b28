// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot greeting broadcast matching.
//!
//! A schedule matches when the tenant-local weekday is in its day set and
//! the local `HH:MM` time falls inside at least one of its inclusive
//! `[from, to]` windows. The first active matching schedule in stored order
//! wins, and a conversation only ever receives one broadcast, guarded by a
//! marker prefix on previously sent broadcast bodies.

use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, NaiveTime};
use tracing::debug;

use palaver_core::types::{AutoMessageSchedule, TimeWindow};
use palaver_core::{PalaverError, Store};

/// Invisible prefix marking broadcast messages for the once-per-conversation
/// guard (U+200E, left-to-right mark).
pub const BROADCAST_MARKER: &str = "\u{200e}";

fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Whether `at` falls inside the window, both bounds inclusive.
///
/// A window with an unparseable bound never matches.
pub fn window_contains(window: &TimeWindow, at: NaiveTime) -> bool {
    let (Some(from), Some(to)) = (parse_hhmm(&window.from), parse_hhmm(&window.to)) else {
        debug!(from = %window.from, to = %window.to, "malformed time window, skipping");
        return false;
    };
    from <= at && at <= to
}

/// Whether the schedule applies at the given local weekday (0 = Sunday) and
/// time.
pub fn schedule_matches(schedule: &AutoMessageSchedule, weekday: u8, at: NaiveTime) -> bool {
    schedule.active
        && schedule.days_of_week.contains(&weekday)
        && schedule.windows.iter().any(|w| window_contains(w, at))
}

pub struct ScheduleMatcher {
    store: Arc<dyn Store>,
}

impl ScheduleMatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The broadcast body to send right now, or `None`.
    ///
    /// Returns `None` when no active schedule matches `now` or when the
    /// conversation already received a broadcast. The returned body carries
    /// the [`BROADCAST_MARKER`] prefix that feeds the guard.
    pub async fn should_broadcast(
        &self,
        connection_id: &str,
        conversation_id: &str,
        now: NaiveDateTime,
    ) -> Result<Option<String>, PalaverError> {
        let schedules = self.store.list_active_schedules(connection_id).await?;
        if schedules.is_empty() {
            return Ok(None);
        }

        let weekday = now.weekday().num_days_from_sunday() as u8;
        let time = now.time();
        let Some(hit) = schedules.iter().find(|s| schedule_matches(s, weekday, time)) else {
            return Ok(None);
        };

        if self
            .store
            .conversation_has_broadcast(conversation_id, BROADCAST_MARKER)
            .await?
        {
            debug!(
                conversation_id = %conversation_id,
                schedule_id = %hit.id,
                "conversation already received a broadcast"
            );
            return Ok(None);
        }

        Ok(Some(format!("{BROADCAST_MARKER}{}", hit.body)))
    }
}
