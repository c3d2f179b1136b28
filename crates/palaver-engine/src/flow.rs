// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prioritized bot-flow matching.
//!
//! Flows evaluate in priority-descending order (ties broken by creation
//! order). The `BotInteraction` audit trail makes matching idempotent per
//! `(message_id, flow_id)` unless a flow opts out via `always_respond`.
//! The first match found across all flows wins; malformed regexes are a
//! logged non-match, never an error.

use std::sync::Arc;

use regex::RegexBuilder;
use tracing::{debug, warn};

use palaver_core::types::{BotCondition, BotFlow, BotInteraction, BotResponse, ConditionKind, MatchOperator};
use palaver_core::{PalaverError, Store};

use crate::resolve::now_rfc3339;

/// The winning flow, its matching condition, and the ordered replies.
#[derive(Debug, Clone)]
pub struct FlowMatch {
    pub flow: BotFlow,
    pub condition: BotCondition,
    pub responses: Vec<BotResponse>,
}

/// Evaluate one condition against the inbound text.
///
/// Case sensitivity is per condition; when insensitive, both sides are
/// lower-cased first. The `operator` inverts the outcome for `not_equals`.
pub fn condition_matches(condition: &BotCondition, text: &str) -> bool {
    // Regex never lower-cases the pattern (it would corrupt escape
    // classes); insensitivity is a compile flag instead.
    let norm = |s: &str| {
        if condition.case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    };
    let (value, text_norm) = (norm(&condition.value), norm(text));

    let hit = match condition.kind {
        ConditionKind::ExactMatch => text_norm == value,
        ConditionKind::Contains => text_norm.contains(&value),
        ConditionKind::StartsWith => text_norm.starts_with(&value),
        ConditionKind::EndsWith => text_norm.ends_with(&value),
        ConditionKind::MenuOption => text_norm.trim() == value.trim(),
        // A pattern that fails to compile is a non-match outright; the
        // operator must not invert it into a match.
        ConditionKind::Regex => match regex_matches(condition, text) {
            Some(hit) => hit,
            None => return false,
        },
    };

    match condition.operator {
        MatchOperator::Equals => hit,
        MatchOperator::NotEquals => !hit,
    }
}

fn regex_matches(condition: &BotCondition, text: &str) -> Option<bool> {
    let flags = condition.regex_flags.as_deref().unwrap_or("");
    let compiled = RegexBuilder::new(&condition.value)
        .case_insensitive(flags.contains('i') || !condition.case_sensitive)
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build();
    match compiled {
        Ok(re) => Some(re.is_match(text)),
        Err(e) => {
            warn!(
                condition_id = %condition.id,
                pattern = %condition.value,
                error = %e,
                "regex condition failed to compile, treating as non-match"
            );
            None
        }
    }
}

pub struct FlowMatcher {
    store: Arc<dyn Store>,
}

impl FlowMatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Find the first matching flow for an inbound message.
    ///
    /// Records a `matched=true` interaction for the winning flow, or a
    /// single `matched=false` interaction after a full pass with no match.
    pub async fn match_message(
        &self,
        connection_id: &str,
        tenant_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<Option<FlowMatch>, PalaverError> {
        let flows = self.store.list_active_flows(connection_id).await?;
        if flows.is_empty() {
            return Ok(None);
        }

        for flow in flows {
            if !flow.always_respond
                && self.store.interaction_exists(message_id, &flow.id).await?
            {
                debug!(
                    flow_id = %flow.id,
                    message_id = %message_id,
                    "flow already fired for this message, skipping"
                );
                continue;
            }

            let conditions = self.store.list_conditions(&flow.id).await?;
            let Some(condition) = conditions.into_iter().find(|c| condition_matches(c, text))
            else {
                continue;
            };

            let responses = self.store.list_responses(&condition.id).await?;
            self.store
                .insert_interaction(&BotInteraction {
                    id: uuid::Uuid::new_v4().to_string(),
                    tenant_id: tenant_id.to_string(),
                    connection_id: connection_id.to_string(),
                    message_id: message_id.to_string(),
                    flow_id: Some(flow.id.clone()),
                    matched: true,
                    responses_sent: responses.len() as i64,
                    created_at: now_rfc3339(),
                })
                .await?;

            debug!(
                flow_id = %flow.id,
                condition_id = %condition.id,
                responses = responses.len(),
                "flow matched"
            );
            if !flow.stop_on_match {
                // First match still wins; later flows are not aggregated.
                debug!(flow_id = %flow.id, "stop_on_match disabled, returning first match anyway");
            }
            return Ok(Some(FlowMatch {
                flow,
                condition,
                responses,
            }));
        }

        self.store
            .insert_interaction(&BotInteraction {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id: tenant_id.to_string(),
                connection_id: connection_id.to_string(),
                message_id: message_id.to_string(),
                flow_id: None,
                matched: false,
                responses_sent: 0,
                created_at: now_rfc3339(),
            })
            .await?;
        Ok(None)
    }
}
