// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filters deciding whether an event reaches the appenders

use std::fmt::Debug;

use crate::event::AccessEvent;

/// Decision of a single filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReply {
    /// Drop the event, no appenders are invoked.
    Deny,
    /// No opinion, ask the next filter in the chain.
    Neutral,
    /// Log the event, skipping the remaining filters.
    Accept,
}

/// Predicate over access events, attached to an
/// [`AccessContext`](crate::AccessContext).
///
/// Filters run in registration order; the first non-[`Neutral`](FilterReply::Neutral)
/// reply ends the chain, an exhausted chain counts as neutral.
pub trait Filter: Send + Sync + Debug {
    /// Decides what to do with one event.
    fn decide(&self, event: &AccessEvent<'_>) -> FilterReply;
}

pub(crate) fn chain_decision(filters: &[Box<dyn Filter>], event: &AccessEvent<'_>) -> FilterReply {
    for filter in filters {
        match filter.decide(event) {
            FilterReply::Neutral => {}
            reply => return reply,
        }
    }
    FilterReply::Neutral
}
