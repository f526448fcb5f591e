//! Runtime half of the loop guard.
//!
//! Injected checkpoints call [`LoopGuard::protect`] once every
//! `check_interval` iterations. The first checkpoint of a synchronous branch
//! records the branch start; later ones compare the elapsed time against the
//! current budget. The host ends a branch by calling [`LoopGuard::idle`].

use crate::ast::Loc;
use crate::errors::InfiniteLoopError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Instant;
use tracing::{trace, warn};

/// Budget in effect before the first `KAInfiniteLoopSetTimeout` call.
pub const INITIAL_TIMEOUT_MS: u64 = 1000;

/// Millisecond time source for the guard.
pub trait Clock {
    fn now(&self) -> u64;

    /// `false` while the host is backgrounded; budgets are not enforced then.
    fn is_accounting(&self) -> bool {
        true
    }
}

/// Wall-clock time since construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// A guarded loop or function, as passed to `KAInfiniteLoopProtect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSite {
    #[serde(rename = "type")]
    pub node_type: String,
    pub loc: SiteSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSpan {
    pub start: Loc,
}

impl RiskSite {
    pub fn new(node_type: &str, loc: Loc) -> Self {
        Self {
            node_type: node_type.to_string(),
            loc: SiteSpan { start: loc },
        }
    }

    fn to_error(&self) -> InfiniteLoopError {
        InfiniteLoopError::Located {
            node_kind: self.node_type.clone(),
            row: self.loc.start.line.saturating_sub(1),
        }
    }
}

pub type LoopCallback = Box<dyn FnMut(&InfiniteLoopError)>;

pub struct LoopGuard {
    clock: Rc<dyn Clock>,
    timeout_ms: u64,
    branch_start: Option<u64>,
    /// Hit counts keyed by the raw site string, in first-hit order.
    hits: IndexMap<String, u32>,
    reset_pending: bool,
    was_accounting: bool,
    report_location: bool,
    callback: Option<LoopCallback>,
}

impl LoopGuard {
    pub fn new(clock: Rc<dyn Clock>, report_location: bool) -> Self {
        let was_accounting = clock.is_accounting();
        Self {
            clock,
            timeout_ms: INITIAL_TIMEOUT_MS,
            branch_start: None,
            hits: IndexMap::new(),
            reset_pending: false,
            was_accounting,
            report_location,
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: LoopCallback) {
        self.callback = Some(callback);
    }

    pub fn set_report_location(&mut self, report_location: bool) {
        self.report_location = report_location;
    }

    pub fn timeout(&self) -> u64 {
        self.timeout_ms
    }

    pub fn set_timeout(&mut self, timeout_ms: u64) {
        trace!(timeout_ms, "loop guard budget changed");
        self.timeout_ms = timeout_ms;
        self.branch_start = None;
    }

    /// Host idle tick: ends the current synchronous branch.
    pub fn idle(&mut self) {
        if self.reset_pending {
            self.branch_start = None;
            self.reset_pending = false;
        }
    }

    pub fn branch_started(&self) -> bool {
        self.branch_start.is_some()
    }

    pub fn protect(&mut self, location: Option<&str>) -> Result<(), InfiniteLoopError> {
        if let Some(location) = location {
            *self.hits.entry(location.to_string()).or_insert(0) += 1;
        }

        let accounting = self.clock.is_accounting();
        if accounting && !self.was_accounting {
            self.branch_start = None;
        }
        self.was_accounting = accounting;

        let now = self.clock.now();
        let Some(start) = self.branch_start else {
            self.branch_start = Some(now);
            self.reset_pending = true;
            return Ok(());
        };

        if !accounting || now.saturating_sub(start) <= self.timeout_ms {
            return Ok(());
        }

        let error = self.overrun_error();
        warn!(%error, elapsed_ms = now - start, budget_ms = self.timeout_ms, "loop budget exceeded");
        if let Some(callback) = self.callback.as_mut() {
            callback(&error);
        }
        self.branch_start = None;
        self.hits.clear();
        Err(error)
    }

    fn overrun_error(&self) -> InfiniteLoopError {
        if !self.report_location {
            return InfiniteLoopError::Unlocated;
        }
        // First site wins ties.
        let mut hottest: Option<(&String, u32)> = None;
        for (site, &count) in &self.hits {
            if hottest.map_or(true, |(_, max)| count > max) {
                hottest = Some((site, count));
            }
        }
        hottest
            .and_then(|(site, _)| serde_json::from_str::<RiskSite>(site).ok())
            .map(|site| site.to_error())
            .unwrap_or(InfiniteLoopError::Unlocated)
    }
}

impl std::fmt::Debug for LoopGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopGuard")
            .field("timeout_ms", &self.timeout_ms)
            .field("branch_start", &self.branch_start)
            .field("hits", &self.hits)
            .field("reset_pending", &self.reset_pending)
            .finish_non_exhaustive()
    }
}
