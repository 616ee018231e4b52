//! Concurrent region refresh with per-region failure isolation.
//!
//! `refresh_all` marks every region loading before anything is dispatched,
//! then drives all fetches concurrently. Each region is settled and rendered
//! the moment its own fetch completes; nothing waits for siblings. The
//! aggregate report is only available once every region settled.
//!
//! Each dispatch carries a per-region sequence number. A response whose
//! number is no longer the latest issued for its region is dropped without
//! touching state or rendering, so a slow old response can never overwrite a
//! newer one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};
use tradedash_core::{DashError, Payload, RegionState, Result, log_region_event};

use crate::error_area::{ErrorScope, ErrorSeverity};
use crate::region::{FetchContext, RefreshReport, Region, RegionOutcome, Settlement};
use crate::session::PageSession;

#[derive(Debug, Default)]
struct RegionSlot {
    state: RegionState,
    latest_seq: u64,
    in_flight: usize,
}

/// One issued dispatch.
struct Ticket {
    region: Arc<dyn Region>,
    ctx: FetchContext,
}

/// Fans region fetches out and settles each one independently.
pub struct RegionRefreshCoordinator {
    regions: Vec<Arc<dyn Region>>,
    slots: Mutex<HashMap<String, RegionSlot>>,
    /// Held while a settlement is checked and rendered so renders of one
    /// region happen in settlement order.
    render_gates: HashMap<String, Arc<Mutex<()>>>,
    session: Arc<PageSession>,
}

impl std::fmt::Debug for RegionRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionRefreshCoordinator")
            .field("regions", &self.region_ids())
            .field("session", &self.session.name())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RegionRefreshCoordinator {
    /// Create a coordinator for a fixed region set.
    ///
    /// Region ids must be unique; a later duplicate is ignored.
    pub fn new(regions: Vec<Arc<dyn Region>>, session: Arc<PageSession>) -> Self {
        let mut unique: Vec<Arc<dyn Region>> = Vec::with_capacity(regions.len());
        let mut slots = HashMap::new();
        let mut render_gates = HashMap::new();

        for region in regions {
            let id = region.id().to_string();
            if slots.contains_key(&id) {
                warn!(region = %id, "duplicate region id ignored");
                continue;
            }
            slots.insert(id.clone(), RegionSlot::default());
            render_gates.insert(id, Arc::new(Mutex::new(())));
            unique.push(region);
        }

        Self {
            regions: unique,
            slots: Mutex::new(slots),
            render_gates,
            session,
        }
    }

    /// Declared region ids, in declaration order.
    pub fn region_ids(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.id()).collect()
    }

    pub fn session(&self) -> &Arc<PageSession> {
        &self.session
    }

    /// Snapshot of one region's state.
    pub fn state(&self, region_id: &str) -> Option<RegionState> {
        lock(&self.slots).get(region_id).map(|s| s.state.clone())
    }

    /// Snapshot of every region's state.
    pub fn states(&self) -> HashMap<String, RegionState> {
        lock(&self.slots)
            .iter()
            .map(|(id, slot)| (id.clone(), slot.state.clone()))
            .collect()
    }

    /// Refresh every region concurrently.
    pub async fn refresh_all(&self) -> RefreshReport {
        let tickets: Vec<Ticket> = self.regions.iter().map(|r| self.issue(r)).collect();
        info!(
            page = self.session.name(),
            regions = tickets.len(),
            "refreshing all regions"
        );
        let report = self.dispatch(tickets).await;
        if !report.is_success() {
            warn!(
                page = self.session.name(),
                failed = report.failed().len(),
                "refresh finished with failures"
            );
        }
        report
    }

    /// Refresh the regions matching `filter` concurrently.
    pub async fn refresh_matching(&self, filter: impl Fn(&dyn Region) -> bool) -> RefreshReport {
        let tickets: Vec<Ticket> = self
            .regions
            .iter()
            .filter(|r| filter(r.as_ref()))
            .map(|r| self.issue(r))
            .collect();
        self.dispatch(tickets).await
    }

    /// Refresh a single region.
    pub async fn refresh_one(&self, region_id: &str) -> Result<RegionOutcome> {
        let region = self
            .regions
            .iter()
            .find(|r| r.id() == region_id)
            .ok_or_else(|| DashError::unknown_region(region_id))?;

        let ticket = self.issue(region);
        let result = ticket.region.fetch(&ticket.ctx).await;
        Ok(self.settle(ticket, result))
    }

    /// Mark the region loading and take the next sequence number.
    fn issue(&self, region: &Arc<dyn Region>) -> Ticket {
        let seq = {
            let mut slots = lock(&self.slots);
            let slot = slots.entry(region.id().to_string()).or_default();
            slot.latest_seq += 1;
            slot.in_flight += 1;
            slot.state.loading = true;
            slot.latest_seq
        };
        log_region_event!(region.id(), "dispatched", seq);
        Ticket {
            region: Arc::clone(region),
            ctx: self.session.fetch_context(region.id(), seq),
        }
    }

    async fn dispatch(&self, tickets: Vec<Ticket>) -> RefreshReport {
        let mut pending: FuturesUnordered<_> = tickets
            .into_iter()
            .map(|ticket| async move {
                let result = ticket.region.fetch(&ticket.ctx).await;
                (ticket, result)
            })
            .collect();

        let mut outcomes = Vec::new();
        while let Some((ticket, result)) = pending.next().await {
            outcomes.push(self.settle(ticket, result));
        }
        RefreshReport::new(outcomes)
    }

    /// Store the result of one dispatch and render it, unless it is stale.
    fn settle(&self, ticket: Ticket, result: Result<Payload>) -> RegionOutcome {
        let Ticket { region, ctx } = ticket;
        let id = region.id();
        let gate = self.render_gates.get(id).cloned().unwrap_or_default();
        let _gate = lock(&gate);

        let current = {
            let mut slots = lock(&self.slots);
            let slot = slots.entry(id.to_string()).or_default();
            slot.in_flight = slot.in_flight.saturating_sub(1);
            slot.state.loading = slot.in_flight > 0;

            let current = ctx.seq == slot.latest_seq;
            if current {
                match &result {
                    Ok(payload) => {
                        slot.state.last_error = None;
                        slot.state.last_success_at = Some(Utc::now());
                        slot.state.last_payload = Some(payload.clone());
                    }
                    Err(e) => slot.state.last_error = Some(e.to_error_info()),
                }
            }
            current
        };

        if !current {
            log_region_event!(id, "discarded", seq = ctx.seq);
            return RegionOutcome {
                region_id: id.to_string(),
                seq: ctx.seq,
                settlement: Settlement::Discarded,
            };
        }

        let result = result.and_then(|payload| region.render(&payload));
        let settlement = match result {
            Ok(()) => {
                debug!(region = id, seq = ctx.seq, "region rendered");
                self.session.errors().resolve(&ErrorScope::Region(id.to_string()));
                Settlement::Rendered
            }
            Err(e) => {
                let info = e.to_error_info();
                warn!(region = id, seq = ctx.seq, error = %e, "region failed");
                if let Some(slot) = lock(&self.slots).get_mut(id) {
                    slot.state.last_error = Some(info.clone());
                }
                self.session.errors().record(
                    ErrorScope::Region(id.to_string()),
                    ErrorSeverity::Error,
                    info.clone(),
                );
                region.on_error(&info);
                Settlement::Failed(info)
            }
        };

        RegionOutcome {
            region_id: id.to_string(),
            seq: ctx.seq,
            settlement,
        }
    }
}
