use crate::data::{AllocationId, TermId, TermPlan};
use crate::error::ServiceError;
use crate::planner::Planner;
use crate::store::{self, Store};
use log::{error, info};
use std::sync::Arc;

/// Recomputes and persists whole-term schedules.
#[derive(Clone)]
pub struct SchedulingService {
    store: Arc<Store>,
    planner: Planner,
}

impl SchedulingService {
    pub fn new(store: Arc<Store>, planner: Planner) -> Self {
        Self { store, planner }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Re-plans the whole term the allocation belongs to.
    pub fn allocate_slot(&self, allocation_id: AllocationId) -> Result<TermPlan, ServiceError> {
        let term_id = self.store.allocation_term(allocation_id)?;
        info!("Allocation {allocation_id} belongs to term {term_id}, rebuilding the term");
        self.rebuild_term_slots(term_id)
    }

    /// Loads, plans and replaces the term's slots in one transaction. Nothing
    /// is written if planning fails, and concurrent rebuilds run one at a time.
    pub fn rebuild_term_slots(&self, term_id: TermId) -> Result<TermPlan, ServiceError> {
        let result = self.store.transaction(|tx| {
            let allocations = store::load_term_allocations(tx, term_id)?;
            let venues = store::load_venues(tx)?;
            let plan = self.planner.build_term_plan(&allocations, &venues)?;
            store::replace_term_slots(tx, term_id, &plan.slots)?;
            Ok::<_, ServiceError>(plan)
        });

        match &result {
            Ok(plan) => info!("Term {term_id} stored with {} slots", plan.slots.len()),
            Err(e) => error!("Rebuilding term {term_id} failed: {e}"),
        }
        result
    }
}
