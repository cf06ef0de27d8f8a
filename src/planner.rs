use crate::data::{Allocation, AllocationId, PlanSlot, PlanWarning, TermPlan, Venue, minutes};
use crate::error::{InfeasibleReason, PlanError};
use crate::placement::{self, EvaluationRules, Placement};
use crate::state::PlanningState;
use crate::{ranking, venues};
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlannerOptions {
    /// Refuse placements that put a lecturer in two overlapping slots.
    pub lecturer_exclusive: bool,
}

/// Greedy most-constrained-first slot planner.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    options: PlannerOptions,
}

impl Planner {
    pub fn new(options: PlannerOptions) -> Self {
        Self { options }
    }

    /// Places every allocation of a term from scratch. Fails as a whole on
    /// the first allocation that cannot be placed.
    pub fn build_term_plan(
        &self,
        allocations: &[Allocation],
        venues: &[Venue],
    ) -> Result<TermPlan, PlanError> {
        let start_time = Instant::now();
        info!(
            "Planning {} allocations over {} venues...",
            allocations.len(),
            venues.len()
        );

        let rules = EvaluationRules {
            lecturer_exclusive: self.options.lecturer_exclusive,
        };
        let mut state = PlanningState::new();
        let mut total_penalty = 0.0;

        for allocation in ranking::rank(allocations) {
            let placement = self.place(allocation, venues, &state, rules)?;
            debug!(
                "Allocation {} -> venue {} {} {:?} (score {:.2})",
                allocation.id, placement.venue_id, placement.day, placement.kind, placement.score
            );
            if !state.commit(allocation, &placement) {
                return Err(PlanError::Infeasible {
                    allocation_id: allocation.id,
                    reason: InfeasibleReason::NoFreeWindow,
                });
            }
            total_penalty += placement.score;
        }

        let slots = state.into_plan_slots();
        let warnings = lecturer_overlaps(&slots, allocations);
        for warning in &warnings {
            warn!("{warning}");
        }
        info!(
            "Planned {} allocations into {} slots in {:.2?}",
            allocations.len(),
            slots.len(),
            start_time.elapsed()
        );

        Ok(TermPlan {
            slots,
            total_penalty,
            warnings,
        })
    }

    fn place(
        &self,
        allocation: &Allocation,
        venues: &[Venue],
        state: &PlanningState,
        rules: EvaluationRules,
    ) -> Result<Placement, PlanError> {
        let infeasible = |reason| PlanError::Infeasible {
            allocation_id: allocation.id,
            reason,
        };
        if allocation.allowed_days.is_empty() {
            return Err(infeasible(InfeasibleReason::NoAllowedDays));
        }
        if allocation.duration_minutes == 0 {
            return Err(infeasible(InfeasibleReason::ZeroDuration));
        }
        if allocation.latest_start().is_none() {
            return Err(infeasible(InfeasibleReason::WindowTooNarrow));
        }
        let eligible = venues::eligible(allocation, venues);
        if eligible.is_empty() {
            return Err(infeasible(InfeasibleReason::NoEligibleVenue));
        }

        eligible
            .iter()
            .cartesian_product(allocation.allowed_days.iter())
            .map(|(venue, day)| placement::evaluate(allocation, venue, *day, state, rules))
            .fold(None, Placement::better)
            .ok_or_else(|| infeasible(InfeasibleReason::NoFreeWindow))
    }
}

/// Pairs of slots sharing a lecturer at overlapping times on the same day.
fn lecturer_overlaps(slots: &[PlanSlot], allocations: &[Allocation]) -> Vec<PlanWarning> {
    let lecturers: HashMap<AllocationId, &str> = allocations
        .iter()
        .map(|a| (a.id, a.lecturer_id.as_str()))
        .collect();

    let by_lecturer_day = slots
        .iter()
        .flat_map(|slot| slot.allocation_ids.iter().map(move |id| (*id, slot)))
        .filter_map(|(id, slot)| {
            lecturers
                .get(&id)
                .map(|lecturer| ((*lecturer, slot.day_of_week), (id, slot)))
        })
        .into_group_map();

    let mut warnings = Vec::new();
    for ((lecturer, day), mut booked) in by_lecturer_day
        .into_iter()
        .sorted_by_key(|((lecturer, day), _)| (*lecturer, *day))
    {
        booked.sort_by_key(|(id, slot)| (slot.start_time, *id));
        for ((first, a), (second, b)) in booked.iter().tuple_combinations() {
            let same_slot = a.venue_id == b.venue_id && a.start_time == b.start_time;
            let overlap = minutes(a.start_time) < minutes(b.end_time)
                && minutes(b.start_time) < minutes(a.end_time);
            if overlap && !same_slot {
                warnings.push(PlanWarning::LecturerOverlap {
                    lecturer_id: lecturer.to_string(),
                    day_of_week: day,
                    first: *first,
                    second: *second,
                });
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DayOfWeek;
    use crate::data::capacity_limit;
    use crate::data::fixtures::{allocation, venue};
    use std::collections::{BTreeSet, HashSet};

    fn plan(allocations: &[Allocation], venues: &[Venue]) -> Result<TermPlan, PlanError> {
        Planner::default().build_term_plan(allocations, venues)
    }

    fn starts(plan: &TermPlan) -> Vec<String> {
        plan.slots.iter().map(|s| s.start_time.to_string()).collect()
    }

    fn check_invariants(plan: &TermPlan, allocations: &[Allocation], venues: &[Venue]) {
        let mut seen = HashSet::new();
        for slot in &plan.slots {
            for id in &slot.allocation_ids {
                assert!(seen.insert(*id), "allocation {id} placed twice");
            }
        }
        let expected: HashSet<_> = allocations.iter().map(|a| a.id).collect();
        assert_eq!(seen, expected);

        for (a, b) in plan.slots.iter().tuple_combinations() {
            if a.venue_id == b.venue_id && a.day_of_week == b.day_of_week {
                assert!(
                    a.end_time <= b.start_time || b.end_time <= a.start_time,
                    "{a:?} overlaps {b:?}"
                );
            }
        }

        let by_id: HashMap<_, _> = allocations.iter().map(|a| (a.id, a)).collect();
        for slot in &plan.slots {
            let venue = venues.iter().find(|v| v.id == slot.venue_id).expect("venue");
            assert!(slot.capacity_used <= capacity_limit(venue.capacity));

            let members: Vec<_> = slot.allocation_ids.iter().map(|id| by_id[id]).collect();
            let used: u32 = members.iter().map(|a| a.number_of_students).sum();
            assert_eq!(used, slot.capacity_used);
            for a in &members {
                assert!(a.allowed_days.contains(&slot.day_of_week));
                assert!(a.start_time <= slot.start_time && slot.end_time <= a.end_time);
                assert_eq!(minutes(slot.end_time) - minutes(slot.start_time), a.duration_minutes);
                if members.len() > 1 {
                    assert!(a.same_unit(slot.module_id, slot.semester_module_id));
                }
            }
        }
    }

    #[test]
    fn single_allocation_starts_at_window_open() {
        let allocations = [allocation(1, 1, "09:00", "12:00", 120)];
        let plan = plan(&allocations, &[venue(1, 30)]).expect("feasible");

        assert_eq!(plan.slots.len(), 1);
        assert_eq!(plan.slots[0].start_time.to_string(), "09:00:00");
        assert_eq!(plan.slots[0].end_time.to_string(), "11:00:00");
    }

    #[test]
    fn packs_back_to_back_without_idle_gaps() {
        let allocations = [
            allocation(1, 1, "08:00", "10:00", 60),
            allocation(2, 2, "08:30", "12:00", 60),
            allocation(3, 3, "08:30", "12:00", 60),
        ];
        let venues = [venue(1, 30)];
        let plan = plan(&allocations, &venues).expect("feasible");

        assert_eq!(starts(&plan), vec!["08:00:00", "09:00:00", "10:00:00"]);
        check_invariants(&plan, &allocations, &venues);
    }

    #[test]
    fn co_taught_sessions_share_one_slot() {
        let mut first = allocation(1, 9, "09:00", "13:00", 90);
        let mut second = allocation(2, 9, "09:00", "13:00", 90);
        second.lecturer_id = first.lecturer_id.clone();
        first.number_of_students = 20;
        second.number_of_students = 20;

        let allocations = [first, second];
        let venues = [venue(1, 50)];
        let plan = plan(&allocations, &venues).expect("feasible");

        assert_eq!(plan.slots.len(), 1);
        assert_eq!(plan.slots[0].capacity_used, 40);
        assert_eq!(plan.slots[0].allocation_ids, vec![1, 2]);
        assert!(plan.warnings.is_empty());
        check_invariants(&plan, &allocations, &venues);
    }

    #[test]
    fn oversized_group_is_infeasible() {
        let mut big = allocation(1, 1, "09:00", "12:00", 60);
        big.number_of_students = 120;

        let err = plan(&[big], &[venue(1, 50), venue(2, 50)]).unwrap_err();
        assert_eq!(
            err,
            PlanError::Infeasible {
                allocation_id: 1,
                reason: InfeasibleReason::NoEligibleVenue
            }
        );
    }

    #[test]
    fn narrow_window_is_infeasible() {
        let err = plan(&[allocation(1, 1, "09:00", "09:45", 60)], &[venue(1, 50)]).unwrap_err();
        assert_eq!(
            err,
            PlanError::Infeasible {
                allocation_id: 1,
                reason: InfeasibleReason::WindowTooNarrow
            }
        );
    }

    #[test]
    fn missing_days_are_infeasible() {
        let mut a = allocation(1, 1, "09:00", "12:00", 60);
        a.allowed_days.clear();
        let err = plan(&[a], &[venue(1, 50)]).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Infeasible {
                reason: InfeasibleReason::NoAllowedDays,
                ..
            }
        ));
    }

    #[test]
    fn zero_length_sessions_are_rejected() {
        let allocations = [
            allocation(1, 1, "09:00", "12:00", 0),
            allocation(2, 2, "09:00", "12:00", 0),
        ];
        let err = plan(&allocations, &[venue(1, 50)]).unwrap_err();
        assert_eq!(
            err,
            PlanError::Infeasible {
                allocation_id: 1,
                reason: InfeasibleReason::ZeroDuration
            }
        );
    }

    #[test]
    fn full_day_aborts_the_whole_run() {
        let allocations = [
            allocation(1, 1, "09:00", "11:00", 120),
            allocation(2, 2, "09:00", "11:00", 60),
        ];
        let err = plan(&allocations, &[venue(1, 50)]).unwrap_err();
        assert_eq!(
            err,
            PlanError::Infeasible {
                allocation_id: 2,
                reason: InfeasibleReason::NoFreeWindow
            }
        );
    }

    #[test]
    fn spreads_over_days_and_venues_when_cheaper() {
        let days = BTreeSet::from([DayOfWeek::Monday, DayOfWeek::Tuesday]);
        let allocations: Vec<_> = (1..=6)
            .map(|id| {
                let mut a = allocation(id, id, "08:00", "12:00", 60);
                a.allowed_days = days.clone();
                a.number_of_students = 10 + id;
                a
            })
            .collect();
        let venues = [venue(1, 20), venue(2, 25)];
        let plan = plan(&allocations, &venues).expect("feasible");

        check_invariants(&plan, &allocations, &venues);
        assert!(plan.slots.iter().any(|s| s.day_of_week == DayOfWeek::Tuesday));
        assert!(plan.slots.iter().any(|s| s.venue_id == 2));
    }

    #[test]
    fn identical_input_gives_identical_plan() {
        let allocations: Vec<_> = (1..=8)
            .map(|id| {
                let mut a = allocation(id, id % 3, "08:00", "16:00", 30 * (1 + id % 2));
                a.allowed_days.insert(DayOfWeek::Wednesday);
                a
            })
            .collect();
        let venues = [venue(1, 40), venue(2, 60), venue(3, 25)];

        let first = plan(&allocations, &venues).expect("feasible");
        let second = plan(&allocations, &venues).expect("feasible");
        assert_eq!(first.slots, second.slots);
        assert_eq!(first.total_penalty, second.total_penalty);
        check_invariants(&first, &allocations, &venues);
    }

    #[test]
    fn reports_lecturer_double_booking() {
        let mut first = allocation(1, 1, "09:00", "10:00", 60);
        let mut second = allocation(2, 2, "09:00", "10:00", 60);
        first.lecturer_id = "L".into();
        second.lecturer_id = "L".into();
        let allocations = [first, second];

        let plan = plan(&allocations, &[venue(1, 20), venue(2, 20)]).expect("feasible");
        assert_eq!(
            plan.warnings,
            vec![PlanWarning::LecturerOverlap {
                lecturer_id: "L".into(),
                day_of_week: DayOfWeek::Monday,
                first: 1,
                second: 2,
            }]
        );
    }

    #[test]
    fn lecturer_exclusive_refuses_double_booking() {
        let mut first = allocation(1, 1, "09:00", "11:00", 60);
        let mut second = allocation(2, 2, "09:00", "11:00", 60);
        first.lecturer_id = "L".into();
        second.lecturer_id = "L".into();
        let allocations = [first, second];
        let venues = [venue(1, 20), venue(2, 20)];

        let plan = Planner::new(PlannerOptions {
            lecturer_exclusive: true,
        })
        .build_term_plan(&allocations, &venues)
        .expect("feasible");

        assert!(plan.warnings.is_empty());
        let mut times = starts(&plan);
        times.sort();
        assert_eq!(times, vec!["09:00:00", "10:00:00"]);
    }
}
