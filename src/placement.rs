use crate::data::{Allocation, DayOfWeek, Minute, Venue, VenueId};
use crate::state::{PlanningState, SlotKey, WorkingSlot};
use log::trace;

/// Granularity of start times tried inside a free window.
pub const START_STEP_MINUTES: usize = 5;

const VENUE_LOAD_WEIGHT: f64 = 15.0;
const DAY_SLOT_WEIGHT: f64 = 5.0;
const CAPACITY_WEIGHT: f64 = 50.0;
const COMBINATION_BONUS: f64 = -40.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementKind {
    Combine(SlotKey),
    Open { start: Minute },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub venue_id: VenueId,
    pub day: DayOfWeek,
    pub kind: PlacementKind,
    pub score: f64,
}

impl Placement {
    /// Keeps the current best unless `other` is strictly lower.
    pub fn better(best: Option<Placement>, other: Option<Placement>) -> Option<Placement> {
        match (best, other) {
            (Some(b), Some(o)) if o.score < b.score => Some(o),
            (None, o) => o,
            (b, _) => b,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationRules {
    pub lecturer_exclusive: bool,
}

/// Best placement of `allocation` on (`venue`, `day`), or `None` if nothing fits.
pub fn evaluate(
    allocation: &Allocation,
    venue: &Venue,
    day: DayOfWeek,
    state: &PlanningState,
    rules: EvaluationRules,
) -> Option<Placement> {
    let load_penalty = VENUE_LOAD_WEIGHT * f64::from(state.venue_load(venue.id))
        + DAY_SLOT_WEIGHT * state.day_slot_count(venue.id, day) as f64;
    let score = |start: Minute, projected: u32, combined: bool| {
        let time_penalty = f64::from(start.saturating_sub(allocation.window_start()));
        let capacity = f64::from(venue.capacity.max(1));
        let capacity_penalty =
            CAPACITY_WEIGHT * (capacity - f64::from(projected)).abs() / capacity;
        let bonus = if combined { COMBINATION_BONUS } else { 0.0 };
        time_penalty + load_penalty + capacity_penalty + bonus
    };

    let combined = state
        .day_slots(venue.id, day)
        .find(|slot| {
            combinable(allocation, venue, slot)
                && !(rules.lecturer_exclusive
                    && state.lecturer_busy(
                        &allocation.lecturer_id,
                        day,
                        slot.key.start,
                        slot.key.end,
                        Some(&slot.key),
                    ))
        })
        .map(|slot| Placement {
            venue_id: venue.id,
            day,
            kind: PlacementKind::Combine(slot.key),
            score: score(
                slot.key.start,
                slot.capacity_used + allocation.number_of_students,
                true,
            ),
        });

    let mut opened: Option<Placement> = None;
    let mut tried = 0usize;
    for (from, to) in free_windows(allocation, state.day_slots(venue.id, day)) {
        for start in (from..=to).step_by(START_STEP_MINUTES) {
            let end = start + allocation.duration_minutes;
            if rules.lecturer_exclusive
                && state.lecturer_busy(&allocation.lecturer_id, day, start, end, None)
            {
                continue;
            }
            tried += 1;
            let candidate = Placement {
                venue_id: venue.id,
                day,
                kind: PlacementKind::Open { start },
                score: score(start, allocation.number_of_students, false),
            };
            opened = Placement::better(opened, Some(candidate));
        }
    }
    trace!(
        "Allocation {} on venue {} {}: combine={}, {} new-slot starts tried.",
        allocation.id,
        venue.id,
        day,
        combined.is_some(),
        tried
    );

    Placement::better(combined, opened)
}

/// Same teaching unit, fully inside the allocation's window, exactly the
/// same length, and still within the venue's tolerated capacity.
pub fn combinable(allocation: &Allocation, venue: &Venue, slot: &WorkingSlot) -> bool {
    allocation.same_unit(slot.module_id, slot.semester_module_id)
        && slot.key.start >= allocation.window_start()
        && slot.key.end <= allocation.window_end()
        && slot.key.duration() == allocation.duration_minutes
        && slot.capacity_used + allocation.number_of_students <= venue.capacity_limit()
}

/// Ranges of feasible start minutes `[from, to]` (both inclusive) between the
/// existing slots of one venue and day. `slots` must be sorted by start.
pub fn free_windows<'a>(
    allocation: &Allocation,
    slots: impl Iterator<Item = &'a WorkingSlot>,
) -> Vec<(Minute, Minute)> {
    let Some(latest) = allocation.latest_start() else {
        return Vec::new();
    };
    let duration = allocation.duration_minutes;
    let mut cursor = allocation.window_start();
    let mut windows = Vec::new();

    for slot in slots {
        if slot.key.end <= cursor {
            continue;
        }
        if slot.key.start >= cursor + duration {
            let last = (slot.key.start - duration).min(latest);
            windows.push((cursor, last));
        }
        cursor = cursor.max(slot.key.end);
        if cursor > latest {
            return windows;
        }
    }

    // tail after the last slot, or the whole window on an empty day
    windows.push((cursor, latest));
    windows
}
