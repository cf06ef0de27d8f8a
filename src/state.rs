use crate::data::{
    Allocation, AllocationId, DayOfWeek, LecturerId, Minute, ModuleId, PlanSlot, SemesterModuleId,
    VenueId, clock,
};
use crate::placement::{Placement, PlacementKind};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// Composite identity of a slot. Ordering groups slots by venue, then day,
/// then start, which makes every (venue, day) a contiguous range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub venue_id: VenueId,
    pub day: DayOfWeek,
    pub start: Minute,
    pub end: Minute,
}

impl SlotKey {
    pub fn duration(&self) -> u32 {
        self.end - self.start
    }

    pub fn overlaps(&self, start: Minute, end: Minute) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, Clone)]
pub struct WorkingSlot {
    pub key: SlotKey,
    pub capacity_used: u32,
    pub module_id: ModuleId,
    pub semester_module_id: SemesterModuleId,
    pub allocation_ids: Vec<AllocationId>,
}

/// Mutable working set of one planning run.
#[derive(Debug, Default)]
pub struct PlanningState {
    slots: BTreeMap<SlotKey, WorkingSlot>,
    venue_load: HashMap<VenueId, u32>,
    bookings: HashMap<LecturerId, HashMap<DayOfWeek, Vec<SlotKey>>>,
}

impl PlanningState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots on one venue and day, sorted by start.
    pub fn day_slots(&self, venue_id: VenueId, day: DayOfWeek) -> impl Iterator<Item = &WorkingSlot> {
        let from = SlotKey {
            venue_id,
            day,
            start: Minute::MIN,
            end: Minute::MIN,
        };
        let to = SlotKey {
            venue_id,
            day,
            start: Minute::MAX,
            end: Minute::MAX,
        };
        self.slots.range(from..=to).map(|(_, slot)| slot)
    }

    pub fn day_slot_count(&self, venue_id: VenueId, day: DayOfWeek) -> usize {
        self.day_slots(venue_id, day).count()
    }

    /// Number of slots opened in the venue so far, merges not counted.
    pub fn venue_load(&self, venue_id: VenueId) -> u32 {
        self.venue_load.get(&venue_id).copied().unwrap_or(0)
    }

    /// Whether the lecturer already sits in another slot overlapping `[start, end)`.
    pub fn lecturer_busy(
        &self,
        lecturer_id: &str,
        day: DayOfWeek,
        start: Minute,
        end: Minute,
        joining: Option<&SlotKey>,
    ) -> bool {
        self.bookings
            .get(lecturer_id)
            .and_then(|days| days.get(&day))
            .is_some_and(|keys| {
                keys.iter()
                    .any(|key| Some(key) != joining && key.overlaps(start, end))
            })
    }

    /// Applies a placement. Returns `false` and leaves the state untouched
    /// if the target slot is missing or the new slot's key is already taken.
    pub fn commit(&mut self, allocation: &Allocation, placement: &Placement) -> bool {
        let key = match placement.kind {
            PlacementKind::Combine(key) => {
                let Some(slot) = self.slots.get_mut(&key) else {
                    return false;
                };
                slot.capacity_used += allocation.number_of_students;
                slot.allocation_ids.push(allocation.id);
                key
            }
            PlacementKind::Open { start } => {
                let key = SlotKey {
                    venue_id: placement.venue_id,
                    day: placement.day,
                    start,
                    end: start + allocation.duration_minutes,
                };
                let Entry::Vacant(entry) = self.slots.entry(key) else {
                    return false;
                };
                entry.insert(WorkingSlot {
                    key,
                    capacity_used: allocation.number_of_students,
                    module_id: allocation.module_id,
                    semester_module_id: allocation.semester_module_id,
                    allocation_ids: vec![allocation.id],
                });
                *self.venue_load.entry(placement.venue_id).or_insert(0) += 1;
                key
            }
        };

        let booked = self
            .bookings
            .entry(allocation.lecturer_id.clone())
            .or_default()
            .entry(placement.day)
            .or_default();
        if !booked.contains(&key) {
            booked.push(key);
        }
        true
    }

    /// Flattens the working set into output records, ordered by venue, day and start.
    pub fn into_plan_slots(self) -> Vec<PlanSlot> {
        self.slots
            .into_values()
            .map(|slot| PlanSlot {
                venue_id: slot.key.venue_id,
                day_of_week: slot.key.day,
                start_time: clock(slot.key.start),
                end_time: clock(slot.key.end),
                capacity_used: slot.capacity_used,
                module_id: slot.module_id,
                semester_module_id: slot.semester_module_id,
                allocation_ids: slot.allocation_ids,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::allocation;

    fn open(venue_id: VenueId, day: DayOfWeek, start: Minute) -> Placement {
        Placement {
            venue_id,
            day,
            kind: PlacementKind::Open { start },
            score: 0.0,
        }
    }

    #[test]
    fn new_slots_bump_venue_load_merges_do_not() {
        let mut state = PlanningState::new();
        let first = allocation(1, 1, "08:00", "12:00", 60);
        let second = allocation(2, 1, "08:00", "12:00", 60);

        state.commit(&first, &open(3, DayOfWeek::Monday, 480));
        let key = SlotKey {
            venue_id: 3,
            day: DayOfWeek::Monday,
            start: 480,
            end: 540,
        };
        state.commit(
            &second,
            &Placement {
                venue_id: 3,
                day: DayOfWeek::Monday,
                kind: PlacementKind::Combine(key),
                score: 0.0,
            },
        );

        assert_eq!(state.venue_load(3), 1);
        assert_eq!(state.day_slot_count(3, DayOfWeek::Monday), 1);
        let slot = state.day_slots(3, DayOfWeek::Monday).next().expect("slot");
        assert_eq!(slot.capacity_used, 40);
        assert_eq!(slot.allocation_ids, vec![1, 2]);
    }

    #[test]
    fn commit_never_replaces_an_existing_slot() {
        let mut state = PlanningState::new();
        assert!(state.commit(&allocation(1, 1, "08:00", "12:00", 60), &open(1, DayOfWeek::Monday, 480)));
        assert!(!state.commit(&allocation(2, 2, "08:00", "12:00", 60), &open(1, DayOfWeek::Monday, 480)));

        let slot = state.day_slots(1, DayOfWeek::Monday).next().expect("slot");
        assert_eq!(slot.allocation_ids, vec![1]);
        assert_eq!(state.venue_load(1), 1);

        let missing = SlotKey {
            venue_id: 1,
            day: DayOfWeek::Tuesday,
            start: 480,
            end: 540,
        };
        let join = Placement {
            venue_id: 1,
            day: DayOfWeek::Tuesday,
            kind: PlacementKind::Combine(missing),
            score: 0.0,
        };
        assert!(!state.commit(&allocation(3, 1, "08:00", "12:00", 60), &join));
        assert!(!state.lecturer_busy("lecturer-3", DayOfWeek::Tuesday, 480, 540, None));
    }

    #[test]
    fn day_slots_are_sorted_and_scoped() {
        let mut state = PlanningState::new();
        state.commit(&allocation(1, 1, "08:00", "18:00", 60), &open(1, DayOfWeek::Monday, 600));
        state.commit(&allocation(2, 2, "08:00", "18:00", 60), &open(1, DayOfWeek::Monday, 480));
        state.commit(&allocation(3, 3, "08:00", "18:00", 60), &open(1, DayOfWeek::Tuesday, 480));
        state.commit(&allocation(4, 4, "08:00", "18:00", 60), &open(2, DayOfWeek::Monday, 540));

        let starts: Vec<_> = state
            .day_slots(1, DayOfWeek::Monday)
            .map(|s| s.key.start)
            .collect();
        assert_eq!(starts, vec![480, 600]);
        assert_eq!(state.day_slot_count(1, DayOfWeek::Tuesday), 1);
        assert_eq!(state.venue_load(1), 3);
        assert_eq!(state.venue_load(2), 1);
    }

    #[test]
    fn lecturer_bookings_ignore_the_joined_slot() {
        let mut state = PlanningState::new();
        let a = allocation(1, 1, "08:00", "18:00", 60);
        state.commit(&a, &open(1, DayOfWeek::Monday, 480));
        let key = SlotKey {
            venue_id: 1,
            day: DayOfWeek::Monday,
            start: 480,
            end: 540,
        };

        assert!(state.lecturer_busy(&a.lecturer_id, DayOfWeek::Monday, 510, 570, None));
        assert!(!state.lecturer_busy(&a.lecturer_id, DayOfWeek::Monday, 480, 540, Some(&key)));
        assert!(!state.lecturer_busy(&a.lecturer_id, DayOfWeek::Monday, 540, 600, None));
        assert!(!state.lecturer_busy(&a.lecturer_id, DayOfWeek::Tuesday, 480, 540, None));
    }

    #[test]
    fn assembler_renders_clock_times() {
        let mut state = PlanningState::new();
        state.commit(&allocation(1, 1, "09:00", "12:00", 120), &open(1, DayOfWeek::Monday, 540));

        let slots = state.into_plan_slots();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start_time.to_string(), "09:00:00");
        assert_eq!(slots[0].end_time.to_string(), "11:00:00");
        assert_eq!(slots[0].allocation_ids, vec![1]);
    }
}
