use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// Type aliases for clarity
pub type AllocationId = u32;
pub type VenueId = u32;
pub type VenueTypeId = u32;
pub type ModuleId = u32;
pub type SemesterModuleId = u32;
pub type TermId = u32;
pub type LecturerId = String;

/// Minutes since midnight.
pub type Minute = u32;

/// Weekday a slot can be booked on. Ordered Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monday" => Ok(DayOfWeek::Monday),
            "tuesday" => Ok(DayOfWeek::Tuesday),
            "wednesday" => Ok(DayOfWeek::Wednesday),
            "thursday" => Ok(DayOfWeek::Thursday),
            "friday" => Ok(DayOfWeek::Friday),
            "saturday" => Ok(DayOfWeek::Saturday),
            "sunday" => Ok(DayOfWeek::Sunday),
            other => Err(format!("unknown day of week '{other}'")),
        }
    }
}

/// A lecturer teaching a module to a group of students, waiting to be placed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub id: AllocationId,
    pub lecturer_id: LecturerId,
    pub module_id: ModuleId,
    pub semester_module_id: SemesterModuleId,
    pub duration_minutes: u32,
    pub number_of_students: u32,
    pub allowed_days: BTreeSet<DayOfWeek>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub required_venue_type_ids: BTreeSet<VenueTypeId>,
}

impl Allocation {
    pub fn window_start(&self) -> Minute {
        minutes(self.start_time)
    }

    pub fn window_end(&self) -> Minute {
        minutes(self.end_time)
    }

    /// Width of the daily window in minutes, zero if the window is inverted.
    pub fn window_width(&self) -> u32 {
        self.window_end().saturating_sub(self.window_start())
    }

    /// Latest start that still fits the window, if any.
    pub fn latest_start(&self) -> Option<Minute> {
        self.window_end()
            .checked_sub(self.duration_minutes)
            .filter(|latest| *latest >= self.window_start())
    }

    /// Same teaching unit: either identifier matching is enough.
    pub fn same_unit(&self, module_id: ModuleId, semester_module_id: SemesterModuleId) -> bool {
        self.module_id == module_id || self.semester_module_id == semester_module_id
    }
}

/// Represents a physical venue with a given capacity and type tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: VenueId,
    pub capacity: u32,
    pub type_id: VenueTypeId,
}

impl Venue {
    pub fn capacity_limit(&self) -> u32 {
        capacity_limit(self.capacity)
    }
}

/// Seats allowed with the fixed 10% overbooking tolerance, rounded down.
pub fn capacity_limit(capacity: u32) -> u32 {
    u32::try_from(u64::from(capacity) * 11 / 10).unwrap_or(u32::MAX)
}

pub fn minutes(time: NaiveTime) -> Minute {
    time.num_seconds_from_midnight() / 60
}

pub fn clock(minute: Minute) -> NaiveTime {
    debug_assert!(minute < 24 * 60);
    NaiveTime::from_num_seconds_from_midnight_opt(minute * 60, 0).unwrap_or_default()
}

/// A concrete weekly booking, possibly shared by several allocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSlot {
    pub venue_id: VenueId,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity_used: u32,
    pub module_id: ModuleId,
    pub semester_module_id: SemesterModuleId,
    pub allocation_ids: Vec<AllocationId>,
}

/// Input of a pure planning run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub venues: Vec<Venue>,
    pub allocations: Vec<Allocation>,
}

/// Describes a soft problem in a finished plan that was not prevented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PlanWarning {
    LecturerOverlap {
        lecturer_id: LecturerId,
        day_of_week: DayOfWeek,
        first: AllocationId,
        second: AllocationId,
    },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::LecturerOverlap {
                lecturer_id,
                day_of_week,
                first,
                second,
            } => write!(
                f,
                "[Lecturer Overlap] Lecturer {lecturer_id} teaches allocations {first} and {second} at overlapping times on {day_of_week}"
            ),
        }
    }
}

/// The final output of the planner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermPlan {
    pub slots: Vec<PlanSlot>,
    pub total_penalty: f64,
    pub warnings: Vec<PlanWarning>,
}
