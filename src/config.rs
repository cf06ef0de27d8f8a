use crate::planner::PlannerOptions;
use clap::Parser;

/// Timetable slot planner service.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "SLOT_PLANNER_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// SQLite database file.
    #[arg(long, env = "SLOT_PLANNER_DB", default_value = "slot_planner.db")]
    pub database: String,

    /// Never book a lecturer into two overlapping slots.
    #[arg(long, env = "SLOT_PLANNER_LECTURER_EXCLUSIVE", default_value_t = false)]
    pub lecturer_exclusive: bool,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, env = "SLOT_PLANNER_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn planner_options(&self) -> PlannerOptions {
        PlannerOptions {
            lecturer_exclusive: self.lecturer_exclusive,
        }
    }
}
