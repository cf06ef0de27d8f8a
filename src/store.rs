use crate::data::{
    Allocation, AllocationId, DayOfWeek, PlanSlot, TermId, Venue, VenueTypeId,
};
use crate::error::StoreError;
use log::debug;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub type StoreResult<T> = Result<T, StoreError>;

pub const BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS venue (
    id        INTEGER PRIMARY KEY,
    capacity  INTEGER NOT NULL,
    type_id   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS allocation (
    id                      INTEGER PRIMARY KEY,
    term_id                 INTEGER NOT NULL,
    lecturer_id             TEXT NOT NULL,
    module_id               INTEGER NOT NULL,
    semester_module_id      INTEGER NOT NULL,
    duration_minutes        INTEGER NOT NULL,
    number_of_students      INTEGER NOT NULL,
    allowed_days            TEXT NOT NULL,
    start_time              TEXT NOT NULL,
    end_time                TEXT NOT NULL,
    required_venue_type_ids TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_allocation_term ON allocation (term_id);
CREATE TABLE IF NOT EXISTS plan_slot (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    term_id            INTEGER NOT NULL,
    venue_id           INTEGER NOT NULL REFERENCES venue (id),
    day_of_week        TEXT NOT NULL,
    start_time         TEXT NOT NULL,
    end_time           TEXT NOT NULL,
    capacity_used      INTEGER NOT NULL,
    module_id          INTEGER NOT NULL,
    semester_module_id INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_plan_slot_term ON plan_slot (term_id);
CREATE TABLE IF NOT EXISTS plan_slot_allocation (
    slot_id       INTEGER NOT NULL REFERENCES plan_slot (id) ON DELETE CASCADE,
    allocation_id INTEGER NOT NULL REFERENCES allocation (id),
    position      INTEGER NOT NULL,
    PRIMARY KEY (slot_id, allocation_id)
);
CREATE INDEX IF NOT EXISTS idx_member_allocation ON plan_slot_allocation (allocation_id);
"#;

const SLOT_COLUMNS: &str = "s.id, s.venue_id, s.day_of_week, s.start_time, s.end_time, \
     s.capacity_used, s.module_id, s.semester_module_id";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn get_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    /// Runs `f` inside one IMMEDIATE transaction. Commits on `Ok`, rolls back
    /// on `Err`. The connection stays locked for the whole call.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    pub fn upsert_venues(&self, venues: &[Venue]) -> StoreResult<usize> {
        self.transaction(|tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO venue (id, capacity, type_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT (id) DO UPDATE SET capacity = excluded.capacity, type_id = excluded.type_id",
            )?;
            for venue in venues {
                stmt.execute(params![venue.id, venue.capacity, venue.type_id])?;
            }
            Ok(venues.len())
        })
    }

    pub fn upsert_allocations(&self, term_id: TermId, allocations: &[Allocation]) -> StoreResult<usize> {
        self.transaction(|tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO allocation (
                    id, term_id, lecturer_id, module_id, semester_module_id, duration_minutes,
                    number_of_students, allowed_days, start_time, end_time, required_venue_type_ids
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (id) DO UPDATE SET
                    term_id = excluded.term_id,
                    lecturer_id = excluded.lecturer_id,
                    module_id = excluded.module_id,
                    semester_module_id = excluded.semester_module_id,
                    duration_minutes = excluded.duration_minutes,
                    number_of_students = excluded.number_of_students,
                    allowed_days = excluded.allowed_days,
                    start_time = excluded.start_time,
                    end_time = excluded.end_time,
                    required_venue_type_ids = excluded.required_venue_type_ids",
            )?;
            for a in allocations {
                stmt.execute(params![
                    a.id,
                    term_id,
                    a.lecturer_id,
                    a.module_id,
                    a.semester_module_id,
                    a.duration_minutes,
                    a.number_of_students,
                    serde_json::to_string(&a.allowed_days)?,
                    a.start_time,
                    a.end_time,
                    serde_json::to_string(&a.required_venue_type_ids)?,
                ])?;
            }
            Ok(allocations.len())
        })
    }

    pub fn venues(&self) -> StoreResult<Vec<Venue>> {
        let conn = self.get_conn()?;
        load_venues(&conn)
    }

    pub fn term_allocations(&self, term_id: TermId) -> StoreResult<Vec<Allocation>> {
        let conn = self.get_conn()?;
        load_term_allocations(&conn, term_id)
    }

    /// Term the allocation belongs to.
    pub fn allocation_term(&self, allocation_id: AllocationId) -> StoreResult<TermId> {
        self.get_conn()?
            .query_row(
                "SELECT term_id FROM allocation WHERE id = ?1",
                [allocation_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "allocation",
                id: allocation_id.to_string(),
            })
    }

    pub fn replace_term_slots(&self, term_id: TermId, slots: &[PlanSlot]) -> StoreResult<usize> {
        self.transaction(|tx| replace_term_slots(tx, term_id, slots))
    }

    pub fn term_slots(&self, term_id: TermId) -> StoreResult<Vec<PlanSlot>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {SLOT_COLUMNS} FROM plan_slot s WHERE s.term_id = ?1
             ORDER BY s.venue_id, s.day_of_week, s.start_time"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([term_id], map_slot_row)?;
        let mut slots = collect_slots(&conn, rows)?;
        // day names sort alphabetically in SQL
        slots.sort_by_key(|s| (s.venue_id, s.day_of_week, s.start_time));
        Ok(slots)
    }

    /// Every slot the lecturer teaches in, across terms.
    pub fn lecturer_slots(&self, lecturer_id: &str) -> StoreResult<Vec<PlanSlot>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT DISTINCT {SLOT_COLUMNS} FROM plan_slot s
             JOIN plan_slot_allocation m ON m.slot_id = s.id
             JOIN allocation a ON a.id = m.allocation_id
             WHERE a.lecturer_id = ?1
             ORDER BY s.day_of_week, s.start_time, s.venue_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([lecturer_id], map_slot_row)?;
        let mut slots = collect_slots(&conn, rows)?;
        slots.sort_by_key(|s| (s.day_of_week, s.start_time, s.venue_id));
        Ok(slots)
    }
}

pub fn load_venues(conn: &Connection) -> StoreResult<Vec<Venue>> {
    let mut stmt = conn.prepare("SELECT id, capacity, type_id FROM venue ORDER BY id")?;
    let venues = stmt
        .query_map([], |row| {
            Ok(Venue {
                id: row.get(0)?,
                capacity: row.get(1)?,
                type_id: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(venues)
}

pub fn load_term_allocations(conn: &Connection, term_id: TermId) -> StoreResult<Vec<Allocation>> {
    let mut stmt = conn.prepare(
        "SELECT id, lecturer_id, module_id, semester_module_id, duration_minutes,
                number_of_students, allowed_days, start_time, end_time, required_venue_type_ids
         FROM allocation WHERE term_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([term_id], |row| {
        Ok((
            Allocation {
                id: row.get(0)?,
                lecturer_id: row.get(1)?,
                module_id: row.get(2)?,
                semester_module_id: row.get(3)?,
                duration_minutes: row.get(4)?,
                number_of_students: row.get(5)?,
                allowed_days: BTreeSet::new(),
                start_time: row.get(7)?,
                end_time: row.get(8)?,
                required_venue_type_ids: BTreeSet::new(),
            },
            row.get::<_, String>(6)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut allocations = Vec::new();
    for row in rows {
        let (mut allocation, days, types) = row?;
        allocation.allowed_days = serde_json::from_str::<BTreeSet<DayOfWeek>>(&days)?;
        allocation.required_venue_type_ids = serde_json::from_str::<BTreeSet<VenueTypeId>>(&types)?;
        allocations.push(allocation);
    }
    Ok(allocations)
}

/// Deletes every stored slot of the term and writes `slots` in their place.
/// Must run inside a transaction.
pub fn replace_term_slots(tx: &Transaction<'_>, term_id: TermId, slots: &[PlanSlot]) -> StoreResult<usize> {
    let removed = tx.execute("DELETE FROM plan_slot WHERE term_id = ?1", [term_id])?;

    let mut insert_slot = tx.prepare(
        "INSERT INTO plan_slot (
            term_id, venue_id, day_of_week, start_time, end_time,
            capacity_used, module_id, semester_module_id
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut insert_member = tx.prepare(
        "INSERT INTO plan_slot_allocation (slot_id, allocation_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for slot in slots {
        let slot_id = insert_slot.insert(params![
            term_id,
            slot.venue_id,
            slot.day_of_week.as_str(),
            slot.start_time,
            slot.end_time,
            slot.capacity_used,
            slot.module_id,
            slot.semester_module_id,
        ])?;
        for (position, allocation_id) in slot.allocation_ids.iter().enumerate() {
            insert_member.execute(params![slot_id, allocation_id, position as i64])?;
        }
    }
    debug!(
        "Replaced {} stored slots of term {} with {}",
        removed,
        term_id,
        slots.len()
    );
    Ok(slots.len())
}

type SlotRow = (i64, PlanSlot, String);

fn map_slot_row(row: &Row<'_>) -> rusqlite::Result<SlotRow> {
    Ok((
        row.get(0)?,
        PlanSlot {
            venue_id: row.get(1)?,
            day_of_week: DayOfWeek::Monday,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
            capacity_used: row.get(5)?,
            module_id: row.get(6)?,
            semester_module_id: row.get(7)?,
            allocation_ids: Vec::new(),
        },
        row.get(2)?,
    ))
}

fn collect_slots(
    conn: &Connection,
    rows: impl Iterator<Item = rusqlite::Result<SlotRow>>,
) -> StoreResult<Vec<PlanSlot>> {
    let mut members = conn.prepare(
        "SELECT allocation_id FROM plan_slot_allocation WHERE slot_id = ?1 ORDER BY position",
    )?;
    let mut slots = Vec::new();
    for row in rows {
        let (slot_id, mut slot, day) = row?;
        slot.day_of_week = day.parse().map_err(|message| StoreError::Corrupt {
            column: "day_of_week",
            message,
        })?;
        slot.allocation_ids = members
            .query_map([slot_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        slots.push(slot);
    }
    Ok(slots)
}
