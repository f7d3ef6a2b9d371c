//! Attendance persistence.
//!
//! Creation is serialised by the `(emp_id, date)` unique key: an idempotent
//! `INSERT ... ON CONFLICT DO NOTHING` followed by a re-select, so concurrent
//! first punches of the same employee converge on one row. The punch updates
//! re-check the current state inside the `UPDATE` itself; no application
//! lock is held.

use crate::models::Attendance;
use attend_core::{DatabasePool, Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Geo fields captured with a punch.
#[derive(Debug, Clone, Default)]
pub struct PunchLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WardTally {
    pub ward_id: i32,
    pub ward: String,
    pub zone: String,
    pub city: String,
    pub registered: i64,
    pub present: i64,
}

#[derive(Clone)]
pub struct AttendanceRepository {
    db: DatabasePool,
}

impl AttendanceRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, attendance_id: i64) -> Result<Option<Attendance>> {
        let record =
            sqlx::query_as::<_, Attendance>("SELECT * FROM attendance WHERE attendance_id = $1")
                .bind(attendance_id)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(record)
    }

    pub async fn get_by_employee_and_date(
        &self,
        emp_id: i64,
        date: NaiveDate,
    ) -> Result<Option<Attendance>> {
        let record = sqlx::query_as::<_, Attendance>(
            "SELECT * FROM attendance WHERE emp_id = $1 AND date = $2",
        )
        .bind(emp_id)
        .bind(date)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(record)
    }

    /// Idempotent creation. The employee's current ward is stamped on the
    /// row so reporting lineage survives later reassignment. Returns the row
    /// and whether this call created it.
    pub async fn get_or_create(&self, emp_id: i64, date: NaiveDate) -> Result<(Attendance, bool)> {
        let inserted = sqlx::query_as::<_, Attendance>(
            "INSERT INTO attendance (emp_id, date, ward_id)
             SELECT e.emp_id, $2, e.ward_id FROM employees e WHERE e.emp_id = $1
             ON CONFLICT (emp_id, date) DO NOTHING
             RETURNING *",
        )
        .bind(emp_id)
        .bind(date)
        .fetch_optional(self.db.pool())
        .await?;

        if let Some(record) = inserted {
            return Ok((record, true));
        }

        // Lost the race (or the row predates us): fetch the existing record.
        // A missing row here means the employee id itself was unknown.
        let existing = self
            .get_by_employee_and_date(emp_id, date)
            .await?
            .ok_or_else(|| Error::not_found("Employee not found"))?;

        Ok((existing, false))
    }

    /// The most recent open record eligible to be closed against `target`:
    /// dated within `[target - 1 day, target]`, punched in, not yet out.
    pub async fn find_open_record(
        &self,
        emp_id: i64,
        floor: NaiveDate,
        target: NaiveDate,
    ) -> Result<Option<Attendance>> {
        let record = sqlx::query_as::<_, Attendance>(
            "SELECT * FROM attendance
             WHERE emp_id = $1 AND date BETWEEN $2 AND $3
               AND punch_in_time IS NOT NULL AND punch_out_time IS NULL
             ORDER BY date DESC
             LIMIT 1",
        )
        .bind(emp_id)
        .bind(floor)
        .bind(target)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(record)
    }

    /// Stamps the punch-in. The `WHERE punch_in_time IS NULL` guard makes
    /// concurrent duplicates lose cleanly.
    pub async fn record_punch_in(
        &self,
        attendance_id: i64,
        at: DateTime<Utc>,
        image_ref: Option<&str>,
        location: &PunchLocation,
        actor: Option<i64>,
    ) -> Result<Attendance> {
        let updated = sqlx::query_as::<_, Attendance>(
            "UPDATE attendance
             SET punch_in_time = $2,
                 punch_in_image_ref = $3,
                 latitude_in = $4,
                 longitude_in = $5,
                 in_address = $6,
                 punched_in_by = $7
             WHERE attendance_id = $1 AND punch_in_time IS NULL
             RETURNING *",
        )
        .bind(attendance_id)
        .bind(at)
        .bind(image_ref)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.address.as_deref())
        .bind(actor)
        .fetch_optional(self.db.pool())
        .await?;

        updated.ok_or_else(|| Error::validation("Already punched in"))
    }

    /// Stamps the punch-out and the duration in minutes. Requires an open
    /// punched-in row.
    pub async fn record_punch_out(
        &self,
        attendance_id: i64,
        at: DateTime<Utc>,
        image_ref: Option<&str>,
        location: &PunchLocation,
        actor: Option<i64>,
    ) -> Result<Attendance> {
        let updated = sqlx::query_as::<_, Attendance>(
            "UPDATE attendance
             SET punch_out_time = $2,
                 punch_out_image_ref = $3,
                 latitude_out = $4,
                 longitude_out = $5,
                 out_address = $6,
                 punched_out_by = $7,
                 duration = (EXTRACT(EPOCH FROM ($2::timestamptz - punch_in_time)) / 60)::INT
             WHERE attendance_id = $1
               AND punch_in_time IS NOT NULL AND punch_out_time IS NULL
             RETURNING *",
        )
        .bind(attendance_id)
        .bind(at)
        .bind(image_ref)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.address.as_deref())
        .bind(actor)
        .fetch_optional(self.db.pool())
        .await?;

        updated.ok_or_else(|| Error::validation("Already punched out"))
    }

    /// Audit actors must reference an existing user; supervisor-assisted
    /// punches from deleted accounts fall back to NULL.
    pub async fn actor_exists(&self, user_id: i64) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(found.is_some())
    }

    /// Per-ward present/registered tallies for the short report.
    pub async fn ward_tallies(
        &self,
        date: NaiveDate,
        city_name: Option<&str>,
        zone_name: Option<&str>,
    ) -> Result<Vec<WardTally>> {
        let mut qb = sqlx::QueryBuilder::new(
            "SELECT w.ward_id,
                    w.name AS ward,
                    z.name AS zone,
                    c.name AS city,
                    COUNT(e.emp_id) AS registered,
                    COUNT(a.punch_in_time) AS present
             FROM wards w
             INNER JOIN zones z ON w.zone_id = z.zone_id
             INNER JOIN cities c ON z.city_id = c.city_id
             LEFT JOIN employees e ON e.ward_id = w.ward_id
             LEFT JOIN attendance a ON a.emp_id = e.emp_id AND a.date = ",
        );
        qb.push_bind(date);
        qb.push(" WHERE 1=1");
        if let Some(city) = city_name {
            qb.push(" AND c.name ILIKE ");
            qb.push_bind(format!("%{}%", city));
        }
        if let Some(zone) = zone_name {
            qb.push(" AND z.name ILIKE ");
            qb.push_bind(format!("%{}%", zone));
        }
        qb.push(" GROUP BY w.ward_id, w.name, z.name, c.name ORDER BY c.name, z.name, w.name");

        let tallies = qb
            .build_query_as::<WardTally>()
            .fetch_all(self.db.pool())
            .await?;
        Ok(tallies)
    }
}
