//! Scope-filtered attendance reporting.
//!
//! A report run composes four fragment kinds into one parameterised query:
//! the grouping's projection (possibly parameterised by location type), the
//! filter clauses, the caller's city-scope injection, and the grouping's
//! GROUP/ORDER/HAVING tail. Every user-supplied value is a bound parameter.

pub mod csv;
mod rows;

pub use rows::*;

use attend_core::{CityScope, DatabasePool, Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportGroupBy {
    Detail,
    Zone,
    Ward,
    City,
    Supervisor,
    Location,
    WardSummary,
    SupervisorSummary,
}

impl ReportGroupBy {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "detail" => Ok(Self::Detail),
            "zone" => Ok(Self::Zone),
            "ward" => Ok(Self::Ward),
            "city" => Ok(Self::City),
            "supervisor" => Ok(Self::Supervisor),
            "location" => Ok(Self::Location),
            "ward_summary" => Ok(Self::WardSummary),
            "supervisor_summary" => Ok(Self::SupervisorSummary),
            _ => Err(Error::validation(format!("Unknown group_by '{}'", value))),
        }
    }

    /// Fragment used in the download filename.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Detail => "detail",
            Self::Zone => "zone",
            Self::Ward => "ward",
            Self::City => "city",
            Self::Supervisor => "supervisor",
            Self::Location => "location",
            Self::WardSummary => "ward-summary",
            Self::SupervisorSummary => "supervisor-summary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    In,
    Out,
    #[default]
    Both,
}

impl LocationType {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            "both" => Ok(Self::Both),
            _ => Err(Error::validation(format!(
                "location_type must be in, out or both, got '{}'",
                value
            ))),
        }
    }

    /// SQL expression for the punch location, treating whitespace-only
    /// addresses as null.
    pub fn sql_expr(&self) -> &'static str {
        match self {
            Self::In => "NULLIF(TRIM(a.in_address), '')",
            Self::Out => "NULLIF(TRIM(a.out_address), '')",
            Self::Both => {
                "COALESCE(NULLIF(TRIM(a.in_address), ''), NULLIF(TRIM(a.out_address), ''), 'Unknown Location')"
            }
        }
    }
}

/// Everything the filter builder understands. All optional; omitted filters
/// impose nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilters {
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub zone_id: Option<i32>,
    pub ward_id: Option<i32>,
    pub city_id: Option<i32>,
    pub supervisor_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub emp_code: Option<String>,
    pub zone_name: Option<String>,
    pub ward_name: Option<String>,
    pub city_name: Option<String>,
    pub supervisor_name: Option<String>,
    pub search: Option<String>,
    pub location: Option<String>,
    pub has_punch_in: Option<bool>,
    pub has_punch_out: Option<bool>,
    #[serde(default)]
    pub absentees_only: bool,
}

const BASE_FROM: &str = "
FROM attendance a
INNER JOIN employees e ON a.emp_id = e.emp_id
LEFT JOIN wards w ON a.ward_id = w.ward_id
LEFT JOIN zones z ON w.zone_id = z.zone_id
LEFT JOIN cities c ON z.city_id = c.city_id";

const SUPERVISOR_FROM: &str = "
FROM attendance a
INNER JOIN employees e ON a.emp_id = e.emp_id
INNER JOIN wards w ON a.ward_id = w.ward_id
INNER JOIN zones z ON w.zone_id = z.zone_id
INNER JOIN cities c ON z.city_id = c.city_id
INNER JOIN supervisor_wards sw ON sw.ward_id = w.ward_id
INNER JOIN users u ON u.id = sw.supervisor_id";

/// supervisor_summary roots at users instead of attendance; its attendance
/// join is pinned to the absentee cutoff date.
const SUPERVISOR_SUMMARY_FROM: &str = "
FROM users u
INNER JOIN supervisor_wards sw ON sw.supervisor_id = u.id
INNER JOIN wards w ON w.ward_id = sw.ward_id
INNER JOIN zones z ON z.zone_id = w.zone_id
INNER JOIN cities c ON c.city_id = z.city_id
LEFT JOIN employees e ON e.ward_id = w.ward_id
LEFT JOIN attendance a ON a.emp_id = e.emp_id
    AND a.date = CURRENT_DATE - 1 AND a.punch_in_time IS NOT NULL";

pub struct ReportEngine {
    db: DatabasePool,
}

impl ReportEngine {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub async fn run(
        &self,
        group_by: ReportGroupBy,
        location_type: LocationType,
        filters: &ReportFilters,
        scope: &CityScope,
    ) -> Result<ReportRows> {
        let mut qb = build_query(group_by, location_type, filters, scope);

        let rows = match group_by {
            ReportGroupBy::Detail => ReportRows::Detail(
                qb.build_query_as::<DetailRow>().fetch_all(self.db.pool()).await?,
            ),
            ReportGroupBy::Zone => ReportRows::Zone(
                qb.build_query_as::<ZoneRow>().fetch_all(self.db.pool()).await?,
            ),
            ReportGroupBy::Ward => ReportRows::Ward(
                qb.build_query_as::<WardRow>().fetch_all(self.db.pool()).await?,
            ),
            ReportGroupBy::City => ReportRows::City(
                qb.build_query_as::<CityRow>().fetch_all(self.db.pool()).await?,
            ),
            ReportGroupBy::Supervisor => ReportRows::Supervisor(
                qb.build_query_as::<SupervisorRow>()
                    .fetch_all(self.db.pool())
                    .await?,
            ),
            ReportGroupBy::Location => ReportRows::Location(
                qb.build_query_as::<LocationRow>()
                    .fetch_all(self.db.pool())
                    .await?,
            ),
            ReportGroupBy::WardSummary => ReportRows::WardSummary(
                qb.build_query_as::<WardSummaryRow>()
                    .fetch_all(self.db.pool())
                    .await?,
            ),
            ReportGroupBy::SupervisorSummary => ReportRows::SupervisorSummary(
                qb.build_query_as::<SupervisorSummaryRow>()
                    .fetch_all(self.db.pool())
                    .await?,
            ),
        };

        Ok(rows)
    }
}

/// Assembles the full statement. Public for the fragment tests.
pub fn build_query(
    group_by: ReportGroupBy,
    location_type: LocationType,
    filters: &ReportFilters,
    scope: &CityScope,
) -> QueryBuilder<'static, Postgres> {
    let loc = location_type.sql_expr();
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");

    match group_by {
        ReportGroupBy::Detail => {
            qb.push(format!(
                "a.attendance_id, a.date, e.emp_code, e.name AS employee_name, e.phone, \
                 w.name AS ward, z.name AS zone, c.name AS city, c.city_id, \
                 a.punch_in_time, a.punch_out_time, a.duration, {} AS location, \
                 a.in_address, a.out_address",
                loc
            ));
            qb.push(BASE_FROM);
        }
        ReportGroupBy::Zone => {
            qb.push(
                "z.zone_id, z.name AS zone, c.name AS city, c.city_id, \
                 COUNT(*) AS total_records, COUNT(a.punch_in_time) AS punched_in, \
                 COUNT(a.punch_out_time) AS punched_out, COUNT(DISTINCT a.emp_id) AS employees",
            );
            qb.push(BASE_FROM);
        }
        ReportGroupBy::Ward => {
            qb.push(
                "w.ward_id, w.name AS ward, z.name AS zone, c.name AS city, c.city_id, \
                 COUNT(*) AS total_records, COUNT(a.punch_in_time) AS punched_in, \
                 COUNT(a.punch_out_time) AS punched_out, COUNT(DISTINCT a.emp_id) AS employees",
            );
            qb.push(BASE_FROM);
        }
        ReportGroupBy::City => {
            qb.push(
                "c.city_id, c.name AS city, \
                 COUNT(*) AS total_records, COUNT(a.punch_in_time) AS punched_in, \
                 COUNT(a.punch_out_time) AS punched_out, COUNT(DISTINCT a.emp_id) AS employees",
            );
            qb.push(BASE_FROM);
        }
        ReportGroupBy::Supervisor => {
            qb.push(
                "u.id AS supervisor_id, u.name AS supervisor_name, \
                 COUNT(DISTINCT w.ward_id) AS wards, COUNT(*) AS total_records, \
                 COUNT(a.punch_in_time) AS punched_in, COUNT(DISTINCT a.emp_id) AS employees",
            );
            qb.push(SUPERVISOR_FROM);
        }
        ReportGroupBy::Location => {
            qb.push(format!(
                "{} AS location, COUNT(*) AS punch_count, COUNT(DISTINCT a.emp_id) AS employee_count",
                loc
            ));
            qb.push(BASE_FROM);
        }
        ReportGroupBy::WardSummary => {
            qb.push(
                "w.ward_id, w.name AS ward, z.name AS zone, c.name AS city, c.city_id, \
                 (SELECT COUNT(*) FROM employees e2 WHERE e2.ward_id = w.ward_id) AS registered_employees, \
                 COUNT(DISTINCT a.emp_id) AS present_employees, \
                 COUNT(a.punch_in_time) AS punch_ins, COUNT(a.punch_out_time) AS punch_outs",
            );
            qb.push(BASE_FROM);
        }
        ReportGroupBy::SupervisorSummary => {
            qb.push(
                "u.id AS supervisor_id, u.name AS supervisor_name, u.phone, \
                 COUNT(DISTINCT w.ward_id) AS total_wards, \
                 COUNT(DISTINCT e.emp_id) AS total_employees, \
                 COUNT(DISTINCT a.emp_id) AS present_yesterday, \
                 COUNT(DISTINCT e.emp_id) - COUNT(DISTINCT a.emp_id) AS absentees",
            );
            qb.push(SUPERVISOR_SUMMARY_FROM);
        }
    }

    qb.push(" WHERE 1=1");
    push_filters(&mut qb, group_by, location_type, filters);
    push_scope(&mut qb, scope);

    match group_by {
        ReportGroupBy::Detail => {
            qb.push(" ORDER BY a.date DESC, employee_name");
        }
        ReportGroupBy::Zone => {
            qb.push(" GROUP BY z.zone_id, z.name, c.name, c.city_id ORDER BY city, zone");
        }
        ReportGroupBy::Ward => {
            qb.push(" GROUP BY w.ward_id, w.name, z.name, c.name, c.city_id ORDER BY city, zone, ward");
        }
        ReportGroupBy::City => {
            qb.push(" GROUP BY c.city_id, c.name ORDER BY city");
        }
        ReportGroupBy::Supervisor => {
            qb.push(" GROUP BY u.id, u.name ORDER BY supervisor_name");
        }
        ReportGroupBy::Location => {
            qb.push(" GROUP BY 1 ORDER BY punch_count DESC");
        }
        ReportGroupBy::WardSummary => {
            qb.push(" GROUP BY w.ward_id, w.name, z.name, c.name, c.city_id ORDER BY city, zone, ward");
        }
        ReportGroupBy::SupervisorSummary => {
            qb.push(" GROUP BY u.id, u.name, u.phone");
            if filters.absentees_only {
                qb.push(" HAVING COUNT(DISTINCT e.emp_id) - COUNT(DISTINCT a.emp_id) > 0");
            }
            qb.push(" ORDER BY supervisor_name");
        }
    }

    qb
}

/// Appends the caller's scope. An empty explicit scope short-circuits to a
/// false predicate: zero rows, not an error.
fn push_scope(qb: &mut QueryBuilder<'static, Postgres>, scope: &CityScope) {
    if scope.all {
        return;
    }
    if scope.is_empty() {
        qb.push(" AND 1 = 0");
        return;
    }
    qb.push(" AND c.city_id = ANY(");
    qb.push_bind(scope.ids());
    qb.push(")");
}

fn push_filters(
    qb: &mut QueryBuilder<'static, Postgres>,
    group_by: ReportGroupBy,
    location_type: LocationType,
    filters: &ReportFilters,
) {
    // The supervisor summary pins its attendance join to the cutoff date, so
    // per-punch filters do not apply there.
    let summary = group_by == ReportGroupBy::SupervisorSummary;

    if !summary {
        if let Some(date) = filters.date {
            qb.push(" AND a.date = ");
            qb.push_bind(date);
        }
        if let Some(start) = filters.start_date {
            qb.push(" AND a.date >= ");
            qb.push_bind(start);
        }
        if let Some(end) = filters.end_date {
            qb.push(" AND a.date <= ");
            qb.push_bind(end);
        }
        if let Some(employee_id) = filters.employee_id {
            qb.push(" AND a.emp_id = ");
            qb.push_bind(employee_id);
        }
        if let Some(emp_code) = &filters.emp_code {
            qb.push(" AND e.emp_code = ");
            qb.push_bind(emp_code.clone());
        }
        if let Some(has_punch_in) = filters.has_punch_in {
            qb.push(if has_punch_in {
                " AND a.punch_in_time IS NOT NULL"
            } else {
                " AND a.punch_in_time IS NULL"
            });
        }
        if let Some(has_punch_out) = filters.has_punch_out {
            qb.push(if has_punch_out {
                " AND a.punch_out_time IS NOT NULL"
            } else {
                " AND a.punch_out_time IS NULL"
            });
        }
        if let Some(location) = &filters.location {
            qb.push(format!(" AND {} ILIKE ", location_type.sql_expr()));
            qb.push_bind(format!("%{}%", location));
        }
        if let Some(search) = &filters.search {
            let needle = format!("%{}%", search);
            qb.push(" AND (e.name ILIKE ");
            qb.push_bind(needle.clone());
            qb.push(" OR e.emp_code ILIKE ");
            qb.push_bind(needle.clone());
            qb.push(" OR w.name ILIKE ");
            qb.push_bind(needle.clone());
            qb.push(" OR z.name ILIKE ");
            qb.push_bind(needle.clone());
            qb.push(" OR c.name ILIKE ");
            qb.push_bind(needle);
            qb.push(")");
        }
    }

    if let Some(zone_id) = filters.zone_id {
        qb.push(" AND z.zone_id = ");
        qb.push_bind(zone_id);
    }
    if let Some(ward_id) = filters.ward_id {
        qb.push(" AND w.ward_id = ");
        qb.push_bind(ward_id);
    }
    if let Some(city_id) = filters.city_id {
        qb.push(" AND c.city_id = ");
        qb.push_bind(city_id);
    }
    if let Some(zone_name) = &filters.zone_name {
        qb.push(" AND z.name ILIKE ");
        qb.push_bind(format!("%{}%", zone_name));
    }
    if let Some(ward_name) = &filters.ward_name {
        qb.push(" AND w.name ILIKE ");
        qb.push_bind(format!("%{}%", ward_name));
    }
    if let Some(city_name) = &filters.city_name {
        qb.push(" AND c.name ILIKE ");
        qb.push_bind(format!("%{}%", city_name));
    }

    match group_by {
        ReportGroupBy::Supervisor | ReportGroupBy::SupervisorSummary => {
            if let Some(supervisor_id) = filters.supervisor_id {
                qb.push(" AND u.id = ");
                qb.push_bind(supervisor_id);
            }
            if let Some(supervisor_name) = &filters.supervisor_name {
                qb.push(" AND u.name ILIKE ");
                qb.push_bind(format!("%{}%", supervisor_name));
            }
        }
        _ => {
            if let Some(supervisor_id) = filters.supervisor_id {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM supervisor_wards sw2 \
                     WHERE sw2.ward_id = a.ward_id AND sw2.supervisor_id = ",
                );
                qb.push_bind(supervisor_id);
                qb.push(")");
            }
            if let Some(supervisor_name) = &filters.supervisor_name {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM supervisor_wards sw2 \
                     INNER JOIN users u2 ON u2.id = sw2.supervisor_id \
                     WHERE sw2.ward_id = a.ward_id AND u2.name ILIKE ",
                );
                qb.push_bind(format!("%{}%", supervisor_name));
                qb.push(")");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_for(
        group_by: ReportGroupBy,
        location_type: LocationType,
        filters: &ReportFilters,
        scope: &CityScope,
    ) -> String {
        build_query(group_by, location_type, filters, scope)
            .sql()
            .to_string()
    }

    #[test]
    fn values_are_always_bound_never_interpolated() {
        let filters = ReportFilters {
            city_name: Some("Delhi'; DROP TABLE attendance; --".to_string()),
            search: Some("x".to_string()),
            ..Default::default()
        };
        let sql = sql_for(
            ReportGroupBy::Detail,
            LocationType::Both,
            &filters,
            &CityScope::all_cities(),
        );
        assert!(!sql.contains("DROP TABLE"));
        assert!(sql.contains("c.name ILIKE $"));
    }

    #[test]
    fn empty_scope_short_circuits_to_false() {
        let sql = sql_for(
            ReportGroupBy::Ward,
            LocationType::Both,
            &ReportFilters::default(),
            &CityScope::of([]),
        );
        assert!(sql.contains("AND 1 = 0"));
        assert!(!sql.contains("ANY"));
    }

    #[test]
    fn explicit_scope_uses_any_bind() {
        let sql = sql_for(
            ReportGroupBy::Ward,
            LocationType::Both,
            &ReportFilters::default(),
            &CityScope::of([2, 5]),
        );
        assert!(sql.contains("c.city_id = ANY($"));
    }

    #[test]
    fn all_scope_adds_nothing() {
        let sql = sql_for(
            ReportGroupBy::City,
            LocationType::Both,
            &ReportFilters::default(),
            &CityScope::all_cities(),
        );
        assert!(!sql.contains("ANY"));
        assert!(!sql.contains("1 = 0"));
    }

    #[test]
    fn location_expression_varies_by_type() {
        let both = LocationType::Both.sql_expr();
        assert!(both.contains("COALESCE"));
        assert!(both.contains("Unknown Location"));

        assert_eq!(LocationType::In.sql_expr(), "NULLIF(TRIM(a.in_address), '')");
        assert_eq!(LocationType::Out.sql_expr(), "NULLIF(TRIM(a.out_address), '')");
    }

    #[test]
    fn boolean_filters_use_null_checks() {
        let filters = ReportFilters {
            has_punch_in: Some(true),
            has_punch_out: Some(false),
            ..Default::default()
        };
        let sql = sql_for(
            ReportGroupBy::Detail,
            LocationType::Both,
            &filters,
            &CityScope::all_cities(),
        );
        assert!(sql.contains("a.punch_in_time IS NOT NULL"));
        assert!(sql.contains("a.punch_out_time IS NULL"));
    }

    #[test]
    fn supervisor_summary_roots_at_users_and_has_absentee_having() {
        let filters = ReportFilters {
            absentees_only: true,
            ..Default::default()
        };
        let sql = sql_for(
            ReportGroupBy::SupervisorSummary,
            LocationType::Both,
            &filters,
            &CityScope::all_cities(),
        );
        assert!(sql.contains("FROM users u"));
        assert!(sql.contains("CURRENT_DATE - 1"));
        assert!(sql.contains("HAVING COUNT(DISTINCT e.emp_id) - COUNT(DISTINCT a.emp_id) > 0"));
    }

    #[test]
    fn supervisor_summary_ignores_punch_filters() {
        let filters = ReportFilters {
            has_punch_in: Some(true),
            date: Some(NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()),
            city_id: Some(7),
            ..Default::default()
        };
        let sql = sql_for(
            ReportGroupBy::SupervisorSummary,
            LocationType::Both,
            &filters,
            &CityScope::all_cities(),
        );
        // The only punch_in_time predicate is the one pinned inside the join.
        assert_eq!(sql.matches("a.punch_in_time IS NOT NULL").count(), 1);
        assert!(sql.contains("c.city_id = $"));
    }

    #[test]
    fn group_by_parse_covers_all_variants() {
        for name in [
            "detail",
            "zone",
            "ward",
            "city",
            "supervisor",
            "location",
            "ward_summary",
            "supervisor_summary",
        ] {
            assert!(ReportGroupBy::parse(name).is_ok(), "{}", name);
        }
        assert!(ReportGroupBy::parse("galaxy").is_err());
    }
}
