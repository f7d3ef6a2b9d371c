//! Attendance records and the report download surface.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use attend_auth::{attach_city_scope, authenticate, authorize, require_city_scope, AuthState};
use attend_core::{CityScope, Error, PermissionScopes};
use attend_workforce::report::{csv, LocationType, ReportFilters, ReportGroupBy};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Json, Response},
    routing::{get, post, Router},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn attendance_routes(auth: &AuthState) -> Router<AppState> {
    let record = Router::new()
        .route("/", post(ensure_record))
        .route("/today", get(today_record))
        .layer(from_fn_with_state(
            auth.clone(),
            authorize("attendance", "manage"),
        ))
        .layer(from_fn_with_state(auth.clone(), authenticate));

    let reporting = Router::new()
        .route("/download", get(download_report))
        .route("/short-report", get(short_report))
        .layer(from_fn_with_state(
            auth.clone(),
            authorize("attendance", "download"),
        ))
        .layer(from_fn(require_city_scope))
        .layer(from_fn_with_state(auth.clone(), attach_city_scope))
        .layer(from_fn_with_state(auth.clone(), authenticate));

    record.merge(reporting)
}

#[derive(Debug, Deserialize)]
struct EnsureRecordRequest {
    emp_id: i64,
}

/// Get-or-create of today's record. An existing row comes back as
/// `200 Record exists, skipping`; a fresh one as `201`.
async fn ensure_record(
    State(state): State<AppState>,
    Json(payload): Json<EnsureRecordRequest>,
) -> ApiResult<Response> {
    let (record, created) = state.punch.ensure_today(payload.emp_id).await?;

    let response = if created {
        (
            StatusCode::CREATED,
            Json(json!({ "message": "Record created", "attendance": record })),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({ "message": "Record exists, skipping", "attendance": record })),
        )
    };
    Ok(response.into_response())
}

#[derive(Debug, Deserialize)]
struct TodayQuery {
    emp_id: i64,
}

async fn today_record(
    State(state): State<AppState>,
    Query(query): Query<TodayQuery>,
) -> ApiResult<Json<Value>> {
    let date = state.punch.calendar().logical_date(Utc::now());
    let record = state
        .attendance
        .get_by_employee_and_date(query.emp_id, date)
        .await?;
    Ok(Json(json!({ "date": date, "attendance": record })))
}

// Query-string deserialization keeps every field inline; the filters are
// assembled below (serde flatten does not mix with urlencoded primitives).
#[derive(Debug, Deserialize)]
struct DownloadQuery {
    format: Option<String>,
    group_by: Option<String>,
    location_type: Option<String>,
    date: Option<NaiveDate>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    zone_id: Option<i32>,
    ward_id: Option<i32>,
    city_id: Option<i32>,
    supervisor_id: Option<i64>,
    employee_id: Option<i64>,
    emp_code: Option<String>,
    zone_name: Option<String>,
    ward_name: Option<String>,
    city_name: Option<String>,
    supervisor_name: Option<String>,
    search: Option<String>,
    location: Option<String>,
    has_punch_in: Option<bool>,
    has_punch_out: Option<bool>,
    #[serde(default)]
    absentees_only: bool,
}

impl DownloadQuery {
    fn filters(&self) -> ReportFilters {
        ReportFilters {
            date: self.date,
            start_date: self.start_date,
            end_date: self.end_date,
            zone_id: self.zone_id,
            ward_id: self.ward_id,
            city_id: self.city_id,
            supervisor_id: self.supervisor_id,
            employee_id: self.employee_id,
            emp_code: self.emp_code.clone(),
            zone_name: self.zone_name.clone(),
            ward_name: self.ward_name.clone(),
            city_name: self.city_name.clone(),
            supervisor_name: self.supervisor_name.clone(),
            search: self.search.clone(),
            location: self.location.clone(),
            has_punch_in: self.has_punch_in,
            has_punch_out: self.has_punch_out,
            absentees_only: self.absentees_only,
        }
    }
}

async fn download_report(
    State(state): State<AppState>,
    scope: CityScope,
    scopes: PermissionScopes,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let group_by = match &query.group_by {
        Some(value) => ReportGroupBy::parse(value).map_err(ApiError)?,
        None => ReportGroupBy::Detail,
    };
    let location_type = match &query.location_type {
        Some(value) => LocationType::parse(value).map_err(ApiError)?,
        None => LocationType::Both,
    };
    let effective = match scopes.get("attendance", "download") {
        Some(permission_scope) => scope.intersect(permission_scope),
        None => scope,
    };

    let filters = query.filters();
    let rows = state
        .reports
        .run(group_by, location_type, &filters, &effective)
        .await?;

    match query.format.as_deref().unwrap_or("json") {
        "csv" => {
            let body = csv::render(rows.csv_headers(), &rows.csv_cells());
            let filename = csv::filename(group_by.suffix(), Utc::now());
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                body,
            )
                .into_response())
        }
        "json" => Ok(Json(json!({
            "group_by": group_by,
            "location_type": location_type,
            "filters": filters,
            "count": rows.count(),
            "data": rows,
        }))
        .into_response()),
        other => Err(ApiError(Error::validation(format!(
            "format must be csv or json, got '{}'",
            other
        )))),
    }
}

#[derive(Debug, Deserialize)]
struct ShortReportQuery {
    #[serde(rename = "cityName")]
    city_name: Option<String>,
    #[serde(rename = "zoneName")]
    zone_name: Option<String>,
    date: Option<NaiveDate>,
}

/// Per-ward present/registered tallies for a single date.
async fn short_report(
    State(state): State<AppState>,
    Query(query): Query<ShortReportQuery>,
) -> ApiResult<Json<Value>> {
    let date = query
        .date
        .unwrap_or_else(|| state.punch.calendar().logical_date(Utc::now()));
    let tallies = state
        .attendance
        .ward_tallies(date, query.city_name.as_deref(), query.zone_name.as_deref())
        .await?;
    Ok(Json(json!({ "date": date, "count": tallies.len(), "wards": tallies })))
}
