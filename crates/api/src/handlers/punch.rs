//! Mobile punch surface: get-or-create, manual punch, face-verified punch
//! (single and group), enrolment, and the image streaming proxy.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use attend_auth::{authenticate, authorize, AuthState};
use attend_core::{AuthUser, Error};
use attend_workforce::punch::{PunchLocation, PunchRequest};
use attend_workforce::storage::basename;
use attend_workforce::PunchType;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put, Router},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

pub fn app_attendance_routes(auth: &AuthState) -> Router<AppState> {
    let manage = Router::new()
        .route("/", post(ensure_record))
        .route("/", put(manual_punch))
        .route("/face-attendance", post(face_punch))
        .route("/faceRoutes/store-face", post(store_face))
        .route("/faceRoutes/:emp_id", delete(remove_face))
        .layer(from_fn_with_state(
            auth.clone(),
            authorize("attendance", "manage"),
        ));

    let view = Router::new().route("/image", get(stream_image));

    manage
        .merge(view)
        .layer(from_fn_with_state(auth.clone(), authenticate))
}

#[derive(Debug, Deserialize)]
struct EnsureRecordRequest {
    emp_id: i64,
}

async fn ensure_record(
    State(state): State<AppState>,
    Json(payload): Json<EnsureRecordRequest>,
) -> ApiResult<Response> {
    let (record, created) = state.punch.ensure_today(payload.emp_id).await?;
    let (status, message) = if created {
        (StatusCode::CREATED, "Record created")
    } else {
        (StatusCode::OK, "Record exists, skipping")
    };
    Ok((status, Json(json!({ "message": message, "attendance": record }))).into_response())
}

/// Fields shared by the multipart punch endpoints.
#[derive(Debug, Default)]
struct PunchForm {
    punch_type: Option<String>,
    emp_id: Option<i64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: Option<String>,
    group_mode: bool,
    image: Option<Bytes>,
}

async fn read_punch_form(mut multipart: Multipart) -> Result<PunchForm, Error> {
    let mut form = PunchForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "file" | "photo" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::validation(format!("Failed to read image: {}", e)))?;
                form.image = Some(bytes);
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::validation(format!("Failed to read field: {}", e)))?;
                match name.as_str() {
                    "punch_type" => form.punch_type = Some(text),
                    "emp_id" => {
                        form.emp_id = Some(text.parse().map_err(|_| {
                            Error::validation("emp_id must be an integer")
                        })?);
                    }
                    "latitude" => form.latitude = text.parse().ok(),
                    "longitude" => form.longitude = text.parse().ok(),
                    "address" => form.address = Some(text),
                    "group_mode" | "is_group" => {
                        form.group_mode = matches!(text.as_str(), "true" | "1" | "yes");
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(form)
}

impl PunchForm {
    fn into_request(self, actor: i64) -> Result<PunchRequest, Error> {
        let punch_type = self
            .punch_type
            .as_deref()
            .ok_or_else(|| Error::validation("punch_type is required"))?;

        Ok(PunchRequest {
            punch_type: PunchType::parse(punch_type)?,
            image: self.image,
            location: PunchLocation {
                latitude: self.latitude,
                longitude: self.longitude,
                address: self.address,
            },
            emp_id: self.emp_id,
            actor: Some(actor),
        })
    }
}

/// Manual punch with an employee hint; no face matching.
async fn manual_punch(
    State(state): State<AppState>,
    actor: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let form = read_punch_form(multipart).await.map_err(ApiError)?;
    let group_mode = form.group_mode;
    if group_mode {
        return Err(ApiError(Error::validation(
            "Group mode requires the face-attendance endpoint",
        )));
    }

    let request = form.into_request(actor.user_id).map_err(ApiError)?;
    let outcome = state.punch.punch(&request).await?;
    Ok(Json(json!({
        "message": format!("Punched {}", outcome.punch_type),
        "employee_name": outcome.employee_name,
        "attendance": outcome.attendance,
    })))
}

/// Face-verified punch; `group_mode` fans out over every detected face.
async fn face_punch(
    State(state): State<AppState>,
    actor: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let form = read_punch_form(multipart).await.map_err(ApiError)?;
    let group_mode = form.group_mode;
    let request = form.into_request(actor.user_id).map_err(ApiError)?;

    if group_mode {
        let response = state.punch.group_punch(&request).await?;
        return Ok(Json(serde_json::to_value(&response).unwrap_or(Value::Null)));
    }

    let outcome = state.punch.face_punch(&request).await?;
    Ok(Json(json!({
        "message": format!("Punched {}", outcome.punch_type),
        "employee_name": outcome.employee_name,
        "similarity": outcome.similarity,
        "attendance": outcome.attendance,
    })))
}

#[derive(Debug, Deserialize)]
struct ImageQuery {
    attendance_id: i64,
    punch_type: String,
}

/// Streams a stored punch image with the origin's content type.
async fn stream_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> ApiResult<Response> {
    let punch_type = PunchType::parse(&query.punch_type).map_err(ApiError)?;
    let record = state
        .attendance
        .get_by_id(query.attendance_id)
        .await?
        .ok_or_else(|| ApiError(Error::not_found("Attendance record not found")))?;

    let reference = match punch_type {
        PunchType::In => record.punch_in_image_ref,
        PunchType::Out => record.punch_out_image_ref,
    }
    .ok_or_else(|| ApiError(Error::not_found("Image not found")))?;

    let fetched = state.store.fetch(&reference).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, fetched.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", basename(&reference)),
            ),
        ],
        fetched.bytes,
    )
        .into_response())
}

async fn store_face(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut emp_id: Option<i64> = None;
    let mut image: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(Error::validation(format!("Malformed multipart body: {}", e))))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "file" | "photo" => {
                image = Some(field.bytes().await.map_err(|e| {
                    ApiError(Error::validation(format!("Failed to read image: {}", e)))
                })?);
            }
            "emp_id" => {
                let text = field.text().await.map_err(|e| {
                    ApiError(Error::validation(format!("Failed to read field: {}", e)))
                })?;
                emp_id = Some(text.parse().map_err(|_| {
                    ApiError(Error::validation("emp_id must be an integer"))
                })?);
            }
            _ => {}
        }
    }

    let emp_id = emp_id.ok_or_else(|| ApiError(Error::validation("emp_id is required")))?;
    let image = image.ok_or_else(|| ApiError(Error::validation("image is required")))?;

    let outcome = state.enrolment.enrol(emp_id, image).await?;
    Ok((StatusCode::CREATED, Json(json!({ "enrolment": outcome }))))
}

async fn remove_face(
    State(state): State<AppState>,
    Path(emp_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.enrolment.unenrol(emp_id).await?;
    Ok(Json(json!({ "message": "Enrollment removed" })))
}
