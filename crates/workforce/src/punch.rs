//! Face-verified punch orchestration.
//!
//! Observable order within one request: identify → verify → upload → update.
//! The image upload happens outside any database transaction; the state
//! transition itself is the idempotency boundary (a repeated punch-in is a
//! 400, never a duplicate row).

use crate::attendance::state::{status_of, validate_transition};
use crate::attendance::{AttendanceCalendar, AttendanceRepository, PunchType};
use crate::employees::EmployeeRepository;
use crate::face::FaceService;
use crate::imaging;
use crate::models::{Attendance, Employee};
use crate::storage::{ImageStore, DEFAULT_CONTENT_TYPE};
use attend_core::{Error, ErrorKind, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub use crate::attendance::repository::PunchLocation;

/// A punch request after multipart decoding.
#[derive(Debug, Clone)]
pub struct PunchRequest {
    pub punch_type: PunchType,
    pub image: Option<Bytes>,
    pub location: PunchLocation,
    /// Employee hint; required for manual punches, optional for face punches.
    pub emp_id: Option<i64>,
    /// The acting user (supervisor-assisted punches) if any.
    pub actor: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PunchOutcome {
    pub attendance: Attendance,
    pub employee_name: String,
    pub punch_type: PunchType,
    pub similarity: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FacePunchStatus {
    Punched,
    Unmatched,
    Duplicate,
    Skipped,
    Error,
}

/// Per-face outcome of a group punch.
#[derive(Debug, Clone, Serialize)]
pub struct FacePunchResult {
    pub face_index: usize,
    pub status: FacePunchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupPunchResponse {
    pub total_faces: usize,
    pub punched_count: usize,
    pub results: Vec<FacePunchResult>,
    /// True when at least one face was punched.
    pub success: bool,
}

pub struct PunchService {
    attendance: AttendanceRepository,
    employees: EmployeeRepository,
    face: Arc<dyn FaceService>,
    store: Arc<ImageStore>,
    calendar: AttendanceCalendar,
    threshold: f32,
}

impl PunchService {
    pub fn new(
        attendance: AttendanceRepository,
        employees: EmployeeRepository,
        face: Arc<dyn FaceService>,
        store: Arc<ImageStore>,
        calendar: AttendanceCalendar,
        threshold: f32,
    ) -> Self {
        Self {
            attendance,
            employees,
            face,
            store,
            calendar,
            threshold,
        }
    }

    pub fn calendar(&self) -> &AttendanceCalendar {
        &self.calendar
    }

    /// Get-or-create of today's record, the `POST` half of the mobile flow.
    pub async fn ensure_today(&self, emp_id: i64) -> Result<(Attendance, bool)> {
        let date = self.calendar.logical_date(Utc::now());
        self.attendance.get_or_create(emp_id, date).await
    }

    /// Manual punch with an employee hint and no face verification.
    pub async fn punch(&self, request: &PunchRequest) -> Result<PunchOutcome> {
        let emp_id = request
            .emp_id
            .ok_or_else(|| Error::validation("emp_id is required"))?;
        let employee = self.employees.require(emp_id).await?;
        self.execute_punch(&employee, request, None).await
    }

    /// Single-mode face punch: search the gallery with the full frame,
    /// verify against the enrolled reference, then transition.
    pub async fn face_punch(&self, request: &PunchRequest) -> Result<PunchOutcome> {
        let image = request
            .image
            .as_ref()
            .ok_or_else(|| Error::validation("image is required"))?;
        let frame = imaging::normalize(image)?;
        let frame_bytes = imaging::encode_jpeg(&frame)?;

        let matches = self.face.search(&frame_bytes, self.threshold).await?;
        let best = matches
            .into_iter()
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
            .ok_or_else(|| Error::unauthenticated("No face matched above threshold"))?;

        let employee = self
            .employees
            .resolve_match(&best.face_id, best.external_id.as_deref())
            .await?
            .ok_or_else(|| Error::unauthenticated("Matched face is not linked to an employee"))?;

        let similarity = self.verify(&employee, &frame_bytes).await?;

        let mut verified = request.clone();
        verified.image = Some(Bytes::from(frame_bytes));
        self.execute_punch(&employee, &verified, Some(similarity)).await
    }

    /// Group-mode face punch: detect every face in the frame, crop, match
    /// and punch each one independently. Individual failures become per-face
    /// statuses; the batch itself always succeeds.
    pub async fn group_punch(&self, request: &PunchRequest) -> Result<GroupPunchResponse> {
        let image = request
            .image
            .as_ref()
            .ok_or_else(|| Error::validation("image is required"))?;
        let frame = imaging::normalize(image)?;
        let frame_bytes = imaging::encode_jpeg(&frame)?;

        let faces = self.face.detect(&frame_bytes).await?;
        if faces.is_empty() {
            return Err(Error::unprocessable("No face detected in the image"));
        }

        let mut results = Vec::with_capacity(faces.len());
        // Faces are processed sequentially so this set stays coherent.
        let mut processed: HashSet<i64> = HashSet::new();
        let mut punched_count = 0;

        for (face_index, face) in faces.iter().enumerate() {
            let result = self
                .punch_one_face(face_index, face, &frame, request, &mut processed)
                .await;
            if result.status == FacePunchStatus::Punched {
                punched_count += 1;
            }
            results.push(result);
        }

        Ok(GroupPunchResponse {
            total_faces: results.len(),
            punched_count,
            success: punched_count > 0,
            results,
        })
    }

    async fn punch_one_face(
        &self,
        face_index: usize,
        face: &imaging::FaceBox,
        frame: &image::DynamicImage,
        request: &PunchRequest,
        processed: &mut HashSet<i64>,
    ) -> FacePunchResult {
        let mut result = FacePunchResult {
            face_index,
            status: FacePunchStatus::Error,
            employee_id: None,
            employee_name: None,
            similarity: None,
            attendance_id: None,
            punched_at: None,
            message: None,
        };

        let crop = match imaging::crop_face(frame, face) {
            Ok(crop) => crop,
            Err(e) => {
                result.message = Some(e.message);
                return result;
            }
        };

        let matches = match self.face.search(&crop, self.threshold).await {
            Ok(matches) => matches,
            Err(e) => {
                // A crop with no detectable face is an unmatched face, not a
                // batch-level failure.
                if e.kind == ErrorKind::Unprocessable {
                    result.status = FacePunchStatus::Unmatched;
                    result.message = Some("No match above threshold".to_string());
                } else {
                    result.message = Some(e.message);
                }
                return result;
            }
        };

        let best = match matches
            .into_iter()
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
        {
            Some(best) => best,
            None => {
                result.status = FacePunchStatus::Unmatched;
                result.message = Some("No match above threshold".to_string());
                return result;
            }
        };
        result.similarity = Some(best.similarity);

        let employee = match self
            .employees
            .resolve_match(&best.face_id, best.external_id.as_deref())
            .await
        {
            Ok(Some(employee)) => employee,
            Ok(None) => {
                result.status = FacePunchStatus::Unmatched;
                result.message = Some("Matched face is not linked to an employee".to_string());
                return result;
            }
            Err(e) => {
                result.message = Some(e.message);
                return result;
            }
        };
        result.employee_id = Some(employee.emp_id);
        result.employee_name = Some(employee.name.clone());

        if !processed.insert(employee.emp_id) {
            result.status = FacePunchStatus::Duplicate;
            result.message = Some("Already processed in this frame".to_string());
            return result;
        }

        let mut per_face = request.clone();
        per_face.image = Some(Bytes::from(crop));
        match self.execute_punch(&employee, &per_face, result.similarity).await {
            Ok(outcome) => {
                result.status = FacePunchStatus::Punched;
                result.attendance_id = Some(outcome.attendance.attendance_id);
                result.punched_at = Some(match request.punch_type {
                    PunchType::In => outcome.attendance.punch_in_time,
                    PunchType::Out => outcome.attendance.punch_out_time,
                }
                .unwrap_or_else(Utc::now));
            }
            Err(e) if e.kind == ErrorKind::Validation => {
                // Ineligible transition (already punched): skip, not fail.
                result.status = FacePunchStatus::Skipped;
                result.message = Some(e.message);
            }
            Err(e) => {
                result.message = Some(e.message);
            }
        }

        result
    }

    /// Pairwise verification of a captured image against the enrolled
    /// reference.
    async fn verify(&self, employee: &Employee, captured: &[u8]) -> Result<f32> {
        let reference = employee
            .face_embedding_ref
            .as_deref()
            .ok_or_else(|| Error::precondition_failed("Face enrollment missing"))?;

        let enrolled = self.store.fetch(reference).await?;
        let similarity = self.face.compare(&enrolled.bytes, captured).await?;
        if similarity < self.threshold {
            return Err(Error::unauthenticated(format!(
                "Face similarity {:.1}% below threshold",
                similarity
            )));
        }
        Ok(similarity)
    }

    /// Shared tail of every punch: resolve the target row (with carry-forward
    /// on punch-out), validate the transition, upload the image, then stamp
    /// the row.
    async fn execute_punch(
        &self,
        employee: &Employee,
        request: &PunchRequest,
        similarity: Option<f32>,
    ) -> Result<PunchOutcome> {
        let now = Utc::now();
        let target_date = self.calendar.logical_date(now);

        let record = match request.punch_type {
            PunchType::In => {
                let (record, _) = self
                    .attendance
                    .get_or_create(employee.emp_id, target_date)
                    .await?;
                validate_transition(status_of(&record), PunchType::In)?;
                record
            }
            PunchType::Out => self.resolve_punch_out_target(employee.emp_id, target_date).await?,
        };

        let actor = self.resolve_actor(request.actor).await?;

        let image_ref = match &request.image {
            Some(bytes) => {
                let key = imaging::punch_image_key(
                    &self.calendar.key_prefix(record.date),
                    &employee.name,
                    request.location.address.as_deref(),
                    request.punch_type,
                    now,
                );
                Some(self.store.put(&key, bytes.clone(), DEFAULT_CONTENT_TYPE).await?)
            }
            None => None,
        };

        let updated = match request.punch_type {
            PunchType::In => {
                self.attendance
                    .record_punch_in(
                        record.attendance_id,
                        now,
                        image_ref.as_deref(),
                        &request.location,
                        actor,
                    )
                    .await?
            }
            PunchType::Out => {
                self.attendance
                    .record_punch_out(
                        record.attendance_id,
                        now,
                        image_ref.as_deref(),
                        &request.location,
                        actor,
                    )
                    .await?
            }
        };

        info!(
            "Employee {} punched {} for {}",
            employee.emp_id, request.punch_type, updated.date
        );

        Ok(PunchOutcome {
            attendance: updated,
            employee_name: employee.name.clone(),
            punch_type: request.punch_type,
            similarity,
        })
    }

    /// Punch-out target resolution: today's row if it is open; otherwise the
    /// most recent open record in the carry-forward window.
    async fn resolve_punch_out_target(
        &self,
        emp_id: i64,
        target_date: chrono::NaiveDate,
    ) -> Result<Attendance> {
        if let Some(record) = self
            .attendance
            .get_by_employee_and_date(emp_id, target_date)
            .await?
        {
            if record.punch_in_time.is_some() {
                validate_transition(status_of(&record), PunchType::Out)?;
                return Ok(record);
            }
        }

        let floor = self.calendar.carry_forward_floor(target_date);
        let open = self
            .attendance
            .find_open_record(emp_id, floor, target_date)
            .await?;

        match open {
            Some(record) => Ok(record),
            None => Err(Error::validation("Must punch in first")),
        }
    }

    /// Actor ids that do not resolve to a user are stored as NULL; that can
    /// hide supervisor misconfiguration, so it is logged.
    async fn resolve_actor(&self, actor: Option<i64>) -> Result<Option<i64>> {
        match actor {
            Some(user_id) => {
                if self.attendance.actor_exists(user_id).await? {
                    Ok(Some(user_id))
                } else {
                    warn!("Punch actor {} does not resolve to a user; storing NULL", user_id);
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }
}
