//! One-time registration of an employee's reference face image.

use crate::employees::EmployeeRepository;
use crate::face::FaceService;
use crate::imaging;
use crate::storage::{ImageStore, DEFAULT_CONTENT_TYPE};
use attend_core::{Error, Result};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct EnrolmentOutcome {
    pub emp_id: i64,
    pub face_id: String,
    pub confidence: f32,
    pub reference: String,
}

pub struct EnrolmentService {
    employees: EmployeeRepository,
    face: Arc<dyn FaceService>,
    store: Arc<ImageStore>,
}

impl EnrolmentService {
    pub fn new(
        employees: EmployeeRepository,
        face: Arc<dyn FaceService>,
        store: Arc<ImageStore>,
    ) -> Self {
        Self {
            employees,
            face,
            store,
        }
    }

    /// Enrols (or re-enrols) an employee. The previous gallery face, if any,
    /// is removed first so one employee never owns two gallery entries.
    pub async fn enrol(&self, emp_id: i64, image: Bytes) -> Result<EnrolmentOutcome> {
        let employee = self.employees.require(emp_id).await?;

        let upright = imaging::normalize(&image)?;
        let encoded = imaging::encode_jpeg(&upright)?;

        if let Some(old_face_id) = &employee.face_id {
            self.face.delete_face(old_face_id).await?;
        }

        let indexed = self.face.index_face(&emp_id.to_string(), &encoded).await?;

        let key = format!(
            "enrolment/{}/{}_{}.jpg",
            emp_id,
            imaging::slugify(&employee.name),
            Utc::now().format("%Y%m%dT%H%M%S")
        );
        let reference = self
            .store
            .put(&key, Bytes::from(encoded), DEFAULT_CONTENT_TYPE)
            .await?;

        self.employees
            .set_enrolment(emp_id, &indexed.face_id, &reference, indexed.confidence)
            .await?;

        info!("Employee {} enrolled with face {}", emp_id, indexed.face_id);
        Ok(EnrolmentOutcome {
            emp_id,
            face_id: indexed.face_id,
            confidence: indexed.confidence,
            reference,
        })
    }

    /// Removes the gallery face and clears both enrolment fields.
    pub async fn unenrol(&self, emp_id: i64) -> Result<()> {
        let employee = self.employees.require(emp_id).await?;
        let face_id = employee
            .face_id
            .as_deref()
            .ok_or_else(|| Error::not_found("Employee has no enrolment"))?;

        self.face.delete_face(face_id).await?;
        self.employees.clear_enrolment(emp_id).await?;

        info!("Employee {} enrolment removed", emp_id);
        Ok(())
    }
}
