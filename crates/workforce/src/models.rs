use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct City {
    pub city_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Zone {
    pub zone_id: i32,
    pub name: String,
    pub city_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ward {
    pub ward_id: i32,
    pub name: String,
    pub zone_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Department {
    pub department_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Designation {
    pub designation_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub emp_id: i64,
    pub emp_code: String,
    pub name: String,
    pub phone: Option<String>,
    pub ward_id: Option<i32>,
    pub designation_id: Option<i32>,
    /// Object-store key of the enrolled reference image. Present iff
    /// enrolment succeeded.
    pub face_embedding_ref: Option<String>,
    pub face_id: Option<String>,
    pub face_confidence: Option<f32>,
}

impl Employee {
    pub fn is_enrolled(&self) -> bool {
        self.face_embedding_ref.is_some() && self.face_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SupervisorWard {
    pub assigned_id: i64,
    pub supervisor_id: i64,
    pub ward_id: i32,
}

/// One per (employee, logical date). `punch_out_time` is NULL or later than
/// `punch_in_time`, and may only be set once `punch_in_time` is.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attendance {
    pub attendance_id: i64,
    pub emp_id: i64,
    pub date: NaiveDate,
    pub ward_id: Option<i32>,
    pub punch_in_time: Option<DateTime<Utc>>,
    pub punch_out_time: Option<DateTime<Utc>>,
    pub punch_in_image_ref: Option<String>,
    pub punch_out_image_ref: Option<String>,
    pub latitude_in: Option<f64>,
    pub longitude_in: Option<f64>,
    pub latitude_out: Option<f64>,
    pub longitude_out: Option<f64>,
    pub in_address: Option<String>,
    pub out_address: Option<String>,
    /// Minutes between punches, stamped at punch-out.
    pub duration: Option<i32>,
    pub punched_in_by: Option<i64>,
    pub punched_out_by: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrolment_requires_both_fields() {
        let mut employee = Employee {
            emp_id: 1,
            emp_code: "E001".to_string(),
            name: "Asha".to_string(),
            phone: None,
            ward_id: None,
            designation_id: None,
            face_embedding_ref: Some("2024/01/01/asha/ref.jpg".to_string()),
            face_id: None,
            face_confidence: None,
        };
        assert!(!employee.is_enrolled());

        employee.face_id = Some("f-123".to_string());
        assert!(employee.is_enrolled());
    }
}
