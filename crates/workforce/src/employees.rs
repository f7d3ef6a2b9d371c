use crate::models::Employee;
use attend_core::{DatabasePool, Error, Result};

#[derive(Clone)]
pub struct EmployeeRepository {
    db: DatabasePool,
}

impl EmployeeRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub async fn get(&self, emp_id: i64) -> Result<Option<Employee>> {
        let employee = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE emp_id = $1")
            .bind(emp_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(employee)
    }

    pub async fn require(&self, emp_id: i64) -> Result<Employee> {
        self.get(emp_id)
            .await?
            .ok_or_else(|| Error::not_found("Employee not found"))
    }

    pub async fn get_by_code(&self, emp_code: &str) -> Result<Option<Employee>> {
        let employee =
            sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE emp_code = $1")
                .bind(emp_code)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(employee)
    }

    /// Resolution order for a gallery match: the stored `face_id` first,
    /// the match's external id (an `emp_id`) as fallback.
    pub async fn resolve_match(
        &self,
        face_id: &str,
        external_id: Option<&str>,
    ) -> Result<Option<Employee>> {
        let by_face = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE face_id = $1")
            .bind(face_id)
            .fetch_optional(self.db.pool())
            .await?;
        if by_face.is_some() {
            return Ok(by_face);
        }

        if let Some(emp_id) = external_id.and_then(|id| id.parse::<i64>().ok()) {
            return self.get(emp_id).await;
        }

        Ok(None)
    }

    pub async fn set_enrolment(
        &self,
        emp_id: i64,
        face_id: &str,
        reference: &str,
        confidence: f32,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE employees SET face_id = $2, face_embedding_ref = $3, face_confidence = $4
             WHERE emp_id = $1",
        )
        .bind(emp_id)
        .bind(face_id)
        .bind(reference)
        .bind(confidence)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Employee not found"));
        }
        Ok(())
    }

    /// Clears both the reference image and the gallery face id; enrolment is
    /// all-or-nothing.
    pub async fn clear_enrolment(&self, emp_id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE employees SET face_id = NULL, face_embedding_ref = NULL, face_confidence = NULL
             WHERE emp_id = $1",
        )
        .bind(emp_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Employee not found"));
        }
        Ok(())
    }
}
