//! Location hierarchy lookups, narrowed by the caller's city scope.

use crate::models::{City, Department, Designation, Ward, Zone};
use attend_core::{CityScope, DatabasePool, Result};

#[derive(Clone)]
pub struct LocationRepository {
    db: DatabasePool,
}

impl LocationRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub async fn list_cities(&self, scope: &CityScope) -> Result<Vec<City>> {
        if scope.is_empty() {
            return Ok(Vec::new());
        }

        let cities = if scope.all {
            sqlx::query_as::<_, City>("SELECT * FROM cities ORDER BY name")
                .fetch_all(self.db.pool())
                .await?
        } else {
            sqlx::query_as::<_, City>(
                "SELECT * FROM cities WHERE city_id = ANY($1) ORDER BY name",
            )
            .bind(scope.ids())
            .fetch_all(self.db.pool())
            .await?
        };

        Ok(cities)
    }

    pub async fn list_zones(&self, scope: &CityScope, city_id: Option<i32>) -> Result<Vec<Zone>> {
        if scope.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM zones WHERE 1=1");
        if let Some(city_id) = city_id {
            qb.push(" AND city_id = ");
            qb.push_bind(city_id);
        }
        if !scope.all {
            qb.push(" AND city_id = ANY(");
            qb.push_bind(scope.ids());
            qb.push(")");
        }
        qb.push(" ORDER BY name");

        let zones = qb.build_query_as::<Zone>().fetch_all(self.db.pool()).await?;
        Ok(zones)
    }

    pub async fn list_wards(&self, scope: &CityScope, zone_id: Option<i32>) -> Result<Vec<Ward>> {
        if scope.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = sqlx::QueryBuilder::new(
            "SELECT w.* FROM wards w INNER JOIN zones z ON w.zone_id = z.zone_id WHERE 1=1",
        );
        if let Some(zone_id) = zone_id {
            qb.push(" AND w.zone_id = ");
            qb.push_bind(zone_id);
        }
        if !scope.all {
            qb.push(" AND z.city_id = ANY(");
            qb.push_bind(scope.ids());
            qb.push(")");
        }
        qb.push(" ORDER BY w.name");

        let wards = qb.build_query_as::<Ward>().fetch_all(self.db.pool()).await?;
        Ok(wards)
    }

    pub async fn list_departments(&self) -> Result<Vec<Department>> {
        let departments =
            sqlx::query_as::<_, Department>("SELECT * FROM departments ORDER BY name")
                .fetch_all(self.db.pool())
                .await?;
        Ok(departments)
    }

    pub async fn list_designations(&self) -> Result<Vec<Designation>> {
        let designations =
            sqlx::query_as::<_, Designation>("SELECT * FROM designations ORDER BY name")
                .fetch_all(self.db.pool())
                .await?;
        Ok(designations)
    }
}
