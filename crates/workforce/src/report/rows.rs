//! Typed row shapes for each report grouping, with their CSV descriptors.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

fn fmt_ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|v| v.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

fn fmt_date(value: NaiveDate) -> Option<String> {
    Some(value.format("%Y-%m-%d").to_string())
}

fn fmt_i64(value: i64) -> Option<String> {
    Some(value.to_string())
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DetailRow {
    pub attendance_id: i64,
    pub date: NaiveDate,
    pub emp_code: String,
    pub employee_name: String,
    pub phone: Option<String>,
    pub ward: Option<String>,
    pub zone: Option<String>,
    pub city: Option<String>,
    pub city_id: Option<i32>,
    pub punch_in_time: Option<DateTime<Utc>>,
    pub punch_out_time: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub location: Option<String>,
    pub in_address: Option<String>,
    pub out_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ZoneRow {
    pub zone_id: i32,
    pub zone: String,
    pub city: Option<String>,
    pub city_id: Option<i32>,
    pub total_records: i64,
    pub punched_in: i64,
    pub punched_out: i64,
    pub employees: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WardRow {
    pub ward_id: i32,
    pub ward: String,
    pub zone: Option<String>,
    pub city: Option<String>,
    pub city_id: Option<i32>,
    pub total_records: i64,
    pub punched_in: i64,
    pub punched_out: i64,
    pub employees: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CityRow {
    pub city_id: i32,
    pub city: String,
    pub total_records: i64,
    pub punched_in: i64,
    pub punched_out: i64,
    pub employees: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SupervisorRow {
    pub supervisor_id: i64,
    pub supervisor_name: String,
    pub wards: i64,
    pub total_records: i64,
    pub punched_in: i64,
    pub employees: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LocationRow {
    pub location: Option<String>,
    pub punch_count: i64,
    pub employee_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WardSummaryRow {
    pub ward_id: i32,
    pub ward: String,
    pub zone: Option<String>,
    pub city: Option<String>,
    pub city_id: Option<i32>,
    pub registered_employees: i64,
    pub present_employees: i64,
    pub punch_ins: i64,
    pub punch_outs: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SupervisorSummaryRow {
    pub supervisor_id: i64,
    pub supervisor_name: String,
    pub phone: Option<String>,
    pub total_wards: i64,
    pub total_employees: i64,
    pub present_yesterday: i64,
    pub absentees: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportRows {
    Detail(Vec<DetailRow>),
    Zone(Vec<ZoneRow>),
    Ward(Vec<WardRow>),
    City(Vec<CityRow>),
    Supervisor(Vec<SupervisorRow>),
    Location(Vec<LocationRow>),
    WardSummary(Vec<WardSummaryRow>),
    SupervisorSummary(Vec<SupervisorSummaryRow>),
}

impl ReportRows {
    pub fn count(&self) -> usize {
        match self {
            Self::Detail(rows) => rows.len(),
            Self::Zone(rows) => rows.len(),
            Self::Ward(rows) => rows.len(),
            Self::City(rows) => rows.len(),
            Self::Supervisor(rows) => rows.len(),
            Self::Location(rows) => rows.len(),
            Self::WardSummary(rows) => rows.len(),
            Self::SupervisorSummary(rows) => rows.len(),
        }
    }

    pub fn csv_headers(&self) -> &'static [&'static str] {
        match self {
            Self::Detail(_) => &[
                "Attendance ID",
                "Date",
                "Employee Code",
                "Employee Name",
                "Phone",
                "Ward",
                "Zone",
                "City",
                "City ID",
                "Punch In",
                "Punch Out",
                "Duration (min)",
                "Location",
                "In Address",
                "Out Address",
            ],
            Self::Zone(_) => &[
                "Zone ID",
                "Zone",
                "City",
                "City ID",
                "Total Records",
                "Punched In",
                "Punched Out",
                "Employees",
            ],
            Self::Ward(_) => &[
                "Ward ID",
                "Ward",
                "Zone",
                "City",
                "City ID",
                "Total Records",
                "Punched In",
                "Punched Out",
                "Employees",
            ],
            Self::City(_) => &[
                "City ID",
                "City",
                "Total Records",
                "Punched In",
                "Punched Out",
                "Employees",
            ],
            Self::Supervisor(_) => &[
                "Supervisor ID",
                "Supervisor Name",
                "Wards",
                "Total Records",
                "Punched In",
                "Employees",
            ],
            Self::Location(_) => &["Location", "Punch Count", "Employees"],
            Self::WardSummary(_) => &[
                "Ward ID",
                "Ward",
                "Zone",
                "City",
                "City ID",
                "Registered",
                "Present",
                "Punch Ins",
                "Punch Outs",
            ],
            Self::SupervisorSummary(_) => &[
                "Supervisor ID",
                "Supervisor Name",
                "Phone",
                "Total Wards",
                "Total Employees",
                "Present Yesterday",
                "Absentees",
            ],
        }
    }

    pub fn csv_cells(&self) -> Vec<Vec<Option<String>>> {
        match self {
            Self::Detail(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        fmt_i64(r.attendance_id),
                        fmt_date(r.date),
                        Some(r.emp_code.clone()),
                        Some(r.employee_name.clone()),
                        r.phone.clone(),
                        r.ward.clone(),
                        r.zone.clone(),
                        r.city.clone(),
                        r.city_id.map(|v| v.to_string()),
                        fmt_ts(r.punch_in_time),
                        fmt_ts(r.punch_out_time),
                        r.duration.map(|v| v.to_string()),
                        r.location.clone(),
                        r.in_address.clone(),
                        r.out_address.clone(),
                    ]
                })
                .collect(),
            Self::Zone(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        Some(r.zone_id.to_string()),
                        Some(r.zone.clone()),
                        r.city.clone(),
                        r.city_id.map(|v| v.to_string()),
                        fmt_i64(r.total_records),
                        fmt_i64(r.punched_in),
                        fmt_i64(r.punched_out),
                        fmt_i64(r.employees),
                    ]
                })
                .collect(),
            Self::Ward(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        Some(r.ward_id.to_string()),
                        Some(r.ward.clone()),
                        r.zone.clone(),
                        r.city.clone(),
                        r.city_id.map(|v| v.to_string()),
                        fmt_i64(r.total_records),
                        fmt_i64(r.punched_in),
                        fmt_i64(r.punched_out),
                        fmt_i64(r.employees),
                    ]
                })
                .collect(),
            Self::City(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        Some(r.city_id.to_string()),
                        Some(r.city.clone()),
                        fmt_i64(r.total_records),
                        fmt_i64(r.punched_in),
                        fmt_i64(r.punched_out),
                        fmt_i64(r.employees),
                    ]
                })
                .collect(),
            Self::Supervisor(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        fmt_i64(r.supervisor_id),
                        Some(r.supervisor_name.clone()),
                        fmt_i64(r.wards),
                        fmt_i64(r.total_records),
                        fmt_i64(r.punched_in),
                        fmt_i64(r.employees),
                    ]
                })
                .collect(),
            Self::Location(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.location.clone(),
                        fmt_i64(r.punch_count),
                        fmt_i64(r.employee_count),
                    ]
                })
                .collect(),
            Self::WardSummary(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        Some(r.ward_id.to_string()),
                        Some(r.ward.clone()),
                        r.zone.clone(),
                        r.city.clone(),
                        r.city_id.map(|v| v.to_string()),
                        fmt_i64(r.registered_employees),
                        fmt_i64(r.present_employees),
                        fmt_i64(r.punch_ins),
                        fmt_i64(r.punch_outs),
                    ]
                })
                .collect(),
            Self::SupervisorSummary(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        fmt_i64(r.supervisor_id),
                        Some(r.supervisor_name.clone()),
                        r.phone.clone(),
                        fmt_i64(r.total_wards),
                        fmt_i64(r.total_employees),
                        fmt_i64(r.present_yesterday),
                        fmt_i64(r.absentees),
                    ]
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_and_cells_stay_aligned() {
        let rows = ReportRows::Ward(vec![WardRow {
            ward_id: 1,
            ward: "Ward 7".to_string(),
            zone: Some("North".to_string()),
            city: Some("Indore".to_string()),
            city_id: Some(7),
            total_records: 10,
            punched_in: 9,
            punched_out: 8,
            employees: 9,
        }]);

        let cells = rows.csv_cells();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].len(), rows.csv_headers().len());
        assert_eq!(cells[0][4].as_deref(), Some("7"));
    }

    #[test]
    fn detail_nulls_become_none_cells() {
        let rows = ReportRows::Detail(vec![DetailRow {
            attendance_id: 5,
            date: NaiveDate::from_ymd_opt(2023, 6, 15).unwrap(),
            emp_code: "E001".to_string(),
            employee_name: "Asha".to_string(),
            phone: None,
            ward: None,
            zone: None,
            city: None,
            city_id: None,
            punch_in_time: None,
            punch_out_time: None,
            duration: None,
            location: None,
            in_address: None,
            out_address: None,
        }]);

        let cells = rows.csv_cells();
        assert_eq!(cells[0].len(), rows.csv_headers().len());
        assert!(cells[0][4].is_none());
        assert!(cells[0][9].is_none());
    }
}
