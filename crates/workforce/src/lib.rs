//! Workforce domain for the attendance platform: employees and the location
//! hierarchy, the attendance state machine, the face-verified punch
//! pipeline, object-store adapters, and the report engine.

pub mod attendance;
pub mod employees;
pub mod enrolment;
pub mod face;
pub mod imaging;
pub mod locations;
pub mod messaging;
pub mod models;
pub mod punch;
pub mod report;
pub mod storage;

pub use attendance::{AttendanceCalendar, AttendanceRepository, AttendanceStatus, PunchType};
pub use employees::EmployeeRepository;
pub use enrolment::EnrolmentService;
pub use face::{FaceService, HttpFaceService};
pub use locations::LocationRepository;
pub use messaging::MessagingGateway;
pub use punch::{PunchRequest, PunchService};
pub use report::{LocationType, ReportEngine, ReportFilters, ReportGroupBy};
pub use storage::ImageStore;
