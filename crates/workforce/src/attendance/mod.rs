pub mod calendar;
pub mod repository;
pub mod state;

pub use calendar::AttendanceCalendar;
pub use repository::AttendanceRepository;
pub use state::{AttendanceStatus, PunchType};
