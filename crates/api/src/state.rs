use attend_auth::{AuthService, AuthState};
use attend_core::{Config, DatabasePool};
use attend_workforce::attendance::AttendanceRepository;
use attend_workforce::report::ReportEngine;
use attend_workforce::{
    EnrolmentService, ImageStore, LocationRepository, MessagingGateway, PunchService,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabasePool,
    pub auth_service: Arc<AuthService>,
    /// Shared state for the authorization middleware chain.
    pub auth_state: AuthState,
    pub locations: LocationRepository,
    pub attendance: AttendanceRepository,
    pub punch: Arc<PunchService>,
    pub enrolment: Arc<EnrolmentService>,
    pub reports: Arc<ReportEngine>,
    pub store: Arc<ImageStore>,
    pub messaging: Arc<MessagingGateway>,
}
