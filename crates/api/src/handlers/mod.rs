pub mod attendance;
pub mod auth;
pub mod locations;
pub mod punch;
pub mod rbac;
pub mod whatsapp;
