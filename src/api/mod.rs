// ABOUTME: Remote attendance API: HTTP client and wire models
// ABOUTME: Covers ping, session create/delete and device attendance upload

pub mod client;
pub mod models;

pub use client::ApiClient;
pub use models::{ApiResponse, AttendanceEnvelope, Credentials};
