//! Service layer result types

use std::collections::HashMap;

/// Outcome of a registration attempt
#[derive(Debug, Clone)]
pub struct RegisterResult {
    /// False when no face was found in the photo; the store is untouched
    pub success: bool,
    pub student_id: String,
    pub message: String,
}

/// Outcome of an identification attempt
#[derive(Debug, Clone)]
pub struct IdentifyResult {
    /// False when no face was found in the photo
    pub face_found: bool,
    /// The matched identifier, if any stored encoding was close enough
    pub student_id: Option<String>,
}

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthResult {
    pub healthy: bool,
    pub version: String,
    pub models_loaded: HashMap<String, bool>,
}
