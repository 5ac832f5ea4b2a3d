//! Submission request DTO and its validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::operation::{parse_submitted, Operation, RawOperation};

/// Body of `POST /api/v1/images`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ProcessImageRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub bucket_name: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub image_key: String,
    #[validate(length(min = 1, message = "must contain at least one operation"))]
    pub operations: Vec<RawOperation>,
}

/// A request that passed validation, with operations decoded into the
/// typed union.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub email: String,
    pub bucket_name: String,
    pub image_key: String,
    pub operations: Vec<Operation>,
}

impl ProcessImageRequest {
    /// Check field constraints and decode the operation list.
    pub fn into_validated(self) -> Result<ValidatedRequest, CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let operations = parse_submitted(self.operations)?;

        Ok(ValidatedRequest {
            email: self.email,
            bucket_name: self.bucket_name,
            image_key: self.image_key,
            operations,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
