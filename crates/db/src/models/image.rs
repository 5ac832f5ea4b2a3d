//! Image job rows.

use imagepp_core::operation::Operation;
use imagepp_core::status::{JobStatus, StatusId};
use imagepp_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `images` table: one image transform job.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Image {
    pub id: DbId,
    pub user_id: DbId,
    pub bucket_name: String,
    pub image_key: String,
    /// Ordered operation list in wire form.
    pub operations: serde_json::Value,
    pub status_id: StatusId,
    /// Set once the transformed object has been uploaded.
    pub output_key: Option<String>,
    /// Message of the most recent failed attempt.
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Image {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    /// Decode the stored operation list.
    pub fn decode_operations(&self) -> Result<Vec<Operation>, serde_json::Error> {
        serde_json::from_value(self.operations.clone())
    }
}

/// DTO for inserting a new job. The row always starts `pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateImage {
    pub user_id: DbId,
    pub bucket_name: String,
    pub image_key: String,
    pub operations: Vec<Operation>,
}

impl CreateImage {
    /// Operations in the JSON shape stored in the `operations` column.
    pub fn operations_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.operations)
    }
}
