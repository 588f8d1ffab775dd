use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeRequestType {
    CreateDepartment,
    UpdateDepartment,
    DeactivateDepartment,
    CreatePosition,
    UpdatePosition,
    ClosePosition,
}

impl ChangeRequestType {
    pub fn targets_department(self) -> bool {
        matches!(
            self,
            ChangeRequestType::UpdateDepartment | ChangeRequestType::DeactivateDepartment
        )
    }

    pub fn targets_position(self) -> bool {
        matches!(
            self,
            ChangeRequestType::UpdatePosition | ChangeRequestType::ClosePosition
        )
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeRequestStatus {
    Pending,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Cancelled,
}

impl ChangeRequestStatus {
    pub fn can_cancel(self) -> bool {
        matches!(
            self,
            ChangeRequestStatus::Pending | ChangeRequestStatus::Submitted
        )
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalDecision {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalDecision {
    /// Request status that follows a final decision.
    pub fn resulting_status(self) -> Option<ChangeRequestStatus> {
        match self {
            ApprovalDecision::Pending => None,
            ApprovalDecision::Approved => Some(ChangeRequestStatus::Approved),
            ApprovalDecision::Rejected => Some(ChangeRequestStatus::Rejected),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StructureChangeRequest {
    pub id: u64,
    #[schema(example = "SCR-202602-1A2B3C4D")]
    pub request_number: String,
    pub requested_by: u64,
    pub request_type: ChangeRequestType,
    pub target_department_id: Option<u64>,
    pub target_position_id: Option<u64>,
    pub details: Option<String>,
    pub reason: String,
    pub status: ChangeRequestStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[schema(example = json!({
    "request_type": "UPDATE_DEPARTMENT",
    "target_department_id": 1,
    "reason": "org change"
}))]
pub struct NewChangeRequest {
    pub request_type: ChangeRequestType,
    pub target_department_id: Option<u64>,
    pub target_position_id: Option<u64>,
    pub details: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct ChangeRequestUpdate {
    pub target_department_id: Option<u64>,
    pub target_position_id: Option<u64>,
    pub details: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StructureApproval {
    pub id: u64,
    pub change_request_id: u64,
    pub approver_id: u64,
    pub decision: ApprovalDecision,
    pub comments: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StructureChangeRequest {
    pub fn apply(&mut self, update: &ChangeRequestUpdate) {
        if update.target_department_id.is_some() {
            self.target_department_id = update.target_department_id;
        }
        if update.target_position_id.is_some() {
            self.target_position_id = update.target_position_id;
        }
        if update.details.is_some() {
            self.details = update.details.clone();
        }
        if let Some(reason) = &update.reason {
            self.reason = reason.clone();
        }
    }
}

pub fn request_number(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().to_string()[..8].to_uppercase();
    format!("SCR-{}-{}", now.format("%Y%m"), suffix)
}
