use super::ApiError;
use crate::constants::{PAGE_SIZE_DEFAULT, PAGE_SIZE_MAX, PAGE_SIZE_MIN};
use crate::entities::tickets::{TicketPriority, TicketStatus};
use crate::entities::users::Role;

pub fn parse_priority(value: &str) -> Result<TicketPriority, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "low" => Ok(TicketPriority::Low),
        "normal" => Ok(TicketPriority::Normal),
        "high" => Ok(TicketPriority::High),
        _ => Err(ApiError::validation(format!(
            "Invalid priority: {value}. Must be one of Low, Normal, High"
        ))),
    }
}

pub fn parse_status(value: &str) -> Result<TicketStatus, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "open" => Ok(TicketStatus::Open),
        "inprogress" | "in_progress" => Ok(TicketStatus::InProgress),
        "closed" => Ok(TicketStatus::Closed),
        _ => Err(ApiError::validation(format!(
            "Invalid status: {value}. Must be one of Open, InProgress, Closed"
        ))),
    }
}

pub fn parse_role(value: &str) -> Result<Role, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "user" => Ok(Role::User),
        "tech" => Ok(Role::Tech),
        "admin" => Ok(Role::Admin),
        _ => Err(ApiError::validation(format!(
            "Invalid role: {value}. Must be one of user, tech, admin"
        ))),
    }
}

/// Pagination inputs are clamped, never rejected: page floors at 1, size is
/// forced into its fixed bounds.
#[must_use]
pub fn clamp_pagination(page: Option<u64>, size: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let size = size
        .unwrap_or(PAGE_SIZE_DEFAULT)
        .clamp(PAGE_SIZE_MIN, PAGE_SIZE_MAX);
    (page, size)
}
