//! Closed enumerations describing course content.
//!
//! Both the provider port and the stores speak these types, so they live here
//! instead of in either side. Each variant has a stable snake_case wire/storage name.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Human review state of a generated outline.
///
/// Independent of job status: a completed outline job produces a
/// `PendingReview` outline, and a person moves it to `Approved` or `Rejected`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::PendingReview => "pending_review",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// Review decisions are only taken once, from `PendingReview`.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self, next),
            (ApprovalStatus::PendingReview, ApprovalStatus::Approved)
                | (ApprovalStatus::PendingReview, ApprovalStatus::Rejected)
        )
    }
}

impl FromStr for ApprovalStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_review" => Ok(ApprovalStatus::PendingReview),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(DomainError::unknown_variant("approval status", other)),
        }
    }
}

impl core::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a lesson component.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Text,
    Heading,
    Image,
    Quiz,
}

impl ComponentType {
    pub const ALL: [ComponentType; 4] = [
        ComponentType::Text,
        ComponentType::Heading,
        ComponentType::Image,
        ComponentType::Quiz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Text => "text",
            ComponentType::Heading => "heading",
            ComponentType::Image => "image",
            ComponentType::Quiz => "quiz",
        }
    }
}

impl FromStr for ComponentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ComponentType::Text),
            "heading" => Ok(ComponentType::Heading),
            "image" => Ok(ComponentType::Image),
            "quiz" => Ok(ComponentType::Quiz),
            other => Err(DomainError::unknown_variant("component type", other)),
        }
    }
}

impl core::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_only_leaves_pending_review() {
        assert!(ApprovalStatus::PendingReview.can_transition_to(ApprovalStatus::Approved));
        assert!(ApprovalStatus::PendingReview.can_transition_to(ApprovalStatus::Rejected));
        assert!(!ApprovalStatus::Approved.can_transition_to(ApprovalStatus::Rejected));
        assert!(!ApprovalStatus::Rejected.can_transition_to(ApprovalStatus::Approved));
        assert!(!ApprovalStatus::Approved.can_transition_to(ApprovalStatus::PendingReview));
    }

    #[test]
    fn component_type_names_match_serde() {
        for ty in ComponentType::ALL {
            let json = serde_json::to_value(ty).unwrap();
            assert_eq!(json, serde_json::json!(ty.as_str()));
            assert_eq!(ty.as_str().parse::<ComponentType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_component_type_is_rejected() {
        assert!(matches!(
            "video".parse::<ComponentType>(),
            Err(DomainError::UnknownVariant { kind: "component type", .. })
        ));
    }
}
