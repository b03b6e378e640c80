use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::InquiryId;

/// Pipeline stage of an inquiry. Any stage is reachable from any other;
/// each transition is recorded as a discrete change event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryStatus {
    New,
    Contacted,
    Qualified,
    Won,
    Bad,
    Lost,
}

impl InquiryStatus {
    /// All stages in pipeline order.
    pub const ALL: [InquiryStatus; 6] = [
        Self::New,
        Self::Contacted,
        Self::Qualified,
        Self::Won,
        Self::Bad,
        Self::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Won => "won",
            Self::Bad => "bad",
            Self::Lost => "lost",
        }
    }
}

impl std::fmt::Display for InquiryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InquiryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "contacted" => Ok(Self::Contacted),
            "qualified" => Ok(Self::Qualified),
            "won" => Ok(Self::Won),
            "bad" => Ok(Self::Bad),
            "lost" => Ok(Self::Lost),
            other => Err(format!("unknown inquiry status: {other}")),
        }
    }
}

/// Which rows the inbox is showing: everything, or one stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(InquiryStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: InquiryStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(s) => *s == status,
        }
    }

    /// The stage predicate, if any, to apply server-side.
    pub fn as_status(&self) -> Option<InquiryStatus> {
        match self {
            Self::All => None,
            Self::Only(s) => Some(*s),
        }
    }
}

impl std::fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(s) => f.write_str(s.as_str()),
        }
    }
}

impl std::str::FromStr for StatusFilter {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Only)
        }
    }
}

/// One inbound booking inquiry.
///
/// `created_at` is the sort key for the inbox and the pagination cursor.
/// `seen_at` is set once when an operator first opens the inquiry and is
/// never cleared afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: InquiryId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub selected_types: Vec<String>,
    pub selected_package: Option<String>,
    pub budget: Option<i64>,
    pub message: Option<String>,
    pub source_page: Option<String>,
    pub user_agent: Option<String>,
    pub status: InquiryStatus,
    pub seen_at: Option<DateTime<Utc>>,
}

impl Inquiry {
    /// New and never opened by an operator. Drives the badge count.
    pub fn is_unseen(&self) -> bool {
        self.status == InquiryStatus::New && self.seen_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_and_parse_roundtrip() {
        for status in InquiryStatus::ALL {
            let parsed: InquiryStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert!("pending".parse::<InquiryStatus>().is_err());
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&InquiryStatus::Contacted).unwrap();
        assert_eq!(json, "\"contacted\"");
    }

    #[test]
    fn filter_all_matches_everything() {
        for status in InquiryStatus::ALL {
            assert!(StatusFilter::All.matches(status));
        }
        assert_eq!(StatusFilter::All.as_status(), None);
    }

    #[test]
    fn filter_only_matches_one_stage() {
        let filter = StatusFilter::Only(InquiryStatus::Won);
        assert!(filter.matches(InquiryStatus::Won));
        assert!(!filter.matches(InquiryStatus::New));
        assert_eq!(filter.as_status(), Some(InquiryStatus::Won));
    }

    #[test]
    fn filter_parse() {
        assert_eq!("all".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!(
            "qualified".parse::<StatusFilter>().unwrap(),
            StatusFilter::Only(InquiryStatus::Qualified)
        );
        assert!("whatever".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn unseen_requires_new_and_unopened() {
        let mut inquiry = Inquiry {
            id: InquiryId::new(),
            created_at: Utc::now(),
            name: "Ada".into(),
            email: None,
            phone: None,
            selected_types: vec![],
            selected_package: None,
            budget: None,
            message: None,
            source_page: None,
            user_agent: None,
            status: InquiryStatus::New,
            seen_at: None,
        };
        assert!(inquiry.is_unseen());

        inquiry.seen_at = Some(Utc::now());
        assert!(!inquiry.is_unseen());

        inquiry.seen_at = None;
        inquiry.status = InquiryStatus::Contacted;
        assert!(!inquiry.is_unseen());
    }
}
