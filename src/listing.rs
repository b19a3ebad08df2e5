//! Listing records as served by the REST API and mutated by push events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Property type of a listing. Each type has its own store and table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealEstateKind {
    Flat,
    House,
    Land,
}

impl RealEstateKind {
    /// Every kind, in table order.
    pub const ALL: [Self; 3] = [Self::Flat, Self::House, Self::Land];

    /// Stable slug used in REST paths and session keys.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::House => "house",
            Self::Land => "land",
        }
    }

    /// Position of this kind in [`RealEstateKind::ALL`].
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Flat => 0,
            Self::House => 1,
            Self::Land => 2,
        }
    }
}

impl fmt::Display for RealEstateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Operator currently calling a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallingUser {
    pub user_id: String,
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// How confidently a listing was matched against another one.
///
/// Only [`DuplicateGrade::Full`] carries meaning on the client: it marks a
/// confirmed duplicate and blocks calling. Grades the client does not know
/// are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DuplicateGrade {
    Full,
    Partial,
    Other(String),
}

impl From<String> for DuplicateGrade {
    fn from(value: String) -> Self {
        match value.as_str() {
            "FULL" => Self::Full,
            "PARTIAL" => Self::Partial,
            _ => Self::Other(value),
        }
    }
}

impl From<DuplicateGrade> for String {
    fn from(value: DuplicateGrade) -> Self {
        match value {
            DuplicateGrade::Full => "FULL".to_string(),
            DuplicateGrade::Partial => "PARTIAL".to_string(),
            DuplicateGrade::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duplicate {
    pub grade: DuplicateGrade,
}

/// Relation counters; the API nests them under `_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingCounts {
    #[serde(default)]
    pub comments: u32,
}

/// An operator comment on a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// One scraped listing (flat, house or land parcel).
///
/// The three property types share this shape; the kind is implied by the
/// store that owns the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    /// Set while an operator is calling this listing. Last write wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calling_user: Option<CallingUser>,
    #[serde(default)]
    pub is_favourite: bool,
    #[serde(default)]
    pub duplicates: Vec<Duplicate>,
    #[serde(rename = "_count", default)]
    pub counts: ListingCounts,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Comments loaded for an open drawer. The page endpoint never sends them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
}

impl Listing {
    /// An active, idle listing with no descriptive fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            calling_user: None,
            is_favourite: false,
            duplicates: Vec::new(),
            counts: ListingCounts::default(),
            is_active: true,
            status: None,
            title: None,
            price: None,
            address: None,
            created_at: None,
            comments: Vec::new(),
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.calling_user.is_some()
    }

    /// Returns `true` if any duplicate entry has grade `FULL`.
    pub fn is_confirmed_duplicate(&self) -> bool {
        self.duplicates
            .iter()
            .any(|d| d.grade == DuplicateGrade::Full)
    }

    /// Whether the call action is enabled for this listing.
    ///
    /// Inactive listings, listings someone is already calling, and confirmed
    /// duplicates cannot be called.
    pub fn can_call(&self) -> bool {
        self.is_active && !self.is_reserved() && !self.is_confirmed_duplicate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_api_shape() {
        let json = serde_json::json!({
            "id": "a1",
            "isFavourite": true,
            "duplicates": [{"grade": "PARTIAL"}, {"grade": "FULL"}],
            "_count": {"comments": 4},
            "isActive": true,
            "status": "NEW",
            "price": 125000
        });
        let listing: Listing = serde_json::from_value(json).expect("should decode");
        assert_eq!(listing.id, "a1");
        assert!(listing.is_favourite);
        assert_eq!(listing.counts.comments, 4);
        assert_eq!(listing.status.as_deref(), Some("NEW"));
        assert!(listing.is_confirmed_duplicate());
        assert!(listing.calling_user.is_none());
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let listing: Listing =
            serde_json::from_value(serde_json::json!({"id": "x"})).expect("should decode");
        assert_eq!(listing, Listing::new("x"));
        assert!(listing.is_active);
    }

    #[test]
    fn counts_serialize_under_underscore_count() {
        let mut listing = Listing::new("a");
        listing.counts.comments = 2;
        let value = serde_json::to_value(&listing).expect("should encode");
        assert_eq!(value["_count"]["comments"], 2);
        assert!(value.get("callingUser").is_none());
    }

    #[test]
    fn unknown_grade_is_preserved() {
        let dup: Duplicate =
            serde_json::from_value(serde_json::json!({"grade": "FUZZY"})).expect("decode");
        assert_eq!(dup.grade, DuplicateGrade::Other("FUZZY".into()));
        let back = serde_json::to_value(&dup).expect("encode");
        assert_eq!(back["grade"], "FUZZY");
    }

    #[test]
    fn can_call_requires_active_idle_non_duplicate() {
        let mut listing = Listing::new("a");
        assert!(listing.can_call());

        listing.calling_user = Some(CallingUser {
            user_id: "u1".into(),
            full_name: "X".into(),
            avatar_url: String::new(),
        });
        assert!(!listing.can_call());
        listing.calling_user = None;

        listing.duplicates.push(Duplicate {
            grade: DuplicateGrade::Partial,
        });
        assert!(listing.can_call(), "partial duplicates do not block calls");
        listing.duplicates.push(Duplicate {
            grade: DuplicateGrade::Full,
        });
        assert!(!listing.can_call());

        let mut inactive = Listing::new("b");
        inactive.is_active = false;
        assert!(!inactive.can_call());
    }

    #[test]
    fn kind_slugs_and_indices() {
        for (i, kind) in RealEstateKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        assert_eq!(RealEstateKind::House.to_string(), "house");
        assert_eq!(
            serde_json::to_value(RealEstateKind::Land).expect("encode"),
            "land"
        );
    }
}
