use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    #[serde(alias = "tv")]
    Show,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Show => "show",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ContentType::Movie),
            "show" | "tv" => Ok(ContentType::Show),
            _ => Err("contentType must be movie or show".to_owned()),
        }
    }
}

/// A movie or show from the catalog. Read-only as far as lists are concerned.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub content_type: ContentType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub genres: BTreeSet<String>,
}

/// One user's saved reference to a catalog item.
///
/// Title and genres are copied from the catalog when the item is added and are
/// never refreshed afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRecord {
    pub user_id: String,
    pub content_id: String,
    pub content_type: ContentType,
    pub title_snapshot: String,
    pub genres_snapshot: BTreeSet<String>,
    pub added_at: DateTime<Utc>,
}

impl MembershipRecord {
    pub fn snapshot(user_id: &str, item: &CatalogItem, added_at: DateTime<Utc>) -> Self {
        MembershipRecord {
            user_id: user_id.to_owned(),
            content_id: item.id.clone(),
            content_type: item.content_type,
            title_snapshot: item.title.clone(),
            genres_snapshot: item.genres.clone(),
            added_at,
        }
    }
}

/// Outcome of an insert-if-absent against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert<T> {
    Inserted(T),
    Existing(T),
}

impl<T> Upsert<T> {
    pub fn into_inner(self) -> T {
        match self {
            Upsert::Inserted(value) | Upsert::Existing(value) => value,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Upsert::Inserted(_))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<MembershipRecord>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_accepts_tv_alias() {
        assert_eq!("tv".parse::<ContentType>(), Ok(ContentType::Show));
        assert_eq!("show".parse::<ContentType>(), Ok(ContentType::Show));
        assert_eq!("movie".parse::<ContentType>(), Ok(ContentType::Movie));
        assert!("Movie".parse::<ContentType>().is_err());
        assert!("".parse::<ContentType>().is_err());

        let parsed: ContentType = serde_json::from_str("\"tv\"").unwrap();
        assert_eq!(parsed, ContentType::Show);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"show\"");
    }

    #[test]
    fn record_serializes_in_camel_case() {
        let item = CatalogItem {
            id: "movie-1".to_owned(),
            content_type: ContentType::Movie,
            title: "Fast Action".to_owned(),
            description: String::new(),
            genres: vec!["Action".to_owned()].into_iter().collect(),
        };
        let record = MembershipRecord::snapshot("u1", &item, Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["contentId"], "movie-1");
        assert_eq!(json["contentType"], "movie");
        assert_eq!(json["titleSnapshot"], "Fast Action");
        assert_eq!(json["genresSnapshot"], serde_json::json!(["Action"]));
        assert!(json["addedAt"].is_string());
    }
}
