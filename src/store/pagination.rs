use serde::{Deserialize, Deserializer};
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query string of `GET /v1/feed`, e.g. `?limit=10&sort=asc&tags=rust,go`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 20))]
    pub limit: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub offset: i64,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default, deserialize_with = "non_empty")]
    #[validate(length(max = 100))]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "comma_separated")]
    #[validate(length(max = 5))]
    pub tags: Vec<String>,
}

fn default_limit() -> i64 {
    20
}

fn non_empty<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn comma_separated<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    Ok(raw
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default())
}
