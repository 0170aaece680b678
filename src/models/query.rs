//! Inbound request types: queries, data sources and the time range.

use serde::{Deserialize, Serialize};

/// Connection attributes of a data source.
///
/// Opaque to the scheduler apart from `id` (batch identity) and `ds_type`
/// (executor selection). Secrets are never serialized.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceInfo {
    pub id: i64,
    pub name: String,
    /// Type tag used to resolve the executor (e.g. "testdata", "math").
    #[serde(rename = "type")]
    pub ds_type: String,
    pub url: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub database: String,
    pub basic_auth: bool,
    pub basic_auth_user: String,
    #[serde(skip_serializing)]
    pub basic_auth_password: String,
}

impl std::fmt::Debug for DataSourceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.ds_type)
            .field("url", &self.url)
            .field("database", &self.database)
            .field("basic_auth", &self.basic_auth)
            .finish_non_exhaustive()
    }
}

impl DataSourceInfo {
    /// Data source with just an identity and a type tag.
    pub fn new(id: i64, ds_type: impl Into<String>) -> Self {
        Self {
            id,
            ds_type: ds_type.into(),
            ..Default::default()
        }
    }
}

/// One named sub-request bound to a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Unique within a request.
    pub ref_id: String,
    #[serde(default)]
    pub query: String,
    #[serde(rename = "datasource")]
    pub data_source: DataSourceInfo,
    /// RefIds whose results this query reads.
    #[serde(default)]
    pub depends: Vec<String>,
}

impl Query {
    pub fn new(ref_id: impl Into<String>, query: impl Into<String>, data_source: DataSourceInfo) -> Self {
        Self {
            ref_id: ref_id.into(),
            query: query.into(),
            data_source,
            depends: Vec::new(),
        }
    }

    /// Builder-style dependency declaration.
    pub fn depends_on<I, S>(mut self, ref_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends.extend(ref_ids.into_iter().map(Into::into));
        self
    }
}

/// Requested time range. Kept as raw strings; parsing belongs to executors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            from: "now-6h".to_string(),
            to: "now".to_string(),
        }
    }
}

/// A batch of queries answered as one response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default)]
    pub max_data_points: Option<u32>,
    pub queries: Vec<Query>,
}

impl Request {
    pub fn new(queries: Vec<Query>) -> Self {
        Self {
            queries,
            ..Default::default()
        }
    }

    /// Parse a request from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
