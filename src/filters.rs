use rusqlite::types::Value;
use std::collections::BTreeSet;

use crate::models::{JobType, LocationType};

/// The user's current search criteria.
///
/// Equality is structural; the type set compares as a set, so selection order
/// and repeated picks do not make two criteria differ.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterCriteria {
    pub search: String,
    pub location: String,
    pub job_types: BTreeSet<JobType>,
    pub remote: bool,
    pub hybrid: bool,
}

impl FilterCriteria {
    pub fn is_unconstrained(&self) -> bool {
        self.to_query().is_unconstrained()
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = JobType>) -> Self {
        self.job_types = types.into_iter().collect();
        self
    }

    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_hybrid(mut self, hybrid: bool) -> Self {
        self.hybrid = hybrid;
        self
    }

    /// One-line summary for headers and logs.
    pub fn describe(&self) -> String {
        let query = self.to_query();
        if query.is_unconstrained() {
            return "all jobs".to_string();
        }
        let mut parts = Vec::new();
        if let Some(s) = &query.search {
            parts.push(format!("\"{}\"", s));
        }
        if let Some(l) = &query.location {
            parts.push(format!("in {}", l));
        }
        if !query.job_types.is_empty() {
            let types: Vec<&str> = query.job_types.iter().map(|t| t.as_str()).collect();
            parts.push(types.join("/"));
        }
        if !query.location_types.is_empty() {
            let kinds: Vec<&str> = query.location_types.iter().map(|t| t.as_str()).collect();
            parts.push(kinds.join("/"));
        }
        parts.join(", ")
    }

    /// Translate the criteria into a backend predicate.
    pub fn to_query(&self) -> JobQuery {
        let mut location_types = Vec::new();
        if self.remote {
            location_types.push(LocationType::Remote);
        }
        if self.hybrid {
            location_types.push(LocationType::Hybrid);
        }

        JobQuery {
            search: non_blank(&self.search),
            location: non_blank(&self.location),
            job_types: self.job_types.iter().copied().collect(),
            location_types,
        }
    }
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalized predicate over the jobs collection.
///
/// `None` and empty lists impose no constraint. Results are always ordered
/// newest first with id ascending as the tie-break, so a given offset maps to
/// the same rows while the data is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
    /// Case-insensitive substring of title or company name.
    pub search: Option<String>,
    /// Case-insensitive substring of the location text.
    pub location: Option<String>,
    /// Inclusive OR over employment types.
    pub job_types: Vec<JobType>,
    /// Inclusive OR over location types.
    pub location_types: Vec<LocationType>,
}

pub const ORDER_BY_SQL: &str = "created_at DESC, id ASC";
pub const ORDER_BY_REST: &str = "created_at.desc,id.asc";

pub struct SqlPage {
    pub sql: String,
    pub params: Vec<Value>,
}

impl JobQuery {
    pub fn is_unconstrained(&self) -> bool {
        self.search.is_none()
            && self.location.is_none()
            && self.job_types.is_empty()
            && self.location_types.is_empty()
    }

    /// Render as a SQLite statement selecting `columns` from `jobs`.
    pub fn to_sql(&self, columns: &str, offset: usize, limit: usize) -> SqlPage {
        let mut sql = format!("SELECT {} FROM jobs WHERE 1=1", columns);
        let mut params: Vec<Value> = vec![];

        if let Some(search) = &self.search {
            let pattern = like_pattern(search);
            sql.push_str(&format!(
                " AND (title LIKE ?{n} ESCAPE '\\' OR company_name LIKE ?{n} ESCAPE '\\')",
                n = params.len() + 1
            ));
            params.push(Value::Text(pattern));
        }

        if let Some(location) = &self.location {
            sql.push_str(&format!(
                " AND location LIKE ?{} ESCAPE '\\'",
                params.len() + 1
            ));
            params.push(Value::Text(like_pattern(location)));
        }

        if !self.job_types.is_empty() {
            let slots = self.placeholders(params.len(), self.job_types.len());
            sql.push_str(&format!(" AND job_type IN ({})", slots));
            params.extend(self.job_types.iter().map(|t| Value::Text(t.as_str().to_string())));
        }

        if !self.location_types.is_empty() {
            let slots = self.placeholders(params.len(), self.location_types.len());
            sql.push_str(&format!(" AND location_type IN ({})", slots));
            params.extend(
                self.location_types
                    .iter()
                    .map(|t| Value::Text(t.as_str().to_string())),
            );
        }

        sql.push_str(&format!(" ORDER BY {}", ORDER_BY_SQL));
        sql.push_str(&format!(
            " LIMIT ?{} OFFSET ?{}",
            params.len() + 1,
            params.len() + 2
        ));
        params.push(Value::Integer(limit as i64));
        params.push(Value::Integer(offset as i64));

        SqlPage { sql, params }
    }

    fn placeholders(&self, already: usize, count: usize) -> String {
        (1..=count)
            .map(|i| format!("?{}", already + i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render as PostgREST query pairs for `GET /rest/v1/jobs`.
    pub fn to_rest_params(&self, offset: usize, limit: usize) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];

        if let Some(search) = &self.search {
            let value = rest_quoted(&rest_ilike_value(search));
            params.push((
                "or".to_string(),
                format!("(title.ilike.{v},company_name.ilike.{v})", v = value),
            ));
        }

        if let Some(location) = &self.location {
            params.push((
                "location".to_string(),
                format!("ilike.{}", rest_ilike_value(location)),
            ));
        }

        if !self.job_types.is_empty() {
            let list: Vec<&str> = self.job_types.iter().map(|t| t.as_str()).collect();
            params.push(("type".to_string(), format!("in.({})", list.join(","))));
        }

        if !self.location_types.is_empty() {
            let list: Vec<&str> = self.location_types.iter().map(|t| t.as_str()).collect();
            params.push((
                "location_type".to_string(),
                format!("in.({})", list.join(",")),
            ));
        }

        params.push(("order".to_string(), ORDER_BY_REST.to_string()));
        params.push(("offset".to_string(), offset.to_string()));
        params.push(("limit".to_string(), limit.to_string()));
        params
    }
}

// Backslash-escape the LIKE metacharacters so the term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn like_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

// PostgREST spells the `%` wildcard as `*`; the value itself goes to ILIKE
fn rest_ilike_value(term: &str) -> String {
    format!("*{}*", escape_like(term))
}

// Values inside PostgREST logical operators must be double-quoted when they
// contain reserved characters such as `,` or `)`.
fn rest_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
