use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Fixed-width UTC timestamp format. Lexicographic order matches chronological
/// order, which the feed relies on for `ORDER BY created_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

/// Relative age, e.g. "3 days ago".
pub fn posted_ago(ts: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(*ts);
    let minutes = elapsed.num_minutes();
    let (n, unit) = if minutes < 1 {
        return "less than a minute ago".to_string();
    } else if minutes < 60 {
        (minutes, "minute")
    } else if elapsed.num_hours() < 24 {
        (elapsed.num_hours(), "hour")
    } else if elapsed.num_days() < 30 {
        (elapsed.num_days(), "day")
    } else if elapsed.num_days() < 365 {
        (elapsed.num_days() / 30, "month")
    } else {
        (elapsed.num_days() / 365, "year")
    };
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Internship,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::FullTime,
        JobType::PartTime,
        JobType::Contract,
        JobType::Internship,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "full-time",
            JobType::PartTime => "part-time",
            JobType::Contract => "contract",
            JobType::Internship => "internship",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobType::FullTime => "Full-time",
            JobType::PartTime => "Part-time",
            JobType::Contract => "Contract",
            JobType::Internship => "Internship",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Onsite,
    Remote,
    Hybrid,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Onsite => "onsite",
            LocationType::Remote => "remote",
            LocationType::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Seeker,
    Employer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Seeker => "seeker",
            Role::Employer => "employer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Reviewed,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Reviewed => "reviewed",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

macro_rules! text_enum {
    ($ty:ident, $what:literal, [$($variant:ident),+]) => {
        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(ValidationError::UnknownValue {
                    field: $what,
                    value: s.to_string(),
                })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(JobType, "job type", [FullTime, PartTime, Contract, Internship]);
text_enum!(LocationType, "location type", [Onsite, Remote, Hybrid]);
text_enum!(Role, "role", [Seeker, Employer]);
text_enum!(ApplicationStatus, "application status", [Pending, Reviewed, Accepted, Rejected]);

/// Salary bounds, both in the board's single currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl SalaryRange {
    pub const CURRENCY: &'static str = "EGP";

    pub fn display(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!(
                "{}–{} {}",
                group_thousands(min),
                group_thousands(max),
                Self::CURRENCY
            ),
            (Some(min), None) => format!("{} {}+", group_thousands(min), Self::CURRENCY),
            _ => "Competitive salary".to_string(),
        }
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: i64,
    pub title: String,
    pub company_name: String,
    pub location: Option<String>,
    pub location_type: LocationType,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(flatten, with = "salary_columns")]
    pub salary: SalaryRange,
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    pub employer_id: i64,
    pub created_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn location_label(&self) -> &str {
        match self.location_type {
            LocationType::Remote => "Remote",
            LocationType::Hybrid => "Hybrid",
            LocationType::Onsite => self.location.as_deref().unwrap_or("On-site"),
        }
    }
}

// Backend rows carry the salary as two flat columns.
mod salary_columns {
    use super::SalaryRange;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Columns {
        #[serde(default)]
        salary_min: Option<i64>,
        #[serde(default)]
        salary_max: Option<i64>,
    }

    pub fn serialize<S: Serializer>(range: &SalaryRange, s: S) -> Result<S::Ok, S::Error> {
        Columns {
            salary_min: range.min,
            salary_max: range.max,
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SalaryRange, D::Error> {
        let cols = Columns::deserialize(d)?;
        Ok(SalaryRange {
            min: cols.salary_min,
            max: cols.salary_max,
        })
    }
}

/// A validated posting ready to insert. Built by `forms::JobForm::validate`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub title: String,
    pub company_name: String,
    pub location: Option<String>,
    pub location_type: LocationType,
    pub job_type: JobType,
    pub salary: SalaryRange,
    pub description: String,
    pub requirements: Vec<String>,
    pub benefits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub company_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub job_id: i64,
    pub seeker_id: i64,
    pub seeker_name: String,
    pub seeker_email: String,
    pub cover_letter: Option<String>,
    pub resume_url: String,
    pub status: ApplicationStatus,
    pub applied_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salary_display() {
        let both = SalaryRange { min: Some(15000), max: Some(25000) };
        assert_eq!(both.display(), "15,000–25,000 EGP");

        let min_only = SalaryRange { min: Some(8000), max: None };
        assert_eq!(min_only.display(), "8,000 EGP+");

        // A max without a min reads as unspecified, like no salary at all
        let max_only = SalaryRange { min: None, max: Some(9000) };
        assert_eq!(max_only.display(), "Competitive salary");
        assert_eq!(SalaryRange::default().display(), "Competitive salary");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
        assert_eq!(group_thousands(-45000), "-45,000");
    }

    #[test]
    fn test_enum_text_round_trip() {
        for ty in JobType::ALL {
            assert_eq!(ty.as_str().parse::<JobType>().unwrap(), ty);
        }
        assert!("freelance".parse::<JobType>().is_err());
        assert_eq!("hybrid".parse::<LocationType>().unwrap(), LocationType::Hybrid);
        assert_eq!("employer".parse::<Role>().unwrap(), Role::Employer);
    }

    #[test]
    fn test_job_posting_from_backend_row() {
        let row = serde_json::json!({
            "id": 7,
            "title": "Backend Engineer",
            "company_name": "Nile Labs",
            "location": null,
            "location_type": "remote",
            "type": "full-time",
            "salary_min": 20000,
            "salary_max": null,
            "description": "Build services",
            "requirements": ["Rust"],
            "employer_id": 3,
            "created_at": "2026-01-02T03:04:05.000000Z"
        });
        let job: JobPosting = serde_json::from_value(row).unwrap();
        assert_eq!(job.job_type, JobType::FullTime);
        assert_eq!(job.location_type, LocationType::Remote);
        assert_eq!(job.salary, SalaryRange { min: Some(20000), max: None });
        assert!(job.benefits.is_empty());
        assert_eq!(job.location_label(), "Remote");
    }

    #[test]
    fn test_posted_ago() {
        let now = parse_timestamp("2026-05-10T12:00:00Z").unwrap();
        let ago = |secs: i64| posted_ago(&(now - chrono::Duration::seconds(secs)), now);
        assert_eq!(ago(10), "less than a minute ago");
        assert_eq!(ago(60), "1 minute ago");
        assert_eq!(ago(3 * 3600), "3 hours ago");
        assert_eq!(ago(86400), "1 day ago");
        assert_eq!(ago(45 * 86400), "1 month ago");
        assert_eq!(ago(800 * 86400), "2 years ago");
        // Clock skew reads as just posted
        assert_eq!(ago(-30), "less than a minute ago");
    }

    #[test]
    fn test_timestamp_format_sorts_chronologically() {
        let early = parse_timestamp("2026-01-02T03:04:05Z").unwrap();
        let late = early + chrono::Duration::milliseconds(1500);
        let a = format_timestamp(&early);
        let b = format_timestamp(&late);
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(&b).unwrap(), late);
    }
}
