use crate::error::ValidationError;
use crate::models::{JobType, LocationType, NewJob, Role, SalaryRange};

const MIN_TITLE: usize = 3;
const MIN_COMPANY: usize = 2;
const MIN_DESCRIPTION: usize = 50;
const MIN_NAME: usize = 2;

/// Raw input for posting a job.
#[derive(Debug, Clone)]
pub struct JobForm {
    pub title: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub job_type: JobType,
    pub location_type: LocationType,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub description: String,
    /// One requirement per line.
    pub requirements: String,
    /// One benefit per line.
    pub benefits: String,
}

impl JobForm {
    /// Validate into an insertable posting. A missing company name falls back
    /// to the employer's profile.
    pub fn validate(self, default_company: Option<&str>) -> Result<NewJob, ValidationError> {
        let title = require_len("title", &self.title, MIN_TITLE)?;
        let company = self
            .company_name
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or(default_company)
            .unwrap_or_default();
        let company_name = require_len("company name", company, MIN_COMPANY)?;
        let description = require_len("description", &self.description, MIN_DESCRIPTION)?;

        if let (Some(min), Some(max)) = (self.salary_min, self.salary_max) {
            if min > max {
                return Err(ValidationError::SalaryOrder { min, max });
            }
        }

        Ok(NewJob {
            title,
            company_name,
            location: self
                .location
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            location_type: self.location_type,
            job_type: self.job_type,
            salary: SalaryRange {
                min: self.salary_min,
                max: self.salary_max,
            },
            description,
            requirements: split_lines(&self.requirements),
            benefits: split_lines(&self.benefits),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SignupForm {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidSignup {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub company_name: Option<String>,
}

impl SignupForm {
    pub fn validate(self) -> Result<ValidSignup, ValidationError> {
        let full_name = require_len("full name", &self.full_name, MIN_NAME)?;
        let email = self.email.trim().to_string();
        if !is_email(&email) {
            return Err(ValidationError::InvalidEmail { field: "email" });
        }
        let company_name = match self.role {
            Role::Employer => self
                .company_name
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            Role::Seeker => None,
        };
        Ok(ValidSignup {
            full_name,
            email,
            role: self.role,
            company_name,
        })
    }
}

fn require_len(field: &'static str, value: &str, min: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < min {
        return Err(ValidationError::TooShort { field, min });
    }
    Ok(trimmed.to_string())
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
