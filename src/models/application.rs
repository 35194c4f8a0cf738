use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Hiring pipeline stage of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Applied,
    Reviewing,
    Interview,
    Hired,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::Reviewing => "Reviewing",
            ApplicationStatus::Interview => "Interview",
            ApplicationStatus::Hired => "Hired",
            ApplicationStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Applied" => Ok(ApplicationStatus::Applied),
            "Reviewing" => Ok(ApplicationStatus::Reviewing),
            "Interview" => Ok(ApplicationStatus::Interview),
            "Hired" => Ok(ApplicationStatus::Hired),
            "Rejected" => Ok(ApplicationStatus::Rejected),
            other => Err(format!("unknown application status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub email: String,
    pub job_title: String,
    pub status: ApplicationStatus,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ApplicationRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub job_title: String,
    pub status: String,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = crate::error::Error;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(crate::error::Error::Internal)?;
        Ok(Application {
            id: row.id,
            name: row.name,
            email: row.email,
            job_title: row.job_title,
            status,
        })
    }
}

/// Free-form event log entry attached to an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationNote {
    pub id: Uuid,
    pub application_id: String,
    pub author_id: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ApplicationStatus::Applied,
            ApplicationStatus::Reviewing,
            ApplicationStatus::Interview,
            ApplicationStatus::Hired,
            ApplicationStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<ApplicationStatus>(), Ok(status));
        }
        assert!("interview".parse::<ApplicationStatus>().is_err());
    }
}
