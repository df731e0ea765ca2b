use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use courier_core::directory::{DepartmentSummary, EmployeeId, EmployeeProfile};

use crate::repositories::{EmployeeDirectory, RepositoryError};

/// Directory rows loaded from a JSON seed file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub departments: Vec<SeedDepartment>,
    #[serde(default)]
    pub employees: Vec<SeedEmployee>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedDepartment {
    pub department_id: String,
    pub department_name: String,
    pub location: Option<String>,
    pub head_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEmployee {
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
    pub hire_date: Option<String>,
    pub manager_id: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub employee_type: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub departments: usize,
    pub employees: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed file `{path}`: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse seed file `{path}`: {source}")]
    Parse { path: String, source: serde_json::Error },
    #[error("employee `{0}` reports to a manager that is not in the seed")]
    UnknownManager(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl DirectorySeed {
    pub fn from_path(path: &Path) -> Result<Self, SeedError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| SeedError::Read { path: display.clone(), source })?;
        serde_json::from_str(&raw).map_err(|source| SeedError::Parse { path: display, source })
    }

    /// Writes departments, then employees with every manager ahead of their reports.
    pub async fn apply(&self, directory: &dyn EmployeeDirectory) -> Result<SeedResult, SeedError> {
        for department in &self.departments {
            directory.save_department(department.clone().into()).await?;
        }

        let mut saved: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&SeedEmployee> = self.employees.iter().collect();
        while !pending.is_empty() {
            let (ready, blocked): (Vec<&SeedEmployee>, Vec<&SeedEmployee>) =
                pending.into_iter().partition(|employee| match employee.manager_id.as_deref() {
                    None => true,
                    Some(manager) => saved.contains(manager),
                });
            if ready.is_empty() {
                let stuck = blocked.first().map(|employee| employee.employee_id.clone());
                return Err(SeedError::UnknownManager(stuck.unwrap_or_default()));
            }
            for employee in ready {
                directory.save_employee(employee.clone().into()).await?;
                saved.insert(employee.employee_id.as_str());
            }
            pending = blocked;
        }

        Ok(SeedResult { departments: self.departments.len(), employees: self.employees.len() })
    }
}

impl From<SeedDepartment> for DepartmentSummary {
    fn from(seed: SeedDepartment) -> Self {
        Self {
            department_id: seed.department_id,
            department_name: seed.department_name,
            location: seed.location,
            head_id: seed.head_id.map(EmployeeId),
            head_name: None,
            employee_count: 0,
        }
    }
}

impl From<SeedEmployee> for EmployeeProfile {
    fn from(seed: SeedEmployee) -> Self {
        Self {
            employee_id: EmployeeId(seed.employee_id),
            first_name: seed.first_name,
            last_name: seed.last_name,
            job_title: seed.job_title,
            department: seed.department,
            email: seed.email,
            hire_date: seed.hire_date,
            manager_id: seed.manager_id.map(EmployeeId),
            manager_name: None,
            country: seed.country,
            region: seed.region,
            employee_type: seed.employee_type,
        }
    }
}
