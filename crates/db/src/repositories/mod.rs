use async_trait::async_trait;
use thiserror::Error;

use courier_core::directory::{DepartmentSummary, EmployeeContext, EmployeeId, EmployeeProfile};

pub mod employee;
pub mod memory;

pub use employee::SqlEmployeeDirectory;
pub use memory::InMemoryEmployeeDirectory;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_employee(&self, id: &EmployeeId)
        -> Result<Option<EmployeeProfile>, RepositoryError>;

    async fn find_department(&self, name: &str)
        -> Result<Option<DepartmentSummary>, RepositoryError>;

    async fn save_employee(&self, employee: EmployeeProfile) -> Result<(), RepositoryError>;

    async fn save_department(&self, department: DepartmentSummary) -> Result<(), RepositoryError>;

    /// Employee profile plus their department summary when one is on file.
    async fn employee_context(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeContext>, RepositoryError> {
        let Some(employee) = self.find_employee(id).await? else {
            return Ok(None);
        };
        let department = match employee.department.as_deref() {
            Some(name) => self.find_department(name).await?,
            None => None,
        };
        Ok(Some(EmployeeContext { employee, department }))
    }
}
