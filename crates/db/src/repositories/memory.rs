use std::collections::HashMap;

use tokio::sync::RwLock;

use courier_core::directory::{DepartmentSummary, EmployeeId, EmployeeProfile};

use super::{EmployeeDirectory, RepositoryError};

#[derive(Default)]
pub struct InMemoryEmployeeDirectory {
    employees: RwLock<HashMap<String, EmployeeProfile>>,
    departments: RwLock<HashMap<String, DepartmentSummary>>,
}

#[async_trait::async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn find_employee(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeProfile>, RepositoryError> {
        let employees = self.employees.read().await;
        let Some(mut employee) = employees.get(&id.0).cloned() else {
            return Ok(None);
        };
        employee.manager_name = employee
            .manager_id
            .as_ref()
            .and_then(|manager| employees.get(&manager.0))
            .map(EmployeeProfile::full_name);
        Ok(Some(employee))
    }

    async fn find_department(
        &self,
        name: &str,
    ) -> Result<Option<DepartmentSummary>, RepositoryError> {
        let departments = self.departments.read().await;
        let Some(mut department) =
            departments.values().find(|department| department.department_name == name).cloned()
        else {
            return Ok(None);
        };

        let employees = self.employees.read().await;
        department.head_name = department
            .head_id
            .as_ref()
            .and_then(|head| employees.get(&head.0))
            .map(EmployeeProfile::full_name);
        department.employee_count = employees
            .values()
            .filter(|employee| employee.department.as_deref() == Some(name))
            .count() as i64;
        Ok(Some(department))
    }

    async fn save_employee(&self, employee: EmployeeProfile) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.employee_id.0.clone(), employee);
        Ok(())
    }

    async fn save_department(&self, department: DepartmentSummary) -> Result<(), RepositoryError> {
        let mut departments = self.departments.write().await;
        departments.insert(department.department_id.clone(), department);
        Ok(())
    }
}
