use sqlx::Row;

use courier_core::directory::{DepartmentSummary, EmployeeId, EmployeeProfile};

use super::{EmployeeDirectory, RepositoryError};
use crate::DbPool;

pub struct SqlEmployeeDirectory {
    pool: DbPool,
}

impl SqlEmployeeDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_employee(row: &sqlx::sqlite::SqliteRow) -> Result<EmployeeProfile, RepositoryError> {
    let manager_id: Option<String> = decode(row.try_get("manager_id"))?;

    Ok(EmployeeProfile {
        employee_id: EmployeeId(decode(row.try_get("employee_id"))?),
        first_name: decode(row.try_get("first_name"))?,
        last_name: decode(row.try_get("last_name"))?,
        job_title: decode(row.try_get("job_title"))?,
        department: decode(row.try_get("department"))?,
        email: decode(row.try_get("email"))?,
        hire_date: decode(row.try_get("hire_date"))?,
        manager_id: manager_id.map(EmployeeId),
        manager_name: decode(row.try_get("manager_name"))?,
        country: decode(row.try_get("country"))?,
        region: decode(row.try_get("region"))?,
        employee_type: decode(row.try_get("employee_type"))?,
    })
}

fn row_to_department(row: &sqlx::sqlite::SqliteRow) -> Result<DepartmentSummary, RepositoryError> {
    let head_id: Option<String> = decode(row.try_get("head_id"))?;

    Ok(DepartmentSummary {
        department_id: decode(row.try_get("department_id"))?,
        department_name: decode(row.try_get("department_name"))?,
        location: decode(row.try_get("location"))?,
        head_id: head_id.map(EmployeeId),
        head_name: decode(row.try_get("head_name"))?,
        employee_count: decode(row.try_get("employee_count"))?,
    })
}

#[async_trait::async_trait]
impl EmployeeDirectory for SqlEmployeeDirectory {
    async fn find_employee(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT e.employee_id, e.first_name, e.last_name, e.job_title, e.department,
                    e.email, e.hire_date, e.manager_id,
                    CASE WHEN m.employee_id IS NULL THEN NULL
                         ELSE m.first_name || ' ' || m.last_name END AS manager_name,
                    e.country, e.region, e.employee_type
             FROM employees e
             LEFT JOIN employees m ON e.manager_id = m.employee_id
             WHERE e.employee_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_employee(r)?)),
            None => Ok(None),
        }
    }

    async fn find_department(
        &self,
        name: &str,
    ) -> Result<Option<DepartmentSummary>, RepositoryError> {
        let row = sqlx::query(
            "SELECT d.department_id, d.department_name, d.location, d.head_id,
                    CASE WHEN h.employee_id IS NULL THEN NULL
                         ELSE h.first_name || ' ' || h.last_name END AS head_name,
                    (SELECT COUNT(*) FROM employees e WHERE e.department = d.department_name)
                        AS employee_count
             FROM departments d
             LEFT JOIN employees h ON d.head_id = h.employee_id
             WHERE d.department_name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_department(r)?)),
            None => Ok(None),
        }
    }

    async fn save_employee(&self, employee: EmployeeProfile) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employees (employee_id, first_name, last_name, job_title, department,
                                    email, hire_date, manager_id, country, region, employee_type)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(employee_id) DO UPDATE SET
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 job_title = excluded.job_title,
                 department = excluded.department,
                 email = excluded.email,
                 hire_date = excluded.hire_date,
                 manager_id = excluded.manager_id,
                 country = excluded.country,
                 region = excluded.region,
                 employee_type = excluded.employee_type",
        )
        .bind(&employee.employee_id.0)
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(&employee.job_title)
        .bind(&employee.department)
        .bind(&employee.email)
        .bind(&employee.hire_date)
        .bind(employee.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(&employee.country)
        .bind(&employee.region)
        .bind(&employee.employee_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_department(&self, department: DepartmentSummary) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO departments (department_id, department_name, location, head_id)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(department_id) DO UPDATE SET
                 department_name = excluded.department_name,
                 location = excluded.location,
                 head_id = excluded.head_id",
        )
        .bind(&department.department_id)
        .bind(&department.department_name)
        .bind(&department.location)
        .bind(department.head_id.as_ref().map(|id| id.0.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use courier_core::directory::{DepartmentSummary, EmployeeId, EmployeeProfile};

    use super::SqlEmployeeDirectory;
    use crate::repositories::EmployeeDirectory;
    use crate::{connect_with_settings, migrations};

    async fn directory() -> SqlEmployeeDirectory {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlEmployeeDirectory::new(pool)
    }

    fn employee(id: &str, first: &str, manager: Option<&str>) -> EmployeeProfile {
        EmployeeProfile {
            employee_id: EmployeeId(id.to_string()),
            first_name: first.to_string(),
            last_name: "Lee".to_string(),
            job_title: Some("Analyst".to_string()),
            department: Some("Finance".to_string()),
            email: Some(format!("{}@example.test", first.to_lowercase())),
            hire_date: Some("2021-04-01".to_string()),
            manager_id: manager.map(|id| EmployeeId(id.to_string())),
            manager_name: None,
            country: Some("DE".to_string()),
            region: Some("EMEA".to_string()),
            employee_type: Some("full_time".to_string()),
        }
    }

    #[tokio::test]
    async fn employee_context_joins_manager_and_department() {
        let directory = directory().await;
        directory.save_employee(employee("E010", "Morgan", None)).await.expect("save manager");
        directory.save_employee(employee("E011", "Riley", Some("E010"))).await.expect("save report");
        directory
            .save_department(DepartmentSummary {
                department_id: "D07".to_string(),
                department_name: "Finance".to_string(),
                location: Some("Hamburg".to_string()),
                head_id: Some(EmployeeId("E010".to_string())),
                head_name: None,
                employee_count: 0,
            })
            .await
            .expect("save department");

        let context = directory
            .employee_context(&EmployeeId("E011".to_string()))
            .await
            .expect("query succeeds")
            .expect("employee exists");

        assert_eq!(context.employee.manager_name.as_deref(), Some("Morgan Lee"));
        let department = context.department.expect("department on file");
        assert_eq!(department.head_name.as_deref(), Some("Morgan Lee"));
        assert_eq!(department.employee_count, 2);
    }

    #[tokio::test]
    async fn unknown_employee_yields_none() {
        let directory = directory().await;

        let context =
            directory.employee_context(&EmployeeId("E999".to_string())).await.expect("query");

        assert!(context.is_none());
    }

    #[tokio::test]
    async fn save_employee_upserts() {
        let directory = directory().await;
        directory.save_employee(employee("E020", "Sam", None)).await.expect("insert");

        let mut promoted = employee("E020", "Sam", None);
        promoted.job_title = Some("Lead Analyst".to_string());
        directory.save_employee(promoted).await.expect("update");

        let stored = directory
            .find_employee(&EmployeeId("E020".to_string()))
            .await
            .expect("query")
            .expect("exists");
        assert_eq!(stored.job_title.as_deref(), Some("Lead Analyst"));
        assert_eq!(stored.manager_name, None);
    }
}
