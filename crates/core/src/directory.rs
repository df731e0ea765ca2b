//! Employee directory records used to ground HR queries.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    /// Finds the first `E###` or `emp###` token in free text, normalized to `E###`.
    pub fn find_in(text: &str) -> Option<Self> {
        let lowered = text.to_ascii_lowercase();
        let bytes = lowered.as_bytes();

        for start in 0..bytes.len() {
            if start > 0 && bytes[start - 1].is_ascii_alphanumeric() {
                continue;
            }
            let prefix_len = if bytes[start..].starts_with(b"emp") {
                3
            } else if bytes[start] == b'e' {
                1
            } else {
                continue;
            };

            let digits = &bytes[start + prefix_len..];
            let run = digits.iter().take_while(|byte| byte.is_ascii_digit()).count();
            if run == 3 {
                let number = &lowered[start + prefix_len..start + prefix_len + 3];
                return Some(Self(format!("E{number}")));
            }
        }
        None
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub employee_id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
    pub hire_date: Option<String>,
    pub manager_id: Option<EmployeeId>,
    pub manager_name: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub employee_type: Option<String>,
}

impl EmployeeProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentSummary {
    pub department_id: String,
    pub department_name: String,
    pub location: Option<String>,
    pub head_id: Option<EmployeeId>,
    pub head_name: Option<String>,
    pub employee_count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeContext {
    pub employee: EmployeeProfile,
    pub department: Option<DepartmentSummary>,
}

impl EmployeeContext {
    /// `Key: value` lines suitable for prefixing a resolver prompt.
    pub fn describe(&self) -> String {
        let employee = &self.employee;
        let mut lines = vec![
            format!("Employee ID: {}", employee.employee_id.0),
            format!("Full Name: {}", employee.full_name()),
        ];
        push_line(&mut lines, "Job Title", employee.job_title.as_deref());
        push_line(&mut lines, "Department", employee.department.as_deref());
        push_line(&mut lines, "Email", employee.email.as_deref());
        push_line(&mut lines, "Hire Date", employee.hire_date.as_deref());
        push_line(&mut lines, "Manager", employee.manager_name.as_deref());
        push_line(&mut lines, "Country", employee.country.as_deref());
        push_line(&mut lines, "Region", employee.region.as_deref());
        push_line(&mut lines, "Employee Type", employee.employee_type.as_deref());

        if let Some(department) = &self.department {
            push_line(&mut lines, "Department Location", department.location.as_deref());
            push_line(&mut lines, "Department Head", department.head_name.as_deref());
            lines.push(format!("Department Size: {}", department.employee_count));
        }
        lines.join("\n")
    }
}

fn push_line(lines: &mut Vec<String>, label: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
        lines.push(format!("{label}: {value}"));
    }
}
