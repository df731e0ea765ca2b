pub mod config;
pub mod directory;
pub mod errors;
pub mod inbound;
pub mod records;

pub use directory::{DepartmentSummary, EmployeeContext, EmployeeId, EmployeeProfile};
pub use errors::{FailureClass, InterfaceError, RetryHint};
pub use inbound::{EventBatch, EventFields, InboundEvent, UNKNOWN};
pub use records::{
    MeetingInfo, MeetingScheduleResult, RecordKind, ResultRecord, SearchContextResult,
    SqlQueryResult, SqlStatus,
};
