use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

/// A member of an organization's roster, as the engine sees it. The full
/// employee record (payroll, leave, compensation) lives elsewhere in the
/// product and is out of scope here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMember {
    pub id: EmployeeId,
    pub org_id: OrgId,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub active: bool,
}
