use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Platform-wide user role. Ordering matters: later variants carry more
/// privileges, so `role >= Role::Instructor` style checks are valid.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Ta,
    Instructor,
    Admin,
}

impl Role {
    /// Roles an admin is allowed to assign when creating or updating users.
    pub const ASSIGNABLE: [Role; 4] = [Role::Student, Role::Ta, Role::Instructor, Role::Admin];

    /// Indicates whether a user with this role can manage courses.
    pub fn can_manage_courses(self) -> bool {
        self >= Role::Instructor
    }
}

impl std::default::Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Ta => write!(f, "ta"),
            Role::Instructor => write!(f, "instructor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_privilege() {
        assert!(Role::Student < Role::Ta);
        assert!(Role::Ta < Role::Instructor);
        assert!(Role::Instructor < Role::Admin);
        assert!(Role::Admin.can_manage_courses());
        assert!(Role::Instructor.can_manage_courses());
        assert!(!Role::Ta.can_manage_courses());
    }

    #[test]
    fn role_serializes_to_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Ta).unwrap(), "\"ta\"");
        assert_eq!(
            serde_json::to_string(&Role::Student).unwrap(),
            "\"student\""
        );
        let role: Role = serde_json::from_str("\"instructor\"").unwrap();
        assert_eq!(role, Role::Instructor);
    }
}
