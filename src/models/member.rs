// src/models/member.rs
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Academic standing of a library member.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, EnumString, Display, AsRefStr, sqlx::Type,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AcademicRole {
    /// Student
    Mahasiswa,
    /// Lecturer
    Dosen,
    /// Administrative staff
    Tendik,
}

/// Public view of a member, as embedded in ledger and bookshelf responses.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberProfile {
    pub id: i64,
    pub nama: String,
    pub username: String,
    pub email: String,
    pub academic_role: Option<AcademicRole>,
    pub no_induk: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_academic_role_from_str() {
        assert_eq!(AcademicRole::from_str("mahasiswa").unwrap(), AcademicRole::Mahasiswa);
        assert_eq!(AcademicRole::from_str("DOSEN").unwrap(), AcademicRole::Dosen);
        assert!(AcademicRole::from_str("rektor").is_err());
        assert_eq!(AcademicRole::Tendik.as_ref(), "tendik");
    }
}
