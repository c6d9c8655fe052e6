use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// 作业类型
///
/// 字符串形式统一使用 snake_case，既是HTTP路径片段，也是锁表中的 `kind` 列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    BulkLogin,
    Warmup,
    Avatar,
    Bio,
    Follow,
    ProxyDiagnostics,
    MediaDedup,
    CookieRobot,
}

impl JobKind {
    pub const ALL: [JobKind; 8] = [
        JobKind::BulkLogin,
        JobKind::Warmup,
        JobKind::Avatar,
        JobKind::Bio,
        JobKind::Follow,
        JobKind::ProxyDiagnostics,
        JobKind::MediaDedup,
        JobKind::CookieRobot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::BulkLogin => "bulk_login",
            JobKind::Warmup => "warmup",
            JobKind::Avatar => "avatar",
            JobKind::Bio => "bio",
            JobKind::Follow => "follow",
            JobKind::ProxyDiagnostics => "proxy_diagnostics",
            JobKind::MediaDedup => "media_dedup",
            JobKind::CookieRobot => "cookie_robot",
        }
    }

    /// 是否属于认证流程（登录、Cookie续期），这类作业使用更严格的重试策略
    pub fn is_auth_flow(&self) -> bool {
        matches!(self, JobKind::BulkLogin | JobKind::CookieRobot)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SchedulerError::Validation(format!("未知的作业类型: {s}")))
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobKind {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobKind {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<JobKind>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobKind {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_string_forms() {
        for kind in JobKind::ALL {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
    }

    #[test]
    fn test_unknown_job_kind_is_validation_error() {
        let err = "reboot".parse::<JobKind>().unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
    }

    #[test]
    fn test_auth_flows() {
        assert!(JobKind::BulkLogin.is_auth_flow());
        assert!(JobKind::CookieRobot.is_auth_flow());
        assert!(!JobKind::MediaDedup.is_auth_flow());
    }
}
