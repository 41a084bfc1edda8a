//! 仓储层的数据库错误转换
//!
//! 所有 sqlx 错误在这里带上操作上下文并写日志，再转换成 `RotationError`。

use std::fmt;

use rotation_errors::RotationError;
use sqlx::Error as SqlxError;
use tracing::error;

/// 仓储操作类型
#[derive(Debug, Clone, Copy)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Delete,
    Query,
    Complete,
    Latch,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Delete => write!(f, "删除"),
            RepositoryOperation::Query => write!(f, "列表查询"),
            RepositoryOperation::Complete => write!(f, "完成交接"),
            RepositoryOperation::Latch => write!(f, "锁存提醒"),
        }
    }
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// 记录并转换数据库错误
    pub fn database_error(
        operation: RepositoryOperation,
        entity: &str,
        err: SqlxError,
    ) -> RotationError {
        error!(operation = %operation, entity = entity, error = %err, "数据库操作失败");
        RotationError::database_error(format!("{operation}{entity}失败: {err}"))
    }

    pub fn is_unique_violation(err: &SqlxError) -> bool {
        match err {
            SqlxError::Database(db_err) => {
                db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        assert_eq!(RepositoryOperation::Complete.to_string(), "完成交接");
        assert_eq!(RepositoryOperation::Latch.to_string(), "锁存提醒");
    }

    #[test]
    fn test_database_error_carries_context() {
        let err = RepositoryErrorHelpers::database_error(
            RepositoryOperation::Read,
            "任务 (ID: 3)",
            SqlxError::RowNotFound,
        );
        assert!(matches!(err, RotationError::Database(_)));
        assert!(err.to_string().contains("查询任务 (ID: 3)失败"));
        assert!(!RepositoryErrorHelpers::is_unique_violation(&SqlxError::RowNotFound));
    }
}
