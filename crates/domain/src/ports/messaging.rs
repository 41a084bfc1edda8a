use async_trait::async_trait;
use rotation_errors::RotationResult;
use serde::{Deserialize, Serialize};

/// 一封待发送的邮件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// 外发消息接口；发送失败必须返回 `RotationError::Delivery`
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> RotationResult<()>;
}
