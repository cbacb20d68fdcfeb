//! Handler seams, one trait per payload family.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::JobError;
use crate::types::{
    AiRequest, BlockchainTx, ContentValidation, JobContext, JobPayload, NftOperation,
    NotificationPayload,
};

/// Sends contract transactions. Expected to scale gas by `ctx.gas_multiplier`.
#[async_trait]
pub trait BlockchainHandler: Send + Sync {
    async fn execute(&self, tx: &BlockchainTx, ctx: &JobContext) -> Result<Value, JobError>;
}

#[async_trait]
pub trait NftHandler: Send + Sync {
    async fn execute(&self, op: &NftOperation, ctx: &JobContext) -> Result<Value, JobError>;
}

#[async_trait]
pub trait ValidationHandler: Send + Sync {
    async fn validate(
        &self,
        request: &ContentValidation,
        ctx: &JobContext,
    ) -> Result<Value, JobError>;
}

#[async_trait]
pub trait AiHandler: Send + Sync {
    async fn analyze(&self, request: &AiRequest, ctx: &JobContext) -> Result<Value, JobError>;
}

#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn notify(
        &self,
        notification: &NotificationPayload,
        ctx: &JobContext,
    ) -> Result<Value, JobError>;
}

/// Registered handlers. A payload whose handler is missing fails with
/// [`JobError::UnknownJobType`].
#[derive(Clone, Default)]
pub struct JobHandlers {
    blockchain: Option<Arc<dyn BlockchainHandler>>,
    nft: Option<Arc<dyn NftHandler>>,
    validation: Option<Arc<dyn ValidationHandler>>,
    ai: Option<Arc<dyn AiHandler>>,
    notification: Option<Arc<dyn NotificationHandler>>,
}

impl JobHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blockchain(mut self, handler: Arc<dyn BlockchainHandler>) -> Self {
        self.blockchain = Some(handler);
        self
    }

    pub fn with_nft(mut self, handler: Arc<dyn NftHandler>) -> Self {
        self.nft = Some(handler);
        self
    }

    pub fn with_validation(mut self, handler: Arc<dyn ValidationHandler>) -> Self {
        self.validation = Some(handler);
        self
    }

    pub fn with_ai(mut self, handler: Arc<dyn AiHandler>) -> Self {
        self.ai = Some(handler);
        self
    }

    pub fn with_notification(mut self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.notification = Some(handler);
        self
    }

    pub async fn dispatch(&self, payload: &JobPayload, ctx: &JobContext) -> Result<Value, JobError> {
        let missing = || JobError::UnknownJobType(payload.job_type());
        match payload {
            JobPayload::Blockchain(tx) => {
                self.blockchain.as_ref().ok_or_else(missing)?.execute(tx, ctx).await
            }
            JobPayload::Nft(op) => self.nft.as_ref().ok_or_else(missing)?.execute(op, ctx).await,
            JobPayload::ValidateContent(request) => {
                self.validation
                    .as_ref()
                    .ok_or_else(missing)?
                    .validate(request, ctx)
                    .await
            }
            JobPayload::AiAnalyze(request) => {
                self.ai.as_ref().ok_or_else(missing)?.analyze(request, ctx).await
            }
            JobPayload::Notification(notification) => {
                self.notification
                    .as_ref()
                    .ok_or_else(missing)?
                    .notify(notification, ctx)
                    .await
            }
        }
    }
}

impl std::fmt::Debug for JobHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandlers")
            .field("blockchain", &self.blockchain.is_some())
            .field("nft", &self.nft.is_some())
            .field("validation", &self.validation.is_some())
            .field("ai", &self.ai.is_some())
            .field("notification", &self.notification.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobType, QueueClass};
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl NotificationHandler for Echo {
        async fn notify(
            &self,
            notification: &NotificationPayload,
            _ctx: &JobContext,
        ) -> Result<Value, JobError> {
            Ok(json!({ "delivered": notification.user_id }))
        }
    }

    fn ctx() -> JobContext {
        JobContext {
            job_id: 1,
            class: QueueClass::Notification,
            tracking_id: "t".into(),
            attempt: 1,
            gas_multiplier: 1.0,
            user_address: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_registered_handler() {
        let handlers = JobHandlers::new().with_notification(Arc::new(Echo));
        let payload = JobPayload::Notification(NotificationPayload {
            user_id: "u1".into(),
            kind: "welcome".into(),
            data: Value::Null,
        });

        let value = handlers.dispatch(&payload, &ctx()).await.unwrap();
        assert_eq!(value, json!({ "delivered": "u1" }));
    }

    #[tokio::test]
    async fn test_missing_handler_is_unknown_job_type() {
        let handlers = JobHandlers::new();
        let payload = JobPayload::Blockchain(BlockchainTx::ClaimRewards { pool_id: 1 });

        let err = handlers.dispatch(&payload, &ctx()).await.unwrap_err();
        assert_eq!(err, JobError::UnknownJobType(JobType::ClaimRewards));
        assert!(err.is_permanent());
    }
}
