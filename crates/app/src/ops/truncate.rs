use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Truncate {
    /// File to resize
    pub path: String,

    /// New size in bytes
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TruncateError {
    #[error("truncate failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Truncate {
    type Error = TruncateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        ctx.connection()
            .await?
            .truncate_file(&self.path, self.size)
            .await?;
        Ok(format!("Truncated /{} to {} bytes", self.path.trim_start_matches('/'), self.size))
    }
}
