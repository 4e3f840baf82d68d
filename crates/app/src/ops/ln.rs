use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Ln {
    /// Path the link points to
    pub target: String,

    /// Link to create
    pub link: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LnError {
    #[error("ln failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Ln {
    type Error = LnError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connection().await?;
        conn.create_link(&self.link, &self.target).await?;
        let target = conn.read_link(&self.link).await?;
        Ok(format!("/{} -> {}", self.link.trim_start_matches('/'), target))
    }
}
