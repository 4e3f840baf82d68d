use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Mkdir {
    /// Directory to create
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MkdirError {
    #[error("mkdir failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Mkdir {
    type Error = MkdirError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connection().await?;
        if conn.exists(&self.path).await? {
            return Err(EngineError::AlreadyExists(self.path.clone()).into());
        }
        conn.create_directory(&self.path).await?;
        Ok(format!("Created directory /{}", self.path.trim_start_matches('/')))
    }
}
