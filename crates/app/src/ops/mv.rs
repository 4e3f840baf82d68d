use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Mv {
    /// Current path
    pub from: String,

    /// New path
    pub to: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MvError {
    #[error("mv failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Mv {
    type Error = MvError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connection().await?;
        if conn.exists(&self.to).await? {
            return Err(EngineError::AlreadyExists(self.to.clone()).into());
        }

        let entry = conn.get_attr(&self.from).await?;
        if entry.is_dir {
            conn.rename_directory(&self.from, &self.to).await?;
        } else {
            conn.rename_file(&self.from, &self.to).await?;
        }
        Ok(format!(
            "Moved /{} to /{}",
            entry.path,
            self.to.trim_start_matches('/')
        ))
    }
}
