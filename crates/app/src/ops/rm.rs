use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Rm {
    /// File or directory to remove
    pub path: String,

    /// Remove a non-empty directory and everything under it
    #[arg(long, short = 'r')]
    pub recursive: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RmError {
    #[error("{0} is not empty (use --recursive)")]
    NotEmpty(String),
    #[error("rm failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Rm {
    type Error = RmError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connection().await?;
        let entry = conn.get_attr(&self.path).await?;

        if entry.is_dir {
            if !self.recursive && !conn.is_dir_empty(&self.path).await? {
                return Err(RmError::NotEmpty(self.path.clone()));
            }
            conn.delete_directory(&self.path).await?;
        } else {
            conn.delete_file(&self.path).await?;
        }
        Ok(format!("Removed /{}", entry.path))
    }
}
