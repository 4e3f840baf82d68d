use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Chmod {
    /// Permission bits in octal, e.g. 644
    pub mode: String,

    /// File or directory to change
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ChmodError {
    #[error("invalid mode {0:?}: expected octal digits")]
    InvalidMode(String),
    #[error("chmod failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Chmod {
    type Error = ChmodError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mode = u32::from_str_radix(&self.mode, 8)
            .map_err(|_| ChmodError::InvalidMode(self.mode.clone()))?;
        let conn = ctx.connection().await?;
        conn.chmod(&self.path, mode).await?;
        Ok(format!("Mode of /{} set to {:04o}", self.path.trim_start_matches('/'), mode))
    }
}
