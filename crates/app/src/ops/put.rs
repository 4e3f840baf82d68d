use std::path::PathBuf;

use bytes::Bytes;
use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Local file to upload
    pub source: PathBuf,

    /// Destination path in the container
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("put failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Put {
    type Error = PutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let data = tokio::fs::read(&self.source)
            .await
            .map_err(|e| PutError::Read(self.source.clone(), e))?;
        let size = data.len();

        let conn = ctx.connection().await?;
        conn.write_from_buffer(&self.path, Bytes::from(data)).await?;

        Ok(format!("Uploaded {} bytes to /{}", size, self.path.trim_start_matches('/')))
    }
}
