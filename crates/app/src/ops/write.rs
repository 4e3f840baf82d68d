use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Write {
    /// File to modify; created when missing
    pub path: String,

    /// Text to write
    pub data: String,

    /// Byte offset to write at
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("write failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Write {
    type Error = WriteError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connection().await?;
        let mut handle = match conn.open(&self.path).await {
            Ok(handle) => handle,
            Err(EngineError::NotFound(_)) => conn.create_file(&self.path).await?,
            Err(e) => return Err(e.into()),
        };

        let written = conn
            .write(&mut handle, self.offset, self.data.as_bytes())
            .await?;
        conn.flush(&mut handle).await?;

        Ok(format!(
            "Wrote {} bytes at offset {} (size now {})",
            written,
            self.offset,
            handle.size()
        ))
    }
}
