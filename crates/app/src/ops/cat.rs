use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// File to print
    pub path: String,

    /// Byte offset to start reading at
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Bytes to read; 0 reads to the end
    #[arg(long, default_value_t = 0)]
    pub length: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error("cat failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Cat {
    type Error = CatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connection().await?;
        let data = conn.read_buffer(&self.path, self.offset, self.length).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}
