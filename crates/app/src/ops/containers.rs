use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Containers;

#[derive(Debug, thiserror::Error)]
pub enum ContainersError {
    #[error("failed to list containers: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Containers {
    type Error = ContainersError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let names = ctx.clients.list_containers()?;
        if names.is_empty() {
            return Ok("No containers".to_string());
        }
        Ok(names.join("\n"))
    }
}
