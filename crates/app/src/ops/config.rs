use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Config {
    type Error = ConfigError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(toml::to_string_pretty(ctx.config())?)
    }
}
