use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Stat {
    /// File or directory to describe
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StatError {
    #[error("stat failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Stat {
    type Error = StatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let entry = ctx.connection().await?.get_attr(&self.path).await?;

        let kind = if entry.is_dir {
            "directory"
        } else if entry.is_symlink {
            "symbolic link"
        } else {
            "regular file"
        };
        let mut output = format!(
            "Path: /{}\n\
             Type: {}\n\
             Size: {}\n\
             Mode: {:04o}{}\n\
             Modified: {}\n\
             Created: {}",
            entry.path,
            kind,
            entry.size,
            entry.permissions(),
            if entry.mode_default { " (default)" } else { "" },
            entry.mtime.to_rfc3339(),
            entry.crtime.to_rfc3339(),
        );
        for (key, value) in &entry.metadata {
            output.push_str(&format!("\nMetadata: {}={}", key, value));
        }
        Ok(output)
    }
}
