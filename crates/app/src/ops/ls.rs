use clap::Args;
use common::prelude::*;

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Directory to list
    #[arg(default_value = "/")]
    pub path: String,

    /// Show mode, size and modification time
    #[arg(long, short = 'l')]
    pub long: bool,

    /// Entries requested per listing page
    #[arg(long)]
    pub page_size: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error("ls failed: {0}")]
    Engine(#[from] EngineError),
}

fn format_entry(entry: &DirectoryEntry, long: bool) -> String {
    let name = if entry.is_dir {
        format!("{}/", entry.name)
    } else if entry.is_symlink {
        format!("{}@", entry.name)
    } else {
        entry.name.clone()
    };
    if !long {
        return name;
    }
    format!(
        "{:06o} {:>12} {} {}",
        entry.mode,
        entry.size,
        entry.mtime.format("%Y-%m-%d %H:%M"),
        name
    )
}

#[async_trait::async_trait]
impl crate::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connection().await?;

        let mut lines = Vec::new();
        let mut token = None;
        loop {
            let page = conn.list(&self.path, token, self.page_size).await?;
            lines.extend(page.entries.iter().map(|e| format_entry(e, self.long)));
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(lines.join("\n"))
    }
}
