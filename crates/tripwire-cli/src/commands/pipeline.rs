//! `tripwire pipeline` — list pipelines with triggers, link, unlink.

use anyhow::bail;
use clap::Subcommand;

use super::App;

#[derive(Subcommand)]
pub enum PipelineCommand {
    /// List pipelines that have triggers defined
    List {
        /// Trigger-event URI filter(s)
        #[arg(long)]
        event: Vec<String>,
    },
    /// Connect a pipeline to the specified trigger event(s)
    Link {
        pipeline: String,
        #[arg(required = true)]
        events: Vec<String>,
    },
    /// Disconnect a pipeline from the specified trigger event(s)
    Unlink {
        pipeline: String,
        #[arg(required = true)]
        events: Vec<String>,
    },
}

pub async fn handle(app: &App, command: PipelineCommand) -> anyhow::Result<()> {
    match command {
        PipelineCommand::List { event } => {
            let pipelines = app
                .store()
                .get_pipelines_for_triggers(app.ctx(), &event)
                .await?;
            if pipelines.is_empty() {
                bail!("no pipelines with triggers defined");
            }
            for pipeline in pipelines {
                println!("{pipeline}");
            }
        }
        PipelineCommand::Link { pipeline, events } => {
            app.store()
                .create_triggers_for_pipeline(app.ctx(), &pipeline, &events)
                .await?;
        }
        PipelineCommand::Unlink { pipeline, events } => {
            app.store()
                .delete_triggers_for_pipeline(app.ctx(), &pipeline, &events)
                .await?;
        }
    }
    Ok(())
}
