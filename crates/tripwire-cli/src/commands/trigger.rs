//! `tripwire trigger` — list, link, and unlink triggers.

use anyhow::bail;
use clap::Subcommand;

use super::App;

#[derive(Subcommand)]
pub enum TriggerCommand {
    /// List triggers filtered by trigger event or pipeline
    List {
        /// Trigger-event URI filter (cannot be mixed with --pipeline)
        #[arg(long)]
        event: Option<String>,
        /// Pipeline filter (cannot be mixed with --event)
        #[arg(long)]
        pipeline: Option<String>,
    },
    /// Connect a trigger event to the specified pipeline(s)
    Link {
        event_uri: String,
        #[arg(required = true)]
        pipelines: Vec<String>,
    },
    /// Disconnect a trigger event from the specified pipeline(s)
    Unlink {
        event_uri: String,
        #[arg(required = true)]
        pipelines: Vec<String>,
    },
}

pub async fn handle(app: &App, command: TriggerCommand) -> anyhow::Result<()> {
    match command {
        TriggerCommand::List { event, pipeline } => {
            let triggers = match (event, pipeline) {
                (Some(_), Some(_)) => bail!("--event cannot be mixed with --pipeline"),
                (Some(event), None) => app.store().get_event_triggers(app.ctx(), &event).await?,
                (None, Some(pipeline)) => {
                    app.store().get_pipeline_triggers(app.ctx(), &pipeline).await?
                }
                (None, None) => app.store().get_event_triggers(app.ctx(), "*").await?,
            };
            if triggers.is_empty() {
                bail!("no triggers defined");
            }
            for trigger in triggers {
                println!("{trigger}");
            }
        }
        TriggerCommand::Link {
            event_uri,
            pipelines,
        } => {
            app.store()
                .create_triggers_for_event(app.ctx(), &event_uri, &pipelines)
                .await?;
        }
        TriggerCommand::Unlink {
            event_uri,
            pipelines,
        } => {
            app.store()
                .delete_triggers_for_event(app.ctx(), &event_uri, &pipelines)
                .await?;
        }
    }
    Ok(())
}
