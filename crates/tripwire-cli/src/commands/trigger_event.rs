//! `tripwire trigger-event` — manage trigger-event definitions.

use clap::Subcommand;

use super::{parse_values, App};

#[derive(Subcommand)]
pub enum TriggerEventCommand {
    /// List defined trigger events
    List {
        /// Trigger event type
        #[arg(long, default_value = "")]
        r#type: String,
        /// Trigger event kind
        #[arg(long, default_value = "")]
        kind: String,
        /// Event URI filter
        #[arg(long, default_value = "")]
        filter: String,
    },
    /// Get a single trigger event by URI
    Get { event_uri: String },
    /// Create/define a trigger event
    Create {
        /// Trigger event type
        #[arg(long)]
        r#type: String,
        /// Trigger event kind
        #[arg(long, default_value = "")]
        kind: String,
        /// Event secret (auto-generated when skipped)
        #[arg(long, default_value = tripwire_broker::GENERATE_KEYWORD)]
        secret: String,
        /// Template value pair(s), as key=value
        #[arg(long)]
        value: Vec<String>,
    },
    /// Delete/undefine a trigger event by URI
    Delete { event_uri: String },
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

pub async fn handle(app: &App, command: TriggerEventCommand) -> anyhow::Result<()> {
    match command {
        TriggerEventCommand::List {
            r#type,
            kind,
            filter,
        } => {
            let events = app
                .store()
                .get_events(app.ctx(), &r#type, &kind, &filter)
                .await?;
            for event in events {
                println!("{event}");
            }
        }
        TriggerEventCommand::Get { event_uri } => {
            let event = app.store().get_event(app.ctx(), &event_uri).await?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        TriggerEventCommand::Create {
            r#type,
            kind,
            secret,
            value,
        } => {
            let values = parse_values(&value)?;
            let event = app
                .store()
                .create_event(app.ctx(), &r#type, &kind, &secret, &values)
                .await?;
            println!("New trigger event successfully created.");
            println!("{}", event.uri);
        }
        TriggerEventCommand::Delete { event_uri } => {
            app.store().delete_event(app.ctx(), &event_uri).await?;
            println!("Trigger event successfully deleted.");
        }
        TriggerEventCommand::Link {
            event_uri,
            pipelines,
        } => {
            app.store()
                .create_triggers_for_event(app.ctx(), &event_uri, &pipelines)
                .await?;
        }
        TriggerEventCommand::Unlink {
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
