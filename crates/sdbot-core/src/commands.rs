//! Global slash-command registration.

use sdbot_types::command::{ApplicationCommand, ai_command};
use tracing::info;

use crate::chat::ChatError;
use crate::discord::DiscordClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub application_id: String,
    pub removed: Vec<String>,
    pub registered: Vec<String>,
}

/// Replaces every global command of the bot's application with the relay's
/// own command set.
#[derive(Debug, Clone)]
pub struct CommandRegistrar {
    client: DiscordClient,
    commands: Vec<ApplicationCommand>,
}

impl CommandRegistrar {
    pub fn new(client: DiscordClient) -> Self {
        Self {
            client,
            commands: vec![ai_command()],
        }
    }

    pub fn commands(&self) -> &[ApplicationCommand] {
        &self.commands
    }

    pub async fn sync(&self) -> Result<SyncReport, ChatError> {
        let session = self.client.login().await?;
        let application_id = session.application_id().to_owned();

        let existing = session.list_commands().await?;
        let mut removed = Vec::with_capacity(existing.len());
        for command in existing {
            session.delete_command(&command.id).await?;
            info!(%application_id, command = %command.name, "removed command");
            removed.push(command.name);
        }

        let registered: Vec<String> = session
            .overwrite_commands(&self.commands)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        info!(%application_id, commands = ?registered, "registered commands");

        Ok(SyncReport {
            application_id,
            removed,
            registered,
        })
    }
}
