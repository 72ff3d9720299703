use clap::{Parser, Subcommand};
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use hearth::config::Config;
use hearth::gateway::{Gesture, ModelGateway};
use hearth::notify::{LogNotifier, Notifier};
use hearth::session::ChatSession;
use hearth::store::Vault;
use hearth::theme::VibeState;
use hearth::tools::{ToolDispatcher, builtin_registry};

#[derive(Parser)]
#[command(name = "hearth", version, about = "A local-first conversational companion with a heartbeat")]
struct Cli {
    /// Path to a config file (default: ~/.config/hearth/hearth.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the companion (default)
    Chat {
        /// Chat id to resume; defaults to the most recent chat
        id: Option<i64>,
    },
    /// List chats
    Chats,
    /// Start a fresh chat and talk
    New,
    /// Delete a chat and its messages
    Delete { id: i64 },
    /// Export the whole vault as one JSON document
    Export {
        /// Output file; stdout when omitted
        output: Option<PathBuf>,
    },
    /// List stored memories
    Memories,
    /// List diary entries
    Diary,
    /// List pending check-ins
    Checkins,
}

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hearth")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("hearth.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

struct App {
    config: Config,
    vault: Arc<Vault>,
    gateway: Arc<ModelGateway>,
    notifier: Arc<LogNotifier>,
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let vault = Arc::new(Vault::open(&config.vault.dir).context("Failed to open vault")?);
        let theme = Arc::new(VibeState::new());
        let notifier = Arc::new(LogNotifier::new());

        let registry = builtin_registry(vault.clone(), theme, notifier.clone(), &config.persona.name);
        let dispatcher = Arc::new(ToolDispatcher::new(Arc::new(registry)));
        let gateway = Arc::new(
            ModelGateway::new(config.api.clone(), config.persona.system_prompt.clone(), dispatcher)
                .context("Failed to build model gateway")?,
        );

        Ok(Self {
            config,
            vault,
            gateway,
            notifier,
        })
    }

    /// Surface check-ins whose time has come, then mark them done
    fn deliver_due_checkins(&self) -> Result<()> {
        for checkin in self.vault.due_checkins(chrono::Utc::now())? {
            println!("{} {}", "check-in:".yellow().bold(), checkin.message);
            self.notifier.notify(&self.config.persona.name, &checkin.message);
            self.vault.complete_checkin(checkin.id)?;
        }
        Ok(())
    }

    async fn run_chat(&self, id: Option<i64>, fresh: bool) -> Result<()> {
        let chat = if fresh {
            self.vault.create_chat("New Chat")?
        } else {
            match id {
                Some(id) => self
                    .vault
                    .get_chat(id)?
                    .ok_or_else(|| eyre::eyre!("no chat with id {}", id))?,
                None => match self.vault.chats()?.into_iter().next() {
                    Some(chat) => chat,
                    None => self.vault.create_chat("New Chat")?,
                },
            }
        };

        self.deliver_due_checkins()?;

        let name = self.config.persona.name.clone();
        for message in self.vault.messages(chat.id)? {
            print_message(&name, message.role, &message.content, message.proactive);
        }

        let session = ChatSession::open(
            chat.id,
            self.vault.clone(),
            self.gateway.clone(),
            &self.config.heartbeat,
        );

        println!(
            "{}",
            format!("[{} | chat {} | /pet /tickle /quit]", chat.title, chat.id).dimmed()
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{} ", "you>".green().bold());
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim().to_string();

            let response = match line.as_str() {
                "" => continue,
                "/quit" | "/exit" => break,
                "/pet" => session.gesture(Gesture::Petting).await?,
                "/tickle" => session.gesture(Gesture::Tickling).await?,
                text => session.send(text).await?,
            };

            match response {
                Some(reply) => {
                    for call in &reply.tool_calls {
                        println!("{}", format!("[tool: {}]", call.name).dimmed());
                    }
                    print_message(&name, hearth::gateway::Role::Assistant, &reply.content, false);
                }
                None => println!("{}", "(still thinking, hold on)".dimmed()),
            }
        }

        session.close();
        println!("{}", "bye".dimmed());
        Ok(())
    }

    fn list_chats(&self) -> Result<()> {
        let chats = self.vault.chats()?;
        if chats.is_empty() {
            println!("{}", "No chats yet".dimmed());
            return Ok(());
        }
        for chat in chats {
            println!(
                "{:>5}  {}  {}",
                chat.id.to_string().cyan(),
                chat.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                chat.title
            );
        }
        Ok(())
    }

    fn export(&self, output: Option<PathBuf>) -> Result<()> {
        let export = self.vault.export_all()?;
        let json = serde_json::to_string_pretty(&export)?;
        match output {
            Some(path) => {
                fs::write(&path, json).context("Failed to write export file")?;
                println!("{} {}", "Exported vault to".green(), path.display());
            }
            None => println!("{}", json),
        }
        Ok(())
    }

    fn list_memories(&self) -> Result<()> {
        for memory in self.vault.memories()? {
            println!(
                "{:>5}  [{}]  {} = {}",
                memory.id.to_string().cyan(),
                memory.priority.as_str().yellow(),
                memory.key.bold(),
                memory.value
            );
        }
        Ok(())
    }

    fn list_diary(&self) -> Result<()> {
        for entry in self.vault.diary_entries()? {
            println!(
                "{}  ({})\n{}\n",
                entry.date.format("%Y-%m-%d %H:%M").to_string().cyan(),
                entry.mood.yellow(),
                entry.content
            );
        }
        Ok(())
    }

    fn list_checkins(&self) -> Result<()> {
        for checkin in self.vault.pending_checkins()? {
            println!(
                "{:>5}  {}  {}",
                checkin.id.to_string().cyan(),
                checkin.scheduled_for.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                checkin.message
            );
        }
        Ok(())
    }
}

fn print_message(name: &str, role: hearth::gateway::Role, content: &str, proactive: bool) {
    use hearth::gateway::Role;
    match role {
        Role::User => println!("{} {}", "you>".green().bold(), content),
        Role::Assistant => {
            let marker = if proactive { format!("{}*>", name) } else { format!("{}>", name) };
            println!("{} {}", marker.cyan().bold(), content);
        }
        Role::System => println!("{}", content.dimmed()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging()?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("Starting hearth with model {}", config.api.model);

    let app = App::build(config)?;

    match cli.command {
        None => app.run_chat(None, false).await,
        Some(Commands::Chat { id }) => app.run_chat(id, false).await,
        Some(Commands::New) => app.run_chat(None, true).await,
        Some(Commands::Chats) => app.list_chats(),
        Some(Commands::Delete { id }) => {
            app.vault.delete_chat(id)?;
            println!("{} {}", "Deleted chat".green(), id);
            Ok(())
        }
        Some(Commands::Export { output }) => app.export(output),
        Some(Commands::Memories) => app.list_memories(),
        Some(Commands::Diary) => app.list_diary(),
        Some(Commands::Checkins) => app.list_checkins(),
    }
}
