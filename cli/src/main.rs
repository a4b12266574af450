use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use huddle_core::{
    AppAction, AppUpdate, BusEvent, ChatEngine, EngineConfig, MessageDeliveryState, MessageKind,
    UpdateListener,
};
use huddle_loopback::{conversation_record, message_record, LoopbackBackend, LoopbackTransport};

const LOCAL_USER: &str = "me";

#[derive(Debug, Parser)]
#[command(name = "huddle")]
#[command(about = "Conversation sync engine demo driver")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scripted session against in-process fixtures
    Demo {
        /// Engine config file (JSON); defaults apply when absent
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pause between scripted steps, in milliseconds
        #[arg(long, default_value_t = 300)]
        step_ms: u64,
    },

    /// Print the effective engine configuration
    Config {
        /// Config file to load; defaults apply when absent
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Demo { config, step_ms } => cmd_demo(config, step_ms),
        Command::Config { path } => cmd_config(path),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn load_config(path: Option<PathBuf>) -> EngineConfig {
    match path {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::default(),
    }
}

fn print(v: serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(&v).expect("json encode"));
}

fn banner(label: &str) {
    println!("\n── {label} ──");
}

fn find_failed_message(engine: &ChatEngine) -> Option<String> {
    let state = engine.state();
    let view = state.active_conversation?;
    view.messages
        .iter()
        .rev()
        .find(|m| matches!(m.delivery, MessageDeliveryState::Failed { .. }))
        .map(|m| m.id.clone())
}

struct Printer;

impl UpdateListener for Printer {
    fn on_update(&self, update: AppUpdate) {
        let at = chrono::Local::now().format("%H:%M:%S%.3f");
        match update {
            AppUpdate::FullState(state) => {
                println!(
                    "[{at}] rev {} full state, {} conversations",
                    state.rev,
                    state.conversations.len()
                );
            }
            AppUpdate::ConnectionChanged { rev, connection } => {
                println!("[{at}] rev {rev} connection {connection:?}");
            }
            AppUpdate::BusyChanged { rev, busy } => {
                println!(
                    "[{at}] rev {rev} busy switching={} starting={}",
                    busy.switching, busy.starting_conversation
                );
            }
            AppUpdate::ConversationListChanged { rev, conversations } => {
                let line = conversations
                    .iter()
                    .map(|c| {
                        let typing = if c.typing_user_ids.is_empty() {
                            String::new()
                        } else {
                            format!(", typing: {}", c.typing_user_ids.join("+"))
                        };
                        format!("{} (unread {}{})", c.id, c.unread_count, typing)
                    })
                    .collect::<Vec<_>>()
                    .join("  |  ");
                println!("[{at}] rev {rev} list: {line}");
            }
            AppUpdate::ActiveConversationChanged {
                rev,
                active_conversation,
            } => match active_conversation {
                Some(view) => {
                    let last = view
                        .messages
                        .last()
                        .map(|m| format!("{}: {:?}", m.sender_id, m.content))
                        .unwrap_or_else(|| "empty".to_string());
                    println!(
                        "[{at}] rev {rev} viewing {}, {} messages, last {}",
                        view.conversation_id,
                        view.messages.len(),
                        last
                    );
                }
                None => println!("[{at}] rev {rev} view closed"),
            },
            AppUpdate::ScrollToLatest {
                rev,
                conversation_id,
            } => {
                println!("[{at}] rev {rev} scroll to latest in {conversation_id}");
            }
            AppUpdate::ToastChanged { rev, toast } => {
                println!("[{at}] rev {rev} toast {toast:?}");
            }
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

fn cmd_config(path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(path);
    print(serde_json::to_value(&config).context("encode config")?);
    Ok(())
}

fn cmd_demo(config: Option<PathBuf>, step_ms: u64) -> anyhow::Result<()> {
    let config = load_config(config);
    let step = Duration::from_millis(step_ms.max(10));

    let transport = LoopbackTransport::new();
    let backend = LoopbackBackend::new(LOCAL_USER);
    backend.seed_conversation(
        conversation_record("c-alice", "alice", 2_000),
        vec![
            message_record("m1", "c-alice", "alice", "hey, are you around?", 1_000),
            message_record("m2", "c-alice", LOCAL_USER, "give me a minute", 1_500),
        ],
    );
    backend.seed_conversation(
        conversation_record("c-bob", "bob", 1_000),
        vec![message_record("m3", "c-bob", "bob", "lunch tomorrow?", 900)],
    );

    let engine = ChatEngine::new(LOCAL_USER, config, backend.clone(), transport.clone());
    engine.listen_for_updates(Box::new(Printer));

    banner("server comes up");
    transport.connect();
    thread::sleep(step);

    banner("open the conversation with alice");
    engine.dispatch(AppAction::SelectConversation {
        conversation_id: "c-alice".into(),
    });
    thread::sleep(step);

    banner("alice starts typing, then replies");
    transport.push_event(&BusEvent::TypingChanged {
        conversation_id: "c-alice".into(),
        user_id: "alice".into(),
        is_typing: true,
    });
    thread::sleep(step);
    let reply = backend.deliver("c-alice", "alice", "i'm here now");
    transport.push_event(&BusEvent::MessageCreated {
        conversation_id: "c-alice".into(),
        message: reply,
    });
    thread::sleep(step);

    banner("send a message");
    engine.dispatch(AppAction::SendMessage {
        conversation_id: "c-alice".into(),
        content: "good, let's sync up".into(),
        kind: MessageKind::Text,
    });
    thread::sleep(step);

    banner("a send fails, then the retry lands");
    backend.fail_sends(true);
    engine.dispatch(AppAction::SendMessage {
        conversation_id: "c-alice".into(),
        content: "did you get this?".into(),
        kind: MessageKind::Text,
    });
    thread::sleep(step);
    backend.fail_sends(false);
    match find_failed_message(&engine) {
        Some(message_id) => engine.dispatch(AppAction::RetryMessage {
            conversation_id: "c-alice".into(),
            message_id,
        }),
        None => eprintln!("expected a failed message to retry"),
    }
    thread::sleep(step);

    banner("bob messages while we look at alice");
    let nudge = backend.deliver("c-bob", "bob", "so, lunch?");
    transport.push_event(&BusEvent::MessageCreated {
        conversation_id: "c-bob".into(),
        message: nudge,
    });
    thread::sleep(step);

    banner("switch to bob; his unread clears");
    engine.dispatch(AppAction::SelectConversation {
        conversation_id: "c-bob".into(),
    });
    thread::sleep(step);

    banner("final state");
    print(serde_json::to_value(engine.state()).context("encode state")?);
    Ok(())
}
