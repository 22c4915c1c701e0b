use anyhow::{Context, Result};
use clap::Parser;
use neptune_chat::auth::{self, FileSecretStore, SecretStore};
use neptune_chat::client::ChatClient;
use neptune_chat::config::Config;
use neptune_chat::error::Error;
use neptune_chat::registry::{self, ModelId, Statefulness};
use neptune_chat::session::ChatSession;
use neptune_chat::transcript::{self, Transcript};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

type InputLines = Lines<BufReader<Stdin>>;

#[derive(Parser)]
#[command(
    name = "neptune",
    version,
    about = "Chat with Neptune AI models from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start an interactive chat session
    Chat {
        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Model id (see `neptune models`)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Send a single message and print the reply
    Ask {
        /// Message text
        text: String,

        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Model id (see `neptune models`)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Log in and store the access token
    Login {
        #[arg(long)]
        email: String,

        /// Password; falls back to $NEPTUNE_PASSWORD, then stdin
        #[arg(long)]
        password: Option<String>,

        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Forget the stored access token
    Logout {
        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// List available models
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("neptune_chat=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Chat { config, model } => {
            let cfg = load_config(&config)?;
            let model = pick_model(&cfg, model.as_deref())?;
            run_chat(&cfg, model).await
        }
        Command::Ask {
            text,
            config,
            model,
        } => {
            let cfg = load_config(&config)?;
            let model = pick_model(&cfg, model.as_deref())?;
            let client = ChatClient::from_config(&cfg.server)?;
            let token = token_store(&cfg).get()?;
            let mut session = ChatSession::new(model).with_token(token);
            if !run_turn(&mut session, &client, &text).await {
                anyhow::bail!("request failed");
            }
            Ok(())
        }
        Command::Login {
            email,
            password,
            config,
        } => {
            let cfg = load_config(&config)?;
            let client = ChatClient::from_config(&cfg.server)?;
            let password = match password.or_else(|| std::env::var("NEPTUNE_PASSWORD").ok()) {
                Some(p) => p,
                None => read_password_line().await?,
            };
            let mut store = token_store(&cfg);
            auth::login(&client, &mut store, &email, &password)
                .await
                .context("Login failed. Check credentials.")?;
            println!("Logged in as {email}");
            Ok(())
        }
        Command::Logout { config } => {
            let cfg = load_config(&config)?;
            auth::logout(&mut token_store(&cfg))?;
            println!("Logged out");
            Ok(())
        }
        Command::Models => {
            print_models(None);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let cfg = if path.exists() {
        Config::load(path)?
    } else {
        Config::default()
    };
    cfg.validate()?;
    Ok(cfg)
}

fn pick_model(cfg: &Config, cli_model: Option<&str>) -> Result<ModelId> {
    let id = cli_model.unwrap_or(&cfg.chat.default_model);
    Ok(id.parse::<ModelId>()?)
}

fn token_store(cfg: &Config) -> FileSecretStore {
    cfg.auth
        .token_path
        .clone()
        .map(FileSecretStore::new)
        .unwrap_or_default()
}

async fn read_password_line() -> Result<String> {
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    Ok(lines.next_line().await?.unwrap_or_default())
}

fn print_models(active: Option<ModelId>) {
    for m in registry::all() {
        let marker = if Some(m.id) == active { "*" } else { " " };
        let mode = match m.statefulness {
            Statefulness::Stateless => "stateless",
            Statefulness::Stateful => "stateful, streamed",
        };
        let persona = if m.persona_preamble.is_some() {
            ", persona"
        } else {
            ""
        };
        println!("{marker} {:<12} {} ({mode}{persona})", m.id.as_str(), m.display_label);
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Run one turn, printing the reply as it arrives. Ctrl-C abandons the turn.
/// Returns false if the exchange failed.
async fn run_turn(session: &mut ChatSession, client: &ChatClient, text: &str) -> bool {
    let speaker = session.model().speaker;
    let mut started = false;
    let print_delta = |delta: &str| {
        if !started {
            if let Some(name) = speaker {
                print!("{name}: ");
            }
            started = true;
        }
        print!("{delta}");
        let _ = std::io::stdout().flush();
    };

    let result = tokio::select! {
        r = session.submit(client, text, print_delta) => Some(r),
        _ = tokio::signal::ctrl_c() => None,
    };

    match result {
        None => {
            session.cancel_turn();
            println!("\n[cancelled]");
            true
        }
        Some(Ok(Some(turn))) => {
            println!();
            println!("  ({:.1} ms)", turn.latency.as_secs_f64() * 1000.0);
            true
        }
        Some(Ok(None)) => true,
        Some(Err(e)) => {
            println!();
            eprintln!("error: {e}");
            false
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

async fn run_chat(cfg: &Config, model: ModelId) -> Result<()> {
    let client = ChatClient::from_config(&cfg.server)?;
    let mut store = token_store(cfg);
    let token = store.get()?;
    let logged_in = token.is_some();
    let mut session = ChatSession::new(model).with_token(token);

    println!(
        "NEPTUNE AI ({}) at {}{}. Type /help for commands.",
        session.model().display_label,
        client.base_url(),
        if logged_in { ", logged in" } else { "" }
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix('/') {
            match handle_command(command, &mut session, &client, &mut store, &mut lines).await {
                Flow::Continue => continue,
                Flow::Quit => break,
            }
        }
        run_turn(&mut session, &client, line).await;
    }
    Ok(())
}

async fn handle_command(
    command: &str,
    session: &mut ChatSession,
    client: &ChatClient,
    store: &mut FileSecretStore,
    lines: &mut InputLines,
) -> Flow {
    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((command, ""));

    match name {
        "quit" | "exit" => return Flow::Quit,
        "help" => {
            println!("/models            list models");
            println!("/model <id>        switch model (clears the conversation)");
            println!("/reset             clear the conversation");
            println!("/save              archive the conversation on the server");
            println!("/export [dir]      write the conversation to a JSON file");
            println!("/login             log in");
            println!("/logout            forget the stored token");
            println!("/quit              leave (or Ctrl-D)");
            println!("Ctrl-C cancels a reply in progress.");
        }
        "models" => print_models(Some(session.model().id)),
        "model" => match session.select_model(arg) {
            Ok(m) => println!("Now chatting with {}", m.display_label),
            Err(e) => eprintln!("error: {e}"),
        },
        "reset" => {
            session.reset();
            println!("Conversation cleared");
        }
        "save" => {
            let conversation = session.conversation();
            match client
                .save_session(session.model().id, conversation.messages(), session.token())
                .await
            {
                Ok(id) => println!("Saved session {id}"),
                Err(e) => eprintln!("error: {e}"),
            }
        }
        "export" => {
            let dir = if arg.is_empty() {
                transcript::default_dir()
            } else {
                PathBuf::from(arg)
            };
            match Transcript::from_session(session).save(&dir) {
                Ok(path) => println!("Wrote {}", path.display()),
                Err(e) => eprintln!("error: {e}"),
            }
        }
        "login" => {
            if let Err(e) = repl_login(session, client, store, lines).await {
                match e {
                    Error::Auth(_) => eprintln!("Login failed. Check credentials."),
                    other => eprintln!("error: {other}"),
                }
            }
        }
        "logout" => match auth::logout(store) {
            Ok(()) => {
                session.set_token(None);
                println!("Logged out");
            }
            Err(e) => eprintln!("error: {e}"),
        },
        other => eprintln!("unknown command /{other}; try /help"),
    }
    Flow::Continue
}

async fn repl_login(
    session: &mut ChatSession,
    client: &ChatClient,
    store: &mut FileSecretStore,
    lines: &mut InputLines,
) -> neptune_chat::error::Result<()> {
    print!("Email: ");
    std::io::stdout().flush()?;
    let email = lines.next_line().await?.unwrap_or_default();
    print!("Password: ");
    std::io::stdout().flush()?;
    let password = lines.next_line().await?.unwrap_or_default();

    let token = auth::login(client, store, &email, &password).await?;
    session.set_token(Some(token));
    println!("Logged in as {}", email.trim());
    Ok(())
}
