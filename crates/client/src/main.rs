//! `advisory`: a terminal client for the virtual advisory board.

use advisory_client::{
    ApiClient, ChatSession, ClientConfig, ConnectionConfig, ConnectionEvent, ConnectionManager,
    ResearchWorkflow, WsConnector,
    voice::{KeyEvent, MicrophoneSource, PushToTalk, VoicePipeline},
};
use advisory_core::{AdvisorSuggestion, Message, ResearchRequest, Sender};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing::info;

#[derive(Parser)]
#[command(name = "advisory", version, about = "Talk to your virtual advisory board", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available advisors
    Advisors,
    /// Chat with one advisor. Reads messages from stdin when none is given.
    Chat {
        #[arg(short, long)]
        advisor: String,
        /// Text file sent along as context
        #[arg(short, long)]
        document: Option<PathBuf>,
        message: Option<String>,
    },
    /// Ask several advisors the same question
    Panel {
        /// Comma-separated advisor ids; all advisors when omitted
        #[arg(short, long, value_delimiter = ',')]
        advisors: Vec<String>,
        #[arg(short, long)]
        document: Option<PathBuf>,
        topic: String,
    },
    /// Work with the research approval queue
    Research {
        #[command(subcommand)]
        action: ResearchAction,
    },
    /// Open a live session and print what the server pushes
    Listen {
        #[arg(short, long, value_delimiter = ',')]
        advisors: Vec<String>,
    },
    /// Push-to-talk: press Enter to start recording and Enter again to send
    Record {
        #[arg(short, long, value_delimiter = ',')]
        advisors: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ResearchAction {
    /// Show pending and completed requests
    List,
    /// Propose a new research request
    Propose {
        query: String,
        #[arg(short, long, default_value = "")]
        context: String,
        /// `advisor:suggestion`, repeatable
        #[arg(short, long = "suggest")]
        suggestions: Vec<String>,
    },
    /// Approve a proposed request and run it
    Approve { request_id: String },
    /// Deny a proposed request
    Deny { request_id: String },
    /// Keep the queue on screen, refreshing on the configured interval
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(api = %config.api_base, ws = %config.ws_url, "Configuration loaded");

    let api = ApiClient::new(config.api_base.clone());

    match cli.command {
        Commands::Advisors => {
            for advisor in api.list_advisors().await? {
                println!("{:<8} {:<18} {}", advisor.id, advisor.name, advisor.description);
            }
        }
        Commands::Chat {
            advisor,
            document,
            message,
        } => chat(api, advisor, document, message).await?,
        Commands::Panel {
            advisors,
            document,
            topic,
        } => {
            let mut session = ChatSession::new(Arc::new(api));
            session.attach_document(read_document(document).await?);
            for reply in session.send_panel(&topic, &advisors).await? {
                print_message(reply);
            }
        }
        Commands::Research { action } => research(&config, api, action).await?,
        Commands::Listen { advisors } => listen(&config, advisors).await?,
        Commands::Record { advisors } => record(&config, advisors).await?,
    }
    Ok(())
}

async fn read_document(path: Option<PathBuf>) -> anyhow::Result<Option<String>> {
    match path {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .map(Some)
            .with_context(|| format!("Failed to read document {}", path.display())),
        None => Ok(None),
    }
}

fn print_message(message: &Message) {
    match message.sender {
        Sender::User => println!("you> {}", message.content),
        Sender::Advisor => println!(
            "{}> {}",
            message.advisor_name.as_deref().unwrap_or("advisor"),
            message.content
        ),
    }
}

async fn chat(
    api: ApiClient,
    advisor: String,
    document: Option<PathBuf>,
    message: Option<String>,
) -> anyhow::Result<()> {
    let mut session = ChatSession::new(Arc::new(api));
    session
        .load_roster()
        .await
        .context("Failed to load advisors")?;
    if !session.select_advisor(&advisor) {
        bail!("unknown advisor '{advisor}'");
    }
    session.attach_document(read_document(document).await?);

    if let Some(message) = message {
        print_message(session.send_chat(&message).await?);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        print_message(session.send_chat(&line).await?);
    }
    Ok(())
}

fn print_request(request: &ResearchRequest) {
    let cost = request
        .cost_estimate
        .map(|c| format!("${c:.4}"))
        .unwrap_or_else(|| "-".to_string());
    println!("{}  {:<11} {:>9}  {}", request.id, request.status.as_str(), cost, request.query);
}

fn print_queue(workflow: &ResearchWorkflow) {
    println!("Pending:");
    for request in workflow.pending() {
        print_request(&request);
    }
    println!("Completed:");
    for request in workflow.completed() {
        print_request(&request);
    }
}

fn parse_suggestion(raw: &str) -> anyhow::Result<AdvisorSuggestion> {
    let (advisor, suggestion) = raw
        .split_once(':')
        .with_context(|| format!("suggestion '{raw}' is not in advisor:text form"))?;
    Ok(AdvisorSuggestion {
        advisor: advisor.trim().to_string(),
        suggestion: suggestion.trim().to_string(),
    })
}

async fn research(
    config: &ClientConfig,
    api: ApiClient,
    action: ResearchAction,
) -> anyhow::Result<()> {
    let workflow = Arc::new(ResearchWorkflow::new(Arc::new(api)));
    match action {
        ResearchAction::List => {
            workflow.refresh().await?;
            print_queue(&workflow);
        }
        ResearchAction::Propose {
            query,
            context,
            suggestions,
        } => {
            let suggestions = suggestions
                .iter()
                .map(|s| parse_suggestion(s))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let receipt = workflow.propose(&query, &context, &suggestions).await?;
            println!("Proposed {} ({})", receipt.request_id, receipt.status);
            if let Some(refined) = &receipt.refined_query {
                println!("{refined}");
            }
            if let Some(cost) = receipt.cost_estimate {
                println!("Estimated cost: ${cost:.4}");
            }
        }
        ResearchAction::Approve { request_id } => {
            let report = workflow.approve(&request_id).await?;
            println!("{} {}", report.request_id, report.status);
            if let Some(results) = &report.results {
                println!("{}", serde_json::to_string_pretty(results)?);
            }
            if let Some(error) = &report.error {
                println!("error: {error}");
            }
        }
        ResearchAction::Deny { request_id } => {
            let receipt = workflow.deny(&request_id).await?;
            println!("{} {}", receipt.request_id, receipt.status);
        }
        ResearchAction::Watch => {
            let poll = workflow.spawn_polling(config.research_poll_interval);
            let mut ticker = tokio::time::interval(config.research_poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => print_queue(&workflow),
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            poll.close();
        }
    }
    Ok(())
}

fn connect(
    config: &ClientConfig,
    advisors: Vec<String>,
) -> (ConnectionManager, broadcast::Receiver<ConnectionEvent>) {
    let manager = ConnectionManager::new(ConnectionConfig::from(config), Arc::new(WsConnector));
    let events = manager.subscribe();
    let mut ready = manager.subscribe();
    let starter = manager.clone();
    // (Re)open the session every time the transport comes up.
    tokio::spawn(async move {
        while let Ok(event) = ready.recv().await {
            if event == ConnectionEvent::Connection(true) {
                starter.start_session(advisors.clone());
            }
        }
    });
    manager.connect();
    (manager, events)
}

fn print_event(event: &ConnectionEvent) -> bool {
    match event {
        ConnectionEvent::Connection(up) => {
            println!("-- {}", if *up { "connected" } else { "disconnected" })
        }
        ConnectionEvent::Message(message) => print_message(message),
        ConnectionEvent::AdvisorUpdate(advisors) => {
            let names: Vec<_> = advisors.iter().map(|a| a.name.as_str()).collect();
            println!("-- advisors: {}", names.join(", "));
        }
        ConnectionEvent::VoiceProcessing(_) => println!("-- processing voice..."),
        ConnectionEvent::VoiceResponse(reply) => {
            if let Some(transcript) = &reply.transcript {
                println!("you (voice)> {transcript}");
            }
            if let Some(response) = &reply.response {
                println!(
                    "{}> {response}",
                    reply.advisor_name.as_deref().unwrap_or("advisor")
                );
            }
        }
        ConnectionEvent::Error { message, terminal } => {
            eprintln!("error: {message}");
            return !terminal;
        }
    }
    true
}

async fn listen(config: &ClientConfig, advisors: Vec<String>) -> anyhow::Result<()> {
    let (manager, mut events) = connect(config, advisors);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => if !print_event(&event) { break },
                Err(RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) if !line.trim().is_empty() => {
                    manager.send_message(line, None, vec![]);
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    manager.end_session();
    manager.disconnect();
    Ok(())
}

#[cfg(feature = "microphone")]
fn microphone() -> Arc<dyn MicrophoneSource> {
    Arc::new(advisory_client::voice::CpalMicrophone)
}

#[cfg(not(feature = "microphone"))]
fn microphone() -> Arc<dyn MicrophoneSource> {
    Arc::new(advisory_client::voice::NoMicrophone)
}

async fn record(config: &ClientConfig, advisors: Vec<String>) -> anyhow::Result<()> {
    let (manager, mut events) = connect(config, advisors);
    let pipeline = Arc::new(VoicePipeline::new(microphone(), manager.clone()));
    let ptt = PushToTalk::new(config.push_to_talk_key.clone(), pipeline.clone());
    let mut levels = pipeline.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Press Enter to start talking, Enter again to send. Ctrl+C quits.");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => if !print_event(&event) { break },
                Err(RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },
            changed = levels.changed() => {
                if changed.is_err() { break }
                let state = levels.borrow_and_update().clone();
                if state.is_recording {
                    let bars = (state.audio_level * 20.0).round() as usize;
                    eprint!("\r[{:<20}]", "#".repeat(bars));
                }
            }
            line = lines.next_line() => {
                if line?.is_none() { break }
                let key = ptt.key().to_string();
                let event = if pipeline.is_recording() {
                    eprintln!();
                    KeyEvent::up(key)
                } else {
                    KeyEvent::down(key)
                };
                if let Err(e) = ptt.handle(&event).await {
                    eprintln!("voice: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    pipeline.dispose();
    manager.end_session();
    manager.disconnect();
    Ok(())
}
