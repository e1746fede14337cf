use audit_rag::config::Settings;
use audit_rag::convo::{Chat, SessionConfig};
use audit_rag::datam::Role;
use audit_rag::error::RagError;
use audit_rag::modes::ConnectionMode;
use audit_rag::orchestra::{Orchestra, TurnOutcome};
use audit_rag::providers::cortex_complete::CortexComplete;
use audit_rag::providers::cortex_search::CortexSearch;
use audit_rag::providers::CompletionModel;
use audit_rag::retrieval::CitationColumns;
use audit_rag::session::SnowflakeSession;

use clap::{ArgAction, Parser};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const TITLE: &str = "💬 Chatbot - Informes de Control";

/// Chat about the CGR audit reports from the terminal.
#[derive(Parser, Debug)]
#[command(name = "audit-chat", version, about, long_about = None)]
struct Args {
    /// How to open the Snowflake session: host or keypair (detected when omitted)
    #[arg(long)]
    mode: Option<ConnectionMode>,

    /// Extra .env file to load before reading the environment
    #[arg(short, long)]
    env_file: Option<PathBuf>,

    /// Completion model
    #[arg(short, long)]
    model: Option<CompletionModel>,

    /// Cortex Search service to query
    #[arg(short, long)]
    service: Option<String>,

    /// Number of context chunks to retrieve (1-10)
    #[arg(long)]
    chunks: Option<u8>,

    /// Number of chat history messages to use (1-10)
    #[arg(long)]
    history: Option<u8>,

    /// Show the retrieved context and history summary after each answer
    #[arg(long)]
    debug: bool,

    /// Do not use the chat history
    #[arg(long)]
    no_history: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Some(path) = &args.env_file {
        if let Err(e) = dotenvy::from_path(path) {
            eprintln!("Error: cannot load {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // `log` records from the library are bridged into the subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(args: Args) -> Result<(), RagError> {
    let settings = Settings::from_env();
    let session = Arc::new(SnowflakeSession::connect(args.mode, &settings)?);
    log::info!("Connected to {} ({} mode)", session.base_url(), session.mode());

    let search = Arc::new(CortexSearch::new(Arc::clone(&session), &settings.search));
    let completion = Arc::new(CortexComplete::new(session));
    let orchestra =
        Orchestra::discover(search, completion, CitationColumns::from_settings(&settings.search)).await?;

    let mut config = SessionConfig::from_defaults(&settings.chat)?;
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(chunks) = args.chunks {
        config.set_num_retrieved_chunks(chunks)?;
    }
    if let Some(history) = args.history {
        config.set_num_chat_messages(history)?;
    }
    config.debug |= args.debug;
    if args.no_history {
        config.use_chat_history = false;
    }
    config.selected_service = Some(args.service.unwrap_or_else(|| settings.search.default_service.clone()));

    let mut chat = Chat::new(orchestra, config);
    repl(&mut chat).await
}

async fn repl(chat: &mut Chat) -> Result<(), RagError> {
    println!("{}", TITLE);
    match &chat.config.selected_service {
        Some(service) => println!("Servicio de búsqueda: {} | Modelo: {}", service, chat.config.model),
        None => println!("No se encontraron servicios de búsqueda Cortex; el ingreso de consultas está deshabilitado."),
    }
    println!("Escriba /help para ver los comandos.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", input_prompt(chat));
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            match handle_command(chat, command) {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => println!("⚠️  {}", e),
            }
            continue;
        }

        if !chat.input_enabled() {
            println!("No hay servicios de búsqueda disponibles; no se pueden recibir consultas.");
            continue;
        }

        println!("Pensando...");
        match chat.send(line).await {
            Ok(outcome) => render_outcome(chat, &outcome),
            Err(e) => {
                log::error!("Turn failed: {}", e);
                println!("Error: {}", e);
            }
        }
    }
    Ok(())
}

fn input_prompt(chat: &Chat) -> &'static str {
    if chat.input_enabled() {
        "👤 Ingrese su consulta...>"
    } else {
        "(deshabilitado)>"
    }
}

fn avatar(role: Role) -> &'static str {
    match role {
        Role::User => "👤",
        Role::Assistant => "❄️",
    }
}

fn render_outcome(chat: &Chat, outcome: &TurnOutcome) {
    println!("\n{} {}\n", avatar(Role::Assistant), outcome.response.trim_end());
    if !chat.config.debug {
        return;
    }
    if let Some(context) = &outcome.context {
        println!("--- Documentos de contexto ---\n{}", context);
    }
    if let Some(summary) = &outcome.history_summary {
        println!("--- Resumen de historial de chat ---\n{}\n", summary);
    }
}

fn handle_command(chat: &mut Chat, command: &str) -> Result<Flow, RagError> {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.collect::<Vec<_>>().join(" ");

    match name {
        "quit" | "exit" | "q" => return Ok(Flow::Quit),
        "help" => print_help(),
        "clear" => {
            chat.clear();
            println!("Conversación limpiada.");
        }
        "services" => {
            for service in chat.services() {
                let marker = if chat.config.selected_service.as_deref() == Some(service.name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{} {} (columna: {})", marker, service.name, service.search_column);
            }
        }
        "service" => {
            chat.select_service(&arg)?;
            println!("Servicio seleccionado: {}", arg);
        }
        "models" => {
            for model in CompletionModel::ALL {
                let marker = if model == chat.config.model { "*" } else { " " };
                println!("{} {}", marker, model);
            }
        }
        "model" => {
            chat.config.model = arg.parse()?;
            println!("Modelo seleccionado: {}", chat.config.model);
        }
        "chunks" => {
            chat.config.set_num_retrieved_chunks(parse_count(&arg)?)?;
            println!("Fragmentos de contexto: {}", chat.config.num_retrieved_chunks());
        }
        "history" => {
            chat.config.set_num_chat_messages(parse_count(&arg)?)?;
            println!("Mensajes en historial: {}", chat.config.num_chat_messages());
        }
        "debug" => {
            chat.config.debug = parse_toggle(&arg)?;
            println!("Modo debug: {}", on_off(chat.config.debug));
        }
        "use-history" => {
            chat.config.use_chat_history = parse_toggle(&arg)?;
            println!("Utilizar historial de chat: {}", on_off(chat.config.use_chat_history));
        }
        "state" => {
            let state = json!({
                "conversation_id": chat.conversation.id,
                "created_at": chat.conversation.created_at,
                "config": chat.config,
                "services": chat.services(),
                "messages": chat.conversation.messages(),
            });
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        other => {
            return Err(RagError::ConfigError(format!(
                "Unknown command '/{}'. Type /help for the list.",
                other
            )))
        }
    }
    Ok(Flow::Continue)
}

fn parse_count(arg: &str) -> Result<u8, RagError> {
    arg.trim()
        .parse()
        .map_err(|_| RagError::ConfigError(format!("'{}' is not a number between 1 and 10", arg)))
}

fn parse_toggle(arg: &str) -> Result<bool, RagError> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "true" | "si" | "sí" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(RagError::ConfigError(format!("Expected on/off, got '{}'", other))),
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn print_help() {
    println!(
        "Comandos:
  /clear                 Limpiar conversación
  /services              Listar servicios de búsqueda Cortex
  /service <nombre>      Seleccionar servicio de búsqueda
  /models                Listar modelos
  /model <id>            Seleccionar modelo
  /chunks <1-10>         Cantidad de fragmentos de contexto
  /history <1-10>        Cantidad de mensajes en historial de chat
  /debug on|off          Modo debug
  /use-history on|off    Utilizar historial de chat
  /state                 Estado de la sesión
  /quit                  Salir"
    );
}
