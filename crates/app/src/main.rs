mod terminal;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use exam_core::model::{ExamId, Role, SubmitReason};
use services::{
    Clock, CountdownEnd, ExamLoopService, IdentityProvider, IntervalTicker, LocalIdentityProvider,
    SessionError, SessionRegistry, SessionView, SharedSession, run_countdown,
};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use terminal::{Command, HELP, render, resolve_answer};

type Input = Lines<BufReader<Stdin>>;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidExamId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidTickMs { raw: String },
    InvalidRole { raw: String },
    MissingEmail,
    MissingName,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidExamId { raw } => write!(f, "invalid --exam-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidTickMs { raw } => write!(f, "invalid --tick-ms value: {raw}"),
            ArgsError::InvalidRole { raw } => {
                write!(f, "invalid --role value: {raw} (super_admin, teacher, student)")
            }
            ArgsError::MissingEmail => write!(f, "--email (or EXAM_EMAIL) is required"),
            ArgsError::MissingName => write!(f, "--name is required"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take     [--db <sqlite_url>] [--exam-id <id>] [--email <email>] [--tick-ms <ms>]");
    eprintln!("  cargo run -p app -- add-user [--db <sqlite_url>] --email <email> --name <name> --role <role>");
    eprintln!();
    eprintln!("Defaults for take:");
    eprintln!("  --db sqlite:exam.sqlite3");
    eprintln!("  --exam-id 1");
    eprintln!("  --tick-ms 1000");
    eprintln!();
    eprintln!("The password is read from EXAM_PASSWORD, or prompted for on stdin.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_ID, EXAM_EMAIL, EXAM_PASSWORD, EXAM_TICK_MS, EXAM_LOG, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subcommand {
    Take,
    AddUser,
}

impl Subcommand {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "add-user" => Some(Self::AddUser),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct TakeArgs {
    db_url: String,
    exam_id: ExamId,
    email: String,
    tick: Duration,
}

#[derive(Debug)]
struct AddUserArgs {
    db_url: String,
    email: String,
    name: String,
    role: Role,
}

fn default_db_url() -> String {
    std::env::var("EXAM_DB_URL")
        .ok()
        .map_or_else(|| normalize_sqlite_url("sqlite:exam.sqlite3".into()), normalize_sqlite_url)
}

fn parse_db(args: &mut impl Iterator<Item = String>) -> Result<String, ArgsError> {
    let value = require_value(args, "--db")?;
    if value.trim().is_empty() {
        return Err(ArgsError::InvalidDbUrl { raw: value });
    }
    Ok(normalize_sqlite_url(value))
}

fn parse_tick_ms(raw: &str) -> Result<Duration, ArgsError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ArgsError::InvalidTickMs {
            raw: raw.to_owned(),
        }),
    }
}

impl TakeArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = default_db_url();
        let mut exam_id = match std::env::var("EXAM_ID") {
            Ok(raw) => raw
                .parse::<ExamId>()
                .map_err(|_| ArgsError::InvalidExamId { raw })?,
            Err(_) => ExamId::new(1),
        };
        let mut email = std::env::var("EXAM_EMAIL").ok();
        let mut tick = match std::env::var("EXAM_TICK_MS") {
            Ok(raw) => parse_tick_ms(&raw)?,
            Err(_) => Duration::from_secs(1),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = parse_db(args)?,
                "--exam-id" => {
                    let value = require_value(args, "--exam-id")?;
                    exam_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidExamId { raw: value.clone() })?;
                }
                "--email" => email = Some(require_value(args, "--email")?),
                "--tick-ms" => tick = parse_tick_ms(&require_value(args, "--tick-ms")?)?,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let email = email
            .filter(|e| !e.trim().is_empty())
            .ok_or(ArgsError::MissingEmail)?;
        Ok(Self {
            db_url,
            exam_id,
            email,
            tick,
        })
    }
}

impl AddUserArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = default_db_url();
        let mut email = None;
        let mut name = None;
        let mut role = Role::Student;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = parse_db(args)?,
                "--email" => email = Some(require_value(args, "--email")?),
                "--name" => name = Some(require_value(args, "--name")?),
                "--role" => {
                    let value = require_value(args, "--role")?;
                    role = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidRole { raw: value.clone() })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            email: email.ok_or(ArgsError::MissingEmail)?,
            name: name.ok_or(ArgsError::MissingName)?,
            role,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("EXAM_LOG").unwrap_or_else(|_| "info".into()))
    });

    // stdout belongs to the exam screen.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| err.to_string().into())
}

/// Password from `EXAM_PASSWORD`, otherwise one line from stdin.
async fn read_password(input: &mut Input) -> Result<String, Box<dyn std::error::Error>> {
    if let Ok(password) = std::env::var("EXAM_PASSWORD") {
        return Ok(password);
    }
    eprint!("password: ");
    let line = input
        .next_line()
        .await?
        .ok_or("stdin closed before a password was entered")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

async fn show(session: &SharedSession) {
    let guard = session.lock().await;
    println!("{}", render(&SessionView::from_session(&guard)));
    println!();
}

/// Apply one command. Returns `true` once the session is submitted.
async fn apply(service: &ExamLoopService, session: &SharedSession, command: Command) -> bool {
    let mut guard = session.lock().await;
    let result = match command {
        Command::Show => Ok(()),
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Previous => guard.previous(),
        Command::GoTo(index) => guard.go_to(index),
        Command::Next if !guard.is_last() => guard.next(),
        Command::Next | Command::Submit => service
            .submit(&mut guard, SubmitReason::UserRequested)
            .await
            .map(|_| ()),
        Command::Answer(input) => match resolve_answer(guard.current_question(), &input) {
            Ok(value) => guard.answer_current(value),
            Err(err) => {
                println!("{err}");
                Ok(())
            }
        },
    };

    match result {
        Ok(()) => {}
        Err(SessionError::Sink(err)) => {
            warn!(error = %err, "submission not delivered yet, will retry");
        }
        Err(err) => println!("{err}"),
    }
    guard.is_submitted()
}

async fn take(
    args: TakeArgs,
    storage: Storage,
    input: &mut Input,
) -> Result<(), Box<dyn std::error::Error>> {
    let identity = LocalIdentityProvider::new(Arc::clone(&storage.users));
    let password = read_password(input).await?;
    let user = identity.login(&args.email, &password).await?;

    let service = ExamLoopService::new(
        Clock::system(),
        Arc::clone(&storage.exams),
        Arc::clone(&storage.sink),
    );
    let session = service.start_session(&user, args.exam_id).await?;
    let attempt_id = session.attempt_id();
    let registry = SessionRegistry::new();
    let shared = registry.insert(session);

    let mut countdown = tokio::spawn({
        let service = service.clone();
        let shared = Arc::clone(&shared);
        let ticker = IntervalTicker::new(args.tick);
        async move { run_countdown(&service, shared, ticker).await }
    });
    let mut countdown_running = true;

    println!("{HELP}");
    println!();
    show(&shared).await;

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else {
                    info!(%attempt_id, "input closed, submitting");
                    apply(&service, &shared, Command::Submit).await;
                    break;
                };
                let submitted = match Command::parse(&line) {
                    Ok(command) => apply(&service, &shared, command).await,
                    Err(err) => {
                        println!("{err}");
                        false
                    }
                };
                if submitted {
                    break;
                }
                show(&shared).await;
            }
            joined = &mut countdown => {
                countdown_running = false;
                match joined? {
                    Ok(CountdownEnd::Expired(_)) => println!("Time is up. Your exam was submitted automatically."),
                    Ok(CountdownEnd::AlreadySubmitted | CountdownEnd::TickerClosed) => {}
                    Err(err) => warn!(error = %err, "expiry submission not delivered yet, will retry"),
                }
                break;
            }
        }
    }
    if countdown_running {
        countdown.abort();
    }

    let mut guard = shared.lock().await;
    if guard.receipt().is_none() && guard.is_submitted() {
        let receipt = service.finalize_submission(&mut guard).await?;
        info!(%attempt_id, receipt_id = receipt.id, "submission delivered on retry");
    }
    if let Some(message) = SessionView::from_session(&guard).completion_message() {
        println!("{message}");
    }
    drop(guard);
    registry.remove(attempt_id);

    identity.logout()?;
    Ok(())
}

async fn add_user(
    args: AddUserArgs,
    storage: Storage,
    input: &mut Input,
) -> Result<(), Box<dyn std::error::Error>> {
    let identity = LocalIdentityProvider::new(Arc::clone(&storage.users));
    let password = read_password(input).await?;
    let user = identity
        .register(&args.email, &args.name, args.role, &password)
        .await?;
    println!(
        "created {} account {} (id {}), home {}",
        user.role(),
        user.email(),
        user.id(),
        user.role().home_path()
    );
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Subcommand::Take,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Subcommand::Take,
        Some(first) => Subcommand::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            ArgsError::UnknownArg(first.to_owned())
        })?,
    };
    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    init_tracing()?;
    let mut iter = argv.into_iter();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let report = |e: ArgsError| {
        eprintln!("{e}");
        print_usage();
        e
    };
    match cmd {
        Subcommand::Take => {
            let args = TakeArgs::parse(&mut iter).map_err(report)?;
            prepare_sqlite_file(&args.db_url)?;
            let storage = Storage::sqlite(&args.db_url).await?;
            take(args, storage, &mut input).await
        }
        Subcommand::AddUser => {
            let args = AddUserArgs::parse(&mut iter).map_err(report)?;
            prepare_sqlite_file(&args.db_url)?;
            let storage = Storage::sqlite(&args.db_url).await?;
            add_user(args, storage, &mut input).await
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
