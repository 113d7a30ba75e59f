use std::fmt;

use exam_core::model::ExamDraft;
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    exam_files: Vec<String>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    NoExamFiles,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::NoExamFiles => write!(f, "at least one --exam-file is required"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("EXAM_DB_URL").unwrap_or_else(|_| "sqlite:exam.sqlite3".into());
        let mut exam_files: Vec<String> = std::env::var("EXAM_FILE").ok().into_iter().collect();

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--exam-file" => {
                    exam_files.push(require_value(&mut args, "--exam-file")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if exam_files.is_empty() {
            return Err(ArgsError::NoExamFiles);
        }

        Ok(Self { db_url, exam_files })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>      SQLite URL (default: sqlite:exam.sqlite3)");
    eprintln!("  --exam-file <path>     Exam JSON file to import (repeatable)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_FILE");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let url = if args.db_url.contains("mode=") || args.db_url.contains(":memory:") {
        args.db_url.clone()
    } else if args.db_url.contains('?') {
        format!("{}&mode=rwc", args.db_url)
    } else {
        format!("{}?mode=rwc", args.db_url)
    };
    let storage = Storage::sqlite(&url).await?;

    for path in &args.exam_files {
        let raw = std::fs::read_to_string(path)?;
        let exam = ExamDraft::from_json(&raw)?.validate()?;
        storage.exams.upsert_exam(&exam).await?;
        println!(
            "imported exam {} ({}, {} questions, {} min) from {path}",
            exam.id(),
            exam.title(),
            exam.question_count(),
            exam.duration_minutes()
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
