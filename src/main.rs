//! txcoord - runs member registrations and reports what each store kept.
//!
//! This is the main entry point for the txcoord command-line interface.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use txcoord::service::{MemberService, ServiceConfig, DEFAULT_FAILURE_MARKER};
use txcoord::storage::{FailureTrigger, LogMessage, Member, Record, RecordStore};
use txcoord::transaction::{TransactionContext, TransactionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinVersion {
    V1,
    V2,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse simple command line args.
    let mut version = JoinVersion::V1;
    let mut config = ServiceConfig::default();
    let mut marker = DEFAULT_FAILURE_MARKER.to_string();
    let mut verbose = false;
    let mut usernames: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-j" | "--join" => {
                i += 1;
                match args.get(i).map(String::as_str) {
                    Some("v1") => version = JoinVersion::V1,
                    Some("v2") => version = JoinVersion::V2,
                    other => {
                        eprintln!("Unknown join version: {}", other.unwrap_or("<missing>"));
                        return ExitCode::FAILURE;
                    }
                }
            }
            "-c" | "--config" => {
                i += 1;
                match args.get(i).map(|s| s.parse::<ServiceConfig>()) {
                    Some(Ok(parsed)) => config = parsed,
                    Some(Err(e)) => {
                        eprintln!("{}", e);
                        return ExitCode::FAILURE;
                    }
                    None => {
                        eprintln!("Missing value for --config");
                        return ExitCode::FAILURE;
                    }
                }
            }
            "-f" | "--fail-marker" => {
                i += 1;
                match args.get(i) {
                    Some(value) => marker = value.clone(),
                    None => {
                        eprintln!("Missing value for --fail-marker");
                        return ExitCode::FAILURE;
                    }
                }
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("txcoord v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg => {
                if !arg.starts_with('-') {
                    usernames.push(arg.to_string());
                } else {
                    eprintln!("Unknown option: {}", arg);
                    return ExitCode::FAILURE;
                }
            }
        }
        i += 1;
    }

    init_logging(verbose);

    if usernames.is_empty() {
        usernames.push("member".to_string());
    }

    let members = RecordStore::<Member>::new("member");
    let logs = RecordStore::<LogMessage>::new("log").with_failure(FailureTrigger::Contains(marker));
    let manager = TransactionManager::new();
    let service = MemberService::new(manager.clone(), members.clone(), logs.clone(), config);
    let ctx = TransactionContext::new();

    println!("configuration: {}", service.config());

    let mut failed = false;
    for username in &usernames {
        let result = match version {
            JoinVersion::V1 => service.join_v1(&ctx, username),
            JoinVersion::V2 => service.join_v2(&ctx, username),
        };
        match result {
            Ok(()) => println!("{}: ok", username),
            Err(e) if e.is_unexpected_rollback() => {
                failed = true;
                println!("{}: unexpected rollback ({})", username, e);
            }
            Err(e) => {
                failed = true;
                println!("{}: failed ({})", username, e);
            }
        }
    }

    print_store(&members);
    print_store(&logs);

    let stats = manager.stats();
    println!(
        "transactions: begun={} joined={} committed={} rolled_back={} unexpected_rollbacks={}",
        stats.begun, stats.joined, stats.committed, stats.rolled_back, stats.unexpected_rollbacks
    );

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "txcoord=debug" } else { "txcoord=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_store<R: Record>(store: &RecordStore<R>) {
    let keys: Vec<String> = store
        .records()
        .iter()
        .map(|r| match r.id() {
            Some(id) => format!("{}#{}", r.key(), id),
            None => r.key().to_string(),
        })
        .collect();
    println!("{} store ({}): [{}]", store.name(), store.len(), keys.join(", "));
}

fn print_help() {
    println!("txcoord - nested-transaction coordinator demo");
    println!();
    println!("Usage: txcoord [OPTIONS] [USERNAME]...");
    println!();
    println!("Options:");
    println!("  -j, --join VERSION       v1 propagates log failures, v2 catches them (default: v1)");
    println!("  -c, --config PRESET      outer-off, single or outer-on (default: outer-on)");
    println!("  -f, --fail-marker TEXT   Log saves fail for usernames containing TEXT (default: {})", DEFAULT_FAILURE_MARKER);
    println!("  -v, --verbose            Enable debug logging");
    println!("  -h, --help               Show this help message");
    println!("  --version                Show version");
    println!();
    println!("Examples:");
    println!("  txcoord alice                              Register alice in one transaction");
    println!("  txcoord -j v2 log-exception_bob            Observe an unexpected rollback");
    println!("  txcoord -c outer-off -j v1 log-exception_x Keep the member, lose the log");
}
