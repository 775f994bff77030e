use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use folio_ledger::{Ledger, LedgerConfig, LedgerError, LedgerFactory, StorageConfig, UserIdentity};
use tracing::debug;

use crate::cli::*;
use crate::session::{Reply, Session};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let ledger = open_ledger(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Shell => cmd_shell(ledger, format),
        Command::Exec(args) => cmd_exec(ledger, args, format),
        Command::Pages => {
            for id in ledger.page_ids() {
                println!("{}", id.to_hex().yellow());
            }
            Ok(())
        }
        Command::Gc => {
            let removed = ledger.collect_garbage()?;
            print_reply(&Reply::Ok { message: format!("{removed} objects removed") }, format)
        }
    }
}

fn open_ledger(cli: &Cli) -> anyhow::Result<Arc<Ledger>> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LedgerConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.storage = StorageConfig::Directory(dir.clone());
    }
    debug!(storage = ?config.storage, user = ?cli.user, "opening ledger");
    let ledger = match &cli.user {
        Some(user) => LedgerFactory::new(config).get_ledger(&UserIdentity::new(user.clone()))?,
        None => Arc::new(Ledger::open(config)?),
    };
    Ok(ledger)
}

fn cmd_shell(ledger: Arc<Ledger>, format: OutputFormat) -> anyhow::Result<()> {
    let mut session = Session::new(Arc::clone(&ledger))?;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("folio:{}> ", session.page().id().to_hex()[..8].cyan());
        io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            println!();
            break;
        };
        if matches!(line.trim(), "quit" | "exit") {
            break;
        }
        match session.execute(&line) {
            Ok(Some(reply)) => print_reply(&reply, format)?,
            Ok(None) => {}
            Err(e) => print_error(&e),
        }
    }
    ledger.flush()?;
    Ok(())
}

fn cmd_exec(ledger: Arc<Ledger>, args: ExecArgs, format: OutputFormat) -> anyhow::Result<()> {
    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading {}", args.script.display()))?;
    let mut session = Session::new(Arc::clone(&ledger))?;
    let mut failures = 0;
    for (number, line) in script.lines().enumerate() {
        match session.execute(line) {
            Ok(Some(reply)) => print_reply(&reply, format)?,
            Ok(None) => {}
            Err(e) if args.keep_going => {
                failures += 1;
                print_error(&e.context(format!("line {}", number + 1)));
            }
            Err(e) => {
                ledger.flush()?;
                return Err(e.context(format!("line {}", number + 1)));
            }
        }
    }
    ledger.flush()?;
    if failures > 0 {
        anyhow::bail!("{failures} line(s) failed");
    }
    Ok(())
}

fn print_reply(reply: &Reply, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", reply.to_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string(reply)?),
    }
    Ok(())
}

fn print_error(err: &anyhow::Error) {
    match err.chain().find_map(|cause| cause.downcast_ref::<LedgerError>()) {
        Some(ledger_err) => eprintln!(
            "{} {}: {:#}",
            "✗".red().bold(),
            ledger_err.status().as_str().red(),
            err
        ),
        None => eprintln!("{} {:#}", "✗".red().bold(), err),
    }
}
