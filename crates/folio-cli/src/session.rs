//! Line-oriented commands against one ledger.

use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use folio_ledger::{Commit, Entry, Ledger, Page, PageId, Priority, Snapshot, Timestamp, Value};
use serde::Serialize;

pub const HELP: &str = "\
page [new|root|rm <id>|<id>]   show or switch the current page
pages                          list pages
put <key> <value>              store an inline value
ref [--lazy] <key> <value>     store a value in the object store
get <key> [offset [max]]       read a value, or a byte range of it
ls [prefix]                    list entries
del <key>                      delete a key
begin | commit | rollback      explicit transactions
heads                          current heads of the page
log [n]                        newest n commits (default 10)
gc                             reclaim unreferenced objects";

/// Result of one command.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Ok { message: String },
    Page { id: String },
    Pages { ids: Vec<String> },
    Value(EntryView),
    Entries { entries: Vec<EntryView> },
    Commits { commits: Vec<CommitView> },
    Help { text: &'static str },
}

#[derive(Debug, Serialize)]
pub struct EntryView {
    pub key: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommitView {
    pub id: String,
    pub parents: Vec<String>,
    pub timestamp: String,
    pub entries: usize,
}

impl CommitView {
    fn new(commit: &Commit) -> Self {
        Self {
            id: commit.id().to_hex(),
            parents: commit.parents().iter().map(|p| p.short_hex()).collect(),
            timestamp: format_timestamp(commit.timestamp()),
            entries: commit.entries().len(),
        }
    }
}

fn format_timestamp(ts: Timestamp) -> String {
    i64::try_from(ts.as_micros())
        .ok()
        .and_then(chrono::DateTime::from_timestamp_micros)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

impl Reply {
    fn ok(message: impl Into<String>) -> Self {
        Self::Ok {
            message: message.into(),
        }
    }

    /// Human-readable rendering.
    pub fn to_text(&self) -> String {
        match self {
            Self::Ok { message } => format!("{} {}", "✓".green(), message),
            Self::Page { id } => format!("page {}", id.yellow()),
            Self::Pages { ids } => ids
                .iter()
                .map(|id| id.yellow().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Value(entry) => entry.to_text(false),
            Self::Entries { entries } if entries.is_empty() => "(empty)".dimmed().to_string(),
            Self::Entries { entries } => entries
                .iter()
                .map(|e| e.to_text(true))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Commits { commits } => commits
                .iter()
                .map(|c| {
                    let mut line = format!(
                        "{}  {}  {} entries",
                        c.id[..12].yellow(),
                        c.timestamp.dimmed(),
                        c.entries
                    );
                    if c.parents.len() > 1 {
                        line.push_str(&format!("  merge of {}", c.parents.join(", ")).cyan().to_string());
                    }
                    line
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Help { text } => text.to_string(),
        }
    }
}

impl EntryView {
    fn new(entry: &Entry, snapshot: &Snapshot) -> anyhow::Result<Self> {
        let data = snapshot.fetch(&entry.key)?.into_bytes()?;
        let (reference, priority) = match &entry.value {
            Value::Inline(_) => (None, None),
            Value::Reference { id, priority } => (Some(id.to_hex()), Some(priority.to_string())),
        };
        Ok(Self {
            key: String::from_utf8_lossy(&entry.key).into_owned(),
            value: String::from_utf8_lossy(&data).into_owned(),
            reference,
            priority,
        })
    }

    fn to_text(&self, with_key: bool) -> String {
        let mut line = if with_key {
            format!("{} = {}", self.key.bold(), self.value)
        } else {
            self.value.clone()
        };
        if let (Some(id), Some(priority)) = (&self.reference, &self.priority) {
            line.push_str(&format!("  (ref {} {})", &id[..12], priority).dimmed().to_string());
        }
        line
    }
}

/// A ledger and the page commands apply to.
pub struct Session {
    ledger: Arc<Ledger>,
    page: Arc<Page>,
}

impl Session {
    pub fn new(ledger: Arc<Ledger>) -> anyhow::Result<Self> {
        let page = ledger.get_root_page()?;
        Ok(Self { ledger, page })
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    /// Run one command line. Blank lines and `#` comments yield `None`.
    pub fn execute(&mut self, line: &str) -> anyhow::Result<Option<Reply>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (command, rest) = next_word(line);
        let reply = match command {
            "page" => self.page_command(rest)?,
            "pages" => Reply::Pages {
                ids: self.ledger.page_ids().iter().map(PageId::to_hex).collect(),
            },
            "put" => {
                let (key, value) = key_and_value(rest)?;
                self.page.put(key.to_owned(), value.to_owned())?;
                Reply::ok(format!("put {key}"))
            }
            "ref" => {
                let (priority, rest) = match rest.strip_prefix("--lazy") {
                    Some(rest) => (Priority::Lazy, rest.trim_start()),
                    None => (Priority::Eager, rest),
                };
                let (key, value) = key_and_value(rest)?;
                self.page
                    .put_with_priority(key.to_owned(), value.to_owned(), priority)?;
                Reply::ok(format!("put {key} as {priority} reference"))
            }
            "get" => self.get_command(rest)?,
            "ls" => {
                let snapshot = self.page.get_snapshot()?;
                let prefix = (!rest.is_empty()).then_some(rest.as_bytes());
                let entries = snapshot
                    .get_all(prefix)
                    .iter()
                    .map(|entry| EntryView::new(entry, &snapshot))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Reply::Entries { entries }
            }
            "del" => {
                let (key, _) = next_word(rest);
                if key.is_empty() {
                    bail!("usage: del <key>");
                }
                self.page.delete(key.to_owned())?;
                Reply::ok(format!("deleted {key}"))
            }
            "begin" => {
                self.page.start_transaction()?;
                Reply::ok("transaction started")
            }
            "commit" => {
                self.page.commit()?;
                Reply::ok("committed")
            }
            "rollback" => {
                self.page.rollback()?;
                Reply::ok("rolled back")
            }
            "heads" => Reply::Commits {
                commits: self.page.heads()?.iter().map(|c| CommitView::new(c)).collect(),
            },
            "log" => {
                let limit = match next_word(rest).0 {
                    "" => 10,
                    n => n.parse().context("log takes a number of commits")?,
                };
                let history = self.page.history()?;
                Reply::Commits {
                    commits: history
                        .iter()
                        .rev()
                        .take(limit)
                        .map(|c| CommitView::new(c))
                        .collect(),
                }
            }
            "gc" => {
                let removed = self.ledger.collect_garbage()?;
                Reply::ok(format!("{removed} objects removed"))
            }
            "help" => Reply::Help { text: HELP },
            other => bail!("unknown command `{other}` (try `help`)"),
        };
        Ok(Some(reply))
    }

    fn page_command(&mut self, rest: &str) -> anyhow::Result<Reply> {
        let (arg, rest) = next_word(rest);
        match arg {
            "" => {}
            "new" => self.page = self.ledger.new_page()?,
            "root" => self.page = self.ledger.get_root_page()?,
            "rm" => {
                let id = parse_page_id(next_word(rest).0)?;
                self.ledger.delete_page(id)?;
                if id == self.page.id() {
                    self.page = self.ledger.get_root_page()?;
                }
                return Ok(Reply::ok(format!("deleted page {id}")));
            }
            hex => self.page = self.ledger.get_page(parse_page_id(hex)?)?,
        }
        Ok(Reply::Page {
            id: self.page.id().to_hex(),
        })
    }

    fn get_command(&self, rest: &str) -> anyhow::Result<Reply> {
        let (key, rest) = next_word(rest);
        if key.is_empty() {
            bail!("usage: get <key> [offset [max]]");
        }
        let snapshot = self.page.get_snapshot()?;
        let (offset, rest) = next_word(rest);
        if offset.is_empty() {
            let entry = snapshot.get(key.as_bytes())?;
            return Ok(Reply::Value(EntryView::new(&entry, &snapshot)?));
        }

        let offset: i64 = offset.parse().context("offset must be an integer")?;
        let max_size: i64 = match next_word(rest).0 {
            "" => -1,
            n => n.parse().context("max size must be an integer")?,
        };
        let data = snapshot.get_partial(key.as_bytes(), offset, max_size)?;
        Ok(Reply::Value(EntryView {
            key: key.to_owned(),
            value: String::from_utf8_lossy(&data).into_owned(),
            reference: None,
            priority: None,
        }))
    }
}

fn next_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}

/// `<key> <value...>`: the value is the rest of the line.
fn key_and_value(rest: &str) -> anyhow::Result<(&str, &str)> {
    let (key, value) = next_word(rest);
    if key.is_empty() {
        bail!("usage: put <key> <value>");
    }
    Ok((key, value))
}

fn parse_page_id(hex: &str) -> anyhow::Result<PageId> {
    PageId::from_hex(hex).with_context(|| format!("invalid page id `{hex}`"))
}

#[cfg(test)]
mod tests {
    use folio_ledger::{LedgerConfig, LedgerError, Status};

    use super::*;

    fn session() -> Session {
        Session::new(Arc::new(Ledger::open(LedgerConfig::default()).unwrap())).unwrap()
    }

    fn run(session: &mut Session, line: &str) -> Reply {
        session.execute(line).unwrap().unwrap()
    }

    fn status_of(err: anyhow::Error) -> Status {
        err.downcast_ref::<LedgerError>().map(LedgerError::status).unwrap()
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let mut s = session();
        assert!(s.execute("").unwrap().is_none());
        assert!(s.execute("   # note").unwrap().is_none());
    }

    #[test]
    fn put_get_and_list() {
        let mut s = session();
        run(&mut s, "put greeting hello world");
        run(&mut s, "put other x");
        let Reply::Value(entry) = run(&mut s, "get greeting") else {
            panic!("expected a value");
        };
        assert_eq!(entry.value, "hello world");

        let Reply::Entries { entries } = run(&mut s, "ls gr") else {
            panic!("expected entries");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "greeting");
    }

    #[test]
    fn references_and_partial_reads() {
        let mut s = session();
        run(&mut s, "ref --lazy blob 0123456789");
        let Reply::Value(entry) = run(&mut s, "get blob -3") else {
            panic!("expected a value");
        };
        assert_eq!(entry.value, "789");
        let Reply::Value(entry) = run(&mut s, "get blob") else {
            panic!("expected a value");
        };
        assert_eq!(entry.priority.as_deref(), Some("lazy"));
        assert!(entry.reference.is_some());
    }

    #[test]
    fn transactions_through_commands() {
        let mut s = session();
        run(&mut s, "begin");
        run(&mut s, "put k v");
        let err = s.execute("begin").unwrap_err();
        assert_eq!(status_of(err), Status::TransactionAlreadyInProgress);
        run(&mut s, "rollback");
        let err = s.execute("get k").unwrap_err();
        assert_eq!(status_of(err), Status::KeyNotFound);
        let err = s.execute("commit").unwrap_err();
        assert_eq!(status_of(err), Status::NoTransactionInProgress);
    }

    #[test]
    fn page_switching() {
        let mut s = session();
        run(&mut s, "put on-root 1");
        let Reply::Page { id } = run(&mut s, "page new") else {
            panic!("expected page");
        };
        assert!(matches!(run(&mut s, "ls"), Reply::Entries { entries } if entries.is_empty()));
        let Reply::Pages { ids } = run(&mut s, "pages") else {
            panic!("expected pages");
        };
        assert!(ids.contains(&id));

        run(&mut s, &format!("page rm {id}"));
        assert!(s.page().id().is_root());
        let err = s.execute(&format!("page rm {id}")).unwrap_err();
        assert_eq!(status_of(err), Status::PageNotFound);
    }

    #[test]
    fn log_and_heads() {
        let mut s = session();
        run(&mut s, "put a 1");
        run(&mut s, "put b 2");
        let Reply::Commits { commits } = run(&mut s, "log 2") else {
            panic!("expected commits");
        };
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].entries, 2);
        let Reply::Commits { commits } = run(&mut s, "heads") else {
            panic!("expected commits");
        };
        assert_eq!(commits.len(), 1);
    }

    #[test]
    fn unknown_command_is_an_error() {
        let mut s = session();
        assert!(s.execute("frobnicate").is_err());
        assert!(s.execute("put").is_err());
    }

    #[test]
    fn replies_serialize_with_kind_tag() {
        let json = serde_json::to_value(Reply::ok("done")).unwrap();
        assert_eq!(json["kind"], "ok");
        assert_eq!(json["message"], "done");
    }
}
