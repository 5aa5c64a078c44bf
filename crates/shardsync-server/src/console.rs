//! Operator console: one command per line on an async reader.
//!
//! The reader only parses. Every command runs on the worker pool and prints
//! its result when it finishes, so a slow `restart` never blocks the next
//! line.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use shardsync_core::{ClusterId, ConnectionStatus, Result, SyncError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::SyncContext;
use crate::ratelimit::nanos_to_millis;

/// Help text for `help`.
pub const HELP: &str = "\
help                              list commands
quit                              shut down
start                             register clusters and auto-connect
restart                           reconnect every cluster
connect <id> [<shardMin> <shardMax>]  connect one cluster
clusters                          list clusters
shards                            show total shards
server <entityId>                 resolve shard and owning cluster
ratelimit <intervalNanos>         set and broadcast the rate-limit interval";

/// A console line that could not be parsed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConsoleError {
    /// Blank line.
    #[error("empty command")]
    Empty,
    /// First word is not a command.
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    /// A required argument is missing.
    #[error("{command}: missing argument <{argument}>")]
    MissingArgument {
        /// Command being parsed.
        command: &'static str,
        /// Name of the missing argument.
        argument: &'static str,
    },
    /// An argument is not a valid number.
    #[error("{command}: '{value}' is not a valid {argument}")]
    InvalidNumber {
        /// Command being parsed.
        command: &'static str,
        /// Name of the argument.
        argument: &'static str,
        /// What was typed.
        value: String,
    },
}

/// A parsed console command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `help`
    Help,
    /// `quit`
    Quit,
    /// `start`
    Start,
    /// `restart`
    Restart,
    /// `connect <id> [<min> <max>]`
    Connect {
        /// Cluster to connect.
        id: ClusterId,
        /// Shard interval to assign first.
        interval: Option<(u32, u32)>,
    },
    /// `clusters`
    Clusters,
    /// `shards`
    Shards,
    /// `server <entityId>`
    Server {
        /// Entity id to resolve.
        entity_id: u64,
    },
    /// `ratelimit <nanos>`
    Ratelimit {
        /// New interval in nanoseconds.
        nanos: i64,
    },
}

impl ConsoleCommand {
    /// Parse one line. Words are separated by whitespace; the command word is
    /// case-insensitive.
    pub fn parse(line: &str) -> std::result::Result<Self, ConsoleError> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Err(ConsoleError::Empty);
        };
        let command = match word.to_ascii_lowercase().as_str() {
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            "start" => Self::Start,
            "restart" => Self::Restart,
            "connect" => {
                let id = required(&mut words, "connect", "id")?;
                let interval = match words.next() {
                    None => None,
                    Some(min) => {
                        let min = number("connect", "shardMin", min)?;
                        let max = required(&mut words, "connect", "shardMax")?;
                        Some((min, max))
                    }
                };
                Self::Connect {
                    id: ClusterId::new(id),
                    interval,
                }
            }
            "clusters" => Self::Clusters,
            "shards" => Self::Shards,
            "server" => Self::Server {
                entity_id: required(&mut words, "server", "entityId")?,
            },
            "ratelimit" => Self::Ratelimit {
                nanos: required(&mut words, "ratelimit", "intervalNanos")?,
            },
            other => return Err(ConsoleError::Unknown(other.to_owned())),
        };
        Ok(command)
    }
}

fn required<'a, T: FromStr>(
    words: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
    argument: &'static str,
) -> std::result::Result<T, ConsoleError> {
    let value = words
        .next()
        .ok_or(ConsoleError::MissingArgument { command, argument })?;
    number(command, argument, value)
}

fn number<T: FromStr>(
    command: &'static str,
    argument: &'static str,
    value: &str,
) -> std::result::Result<T, ConsoleError> {
    value.parse().map_err(|_| ConsoleError::InvalidNumber {
        command,
        argument,
        value: value.to_owned(),
    })
}

/// Executes console commands against the shared context.
#[derive(Clone)]
pub struct Console {
    ctx: Arc<SyncContext>,
    shutdown: CancellationToken,
}

impl Console {
    /// Create a console. `quit` cancels `shutdown`.
    pub fn new(ctx: Arc<SyncContext>, shutdown: CancellationToken) -> Self {
        Self { ctx, shutdown }
    }

    /// Run one command and return its printable result.
    pub async fn execute(&self, command: ConsoleCommand) -> Result<String> {
        let manager = &self.ctx.manager;
        let output = match command {
            ConsoleCommand::Help => HELP.to_owned(),
            ConsoleCommand::Quit => {
                self.shutdown.cancel();
                "shutting down".to_owned()
            }
            ConsoleCommand::Start => {
                if manager.is_started() {
                    "already started".to_owned()
                } else {
                    let submitted = manager.start().await.len();
                    format!("started, {submitted} auto-connect(s) submitted")
                }
            }
            ConsoleCommand::Restart => {
                let report = manager.restart().await;
                let mut out = String::new();
                for outcome in &report.outcomes {
                    let _ = match &outcome.error {
                        None => writeln!(out, "cluster {}: reconnected", outcome.cluster_id),
                        Some(e) => writeln!(out, "cluster {}: failed ({e})", outcome.cluster_id),
                    };
                }
                let _ = write!(
                    out,
                    "restart finished: {} reconnected, {} failed",
                    report.succeeded().len(),
                    report.failed().len()
                );
                out
            }
            ConsoleCommand::Connect { id, interval } => {
                let cluster = manager.cluster(id)?;
                if cluster.is_active() || cluster.status == ConnectionStatus::Connecting {
                    return Err(SyncError::InvalidTransition {
                        cluster: id,
                        from: cluster.status,
                        to: ConnectionStatus::Connecting,
                    });
                }
                let mut out = String::new();
                if let Some((min, max)) = interval {
                    let assigned = manager.set_shard_interval(id, min, max)?;
                    let _ = write!(out, "cluster {id} assigned shards {assigned}; ");
                }
                manager.connect_cluster(id, true, false).await?;
                let _ = write!(out, "cluster {id} connected");
                out
            }
            ConsoleCommand::Clusters => {
                let clusters = manager.clusters();
                if clusters.is_empty() {
                    "no clusters registered".to_owned()
                } else {
                    let mut out = String::new();
                    for (i, cluster) in clusters.iter().enumerate() {
                        if i > 0 {
                            out.push('\n');
                        }
                        let (min, max) = cluster
                            .shard_interval
                            .map_or((-1, -1), |iv| (i64::from(iv.min()), i64::from(iv.max())));
                        let _ = write!(
                            out,
                            "cluster {} status={} load={} shardMin={min} shardMax={max} endpoint={}",
                            cluster.id,
                            cluster.status,
                            cluster.reported_load.unwrap_or(0),
                            cluster.endpoint
                        );
                    }
                    out
                }
            }
            ConsoleCommand::Shards => {
                format!("total shards: {}", manager.total_shards().unwrap_or(0))
            }
            ConsoleCommand::Server { entity_id } => {
                let shard = manager.resolve_shard(entity_id)?;
                match manager.resolve_cluster(entity_id) {
                    Ok(owner) => format!("entity {entity_id}: shard {shard}, cluster {}", owner.id),
                    Err(e) if e.is_not_found() => {
                        format!("entity {entity_id}: shard {shard}, no connected owner")
                    }
                    Err(e) => return Err(e),
                }
            }
            ConsoleCommand::Ratelimit { nanos } => {
                let report = self.ctx.ratelimit.set_interval_nanos(nanos)?;
                format!(
                    "rate-limit interval set to {}ms, sent to {}/{} cluster(s)",
                    nanos_to_millis(nanos),
                    report.delivered,
                    report.attempted
                )
            }
        };
        Ok(output)
    }

    /// Read commands until EOF or shutdown.
    ///
    /// Each command is submitted to the worker pool. Its result, or a one-line
    /// error, goes to stdout; failures are also logged.
    pub async fn run<R>(&self, reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("console input closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "console read failed");
                    break;
                }
            };
            let command = match ConsoleCommand::parse(&line) {
                Ok(command) => command,
                Err(ConsoleError::Empty) => continue,
                Err(e) => {
                    warn!(error = %e, "invalid console command");
                    continue;
                }
            };
            let console = self.clone();
            let _ = self.ctx.pool.spawn(async move {
                info!(?command, "console command");
                match console.execute(command).await {
                    Ok(output) => println!("{output}"),
                    Err(e) => {
                        warn!(error = %e, code = e.code(), "console command failed");
                        println!("error [{}]: {e}", e.code());
                    }
                }
            });
        }
    }
}
