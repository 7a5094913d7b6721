//! Interactive parking console
//!
//! Drives a [`ParkRegistry`] over in-memory call legs from line commands on
//! stdin. Useful for poking at lot behaviour without a running switch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use rvoip_park_core::logging::{parse_log_level, setup_logging, LoggingConfig};
use rvoip_park_core::{
    LocalSession, ParkConfig, ParkEvent, ParkRegistry, ParkRequest, ParkSearch, ParkableSession,
    Slot,
};

/// Interactive call parking console
#[derive(Parser, Debug)]
#[command(name = "park-console", version, about)]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long, env = "RVOIP_PARK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Call(String),
    Bridge(String, String),
    Park { lot: String, user: String },
    Request { lot: String, user: String },
    Unpark { lot: String, slot: Option<Slot> },
    Find { lot: String, user: String },
    List(String),
    Hangup(String),
    Pickup(String),
    Stats,
    Help,
    Quit,
}

fn parse_command(line: &str) -> anyhow::Result<Command> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        ["call", user] => Command::Call(user.to_string()),
        ["bridge", a, b] => Command::Bridge(a.to_string(), b.to_string()),
        ["park", lot, user] => Command::Park {
            lot: lot.to_string(),
            user: user.to_string(),
        },
        ["request", lot, user] => Command::Request {
            lot: lot.to_string(),
            user: user.to_string(),
        },
        ["unpark", lot] => Command::Unpark {
            lot: lot.to_string(),
            slot: None,
        },
        ["unpark", lot, slot] => Command::Unpark {
            lot: lot.to_string(),
            slot: Some(slot.parse()?),
        },
        ["find", lot, user] => Command::Find {
            lot: lot.to_string(),
            user: user.to_string(),
        },
        ["list", lot] => Command::List(lot.to_string()),
        ["hangup", user] => Command::Hangup(user.to_string()),
        ["pickup", user] => Command::Pickup(user.to_string()),
        ["stats"] => Command::Stats,
        ["help"] => Command::Help,
        ["quit"] | ["exit"] => Command::Quit,
        [] => bail!("empty command"),
        [other, ..] => bail!("unknown command '{}', try 'help'", other),
    };
    Ok(command)
}

const HELP: &str = "\
call <user>                 create a leg
bridge <user> <other>       create two bridged legs
park <lot> <user>           park (a bridged user parks its companion)
request <lot> <user>        park through the event bus
unpark <lot> [slot]         unpark by slot, or longest waiting
find <lot> <user>           find a call parked by <user>
list <lot>                  list parked calls
hangup <user>               the leg hangs up
pickup <user>               the leg is picked up elsewhere
stats                       lot statistics
quit";

struct Console {
    registry: Arc<ParkRegistry>,
    legs: HashMap<String, Arc<LocalSession>>,
}

impl Console {
    fn leg(&self, user: &str) -> anyhow::Result<Arc<LocalSession>> {
        self.legs
            .get(user)
            .cloned()
            .ok_or_else(|| anyhow!("no leg for '{}', create one with 'call'", user))
    }

    fn run(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Call(user) => {
                self.legs.insert(user.clone(), LocalSession::with_audio(&user));
                println!("leg {} ready", user);
            }
            Command::Bridge(a, b) => {
                let (leg_a, leg_b) = LocalSession::bridged(&a, &b);
                self.legs.insert(a.clone(), leg_a);
                self.legs.insert(b.clone(), leg_b);
                println!("{} <-> {} bridged", a, b);
            }
            Command::Park { lot, user } => {
                let call = self.registry.try_park(self.leg(&user)?, &lot)?;
                println!("parked in {} slot {}", lot, call.record.slot);
            }
            Command::Request { lot, user } => {
                let request = ParkRequest::new(lot, self.leg(&user)?);
                if self.registry.bus().request_park(request).is_none() {
                    println!("request rejected");
                }
            }
            Command::Unpark { lot, slot } => {
                let call = self.registry.try_unpark(&lot, slot)?;
                println!("unparked slot {} ({})", call.record.slot, call.session.identity().user);
            }
            Command::Find { lot, user } => {
                let call = self.registry.try_find(&lot, &ParkSearch::ParkedBy(user))?;
                println!("slot {} ({})", call.record.slot, call.session.identity().user);
            }
            Command::List(lot) => {
                let calls = self.registry.get(&lot);
                if calls.is_empty() {
                    println!("lot {} is empty", lot);
                }
                for call in calls {
                    println!(
                        "{}  {:<12} parked by {:<12} waiting {}s",
                        call.record.slot,
                        call.session.identity().user,
                        call.record.parked_by.identity.user,
                        call.record.wait_time().num_seconds()
                    );
                }
            }
            Command::Hangup(user) => self.leg(&user)?.hangup(),
            Command::Pickup(user) => self.leg(&user)?.retrieve_elsewhere(),
            Command::Stats => {
                for stats in self.registry.stats() {
                    println!(
                        "{:<16} {}/{} parked, {} parked total, {} released ({} automatic), {} rejected",
                        stats.name,
                        stats.parked,
                        stats.capacity,
                        stats.total_parked,
                        stats.total_released,
                        stats.auto_released,
                        stats.rejected
                    );
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = LoggingConfig::new(parse_log_level(&cli.log_level)?, "park-console")
        .with_json(cli.json_logs);
    setup_logging(&logging)?;

    let config = match &cli.config {
        Some(path) => ParkConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ParkConfig::from_env()?,
    };

    let registry = ParkRegistry::new(config);
    registry.on("console", |event: &ParkEvent| match event {
        ParkEvent::Parked { call } => println!(
            "* {} parked in {} slot {} ({} waiting)",
            call.session.identity().user,
            call.record.lot,
            call.record.slot,
            call.record.count
        ),
        ParkEvent::Unparked { call, reason } => println!(
            "* {} left {} slot {} ({:?}, {} still waiting)",
            call.session.identity().user,
            call.record.lot,
            call.record.slot,
            reason,
            call.record.count
        ),
    });

    let mut console = Console {
        registry,
        legs: HashMap::new(),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => {
                if let Err(e) = console.run(command) {
                    println!("error: {}", e);
                }
            }
            Err(e) => println!("error: {}", e),
        }
    }

    Ok(())
}
