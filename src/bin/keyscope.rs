//! The keyscope executable browses and edits the keys of a store from the command line.
//!
//! `keyscope [--url URL] [--timeout SECS] [-v...] <SUBCOMMAND>`
//!
//!     --url is the connection target, e.g. redis://:password@localhost:6379/0. Without it the
//!     target of the last successful run is used, and failing that redis://127.0.0.1:6379.
//!     --timeout is the overall deadline in seconds for get, info and diag.
//!     -v raises the log level (info, debug, trace). Logs go to STDERR.
//!     These options go before the subcommand.
//!
//! `keyscope connect`
//!
//!     Check that the store answers.
//!
//! `keyscope keys [--filter TERM] [--details]`
//!
//!     Print the keys grouped by shared prefix, as JSON. --filter keeps the keys whose name
//!     contains TERM (ignoring case), --details also fetches type, ttl and value of every key.
//!     If the listing fails, a diagnostics snapshot is printed before the error.
//!
//! `keyscope get <KEY>`
//!
//!     Print the type, ttl and value of one key.
//!
//! `keyscope set <KEY> <VALUE> [--type TYPE] [--update]`
//!
//!     Write a key. TYPE is one of scalar, list, set, map, sorted-set (default scalar);
//!     container values are JSON. --update replaces an existing container instead of adding
//!     to it.
//!
//! `keyscope rm <KEY>`
//!
//!     Delete a key. Deleting a missing key is not an error.
//!
//! `keyscope info` / `keyscope diag`
//!
//!     Print the server report / the diagnostics snapshot.
//!
//! `keyscope forget`
//!
//!     Drop the remembered connection target.
//!
//! Every failure prints the error to STDERR and exits with a non-zero code.

use std::process;
use std::time::Duration;

use clap::{crate_version, App, Arg, ArgMatches, SubCommand};
use keyscope::{
    Action, BrowserState, CatalogConfig, ConnectionTarget, KeyCatalogClient, KeyscopeError,
    Result, Settings, ValueType, WriteMode,
};
use serde::Serialize;
use tracing::{debug, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_TARGET: &str = "redis://127.0.0.1:6379";

/// the work requested on the command line
#[derive(Debug)]
enum Request {
    Connect,
    Keys { filter: String, details: bool },
    Get { key: String },
    Set { key: String, value: String, value_type: ValueType, mode: WriteMode },
    Remove { key: String },
    Info,
    Diagnose,
    Forget,
}

/// [`Opt`] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the connection target exactly as given, `None` if it should come from the settings
    url: Option<String>,
    config: CatalogConfig,
    req: Request,
}

impl Opt {
    /// validates the global options
    /// # Errors
    /// returns [`KeyscopeError::Config`] if `--url` or `--timeout` is malformed
    fn build(url: Option<&str>, timeout: Option<&str>, req: Request) -> Result<Opt> {
        if let Some(url) = url {
            ConnectionTarget::parse(url)?;
        }
        let mut config = CatalogConfig::default();
        if let Some(secs) = timeout {
            let secs: u64 = secs.parse().map_err(|_| {
                KeyscopeError::Config(format!("timeout must be a whole number of seconds, got {}", secs))
            })?;
            config = config.deadline(Duration::from_secs(secs));
        }
        Ok(Opt {
            url: url.map(String::from),
            config,
            req,
        })
    }
}

fn main() {
    let matches = App::new("keyscope")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("browse and edit the keys of a redis compatible store")
        .subcommands(vec![
            SubCommand::with_name("connect").about("Check that the store answers"),
            SubCommand::with_name("keys")
                .about("List keys grouped by shared prefix")
                .arg(Arg::with_name("filter")
                    .long("filter")
                    .value_name("TERM")
                    .help("only keys whose name contains TERM, ignoring case"))
                .arg(Arg::with_name("details")
                    .long("details")
                    .help("also fetch type, ttl and value of every key")),
            SubCommand::with_name("get")
                .about("Show type, ttl and value of a key")
                .arg(Arg::with_name("KEY").required(true).index(1)),
            SubCommand::with_name("set")
                .about("Write a key")
                .arg(Arg::with_name("KEY").required(true).index(1))
                .arg(Arg::with_name("VALUE").required(true).index(2))
                .arg(Arg::with_name("type")
                    .long("type")
                    .value_name("TYPE")
                    .help("scalar, list, set, map or sorted-set")
                    .default_value("scalar"))
                .arg(Arg::with_name("update")
                    .long("update")
                    .help("replace the existing value instead of adding to it")),
            SubCommand::with_name("rm")
                .about("Delete a key")
                .arg(Arg::with_name("KEY").required(true).index(1)),
            SubCommand::with_name("info").about("Show server, memory and config details"),
            SubCommand::with_name("diag").about("Run the connection diagnostics"),
            SubCommand::with_name("forget").about("Forget the remembered connection target"),
        ])
        .arg(Arg::with_name("url")
            .long("url")
            .value_name("URL")
            .help("connection target, e.g. redis://:password@localhost:6379/0"))
        .arg(Arg::with_name("timeout")
            .long("timeout")
            .value_name("SECS")
            .help("overall deadline for get, info and diag"))
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .help("more log output, repeat for more"))
        .get_matches();

    // configure a subscriber that will log messages to STDERR
    subscriber_config(matches.occurrences_of("verbose"));

    if let Err(e) = parse_options(&matches).and_then(run) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

/// runs the requested operation on a [`KeyCatalogClient`] and prints its result to STDOUT
fn run(opt: Opt) -> Result<()> {
    let mut settings = Settings::load(Settings::default_path()?)?;
    let url = opt
        .url
        .or_else(|| settings.last_target().map(String::from))
        .unwrap_or_else(|| DEFAULT_TARGET.to_string());
    let catalog = KeyCatalogClient::new(opt.config);

    match opt.req {
        Request::Connect => {
            let reply = catalog.connect(&url)?;
            println!("{} ({})", ConnectionTarget::parse(&url)?, reply);
        }
        Request::Keys { filter, details } => {
            let listing = if details {
                catalog.describe_all(&url)
            } else {
                catalog.list_keys(&url)
            };
            let keys = match listing {
                Ok(keys) => keys,
                Err(e) => {
                    // show what does and does not work before giving up
                    print_json(&catalog.diagnose(&url))?;
                    return Err(e);
                }
            };
            let state = BrowserState::default()
                .apply(Action::KeysLoaded(keys))
                .apply(Action::Search(filter));
            debug!("{} of {} keys match", state.visible_count(), state.keys().len());
            print_json(&state.groups())?;
        }
        Request::Get { key } => {
            let desc = catalog.describe_key(&url, &key)?;
            if desc.is_absent() {
                println!("Key not found");
            } else {
                print_json(&desc)?;
            }
        }
        Request::Set { key, value, value_type, mode } => {
            catalog.write_key(&url, &key, &value_type, &value, mode)?;
        }
        Request::Remove { key } => catalog.delete_key(&url, &key)?,
        Request::Info => print_json(&catalog.server_report(&url)?)?,
        Request::Diagnose => print_json(&catalog.diagnose(&url))?,
        Request::Forget => {
            settings.forget();
            return settings.save();
        }
    }

    settings.remember(&url);
    if let Err(e) = settings.save() {
        warn!("could not remember connection target: {}", e);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let req = match matches.subcommand() {
        ("connect", Some(_)) => Request::Connect,
        ("keys", Some(args)) => Request::Keys {
            filter: args.value_of("filter").unwrap_or_default().to_string(),
            details: args.is_present("details"),
        },
        ("get", Some(args)) => Request::Get {
            key: args.value_of("KEY").map(String::from).unwrap(),
        },
        ("set", Some(args)) => Request::Set {
            key: args.value_of("KEY").map(String::from).unwrap(),
            value: args.value_of("VALUE").map(String::from).unwrap(),
            value_type: args.value_of("type").unwrap_or("scalar").parse()?,
            mode: if args.is_present("update") {
                WriteMode::Update
            } else {
                WriteMode::Create
            },
        },
        ("rm", Some(args)) => Request::Remove {
            key: args.value_of("KEY").map(String::from).unwrap(),
        },
        ("info", Some(_)) => Request::Info,
        ("diag", Some(_)) => Request::Diagnose,
        ("forget", Some(_)) => Request::Forget,
        _ => {
            return Err(KeyscopeError::Config(
                "a subcommand is required, see --help".into(),
            ))
        }
    };
    Opt::build(matches.value_of("url"), matches.value_of("timeout"), req)
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(verbosity: u64) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        // log to stderr so STDOUT stays machine readable
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
