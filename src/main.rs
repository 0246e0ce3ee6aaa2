//! Thin CLI layer: parse args, styled output, and call into valuefragments-core.
//! Crash-proof: panic caught and reported; all errors return Result.
//! The same binary serves as the process-pool worker (`valuefragments worker`).

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use valuefragments_core::jobs::PiForCpuLoad;
use valuefragments_core::task_queue::{self, GroupOptions, How};
use valuefragments_core::{timing, Config, HumanReadable};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("VALUEFRAGMENTS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn spinner(message: &str) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
        .template("{spinner:.dim} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar = ProgressBar::new_spinner();
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {}", e))
}

fn parse_arg<T>(m: &ArgMatches, name: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = m
        .get_one::<String>(name)
        .ok_or_else(|| format!("missing argument '{}'", name))?;
    raw.trim()
        .parse()
        .map_err(|e| format!("invalid value '{}' for '{}': {}", raw, name, e))
}

fn parse_opt<T>(m: &ArgMatches, name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match m.get_one::<String>(name) {
        Some(_) => parse_arg(m, name).map(Some),
        None => Ok(None),
    }
}

/// Comma separated list, e.g. `1,2,3`.
fn parse_list<T>(m: &ArgMatches, name: &str) -> Result<Vec<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = m
        .get_one::<String>(name)
        .ok_or_else(|| format!("missing argument '{}'", name))?;
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse()
                .map_err(|e| format!("invalid entry '{}' in '{}': {}", s, name, e))
        })
        .collect()
}

fn triple(values: Vec<f64>, name: &str) -> Result<(f64, f64, f64), String> {
    match values.as_slice() {
        [a, b, c] => Ok((*a, *b, *c)),
        _ => Err(format!("'{}' needs exactly three values, got {}", name, values.len())),
    }
}

fn cli() -> Command {
    let cmd = Command::new("valuefragments")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Grab bag of helpers: grouped execution, timing, math and file utilities")
        .after_help(
            "Examples:\n  valuefragments run-grouped --how tpe --jobs 8\n  valuefragments hash Cargo.toml\n  valuefragments human 123456789\n  valuefragments probneeds --needs 1,2 --probs 0.5,0.3",
        )
        .subcommand(
            Command::new("hash")
                .about("SHA-256 of files (hashed in parallel)")
                .arg(Arg::new("path").required(true).num_args(1..).help("File(s) to hash")),
        )
        .subcommand(
            Command::new("int2bin")
                .about("Binary representation, zero padded")
                .arg(Arg::new("number").required(true).help("Non-negative integer"))
                .arg(
                    Arg::new("digits")
                        .short('d')
                        .long("digits")
                        .default_value("8")
                        .help("Minimum number of digits"),
                ),
        )
        .subcommand(
            Command::new("basic-auth")
                .about("Authorization header value for HTTP Basic auth")
                .arg(Arg::new("user").required(true))
                .arg(Arg::new("password").required(true)),
        )
        .subcommand(
            Command::new("human")
                .about("Show a number with binary prefixes (KiB, MiB, ...)")
                .arg(Arg::new("value").required(true))
                .arg(Arg::new("unit").long("unit").default_value("B"))
                .arg(
                    Arg::new("precision")
                        .short('p')
                        .long("precision")
                        .default_value("3"),
                ),
        )
        .subcommand(
            Command::new("pi")
                .about("Monte-Carlo pi estimate (CPU load)")
                .arg(iterations_arg())
                .arg(seed_arg()),
        )
        .subcommand(
            Command::new("run-grouped")
                .about("Run a group of pi estimates on threads, a thread pool or worker processes")
                .arg(
                    Arg::new("how")
                        .long("how")
                        .help("thread, tpe or ppe (default: config, else thread)"),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .default_value("8")
                        .help("Number of calls in the group"),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .help("Pool size for tpe/ppe (default: config, else CPU count)"),
                )
                .arg(iterations_arg())
                .arg(seed_arg())
                .arg(
                    Arg::new("log-calls")
                        .long("log-calls")
                        .action(ArgAction::SetTrue)
                        .help("Append start, timing and end lines to the decorated log"),
                ),
        )
        .subcommand(
            Command::new("probneeds")
                .about("Probability that a stock covers independent needs")
                .arg(Arg::new("needs").long("needs").required(true).help("e.g. 1,2,1"))
                .arg(Arg::new("probs").long("probs").required(true).help("e.g. 0.5,0.3,0.1"))
                .arg(Arg::new("avails").long("avails").help("Stock (default: sum of needs)")),
        )
        .subcommand(
            Command::new("polyroot")
                .about("Real roots of a*x^2 + b*x + c = value")
                .arg(
                    Arg::new("coeffs")
                        .required(true)
                        .allow_hyphen_values(true)
                        .help("a,b,c"),
                )
                .arg(
                    Arg::new("value")
                        .long("value")
                        .default_value("0")
                        .allow_negative_numbers(true),
                ),
        )
        .subcommand(
            Command::new("intp")
                .about("Parabola through three points")
                .arg(Arg::new("x").long("x").required(true).help("x1,x2,x3"))
                .arg(Arg::new("y").long("y").required(true).help("y1,y2,y3")),
        )
        .subcommand(
            Command::new("files")
                .about("List files below a folder, deepest first")
                .arg(Arg::new("folder").default_value(".")),
        )
        .subcommand(
            Command::new("filename")
                .about("Strip characters not allowed in file names")
                .arg(Arg::new("text").required(true))
                .arg(
                    Arg::new("strict")
                        .long("strict")
                        .action(ArgAction::SetTrue)
                        .help("Keep only letters, digits, '-', '_' and '.'"),
                ),
        )
        .subcommand(
            Command::new("background")
                .about("Lower this process's priority, then report the niceness"),
        )
        .subcommand(
            Command::new("worker")
                .about("Process-pool worker: JSON requests on stdin, replies on stdout")
                .hide(true),
        );
    add_links(cmd)
}

#[cfg(feature = "fetch")]
fn add_links(cmd: Command) -> Command {
    cmd.subcommand(
        Command::new("links")
            .about("Anchor targets of a web page containing a substring")
            .arg(Arg::new("url").required(true))
            .arg(Arg::new("substring").default_value(""))
            .arg(
                Arg::new("cache")
                    .long("cache")
                    .value_name("FILE")
                    .help("Read the page through this cache file (refreshed after cacheMaxAgeSecs)"),
            ),
    )
}

#[cfg(not(feature = "fetch"))]
fn add_links(cmd: Command) -> Command {
    cmd
}

fn iterations_arg() -> Arg {
    Arg::new("iterations")
        .short('n')
        .long("iterations")
        .default_value("1000000")
        .help("Samples per estimate")
}

fn seed_arg() -> Arg {
    Arg::new("seed")
        .long("seed")
        .help("Seed for reproducible estimates")
}

fn run_grouped_cmd(sub_m: &ArgMatches, config: &Config) -> Result<(), String> {
    let how = match sub_m.get_one::<String>("how") {
        Some(raw) => raw.parse::<How>().map_err(|e| e.to_string())?,
        None => config.how.unwrap_or_default(),
    };
    let count: usize = parse_arg(sub_m, "jobs")?;
    let numiter: u64 = parse_arg(sub_m, "iterations")?;
    let seed: Option<u64> = parse_opt(sub_m, "seed")?;
    let options = match parse_opt::<usize>(sub_m, "workers")? {
        Some(n) => GroupOptions::default().with_workers(n),
        None => config.group_options(),
    };
    let jobs: Vec<PiForCpuLoad> = (0..count).map(|_| PiForCpuLoad { numiter, seed }).collect();

    let rt = runtime()?;
    let bar = spinner(&format!("Running {} calls ({})", count, how));
    let group = task_queue::run_grouped_with(jobs, how, &options);
    let outcome = if sub_m.get_flag("log-calls") {
        let path = config.decorated_log_path();
        rt.block_on(timing::log_decorated_async("run_grouped", &path, group))
            .map_err(|e| e.to_string())?
    } else {
        rt.block_on(group)
    };
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let results = outcome.map_err(|e| e.to_string())?;
    for (i, value) in results.iter().enumerate() {
        println!("{:>4}  {}", i, value);
    }
    let sum: f64 = results.iter().sum();
    dim(&format!("sum {}  mean {}", sum, sum / results.len().max(1) as f64));
    Ok(())
}

fn run() -> Result<(), String> {
    let matches = cli().get_matches();

    // worker: keep stdout clean for the JSON protocol
    if let Some(("worker", _)) = matches.subcommand() {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        task_queue::worker::serve(
            &valuefragments_core::builtin_registry(),
            stdin.lock(),
            stdout.lock(),
        )
        .map_err(|e| format!("worker failed: {}", e))?;
        return Ok(());
    }

    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = valuefragments_core::load_config(&cwd).with_env();
    tracing::debug!(?config, "config loaded");

    match matches.subcommand() {
        Some(("hash", sub_m)) => {
            let paths: Vec<PathBuf> = sub_m
                .get_many::<String>("path")
                .into_iter()
                .flatten()
                .map(PathBuf::from)
                .collect();
            let mut failed = 0;
            for (path, digest) in valuefragments_core::hash_files(paths) {
                match digest {
                    Ok(d) => println!("{}  {}", d, path.display()),
                    Err(e) => {
                        error(&e.to_string());
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{} file(s) could not be hashed", failed));
            }
        }
        Some(("int2bin", sub_m)) => {
            let number: u64 = parse_arg(sub_m, "number")?;
            let digits: usize = parse_arg(sub_m, "digits")?;
            println!("{}", valuefragments_core::int2bin(number, digits));
        }
        Some(("basic-auth", sub_m)) => {
            let user = sub_m.get_one::<String>("user").map(String::as_str).unwrap_or("");
            let password = sub_m
                .get_one::<String>("password")
                .map(String::as_str)
                .unwrap_or("");
            println!("{}", valuefragments_core::basic_auth(user, password));
        }
        Some(("human", sub_m)) => {
            let value: u64 = parse_arg(sub_m, "value")?;
            let precision: usize = parse_arg(sub_m, "precision")?;
            let unit = sub_m.get_one::<String>("unit").map(String::as_str).unwrap_or("B");
            println!(
                "{:.prec$}",
                HumanReadable::with_unit(value, unit),
                prec = precision
            );
        }
        Some(("pi", sub_m)) => {
            let numiter: u64 = parse_arg(sub_m, "iterations")?;
            let seed: Option<u64> = parse_opt(sub_m, "seed")?;
            let estimate = timing::timing_wall("pi_for_cpu_load", || {
                valuefragments_core::pi_for_cpu_load(numiter, seed)
            });
            println!("{}", estimate);
        }
        Some(("run-grouped", sub_m)) => run_grouped_cmd(sub_m, &config)?,
        Some(("probneeds", sub_m)) => {
            let needs: Vec<u64> = parse_list(sub_m, "needs")?;
            let probs: Vec<f64> = parse_list(sub_m, "probs")?;
            let avails: Option<u64> = parse_opt(sub_m, "avails")?;
            let p = valuefragments_core::probneeds(&needs, &probs, avails).map_err(|e| e.to_string())?;
            println!("{}", p);
        }
        Some(("polyroot", sub_m)) => {
            let coeffs = triple(parse_list(sub_m, "coeffs")?, "coeffs")?;
            let val: f64 = parse_arg(sub_m, "value")?;
            let (lo, hi) = valuefragments_core::polyroot(coeffs, val).map_err(|e| e.to_string())?;
            println!("{} {}", lo, hi);
        }
        Some(("intp", sub_m)) => {
            let xs = triple(parse_list(sub_m, "x")?, "x")?;
            let ys = triple(parse_list(sub_m, "y")?, "y")?;
            let (a, b, c) = valuefragments_core::intp(xs, ys).map_err(|e| e.to_string())?;
            println!("{} {} {}", a, b, c);
        }
        Some(("files", sub_m)) => {
            let folder = sub_m.get_one::<String>("folder").map(String::as_str).unwrap_or(".");
            let folder = Path::new(folder);
            if !folder.is_dir() {
                return Err(format!("{} is not a folder", folder.display()));
            }
            for file in valuefragments_core::recurse_files_in_folder(folder) {
                println!("{}", file.display());
            }
        }
        Some(("filename", sub_m)) => {
            let text = sub_m.get_one::<String>("text").map(String::as_str).unwrap_or("");
            if sub_m.get_flag("strict") {
                println!("{}", valuefragments_core::stringtovalidfilename2(text));
            } else {
                println!("{}", valuefragments_core::stringtovalidfilename(text));
            }
        }
        #[cfg(feature = "fetch")]
        Some(("links", sub_m)) => {
            let url = sub_m.get_one::<String>("url").map(String::as_str).unwrap_or("");
            let substring = sub_m
                .get_one::<String>("substring")
                .map(String::as_str)
                .unwrap_or("");
            let timeouts = valuefragments_core::fetch::DEFAULT_TIMEOUTS;
            let links = match sub_m.get_one::<String>("cache") {
                Some(cache) => valuefragments_core::selected_href_links_cached(
                    url,
                    substring,
                    Path::new(cache),
                    timeouts,
                    config.cache_max_age(),
                ),
                None => valuefragments_core::selected_href_links(url, substring, timeouts),
            }
            .map_err(|e| e.to_string())?;
            if links.is_empty() {
                dim("No matching links.");
            }
            for link in links {
                println!("{}", link);
            }
        }
        Some(("background", _)) => {
            valuefragments_core::backgroundme().map_err(|e| e.to_string())?;
            valuefragments_core::utils::init_data_dir()
                .map_err(|e| format!("Failed to create data dir: {}", e))?;
            match valuefragments_core::process::current_niceness() {
                Some(n) => valuefragments_core::log(&format!("Running in background (nice {}).", n)),
                None => valuefragments_core::log("Running in background."),
            }
        }
        _ => {
            if use_color() {
                println!("{}", "valuefragments".bright_cyan().bold());
            } else {
                println!("valuefragments");
            }
            info("Grouped execution, timing, math and file helpers.");
            dim("\nRun `valuefragments --help` for details.");
        }
    }

    Ok(())
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }
    init_tracing();

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
