use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use log::{debug, warn};

use rkreboot::batch::{BatchOrchestrator, BatchResult, DeviceReport, aggregate, report_schema};
use rkreboot::config::{BatchConfig, DEFAULT_PORT, DeviceTarget, DeviceTemplate};
use rkreboot::targets::read_target_file;
use rkreboot::transport::{ConnectionSecurityOptions, SshConnector};

#[derive(Parser, Debug)]
#[command(name = "rkreboot")]
#[command(about = "Ruckus access point reboot tool, single device or batch")]
#[command(version)]
#[command(group(ArgGroup::new("source").args(["host", "csv_file"])))]
struct Cli {
    /// IP address or hostname of one access point
    #[arg(long, required_unless_present_any = ["csv_file", "schema"])]
    host: Option<String>,

    /// CSV file listing access point IP addresses in its first column
    #[arg(short = 'f', long)]
    csv_file: Option<PathBuf>,

    /// SSH username (asked for when missing)
    #[arg(short, long, env = "RUCKUS_USERNAME")]
    username: Option<String>,

    /// SSH password (asked for without echo when missing)
    #[arg(short, long, env = "RUCKUS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// SSH port
    #[arg(long, env = "RUCKUS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Connect, login and command timeout in seconds
    #[arg(long, env = "RUCKUS_TIMEOUT")]
    timeout: Option<u64>,

    /// How long to wait for the device after sending reboot, in seconds
    #[arg(long, env = "RUCKUS_REBOOT_TIMEOUT")]
    reboot_timeout: Option<u64>,

    /// Skip the confirmation question
    #[arg(long)]
    no_confirm: bool,

    /// Read version and uptime before rebooting
    #[arg(long)]
    info: bool,

    /// Do not reboot; with --info this is a connection test
    #[arg(long)]
    no_reboot: bool,

    /// Seconds to wait between two devices
    #[arg(long, default_value_t = 2)]
    delay: u64,

    /// SSH algorithm profile: default, secure or legacy
    #[arg(long, default_value = "default")]
    security: String,

    /// Print the batch result as JSON
    #[arg(long)]
    json: bool,

    /// Print the JSON schema of the --json output and exit
    #[arg(long)]
    schema: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rkreboot={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(if cli.verbose { "debug" } else { "warn" });
    debug!("mode: {}", if cli.host.is_some() { "single device" } else { "batch" });

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every device succeeded.
fn run(cli: Cli) -> Result<bool> {
    if cli.schema {
        println!("{}", serde_json::to_string_pretty(&report_schema())?);
        return Ok(true);
    }

    let username = match cli.username.clone() {
        Some(username) => username,
        None => ask("SSH Username: ")?,
    };
    let password = password_or_prompt(cli.password.clone(), || {
        rpassword::prompt_password("SSH Password: ")
    })?;

    let mut template = DeviceTemplate::new(username, password);
    template.port = cli.port;
    if let Some(timeout) = cli.timeout {
        template.timeouts.connect = timeout;
        template.timeouts.login = timeout;
        template.timeouts.command = timeout;
    }
    if let Some(timeout) = cli.reboot_timeout {
        template.timeouts.reboot = timeout;
    }

    let hosts = match (&cli.host, &cli.csv_file) {
        (Some(host), _) => vec![host.clone()],
        (None, Some(path)) => read_target_file(path)?.hosts,
        (None, None) => bail!("either --host or --csv-file must be given"),
    };
    let targets: Vec<_> = hosts.iter().map(|host| template.target(host.as_str())).collect();

    let config = BatchConfig {
        collect_info: cli.info,
        perform_reboot: !cli.no_reboot,
        inter_device_delay: Duration::from_secs(cli.delay),
        ..BatchConfig::default()
    };

    if config.perform_reboot && !cli.no_confirm {
        println!("About to reboot {} access point(s).", targets.len());
        println!("This disconnects all clients of those access points temporarily.");
        if !confirm("Do you want to continue? [y/N] ")? {
            println!("Operation cancelled by user");
            return Ok(true);
        }
    }

    let security = ConnectionSecurityOptions::by_name(&cli.security)
        .with_context(|| format!("unknown security profile {:?}", cli.security))?;
    let orchestrator = BatchOrchestrator::new(SshConnector::new(security), config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let result = runtime.block_on(async {
        match targets.as_slice() {
            [target] if cli.host.is_some() => single(&orchestrator, target).await,
            _ => orchestrator.run_batch_until(&targets, interrupted()).await,
        }
    });

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, orchestrator.config().perform_reboot);
    }
    Ok(result.summary.all_succeeded() && !result.cancelled)
}

/// Single-device run. Failures are reported directly instead of through
/// the batch loop.
async fn single(
    orchestrator: &BatchOrchestrator<SshConnector>,
    target: &DeviceTarget,
) -> BatchResult {
    tokio::select! {
        outcome = orchestrator.run_single(target) => {
            let report = match outcome {
                Ok(report) => report,
                Err(err) => {
                    eprintln!("{}: {}", target.host, err);
                    DeviceReport::failed(target, &err, orchestrator.config().perform_reboot)
                }
            };
            aggregate(vec![report], false)
        }
        _ = interrupted() => {
            eprintln!("Operation cancelled by user");
            aggregate(vec![DeviceReport::aborted(target)], true)
        }
    }
}

/// Completes on Ctrl-C. Never completes if the handler cannot be installed.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
}

fn print_result(result: &BatchResult, rebooting: bool) {
    println!();
    for report in &result.reports {
        let mark = if report.status.is_success() { "OK  " } else { "FAIL" };
        println!("[{}] {} ({}) {}", mark, report.host, report.status, report.message());
        if let Some(version) = &report.version {
            for line in version.lines() {
                println!("        version: {}", line);
            }
        }
        if let Some(uptime) = &report.uptime {
            for line in uptime.lines() {
                println!("        uptime:  {}", line);
            }
        }
    }
    if result.cancelled {
        println!("\nRun cancelled before all devices were processed");
    }
    let verb = if rebooting { "rebooted" } else { "checked" };
    println!(
        "\n{}/{} devices {} successfully",
        result.summary.success, result.summary.total, verb
    );
}

fn ask(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim().to_string())
}

/// The given password, or one read through `prompt`.
fn password_or_prompt(
    given: Option<String>,
    prompt: impl FnOnce() -> io::Result<String>,
) -> Result<String> {
    let password = match given {
        Some(password) => password,
        None => prompt().context("failed to read the password")?,
    };
    if password.is_empty() {
        bail!("no password given; pass --password, set RUCKUS_PASSWORD or type one");
    }
    Ok(password)
}

fn confirm(question: &str) -> Result<bool> {
    let answer = ask(question)?.to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
