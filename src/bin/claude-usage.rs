use async_trait::async_trait;
use claude_usage_lib::config::AppSettings;
use claude_usage_lib::poller::{start_refresh_loop, PollOutcome, RefreshTrigger, UsagePresenter};
use claude_usage_lib::tray::tooltip_text;
use claude_usage_lib::{build_pipeline, init_logging};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug)]
struct CliArgs {
    command: String,
    format: OutputFormat,
    pretty: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    discovered_via: Option<claude_usage_lib::storage::DiscoveredVia>,
}

#[tokio::main]
async fn main() {
    let args = parse_args(std::env::args().skip(1).collect());
    if args.command == "--help" || args.command == "-h" {
        print_help();
        return;
    }
    if args.command == "--version" || args.command == "-V" {
        println!("claude-usage {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let settings = AppSettings::load();
    init_logging(settings.file_logging);

    let result = match args.command.as_str() {
        "status" => run_status(&args, &settings).await,
        "watch" => run_watch(args, &settings).await,
        "locate" => run_locate(&args, &settings),
        _ => Err(format!(
            "Unknown command: {}. Use --help for usage.",
            args.command
        )),
    };

    if let Err(message) = result {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

/// `[command] [flags]`; a bare flag list runs `status`
fn parse_args(mut argv: Vec<String>) -> CliArgs {
    let mut format = OutputFormat::Text;
    let mut pretty = false;

    let takes_command = argv
        .first()
        .is_some_and(|first| !first.starts_with('-') || is_info_flag(first));
    let command = if takes_command {
        argv.remove(0)
    } else {
        "status".to_string()
    };

    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" => match iter.next().as_deref() {
                Some("json") => format = OutputFormat::Json,
                Some("text") => format = OutputFormat::Text,
                other => tracing::debug!("Ignoring --format value {:?}", other),
            },
            "--json" => format = OutputFormat::Json,
            "--pretty" => pretty = true,
            _ => {}
        }
    }

    CliArgs {
        command,
        format,
        pretty,
    }
}

fn is_info_flag(arg: &str) -> bool {
    matches!(arg, "--help" | "-h" | "--version" | "-V")
}

async fn run_status(args: &CliArgs, settings: &AppSettings) -> Result<(), String> {
    let pipeline = build_pipeline(settings);
    let outcome = pipeline.run_cycle().await;
    print_outcome(&outcome, args.format, args.pretty)?;

    match outcome {
        PollOutcome::Success { .. } => Ok(()),
        PollOutcome::NoCredentials => Err("No Claude credentials found".to_string()),
        PollOutcome::FetchFailed => Err("Failed to fetch Claude usage".to_string()),
    }
}

struct StdoutPresenter {
    format: OutputFormat,
    pretty: bool,
}

#[async_trait]
impl UsagePresenter for StdoutPresenter {
    async fn present(&self, outcome: &PollOutcome) {
        if let Err(err) = print_outcome(outcome, self.format, self.pretty) {
            tracing::warn!("Failed to print usage: {}", err);
        }
    }
}

async fn run_watch(args: CliArgs, settings: &AppSettings) -> Result<(), String> {
    let pipeline = build_pipeline(settings);
    let trigger = RefreshTrigger::new();
    let presenter = Arc::new(StdoutPresenter {
        format: args.format,
        pretty: args.pretty,
    });

    // Any line on stdin acts as "Refresh Now".
    let stdin_trigger = trigger.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            stdin_trigger.request();
        }
    });

    tokio::select! {
        _ = start_refresh_loop(pipeline, settings.refresh_interval(), trigger, presenter) => Ok(()),
        result = tokio::signal::ctrl_c() => result.map_err(|err| err.to_string()),
    }
}

fn run_locate(args: &CliArgs, settings: &AppSettings) -> Result<(), String> {
    let pipeline = build_pipeline(settings);
    let resolved = pipeline.tokens().locator().resolve();

    match args.format {
        OutputFormat::Json => print_json(
            &LocatePayload {
                path: resolved.as_ref().map(|r| r.path.display().to_string()),
                discovered_via: resolved.as_ref().map(|r| r.discovered_via),
            },
            args.pretty,
        )?,
        OutputFormat::Text => match &resolved {
            Some(resolved) => {
                println!("{} ({:?})", resolved.path.display(), resolved.discovered_via)
            }
            None => println!("No credentials file found"),
        },
    }

    resolved
        .map(|_| ())
        .ok_or_else(|| "Run 'claude' to authenticate".to_string())
}

fn print_outcome(outcome: &PollOutcome, format: OutputFormat, pretty: bool) -> Result<(), String> {
    match format {
        OutputFormat::Text => {
            println!("{}", tooltip_text(outcome));
            Ok(())
        }
        OutputFormat::Json => print_json(outcome, pretty),
    }
}

fn print_json<T: Serialize>(payload: &T, pretty: bool) -> Result<(), String> {
    let encode = if pretty {
        serde_json::to_string_pretty::<T>
    } else {
        serde_json::to_string::<T>
    };
    let line = encode(payload).map_err(|err| format!("Failed to encode JSON: {err}"))?;
    println!("{line}");
    Ok(())
}

fn print_help() {
    println!(
        concat!(
            "claude-usage {}\n\n",
            "Usage:\n",
            "  claude-usage status [--format text|json] [--pretty]\n",
            "  claude-usage watch [--format text|json] [--pretty]\n",
            "  claude-usage locate [--format text|json]\n\n",
            "Commands:\n",
            "  status  Fetch usage once and print it\n",
            "  watch   Poll continuously; press Enter to refresh now\n",
            "  locate  Show which credentials file is used\n\n",
            "Flags:\n",
            "  --format <text|json>  Output format\n",
            "  --json               Shortcut for --format json\n",
            "  --pretty             Pretty-print JSON output\n",
            "  -h, --help           Show help\n",
            "  -V, --version        Show version"
        ),
        env!("CARGO_PKG_VERSION")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> CliArgs {
        parse_args(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn bare_flags_run_status() {
        let parsed = args(&["--json", "--pretty"]);
        assert_eq!(parsed.command, "status");
        assert_eq!(parsed.format, OutputFormat::Json);
        assert!(parsed.pretty);
    }

    #[test]
    fn leading_info_flag_becomes_the_command() {
        assert_eq!(args(&["--help"]).command, "--help");
        assert_eq!(args(&["-V"]).command, "-V");
    }

    #[test]
    fn command_then_format() {
        let parsed = args(&["watch", "--format", "json"]);
        assert_eq!(parsed.command, "watch");
        assert_eq!(parsed.format, OutputFormat::Json);

        let parsed = args(&["locate", "--format", "yaml"]);
        assert_eq!(parsed.format, OutputFormat::Text);
    }
}
