use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aws_root_reset::browser::{ChromeLauncher, SigninLayout};
use aws_root_reset::config::{ConfigError, Overrides, Settings};
use aws_root_reset::email::setup::setup_imap_credentials;
use aws_root_reset::email::{EmailRetriever, ImapConnector};
use aws_root_reset::reset::{Account, Collaborators};
use aws_root_reset::runner::{init_record, record_status, run_accounts, RunPlan};
use aws_root_reset::utils::{initialize_logging, SystemClock};
use aws_root_reset::IMAP_PASSWORD_ENV;

const EXIT_CONFIG: i32 = 2;

fn account_args() -> Vec<Arg> {
    vec![
        Arg::new("account-id")
            .long("account-id")
            .help("Reset a single account instead of the configured list")
            .requires_all(["email", "secret-id"]),
        Arg::new("email")
            .long("email")
            .help("Root email of the single account"),
        Arg::new("secret-id")
            .long("secret-id")
            .help("Secret record of the single account"),
        Arg::new("name")
            .long("name")
            .help("Display name of the single account (defaults to the account id)"),
    ]
}

fn cli() -> Command {
    Command::new("aws-root-reset")
        .about("Reset AWS root account passwords through the console reset flow")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .default_value("root-reset.json")
                .help("Path to the JSON configuration file"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .default_value("aws-root-reset.log")
                .help("File that receives the log"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level"),
        )
        .subcommand(
            Command::new("run")
                .about("Reset passwords for the configured accounts")
                .args(account_args())
                .arg(
                    Arg::new("headless")
                        .long("headless")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("headed")
                        .help("Run Chrome without a window"),
                )
                .arg(
                    Arg::new("headed")
                        .long("headed")
                        .action(ArgAction::SetTrue)
                        .help("Show the Chrome window"),
                )
                .arg(
                    Arg::new("wait-for-email")
                        .long("wait-for-email")
                        .value_name("SECONDS")
                        .value_parser(value_parser!(u64))
                        .help("How long to wait for the reset email"),
                )
                .arg(
                    Arg::new("automation-timeout")
                        .long("automation-timeout")
                        .value_name("SECONDS")
                        .value_parser(value_parser!(u64))
                        .help("Budget for one account's whole reset"),
                )
                .arg(
                    Arg::new("force-reset")
                        .long("force-reset")
                        .action(ArgAction::SetTrue)
                        .help("Reset even if the record says the password is set"),
                )
                .arg(
                    Arg::new("skip-mfa")
                        .long("skip-mfa")
                        .action(ArgAction::SetTrue)
                        .help("Treat an MFA prompt after sign-in as a verified login"),
                )
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .value_parser(value_parser!(usize))
                        .help("Accounts processed concurrently"),
                )
                .arg(
                    Arg::new("fail-fast")
                        .long("fail-fast")
                        .action(ArgAction::SetTrue)
                        .help("Stop starting accounts after the first failure"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_parser(["json", "text"])
                        .default_value("json")
                        .help("Result format"),
                )
                .arg(
                    Arg::new("imap-password")
                        .long("imap-password")
                        .env(IMAP_PASSWORD_ENV)
                        .hide(true)
                        .hide_env_values(true),
                ),
        )
        .subcommand(
            Command::new("init-record")
                .about("Create secret records for accounts that have none")
                .args(account_args()),
        )
        .subcommand(
            Command::new("status")
                .about("Show the stored reset status of each account")
                .args(account_args())
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_parser(["json", "text"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            Command::new("store-imap-credentials")
                .about("Store the reset inbox password in the system keyring")
                .arg(
                    Arg::new("secret-name")
                        .long("secret-name")
                        .help("Keyring entry name (defaults to email.password_secret)"),
                ),
        )
}

/// Single account from the command line, if one was given
fn account_from_args(matches: &ArgMatches) -> Option<Account> {
    let account_id = matches.get_one::<String>("account-id")?;
    let email = matches.get_one::<String>("email")?;
    let secret_id = matches.get_one::<String>("secret-id")?;
    Some(Account {
        name: matches
            .get_one::<String>("name")
            .cloned()
            .unwrap_or_else(|| account_id.clone()),
        account_id: account_id.clone(),
        email: email.clone(),
        secret_id: secret_id.clone(),
    })
}

fn load_settings(config_path: &Path, matches: &ArgMatches) -> Result<Settings, ConfigError> {
    let single = account_from_args(matches);
    let mut settings = match Settings::load(config_path) {
        Ok(settings) => settings,
        // A single account on the command line can run on defaults
        Err(ConfigError::Invalid(msg)) if single.is_some() && !config_path.exists() => {
            warn!("{}; continuing with defaults", msg);
            Settings::default()
        }
        Err(e) => return Err(e),
    };
    settings.apply_overrides(Overrides {
        account: single,
        ..Overrides::default()
    });
    Ok(settings)
}

fn run_overrides(matches: &ArgMatches) -> Overrides {
    let headless = if matches.get_flag("headless") {
        Some(true)
    } else if matches.get_flag("headed") {
        Some(false)
    } else {
        None
    };
    Overrides {
        headless,
        wait_for_email_seconds: matches.get_one::<u64>("wait-for-email").copied(),
        automation_timeout_seconds: matches.get_one::<u64>("automation-timeout").copied(),
        workers: matches.get_one::<usize>("workers").copied(),
        force_reset: matches.get_flag("force-reset"),
        skip_mfa: matches.get_flag("skip-mfa"),
        fail_fast: matches.get_flag("fail-fast"),
        account: None,
    }
}

fn config_failure(error: impl std::fmt::Display) -> i32 {
    error!("{}", error);
    eprintln!("Error: {}", error);
    EXIT_CONFIG
}

fn run_command(config_path: &Path, matches: &ArgMatches) -> i32 {
    let mut settings = match load_settings(config_path, matches) {
        Ok(settings) => settings,
        Err(e) => return config_failure(e),
    };
    settings.apply_overrides(run_overrides(matches));
    if let Err(e) = settings.validate() {
        return config_failure(e);
    }

    let password = match settings.imap_password(matches.get_one::<String>("imap-password").cloned())
    {
        Ok(password) => password,
        Err(e) => return config_failure(e),
    };
    let store = match settings.open_store() {
        Ok(store) => store,
        Err(e) => return config_failure(e),
    };
    let retriever = match EmailRetriever::new(
        &settings.email.provider,
        settings.poll_interval(),
        settings.email.max_messages_per_poll,
    ) {
        Ok(retriever) => retriever,
        Err(e) => return config_failure(e),
    };
    let connector = ImapConnector::new(settings.imap_endpoint(), password, settings.step_timeout());
    let browser = ChromeLauncher::new(settings.chrome_options(), SigninLayout::aws_root());

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Interrupt received; stopping after the current step");
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Could not install interrupt handler: {}", e);
    }

    let deps = Collaborators {
        store: store.as_ref(),
        browser: &browser,
        mailbox: &connector,
        retriever: &retriever,
        clock: &SystemClock,
        interrupted: &interrupted,
    };
    let plan = RunPlan {
        options: settings.reset_options(),
        policy: settings.automation.on_failure,
        workers: settings.automation.workers,
    };

    let report = run_accounts(&settings.accounts, &plan, deps);
    info!("Run finished: {}", report.summary());

    match matches.get_one::<String>("output").map(String::as_str) {
        Some("text") => println!("{}", report.to_text()),
        _ => match report.json_lines() {
            Ok(lines) => {
                for line in lines {
                    println!("{}", line);
                }
                eprintln!("{}", report.summary());
            }
            Err(e) => return config_failure(e),
        },
    }
    report.exit_code()
}

fn init_record_command(config_path: &Path, matches: &ArgMatches) -> i32 {
    let settings = match load_settings(config_path, matches) {
        Ok(settings) => settings,
        Err(e) => return config_failure(e),
    };
    if let Err(e) = settings.validate_accounts() {
        return config_failure(e);
    }
    let store = match settings.open_store() {
        Ok(store) => store,
        Err(e) => return config_failure(e),
    };

    for account in &settings.accounts {
        match init_record(store.as_ref(), account) {
            Ok(true) => println!("{}: created {}", account.name, account.secret_id),
            Ok(false) => println!("{}: {} already exists", account.name, account.secret_id),
            Err(e) => return config_failure(e),
        }
    }
    0
}

fn status_command(config_path: &Path, matches: &ArgMatches) -> i32 {
    let settings = match load_settings(config_path, matches) {
        Ok(settings) => settings,
        Err(e) => return config_failure(e),
    };
    if let Err(e) = settings.validate_accounts() {
        return config_failure(e);
    }
    let store = match settings.open_store() {
        Ok(store) => store,
        Err(e) => return config_failure(e),
    };
    let summaries = match record_status(store.as_ref(), &settings.accounts) {
        Ok(summaries) => summaries,
        Err(e) => return config_failure(e),
    };

    for summary in &summaries {
        if matches.get_one::<String>("output").map(String::as_str) == Some("json") {
            match serde_json::to_string(summary) {
                Ok(line) => println!("{}", line),
                Err(e) => return config_failure(e),
            }
            continue;
        }
        let last = match (&summary.last_state, &summary.last_reason) {
            (Some(state), Some(reason)) => format!("{:?}: {}", state, reason),
            (Some(state), None) => format!("{:?}", state),
            _ => "never run".to_string(),
        };
        println!(
            "{:<20} record={} password_set={} last={}",
            summary.account,
            if summary.exists { "present" } else { "missing" },
            summary.password_set,
            last
        );
    }
    0
}

fn store_credentials_command(config_path: &Path, matches: &ArgMatches) -> i32 {
    // The config file is optional here; it only supplies defaults
    let settings = Settings::load(config_path).unwrap_or_default();
    let secret_name = matches
        .get_one::<String>("secret-name")
        .cloned()
        .unwrap_or_else(|| settings.email.password_secret.clone());

    match setup_imap_credentials(&secret_name, &settings.email.username) {
        Ok(()) => 0,
        Err(e) => config_failure(e),
    }
}

fn main() {
    let matches = cli().get_matches();

    let log_file = matches
        .get_one::<PathBuf>("log-file")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("aws-root-reset.log"));
    let level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = initialize_logging(&log_file, level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("root-reset.json"));

    let code = match matches.subcommand() {
        Some(("run", sub_matches)) => run_command(&config_path, sub_matches),
        Some(("init-record", sub_matches)) => init_record_command(&config_path, sub_matches),
        Some(("status", sub_matches)) => status_command(&config_path, sub_matches),
        Some(("store-imap-credentials", sub_matches)) => {
            store_credentials_command(&config_path, sub_matches)
        }
        _ => EXIT_CONFIG,
    };
    process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_run_flags_become_overrides() {
        let matches = cli()
            .try_get_matches_from([
                "aws-root-reset",
                "run",
                "--headed",
                "--wait-for-email",
                "45",
                "--force-reset",
                "--fail-fast",
                "--workers",
                "3",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let overrides = run_overrides(sub);
        assert_eq!(overrides.headless, Some(false));
        assert_eq!(overrides.wait_for_email_seconds, Some(45));
        assert_eq!(overrides.workers, Some(3));
        assert!(overrides.force_reset);
        assert!(overrides.fail_fast);
        assert!(!overrides.skip_mfa);
    }

    #[test]
    fn test_single_account_requires_email_and_secret() {
        assert!(cli()
            .try_get_matches_from(["aws-root-reset", "run", "--account-id", "123456789012"])
            .is_err());

        let matches = cli()
            .try_get_matches_from([
                "aws-root-reset",
                "init-record",
                "--account-id",
                "123456789012",
                "--email",
                "root@example.com",
                "--secret-id",
                "aws/root/prod",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let account = account_from_args(sub).unwrap();
        assert_eq!(account.name, "123456789012");
        assert_eq!(account.secret_id, "aws/root/prod");
    }
}
