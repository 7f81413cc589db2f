use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;

use registrar::config::Config;
use registrar::notify::{Notice, NoticeLevel, Notifier};
use registrar::request::Params;
use registrar::resources::{NewSession, StudentFilter, UserFilter};
use registrar::{logging, HttpClient};

#[derive(Parser, Debug)]
#[command(name = "registrar")]
#[command(about = "Command-line client for the school registrar API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/registrar/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Increase log verbosity (-v, -vv, -vvv)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sign in (password from REGISTRAR_PASSWORD)
  Login { email: String },
  /// Sign out and forget the stored session
  Logout,
  /// Show the signed-in user
  Whoami,
  /// Send a password reset link
  ForgotPassword { email: String },
  Users {
    #[arg(long)]
    role: Option<String>,
    #[arg(long)]
    search: Option<String>,
  },
  Students {
    #[arg(long)]
    class: Option<u64>,
    #[arg(long)]
    search: Option<String>,
  },
  Classes,
  Subjects {
    #[arg(long)]
    class: Option<u64>,
  },
  Sessions {
    #[command(subcommand)]
    action: Option<SessionAction>,
  },
  Terms {
    #[arg(long)]
    session: Option<u64>,
  },
  Payments {
    #[arg(long)]
    student: Option<u64>,
  },
  Results {
    #[command(subcommand)]
    action: ResultAction,
  },
  /// Raw GET against the API, e.g. `registrar get /classes/4/students`
  Get {
    path: String,
    /// Query parameters as key=value
    #[arg(short, long = "param")]
    params: Vec<String>,
  },
}

#[derive(Subcommand, Debug)]
enum SessionAction {
  Create {
    name: String,
    /// First day, YYYY-MM-DD
    start: NaiveDate,
    /// Last day, YYYY-MM-DD
    end: NaiveDate,
    #[arg(long)]
    current: bool,
  },
  Activate { id: u64 },
}

#[derive(Subcommand, Debug)]
enum ResultAction {
  Pending {
    #[arg(long)]
    class: Option<u64>,
  },
  Approve { id: u64 },
  Reject {
    id: u64,
    #[arg(long)]
    reason: String,
  },
}

/// Prints notices to stderr so stdout stays machine readable.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  fn notify(&self, notice: &Notice) {
    let tag = match notice.level {
      NoticeLevel::Success => "ok",
      NoticeLevel::Info => "info",
      NoticeLevel::Warning => "warning",
      NoticeLevel::Error => "error",
    };
    eprintln!("[{}] {}", tag, notice.message);
  }

  fn login_required(&self) {
    eprintln!("Session expired. Run `registrar login <email>` to sign in again.");
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn parse_params(raw: &[String]) -> Result<Params> {
  raw.iter().try_fold(Params::new(), |params, pair| {
    let (key, value) = pair
      .split_once('=')
      .ok_or_else(|| eyre!("Expected key=value, got {}", pair))?;
    Ok(params.with(key, value))
  })
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(args.verbose, &config.logging)?;

  let client = HttpClient::from_config(&config, Arc::new(ConsoleNotifier))?;
  tracing::debug!(base_url = %client.base_url(), "client ready");

  run(&client, args.command).await
}

async fn run(client: &HttpClient, command: Command) -> Result<()> {
  match command {
    Command::Login { email } => {
      let password = Config::get_password()?;
      let user = client.auth().login(&email, &password).await?;
      eprintln!("Signed in as {} ({})", user.full_name(), user.role);
    }
    Command::Logout => client.auth().logout().await?,
    Command::Whoami => print_json(&client.auth().me().await?)?,
    Command::ForgotPassword { email } => client.auth().forgot_password(&email).await?,
    Command::Users { role, search } => {
      let filter = UserFilter {
        role,
        search,
        page: None,
      };
      print_json(&client.users().list(&filter).await?)?;
    }
    Command::Students { class, search } => {
      let filter = StudentFilter {
        class_id: class,
        search,
        page: None,
      };
      print_json(&client.students().list(&filter).await?)?;
    }
    Command::Classes => print_json(&client.classes().list().await?)?,
    Command::Subjects { class } => print_json(&client.subjects().list(class).await?)?,
    Command::Sessions { action: None } => print_json(&client.sessions().list().await?)?,
    Command::Sessions {
      action: Some(SessionAction::Create {
        name,
        start,
        end,
        current,
      }),
    } => {
      let session = NewSession {
        name,
        start_date: start,
        end_date: end,
        is_current: current,
      };
      session.validate()?;
      print_json(&client.sessions().create(&session).await?)?;
    }
    Command::Sessions {
      action: Some(SessionAction::Activate { id }),
    } => client.sessions().activate(id).await?,
    Command::Terms { session } => print_json(&client.terms().list(session).await?)?,
    Command::Payments { student } => print_json(&client.payments().list(student).await?)?,
    Command::Results { action } => match action {
      ResultAction::Pending { class } => print_json(&client.results().pending(class).await?)?,
      ResultAction::Approve { id } => client.results().approve(id).await?,
      ResultAction::Reject { id, reason } => client.results().reject(id, &reason).await?,
    },
    Command::Get { path, params } => {
      let value: Value = client.get(&path, parse_params(&params)?).await?;
      print_json(&value)?;
    }
  }
  Ok(())
}
