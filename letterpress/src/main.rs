//! Command line front end
//!
//! ```bash
//! # Render a template directory to stdout
//! letterpress render templates/welcome --to user@example.com --value user=Ann
//!
//! # Render and send through the configured SMTP server
//! letterpress --config letterpress.toml render templates/welcome \
//!     --to user@example.com --value user=Ann --send
//!
//! # List the templates of a registry directory
//! letterpress list templates
//! ```

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use letterpress::config::Config;
use letterpress::{logging, Address, MessageOptions, Postman, SmtpTransport, Template, TemplateRegistry, Values};
use serde_json::Value;
use tracing::info;

#[derive(Parser)]
#[command(name = "letterpress")]
#[command(about = "Render and send e-mail templates", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template directory
    Render {
        /// Template directory
        dir: PathBuf,
        /// Recipient address, repeatable
        #[arg(long, required = true)]
        to: Vec<String>,
        /// Template value as key=value, repeatable
        #[arg(long = "value")]
        values: Vec<String>,
        /// Sender, overrides the configured one
        #[arg(long)]
        from: Option<String>,
        /// Send instead of printing
        #[arg(long)]
        send: bool,
    },
    /// List templates in a registry directory
    List {
        /// Directory with one subdirectory per template
        dir: PathBuf,
    },
}

fn parse_values(pairs: &[String]) -> anyhow::Result<Values> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected key=value, got {}", pair))?;
            Ok((key.to_string(), Value::from(value)))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::default(),
    };
    logging::init(&config.logging);

    match cli.command {
        Commands::Render {
            dir,
            to,
            values,
            from,
            send,
        } => {
            let template = Template::from_directory(&dir, &config.templates)
                .with_context(|| format!("Failed to load template {}", dir.display()))?;
            let values = parse_values(&values)?;
            let recipients = to
                .iter()
                .map(|addr| Address::parse(addr))
                .collect::<letterpress::Result<Vec<_>>>()?;

            let sender = from
                .or_else(|| config.sender.clone())
                .map(|s| Address::parse(&s))
                .transpose()?;

            let mut options = MessageOptions::new();
            options.sender = sender.clone();
            let mut message = template.build_message(recipients, &values, options)?;

            if !send {
                print!("{}", message.serialize_with(&config.mime)?);
                return Ok(());
            }

            let sender = sender.ok_or_else(|| anyhow!("No sender: pass --from or set `sender`"))?;
            let mut postman = Postman::new(sender, SmtpTransport::new(config.smtp.clone()))?
                .with_mime_config(config.mime.clone());

            let mut connection = postman.connect()?;
            connection.send(&mut message)?;
            connection.disconnect()?;
            info!("Sent {}", message.message_id());
        }
        Commands::List { dir } => {
            let registry = TemplateRegistry::from_directory(&dir, &config.templates)
                .with_context(|| format!("Failed to load templates from {}", dir.display()))?;
            for name in registry.names() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
