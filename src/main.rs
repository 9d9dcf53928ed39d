//! tradebill - Invoice server and command-line client for trade contractors

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tradebill::calculator::format_money;
use tradebill::client::HttpInvoiceService;
use tradebill::config::{self, Config};
use tradebill::models::{Invoice, InvoiceStatus};
use tradebill::repository::InvoiceRepository;
use tradebill::{api, db, delivery};

#[derive(Parser)]
#[command(name = "tradebill")]
#[command(about = "Invoicing server and client for plumbing, electrical and HVAC work")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the invoice server
    Serve {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Generate a new API token
    Token {
        /// Name/label for the token
        #[arg(short, long)]
        name: Option<String>,

        /// List all configured tokens
        #[arg(long)]
        list: bool,

        /// Revoke a token by name
        #[arg(long)]
        revoke: Option<String>,

        /// Config file path (for list/revoke operations)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Initialize a new config file
    Init {
        /// Output path for config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Work with invoices on a running server
    Invoices {
        #[command(flatten)]
        remote: RemoteArgs,

        #[command(subcommand)]
        command: InvoiceCommand,
    },
}

#[derive(clap::Args)]
struct RemoteArgs {
    /// Server URL (overrides [client] server_url)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// API token (overrides [client] token)
    #[arg(short, long, global = true)]
    token: Option<String>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum InvoiceCommand {
    /// List invoices, newest first
    List,

    /// Show one invoice with its line items and totals
    Show { id: i64 },

    /// Send (or re-send) an invoice to the client
    Send { id: i64 },

    /// Record payment for an invoice
    MarkPaid { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "tradebill=info"
                    .parse()
                    .context("Invalid log directive")?,
            ),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, bind } => {
            let mut cfg = load_config(config)?;

            // Override with CLI args
            if let Some(p) = port {
                cfg.server.port = p;
            }
            if let Some(b) = bind {
                cfg.server.bind = b;
            }

            run_server(cfg).await
        }

        Commands::Token {
            name,
            list,
            revoke,
            config,
        } => {
            let config_path = match config {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if list {
                return list_tokens(&config_path);
            }

            if let Some(token_name) = revoke {
                return revoke_token(&config_path, &token_name);
            }

            let token = generate_token();
            let label = name.unwrap_or_else(|| "default".to_string());
            let token_hash = config::hash_token(&token)?;

            if config_path.exists() {
                let mut cfg = Config::load_from(&config_path)?;

                if cfg.tokens.iter().any(|t| t.name == label) {
                    println!(
                        "Token '{}' already exists. Use --revoke first to replace it.",
                        label
                    );
                    return Ok(());
                }

                cfg.tokens.push(config::TokenConfig {
                    name: label.clone(),
                    token_hash,
                });
                cfg.save_to(&config_path)?;

                println!("Generated API token for '{}' and saved it to {}\n", label, config_path.display());
            } else {
                println!("Generated API token for '{}':\n", label);
                println!("Add this to your server's config.toml:\n");
                println!("  [[tokens]]");
                println!("  name = \"{}\"", label);
                println!("  token_hash = \"{}\"\n", token_hash);
            }

            println!("Token: {}\n", token);
            println!("Clients use it as a bearer token, or in their config.toml:");
            println!("  [client]");
            println!("  server_url = \"http://YOUR_SERVER_IP:3030\"");
            println!("  token = \"{}\"\n", token);
            println!("Save this token now - it cannot be retrieved later!");

            Ok(())
        }

        Commands::Init { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from("config.toml"));
            let cfg = Config::default();
            cfg.save_to(&path)?;

            println!("Created config file: {}", path.display());
            println!();
            println!("Next steps:");
            println!(
                "  1. Generate a token: tradebill token --config {} --name my-phone",
                path.display()
            );
            println!(
                "  2. Start the server: tradebill serve --config {}",
                path.display()
            );

            Ok(())
        }

        Commands::Invoices { remote, command } => run_invoices(remote, command).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
}

fn list_tokens(config_path: &std::path::Path) -> Result<()> {
    if !config_path.exists() {
        println!("No config file found at {}", config_path.display());
        println!("Run 'tradebill init' to create one.");
        return Ok(());
    }

    let cfg = Config::load_from(config_path)?;
    if cfg.tokens.is_empty() {
        println!("No tokens configured.");
        println!("Generate one with: tradebill token --name <device-name>");
        return Ok(());
    }

    println!("Configured tokens:");
    println!();
    for token in &cfg.tokens {
        let hash_preview: String = token.token_hash.chars().take(20).collect();
        let ellipsis = if token.token_hash.len() > hash_preview.len() { "..." } else { "" };
        println!("  {} - {}{}", token.name, hash_preview, ellipsis);
    }
    Ok(())
}

fn revoke_token(config_path: &std::path::Path, token_name: &str) -> Result<()> {
    if !config_path.exists() {
        println!("No config file found at {}", config_path.display());
        return Ok(());
    }

    let mut cfg = Config::load_from(config_path)?;
    let original_len = cfg.tokens.len();
    cfg.tokens.retain(|t| t.name != token_name);

    if cfg.tokens.len() == original_len {
        println!("Token '{}' not found.", token_name);
    } else {
        cfg.save_to(config_path)?;
        println!("Revoked token '{}'.", token_name);
    }
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let db = db::Database::open(&config.database.path).context("Failed to open database")?;

    let state = api::AppState::new(db, config.clone());
    let app = api::create_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("tradebill server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_invoices(remote: RemoteArgs, command: InvoiceCommand) -> Result<()> {
    let cfg = load_config(remote.config)?;
    let server_url = remote.server.unwrap_or(cfg.client.server_url);
    let token = remote.token.or(cfg.client.token);

    let mut invoices = InvoiceRepository::new(HttpInvoiceService::new(server_url, token));

    match command {
        InvoiceCommand::List => {
            let summaries = invoices.list().await?;
            if summaries.is_empty() {
                println!("No invoices yet.");
                return Ok(());
            }

            println!(
                "{:>5}  {:<24} {:<10} {:<6} {:>12}  {}",
                "ID", "CLIENT", "TRADE", "STATUS", "TOTAL", "CREATED"
            );
            for s in summaries {
                println!(
                    "{:>5}  {:<24} {:<10} {:<6} {:>12}  {}",
                    s.id,
                    truncate(&s.client_name, 24),
                    s.trade_type,
                    s.status,
                    format_money(s.total),
                    s.created_at.format("%Y-%m-%d")
                );
            }
        }

        InvoiceCommand::Show { id } => {
            let invoice = invoices.get(id).await?;
            print_invoice(&invoice);
        }

        InvoiceCommand::Send { id } => {
            // Load first so local send rules apply before the request goes out
            invoices.get(id).await?;
            let invoice = invoices.send(id).await?;
            println!(
                "Invoice {} sent to {} ({})",
                invoice.id,
                invoice.client_email,
                format_money(invoice.totals.total)
            );
            if let Some(url) = &invoice.pdf_url {
                println!("PDF: {}", url);
            }
        }

        InvoiceCommand::MarkPaid { id } => {
            let invoice = invoices.change_status(id, InvoiceStatus::Paid).await?;
            println!(
                "Invoice {} marked paid ({})",
                invoice.id,
                format_money(invoice.totals.total)
            );
        }
    }

    Ok(())
}

fn print_invoice(invoice: &Invoice) {
    println!("Invoice #{} [{}]", invoice.id, invoice.status);
    println!("  Client:  {} <{}>", invoice.client_name, invoice.client_email);
    println!("  Job:     {}", invoice.job_address);
    println!("  Trade:   {}", invoice.trade_type);
    println!("  Created: {}", invoice.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(url) = &invoice.pdf_url {
        println!("  PDF:     {}", url);
    }
    println!();

    for item in &invoice.line_items {
        println!(
            "  {:<6} {:<36} {:>8} x {:>10} = {:>12}",
            item.category,
            truncate(&item.description, 36),
            item.quantity.normalize().to_string(),
            format_money(item.unit_price),
            format_money(item.line_total)
        );
    }
    println!();

    let totals = &invoice.totals;
    for entry in &totals.category_breakdown {
        println!("  {:<20} {:>12}", entry.category, format_money(entry.total));
    }
    println!("  {:<20} {:>12}", "Subtotal", format_money(totals.subtotal));
    println!(
        "  {:<20} {:>12}",
        format!("Tax ({}%)", invoice.tax_rate.normalize()),
        format_money(totals.tax_amount)
    );
    println!("  {:<20} {:>12}", "Total", format_money(totals.total));
    println!();
    println!("{}", delivery::compliance_notes(invoice.trade_type));
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push('~');
    short
}

fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    let token_body: String = bytes
        .iter()
        .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
        .collect();

    format!("tbk_{}", token_body)
}
