// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use std::env;
use std::fs::File;
use std::path::Path;

use captable_ledger::{logging, tax_id, AppConfig, ConfigError, HolderKind, Ledger, LogTarget, ShareholderRegistry};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    dispatch(&args, AppConfig::load)
}

/// Run the command in `args`. Configuration is only loaded by the commands
/// that touch the database, so `tax-id` works offline even with a bad config.
fn dispatch<L>(args: &[String], load_config: L) -> Result<()>
where
    L: FnOnce() -> Result<AppConfig, ConfigError>,
{
    match args.get(1).map(String::as_str) {
        Some("init") => {
            let config = load_config()?;
            logging::init(&config.log_filter, LogTarget::Stderr)?;
            run_init(&config)?;
        }
        Some("verify") => {
            let config = load_config()?;
            logging::init(&config.log_filter, LogTarget::Stderr)?;
            run_verify(&config)?;
        }
        Some("tax-id") => {
            let (Some(kind), Some(value)) = (args.get(2), args.get(3)) else {
                bail!("usage: captable tax-id <cpf|cnpj> <value>");
            };
            run_tax_id(kind, value)?;
        }
        Some("export") => {
            let Some(out) = args.get(2) else {
                bail!("usage: captable export <file.csv>");
            };
            let config = load_config()?;
            logging::init(&config.log_filter, LogTarget::Stderr)?;
            run_export(&config, Path::new(out))?;
        }
        Some(other) if other != "ui" => {
            bail!("unknown command '{}' (expected init, verify, tax-id, export, ui)", other);
        }
        _ => {
            // UI mode (default)
            run_ui_mode(&load_config()?)?;
        }
    }

    Ok(())
}

fn run_init(config: &AppConfig) -> Result<()> {
    println!("🗄️  Cap Table Ledger - Database Setup");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n🔧 Setting up database...");
    let ledger = Ledger::open(&config.database_path, &config.actor)?;
    println!("✓ Database ready at {} (WAL mode)", config.database_path.display());

    let shareholders = ledger.shareholders()?.len();
    let transactions = ledger.transactions()?.len();
    println!("✓ {} shareholders, {} transactions", shareholders, transactions);

    Ok(())
}

fn run_verify(config: &AppConfig) -> Result<()> {
    println!("🔍 Verifying audit chain...");
    let ledger = Ledger::open(&config.database_path, &config.actor)?;
    let report = ledger.verify_audit_chain()?;

    if report.valid {
        println!("✅ {} events verified", report.verified_events);
        Ok(())
    } else {
        match &report.first_broken {
            Some(event_id) => println!(
                "❌ Chain broken at event {} ({} of {} verified)",
                event_id, report.verified_events, report.total_events
            ),
            None => println!(
                "❌ {} events link up but do not match the stored chain head (events deleted?)",
                report.verified_events
            ),
        }
        std::process::exit(1);
    }
}

fn run_tax_id(kind: &str, value: &str) -> Result<()> {
    let Some(kind) = HolderKind::parse(kind) else {
        bail!("unknown document type '{}' (expected cpf or cnpj)", kind);
    };

    println!("{}", tax_id::format(value, kind));
    match tax_id::check(value, kind) {
        Ok(()) => println!("✓ Valid {}", kind.document_name()),
        Err(e) => {
            println!("❌ {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn run_export(config: &AppConfig, out: &Path) -> Result<()> {
    println!("📤 Exporting cap table...");
    let ledger = Ledger::open(&config.database_path, &config.actor)?;
    let table = ledger.cap_table()?;
    let registry = ShareholderRegistry::from_shareholders(ledger.shareholders()?);

    let file = File::create(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let rows = table.write_csv(file, &registry)?;

    println!("✓ Wrote {} positions to {}", rows, out.display());
    println!("✓ Outstanding: {} shares", table.total_shares());
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    // The terminal belongs to the UI; logs go to a file next to the database
    let log_path = config.database_path.with_extension("log");
    logging::init(&config.log_filter, LogTarget::File(log_path))?;

    println!("🖥️  Loading Cap Table Ledger UI...\n");
    let ledger = Ledger::open(&config.database_path, &config.actor)?;

    let mut app = ui::App::new(ledger)?;
    println!("✓ Loaded {} transactions\n", app.transactions.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin captable-server --features server");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn broken_config() -> Result<AppConfig, ConfigError> {
        Err(ConfigError::InvalidValue {
            key: "bind_addr",
            message: "'nope' is not a socket address".to_string(),
        })
    }

    #[test]
    fn test_tax_id_does_not_need_config() {
        let result = dispatch(&args(&["captable", "tax-id", "cpf", "52998224725"]), broken_config);
        assert!(result.is_ok());
    }

    #[test]
    fn test_database_commands_report_config_errors() {
        let err = dispatch(&args(&["captable", "verify"]), broken_config).unwrap_err();
        assert!(err.to_string().contains("bind_addr"));
    }

    #[test]
    fn test_unknown_command() {
        assert!(dispatch(&args(&["captable", "explode"]), broken_config).is_err());
    }
}
