//! docid CLI: tenant-scoped sequential document IDs
//!
//! Commands: init, ensure, next, preview, reserve, config, migrate, legacy,
//! completions

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use docid_core::document_type::{normalize_key, DEFAULT_PADDING, DEFAULT_SEPARATOR};
use docid_core::{
    Clock, DocumentTypeConfig, EngineConfig, FinancialYear, FixedClock, LegacyIdConfig,
    PeriodBasis, ResetPolicy, SystemClock, TenantId,
};
use docid_engine::{
    format_configuration, Bootstrapper, BulkAllocator, ConfigService, DocumentTypeUpdate,
    ExtraTokens, IdGenerator, IssuedId, LegacyMigrator, OutputFormat, SettingsUpdate,
};
use docid_store::{RegistryStore, SqliteStore};

#[derive(Parser)]
#[command(name = "docid")]
#[command(version)]
#[command(about = "Tenant-scoped sequential document IDs")]
struct Cli {
    /// SQLite database file (overrides the config file and DOCID_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluate periods as of this date instead of today
    #[arg(long, global = true, hide = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its schema
    Init,
    /// Ensure a tenant has settings and the standard document types
    Ensure {
        #[arg(long)]
        tenant: String,
    },
    /// Issue the next identifier
    Next {
        #[arg(long)]
        tenant: String,
        /// Document type key (legacy names accepted)
        #[arg(long = "type")]
        doc_type: String,
        /// Extra template token, NAME=VALUE (repeatable)
        #[arg(long = "token", value_parser = parse_token)]
        tokens: Vec<(String, String)>,
        /// Fall back to a tagged temporary ID if the database is unavailable
        #[arg(long)]
        allow_degraded: bool,
    },
    /// Show the next identifier without consuming it
    Preview {
        #[arg(long)]
        tenant: String,
        #[arg(long = "type")]
        doc_type: String,
        #[arg(long = "token", value_parser = parse_token)]
        tokens: Vec<(String, String)>,
    },
    /// Reserve and commit a block of identifiers for a batch import
    Reserve {
        #[arg(long)]
        tenant: String,
        #[arg(long = "type")]
        doc_type: String,
        #[arg(long)]
        count: usize,
        /// Identifier already used by the batch (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long = "token", value_parser = parse_token)]
        tokens: Vec<(String, String)>,
        /// Print the range that would be reserved, claiming nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Import legacy configuration for a tenant (one-time)
    Migrate {
        #[arg(long)]
        tenant: String,
    },
    /// Manage legacy configuration records
    Legacy {
        #[command(subcommand)]
        command: LegacyCommands,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show settings and document types with next-ID previews
    Show {
        #[arg(long)]
        tenant: String,
        /// json, table or markdown
        #[arg(long, default_value = "json")]
        format: OutputFormat,
    },
    /// Update a document type
    SetType {
        #[arg(long)]
        tenant: String,
        #[arg(long = "type")]
        doc_type: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        separator: Option<String>,
        #[arg(long)]
        template: Option<String>,
        #[arg(long)]
        padding: Option<usize>,
        #[arg(long)]
        start_from: Option<u64>,
        #[arg(long)]
        reset_policy: Option<ResetPolicy>,
        #[arg(long)]
        ref_number: Option<String>,
        /// Custom token, NAME=VALUE (repeatable; replaces all custom tokens)
        #[arg(long = "custom-token", value_parser = parse_token)]
        custom_tokens: Vec<(String, String)>,
        /// Overwrite the current bucket's last issued number
        #[arg(long)]
        last_number: Option<u64>,
        #[arg(long)]
        updated_by: Option<String>,
    },
    /// Register a new document type
    AddType {
        #[arg(long)]
        tenant: String,
        #[arg(long = "type")]
        doc_type: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        template: String,
        #[arg(long, default_value_t = 1)]
        start_from: u64,
        #[arg(long, default_value_t = DEFAULT_PADDING)]
        padding: usize,
        #[arg(long, default_value = "YEARLY")]
        reset_policy: ResetPolicy,
        #[arg(long, default_value = DEFAULT_SEPARATOR)]
        separator: String,
        /// Reset by calendar year instead of financial year
        #[arg(long)]
        calendar_year: bool,
    },
    /// Update company settings
    SetSettings {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        dept: Option<String>,
        /// Start year, e.g. 2025 or 2025-26
        #[arg(long)]
        financial_year: Option<FinancialYear>,
    },
}

#[derive(Subcommand)]
enum LegacyCommands {
    /// Add or replace a legacy record
    Add {
        #[arg(long)]
        tenant: String,
        /// Legacy entity name, e.g. EMPLOYEE, OFFER
        #[arg(long)]
        entity: String,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        dept: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        template: Option<String>,
        #[arg(long)]
        padding: Option<usize>,
        #[arg(long)]
        start_from: Option<u64>,
        #[arg(long)]
        reset_policy: Option<ResetPolicy>,
        /// Last sequence number issued under the legacy scheme
        #[arg(long)]
        current_seq: Option<u64>,
    },
    /// List legacy records
    List {
        #[arg(long)]
        tenant: String,
    },
}

fn parse_token(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))
}

fn extra_tokens(tokens: Vec<(String, String)>) -> ExtraTokens {
    tokens.into_iter().collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docid=info")),
        )
        .with_writer(io::stderr)
        .init();
}

struct App {
    config: EngineConfig,
    clock: Box<dyn Clock>,
}

impl App {
    fn open_store(&self) -> Result<SqliteStore> {
        let path = &self.config.database_path;
        SqliteStore::open(path, self.config.busy_timeout())
            .with_context(|| format!("opening {}", path.display()))
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "docid", &mut io::stdout());
        return Ok(());
    }

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    tracing::debug!(
        db = %config.database_path.display(),
        busy_timeout_ms = config.busy_timeout_ms,
        "resolved engine configuration"
    );
    let clock: Box<dyn Clock> = match cli.today {
        Some(date) => {
            let midnight = date.and_hms_opt(0, 0, 0).context("invalid --today date")?;
            Box::new(FixedClock::at(midnight.and_utc()))
        }
        None => Box::new(SystemClock),
    };
    let ctx = App { config, clock };

    match cli.command {
        Commands::Init => cmd_init(&ctx),
        Commands::Ensure { tenant } => cmd_ensure(&ctx, &tenant),
        Commands::Next {
            tenant,
            doc_type,
            tokens,
            allow_degraded,
        } => cmd_next(&ctx, &tenant, &doc_type, tokens, allow_degraded),
        Commands::Preview {
            tenant,
            doc_type,
            tokens,
        } => cmd_preview(&ctx, &tenant, &doc_type, tokens),
        Commands::Reserve {
            tenant,
            doc_type,
            count,
            exclude,
            tokens,
            dry_run,
        } => cmd_reserve(&ctx, &tenant, &doc_type, count, &exclude, tokens, dry_run),
        Commands::Config { command } => cmd_config(&ctx, command),
        Commands::Migrate { tenant } => cmd_migrate(&ctx, &tenant),
        Commands::Legacy { command } => cmd_legacy(&ctx, command),
        Commands::Completions { .. } => Ok(()),
    }
}

fn cmd_init(ctx: &App) -> Result<()> {
    let store = ctx.open_store()?;
    print_json(&serde_json::json!({
        "database": ctx.config.database_path,
        "counters": store.counter_count()?,
        "status": "initialized",
    }))
}

fn cmd_ensure(ctx: &App, tenant: &str) -> Result<()> {
    let tenant = TenantId::new(tenant)?;
    let store = ctx.open_store()?;
    let boot = Bootstrapper::new(&store, ctx.clock.as_ref(), &ctx.config.defaults);
    let settings = boot.ensure_settings(&tenant)?;
    let created = boot.ensure_document_types(&tenant)?;
    print_json(&serde_json::json!({
        "tenant": tenant,
        "financial_year": settings.financial_year_label(),
        "settings": settings,
        "document_types_created": created,
    }))
}

fn cmd_next(
    ctx: &App,
    tenant: &str,
    doc_type: &str,
    tokens: Vec<(String, String)>,
    allow_degraded: bool,
) -> Result<()> {
    let tenant = TenantId::new(tenant)?;
    let extras = extra_tokens(tokens);

    if allow_degraded {
        let issued = match SqliteStore::open(&ctx.config.database_path, ctx.config.busy_timeout())
        {
            Ok(store) => IdGenerator::new(&store, ctx.clock.as_ref(), &ctx.config.defaults)
                .generate_or_degraded(&tenant, doc_type, &extras)?,
            Err(err) if err.is_store_unavailable() => {
                IssuedId::degraded(&tenant, doc_type, ctx.clock.now(), &err)
            }
            Err(err) => return Err(err.into()),
        };
        return print_json(&issued);
    }

    let store = ctx.open_store()?;
    let generated = IdGenerator::new(&store, ctx.clock.as_ref(), &ctx.config.defaults)
        .generate_id(&tenant, doc_type, true, &extras)?;
    print_json(&generated)
}

fn cmd_preview(
    ctx: &App,
    tenant: &str,
    doc_type: &str,
    tokens: Vec<(String, String)>,
) -> Result<()> {
    let tenant = TenantId::new(tenant)?;
    let store = ctx.open_store()?;
    let generated = IdGenerator::new(&store, ctx.clock.as_ref(), &ctx.config.defaults)
        .generate_id(&tenant, doc_type, false, &extra_tokens(tokens))?;
    print_json(&generated)
}

fn cmd_reserve(
    ctx: &App,
    tenant: &str,
    doc_type: &str,
    count: usize,
    exclude: &[String],
    tokens: Vec<(String, String)>,
    dry_run: bool,
) -> Result<()> {
    let tenant = TenantId::new(tenant)?;
    let store = ctx.open_store()?;
    let allocator = BulkAllocator::new(&store, ctx.clock.as_ref(), &ctx.config.defaults);
    let extra = extra_tokens(tokens);
    let (reservation, commit) = if dry_run {
        (allocator.plan(&tenant, doc_type, count, exclude, &extra)?, None)
    } else {
        let reservation = allocator.reserve(&tenant, doc_type, count, exclude, &extra)?;
        let commit = allocator.commit(&reservation, exclude)?;
        (reservation, Some(commit))
    };
    print_json(&serde_json::json!({
        "reservation": reservation,
        "commit": commit,
    }))
}

fn cmd_config(ctx: &App, command: ConfigCommands) -> Result<()> {
    let store = ctx.open_store()?;
    let service = ConfigService::new(&store, ctx.clock.as_ref(), &ctx.config.defaults);

    match command {
        ConfigCommands::Show { tenant, format } => {
            let view = service.view(&TenantId::new(tenant)?)?;
            let output = format_configuration(&view, format);
            print!("{output}");
            if !output.ends_with('\n') {
                println!();
            }
            Ok(())
        }
        ConfigCommands::SetType {
            tenant,
            doc_type,
            name,
            prefix,
            separator,
            template,
            padding,
            start_from,
            reset_policy,
            ref_number,
            custom_tokens,
            last_number,
            updated_by,
        } => {
            let update = DocumentTypeUpdate {
                name,
                prefix,
                separator,
                format_template: template,
                padding,
                start_from,
                reset_policy,
                period_basis: None,
                ref_number,
                custom_tokens: (!custom_tokens.is_empty())
                    .then(|| custom_tokens.into_iter().collect::<BTreeMap<_, _>>()),
                last_number,
                updated_by,
            };
            let view = service.update_document_type(&TenantId::new(tenant)?, &doc_type, &update)?;
            print_json(&view)
        }
        ConfigCommands::AddType {
            tenant,
            doc_type,
            name,
            prefix,
            template,
            start_from,
            padding,
            reset_policy,
            separator,
            calendar_year,
        } => {
            let tenant = TenantId::new(tenant)?;
            let config = DocumentTypeConfig {
                key: normalize_key(&doc_type),
                name,
                prefix,
                separator,
                format_template: template,
                start_from,
                padding,
                reset_policy,
                period_basis: if calendar_year {
                    PeriodBasis::CalendarYear
                } else {
                    PeriodBasis::FinancialYear
                },
                ref_number: None,
                custom_tokens: BTreeMap::new(),
                updated_by: None,
                updated_at: ctx.clock.now(),
            };
            let key = config.key.clone();
            let created = service.define_document_type(&tenant, config)?;
            if !created {
                anyhow::bail!("document type {key} already exists for {tenant}");
            }
            let view = service.view(&tenant)?;
            let added = view
                .document_types
                .into_iter()
                .find(|t| t.config.key == key)
                .context("document type missing after insert")?;
            print_json(&added)
        }
        ConfigCommands::SetSettings {
            tenant,
            company,
            branch,
            dept,
            financial_year,
        } => {
            let update = SettingsUpdate {
                company_code: company,
                branch_code: branch,
                department_code: dept,
                financial_year,
            };
            let settings = service.update_settings(&TenantId::new(tenant)?, &update)?;
            print_json(&settings)
        }
    }
}

fn cmd_migrate(ctx: &App, tenant: &str) -> Result<()> {
    let tenant = TenantId::new(tenant)?;
    let store = ctx.open_store()?;
    let report = LegacyMigrator::new(&store, ctx.clock.as_ref(), &ctx.config.defaults)
        .migrate(&tenant)?;
    print_json(&report)
}

fn cmd_legacy(ctx: &App, command: LegacyCommands) -> Result<()> {
    let store = ctx.open_store()?;
    match command {
        LegacyCommands::Add {
            tenant,
            entity,
            company,
            branch,
            dept,
            prefix,
            template,
            padding,
            start_from,
            reset_policy,
            current_seq,
        } => {
            let tenant = TenantId::new(tenant)?;
            let record = LegacyIdConfig {
                entity_type: entity.trim().to_ascii_uppercase(),
                company_code: company,
                branch_code: branch,
                department_code: dept,
                prefix,
                format_template: template,
                padding,
                start_from,
                reset_policy,
                current_seq,
            };
            store.save_legacy_config(&tenant, &record)?;
            print_json(&record)
        }
        LegacyCommands::List { tenant } => {
            print_json(&store.legacy_configs(&TenantId::new(tenant)?)?)
        }
    }
}
