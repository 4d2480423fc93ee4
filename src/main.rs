use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use debt_optimizer::config::{Config, ConfigOverrides};
use debt_optimizer::debts::normalize_request;
use debt_optimizer::output::csv::plan_to_csv;
use debt_optimizer::output::json::render_json;
use debt_optimizer::output::table::{render_plan_tables, render_summary_table};
use debt_optimizer::planner::{
    minimum_payment_baseline, optimize_with_budget, BaselineSummary, HorizonPolicy, RepaymentPlan,
};
use debt_optimizer::server::run_server;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "debt-optimizer",
    about = "Interest-minimizing debt repayment planner"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plan repayments for a request file (`-` reads stdin).
    Plan {
        #[arg(short, long, default_value = "-")]
        input: String,
        #[arg(long)]
        horizon: Option<usize>,
        #[arg(long)]
        budget: Option<f64>,
        #[arg(long = "timeout-secs")]
        timeout_secs: Option<u64>,
        #[arg(long = "horizon-policy")]
        horizon_policy: Option<HorizonPolicy>,
    },
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;

    match cli.command {
        Commands::Config { init, show } => handle_config_command(init, show, &config, &config_path),
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, addr).await
        }
        Commands::Plan {
            input,
            horizon,
            budget,
            timeout_secs,
            horizon_policy,
        } => {
            config.apply_overrides(ConfigOverrides {
                horizon_months: horizon,
                horizon_policy,
                solve_timeout_secs: timeout_secs,
            });
            config.validate()?;
            let raw = read_request(&input)?;
            let mut portfolio = normalize_request(&raw)?;
            if let Some(budget) = budget {
                if !budget.is_finite() || budget < 0.0 {
                    bail!("--budget must be a non-negative number");
                }
                portfolio.user = portfolio.user.with_monthly_budget(budget);
            }
            info!(
                debts = portfolio.debts.len(),
                total_balance = portfolio.total_balance(),
                total_minimums = portfolio.total_minimums(),
                monthly_budget = portfolio.monthly_budget(),
                "planning repayments"
            );

            let settings = config.plan_settings();
            let baseline = minimum_payment_baseline(&portfolio.debts, settings.horizon_months);
            let plan = optimize_with_budget(portfolio, settings).await?;
            print_plan(&plan, &baseline, cli.output)
        }
    }
}

fn read_request(input: &str) -> Result<Value> {
    let data = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed reading request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("failed reading request: {input}"))?
    };
    serde_json::from_str(&data).context("request is not valid JSON")
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn print_plan(plan: &RepaymentPlan, baseline: &BaselineSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_plan_tables(plan));
            println!();
            println!("{}", render_summary_table(plan, baseline));
        }
        OutputFormat::Json => println!("{}", render_json(plan)?),
        OutputFormat::Csv => print!("{}", plan_to_csv(plan)?),
    }
    Ok(())
}
