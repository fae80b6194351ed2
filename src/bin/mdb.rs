//! mdb: inspect connection strings and interpolated statements
//!
//! # Usage
//!
//! ```bash
//! # Show every field of a DSN after normalization
//! mdb dsn "app:secret@tcp(db.internal)/main?readTimeout=30s"
//!
//! # Canonical form of a DSN
//! mdb format "app@tcp(db.internal:8080)/main?timeout=90s"
//!
//! # Preview the statement the driver would send
//! mdb interpolate "SELECT * FROM t WHERE name = ? AND age > ?" str:john int:21
//! ```

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDateTime, TimeZone};
use clap::{Parser, Subcommand};
use colored::*;
use mdb::config::duration::format_duration;
use mdb::config::{Profiles, parse_bool};
use mdb::prelude::*;
use mdb::protocol::{InterpolateOptions, ServerStatus};

#[derive(Parser)]
#[command(name = "mdb")]
#[command(version)]
#[command(about = "MDB driver toolbox: DSNs and client-side interpolation", long_about = None)]
#[command(after_help = r#"EXAMPLES:
    mdb dsn 'root@tcp(127.0.0.1)/main?interpolateParams=true'
    mdb format @local
    mdb interpolate 'SELECT ?, ?' int:1 'str:say "hi"' --no-backslash-escapes"#)]
struct Cli {
    /// DSN used when a command's DSN argument is omitted (`@name` selects a profile)
    #[arg(long, global = true, env = "MDB_DSN")]
    dsn: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a DSN and show the normalized configuration
    Dsn {
        /// DSN or `@profile`
        target: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a DSN and print its canonical form
    Format {
        /// DSN or `@profile`
        target: Option<String>,
    },
    /// Inline typed arguments into a statement
    ///
    /// Arguments are written as `type:value` with type one of
    /// int, uint, float, bool, str, time, json; `null` stands alone.
    Interpolate {
        statement: String,
        args: Vec<String>,
        /// Escape by doubling quotes instead of backslashes
        #[arg(long)]
        no_backslash_escapes: bool,
    },
    /// List saved DSN profiles
    Profiles,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("MDB_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let registry = Registry::new();
    match &cli.command {
        Commands::Dsn { target, json } => {
            let dsn = resolve_target(cli, target.as_deref())?;
            let config = parse_dsn(&dsn, &registry)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config_json(&config))?);
            } else {
                show_config(&config);
            }
        }
        Commands::Format { target } => {
            let dsn = resolve_target(cli, target.as_deref())?;
            let config = parse_dsn(&dsn, &registry)?;
            println!("{}", config.format_dsn());
        }
        Commands::Interpolate {
            statement,
            args,
            no_backslash_escapes,
        } => {
            let config = match cli.dsn.as_deref() {
                Some(dsn) => parse_dsn(&resolve_target(cli, Some(dsn))?, &registry)?,
                None => Config::default(),
            };
            let args = args
                .iter()
                .map(|a| parse_arg(a, &config))
                .collect::<Result<Vec<_>>>()?;
            if cli.verbose {
                println!("{} {}", "Input:".dimmed(), statement.yellow());
                for (i, arg) in args.iter().enumerate() {
                    println!("  {} {} ({})", format!("?{}", i + 1).dimmed(), cli_arg(arg), arg.kind());
                }
            }
            let status = ServerStatus {
                no_backslash_escapes: *no_backslash_escapes,
                ..ServerStatus::default()
            };
            let opts = InterpolateOptions::new(&config, status);
            let sql = interpolate(statement, &args, &opts)
                .map_err(|reason| anyhow!("cannot inline arguments: {}", reason))?;
            println!("{}", sql);
        }
        Commands::Profiles => show_profiles()?,
    }
    Ok(())
}

fn resolve_target(cli: &Cli, target: Option<&str>) -> Result<String> {
    let target = target
        .or(cli.dsn.as_deref())
        .ok_or_else(|| anyhow!("no DSN given; pass one or set MDB_DSN"))?;
    if !target.starts_with('@') {
        return Ok(target.to_string());
    }
    let profiles = Profiles::load_default()?;
    let dsn = profiles.resolve(target)?;
    if cli.verbose {
        eprintln!("{} {} -> {}", "Profile:".dimmed(), target.cyan(), dsn);
    }
    Ok(dsn)
}

fn parse_arg(raw: &str, config: &Config) -> Result<Arg> {
    if raw == "null" {
        return Ok(Arg::Null);
    }
    let (kind, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("argument '{}' is not of the form type:value", raw))?;
    let arg = match kind {
        "int" => Arg::Int(value.parse().with_context(|| format!("bad int '{}'", value))?),
        "uint" => Arg::UInt(value.parse().with_context(|| format!("bad uint '{}'", value))?),
        "float" => Arg::Float(value.parse().with_context(|| format!("bad float '{}'", value))?),
        "bool" => Arg::Bool(parse_bool(value).ok_or_else(|| anyhow!("bad bool '{}'", value))?),
        "str" => Arg::Text(value.to_string()),
        "time" => parse_time(value, config)?,
        "json" => serde_json::from_str::<serde_json::Value>(value)
            .with_context(|| format!("bad json '{}'", value))?
            .into(),
        other => bail!("unknown argument type '{}'", other),
    };
    Ok(arg)
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS[.f]` read in the DSN's `loc`.
fn parse_time(value: &str, config: &Config) -> Result<Arg> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.into());
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .with_context(|| format!("bad time '{}'", value))?;
    let local = config
        .loc
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| anyhow!("time '{}' is ambiguous in {}", value, config.loc))?;
    Ok(local.into())
}

fn cli_arg(arg: &Arg) -> String {
    format!("{:?}", arg).yellow().to_string()
}

fn show_config(config: &Config) {
    let timeout = |d: Option<std::time::Duration>| d.map(format_duration).unwrap_or_else(|| "-".into());
    let rows: Vec<(&str, String)> = vec![
        ("user", config.user.clone()),
        ("password", if config.password.is_empty() { String::new() } else { "******".into() }),
        ("net", config.net.clone()),
        ("addr", config.addr.clone()),
        ("dbname", config.db_name.clone()),
        ("loc", config.loc.to_string()),
        ("tls", config.tls_config.clone()),
        ("timeout", timeout(config.timeout)),
        ("readTimeout", timeout(config.read_timeout)),
        ("writeTimeout", timeout(config.write_timeout)),
        ("maxAllowedPacket", config.max_allowed_packet.to_string()),
        ("fetchSize", config.fetch_size.to_string()),
        ("maxRowCount", config.max_row_count.to_string()),
        ("interpolateParams", config.interpolate_params.to_string()),
        ("parseTime", config.parse_time.to_string()),
        ("checkConnLiveness", config.check_conn_liveness.to_string()),
        ("clientFoundRows", config.client_found_rows.to_string()),
        ("rejectReadOnly", config.reject_read_only.to_string()),
    ];

    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in rows {
        println!("{:width$}  {}", key.cyan(), value.white(), width = width);
    }
    if !config.params.is_empty() {
        println!("{}", "params".cyan());
        for (k, v) in &config.params {
            println!("  {} = {}", k, v.yellow());
        }
    }
    println!();
    println!("{} {}", "DSN:".green().bold(), masked_dsn(config));
}

/// Canonical DSN with the password replaced.
fn masked_dsn(config: &Config) -> String {
    if config.password.is_empty() {
        return config.format_dsn();
    }
    let mut masked = config.clone();
    masked.password = "******".to_string();
    masked.format_dsn()
}

fn config_json(config: &Config) -> serde_json::Value {
    let ms = |d: Option<std::time::Duration>| d.map(|d| d.as_millis() as u64);
    serde_json::json!({
        "user": config.user,
        "net": config.net,
        "addr": config.addr,
        "dbname": config.db_name,
        "loc": config.loc.to_string(),
        "tls": config.tls_config,
        "timeout_ms": ms(config.timeout),
        "read_timeout_ms": ms(config.read_timeout),
        "write_timeout_ms": ms(config.write_timeout),
        "max_allowed_packet": config.max_allowed_packet,
        "fetch_size": config.fetch_size,
        "max_row_count": config.max_row_count,
        "interpolate_params": config.interpolate_params,
        "parse_time": config.parse_time,
        "check_conn_liveness": config.check_conn_liveness,
        "client_found_rows": config.client_found_rows,
        "reject_read_only": config.reject_read_only,
        "params": config.params,
        "dsn": masked_dsn(config),
    })
}

fn show_profiles() -> Result<()> {
    let path = Profiles::default_path();
    let profiles = Profiles::load_default()?;
    if profiles.profiles.is_empty() {
        match path {
            Some(path) => println!("{} {}", "(no profiles)".dimmed(), path.display()),
            None => println!("{}", "(no profiles)".dimmed()),
        }
        return Ok(());
    }
    for (name, profile) in &profiles.profiles {
        print!("{} {}", format!("@{}", name).cyan().bold(), profile.dsn);
        if let Some(desc) = &profile.description {
            print!("  {}", desc.dimmed());
        }
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains(r#"'str:say "hi"'"#));

        let cli = Cli::try_parse_from(["mdb", "dsn", "/main", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Dsn { json: true, .. }));
    }

    #[test]
    fn test_password_masked_in_dsn_output() {
        let config = parse_dsn("app:secret@tcp(db.internal)/main", &Registry::new()).unwrap();
        assert_eq!(masked_dsn(&config), "app:******@tcp(db.internal:8080)/main");
        let json = config_json(&config).to_string();
        assert!(!json.contains("secret"));

        let config = parse_dsn("app@tcp(db.internal)/main", &Registry::new()).unwrap();
        assert_eq!(masked_dsn(&config), "app@tcp(db.internal:8080)/main");
    }

    #[test]
    fn test_parse_arg() {
        let config = Config::default();
        assert_eq!(parse_arg("int:21", &config).unwrap(), Arg::Int(21));
        assert_eq!(parse_arg("null", &config).unwrap(), Arg::Null);
        assert_eq!(parse_arg("bool:true", &config).unwrap(), Arg::Bool(true));
        assert!(parse_arg("nope", &config).is_err());
        assert!(parse_arg("int:x", &config).is_err());
    }
}
