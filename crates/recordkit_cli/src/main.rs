//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `recordkit_core` linkage and compile one sample query per dialect.
//! - Start file logging from the backend config, the way an embedding host would.
//!
//! Usage: `recordkit_cli [config.json] [log_dir]`

use recordkit_core::{compile, BackendConfig, DialectKind, Expr, Query, Statement};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("recordkit_core ping={}", recordkit_core::ping());
    println!("recordkit_core version={}", recordkit_core::core_version());

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => match BackendConfig::from_path(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("config error={err}");
                return ExitCode::FAILURE;
            }
        },
        None => BackendConfig::default(),
    };
    let log_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("recordkit-logs"));
    match config.init_logging(&log_dir) {
        Ok(()) => println!(
            "logging level={} dir={}",
            config.log_level,
            log_dir.display()
        ),
        Err(err) => eprintln!("logging disabled error={err}"),
    }

    let sample: Statement = Query::select_all()
        .from_table("users")
        .filter(Expr::col("age").gt_eq(18).and(Expr::col("status").eq("active")))
        .limit(10)
        .into();

    for kind in [
        DialectKind::Standard,
        DialectKind::Sqlite,
        DialectKind::Postgres,
        DialectKind::Mysql,
    ] {
        let dialect = kind.dialect();
        match compile(&sample, dialect.as_ref()) {
            Ok(compiled) => println!(
                "{} sql={} params={}",
                kind.as_str(),
                compiled.sql,
                compiled.params.len()
            ),
            Err(err) => println!("{} error={err}", kind.as_str()),
        }
    }
    ExitCode::SUCCESS
}
