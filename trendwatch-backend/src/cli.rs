use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use trendwatch_common::{Language, LanguageError, Period, RankedItem};

use crate::config::TrendwatchConfig;
use crate::extract::ExtractOptions;
use crate::refresh::Refresher;
use crate::scheduler::{RefreshScheduler, SchedulerConfig};
use crate::source::TrendingClient;
use crate::store::SnapshotStore;
use crate::web;

const DESCRIPTION_WIDTH: usize = 70;

#[derive(Parser, Debug)]
#[command(name = "trendwatch", about = "Track trending repositories per language", version)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "trendwatch.toml")]
    pub config: PathBuf,

    /// Override the database location from the configuration
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start following languages
    Follow {
        #[arg(required = true, value_parser = parse_language)]
        langs: Vec<&'static Language>,
    },
    /// Stop following languages
    Unfollow {
        #[arg(required = true, value_parser = parse_language)]
        langs: Vec<&'static Language>,
    },
    /// List followed languages
    Follows,
    /// Scrape every followed language once
    Refresh,
    /// Print the latest snapshot of a language
    Latest {
        #[arg(value_parser = parse_language)]
        lang: &'static Language,
        #[arg(long, default_value = "daily")]
        period: Period,
    },
    /// List snapshot timestamps of a language
    History {
        #[arg(value_parser = parse_language)]
        lang: &'static Language,
    },
    /// Serve the JSON API
    Serve,
    /// Serve the JSON API and refresh in the background
    ServeAndRefresh,
}

impl Command {
    /// Most verbose console log level for this command. One-shot commands
    /// only let warnings reach the terminal.
    pub fn console_floor(&self) -> LevelFilter {
        match self {
            Command::Serve | Command::ServeAndRefresh => LevelFilter::TRACE,
            _ => LevelFilter::WARN,
        }
    }
}

fn parse_language(s: &str) -> Result<&'static Language, LanguageError> {
    Language::parse(&s.to_lowercase())
}

/// Execute `cli.command` against the store configured in `config`.
pub async fn run(cli: Cli, config: TrendwatchConfig) -> anyhow::Result<()> {
    let db_path = cli.db.unwrap_or_else(|| config.db_path.clone());
    let store = Arc::new(
        SnapshotStore::open(&db_path).with_context(|| format!("Failed to open database {:?}", db_path))?,
    );

    match cli.command {
        Command::Follow { langs } => {
            for lang in langs {
                store.follow(lang)?;
            }
        }
        Command::Unfollow { langs } => {
            for lang in langs {
                store.unfollow(lang)?;
            }
        }
        Command::Follows => {
            for lang in store.follows()? {
                println!("{}", lang.store_key);
            }
        }
        Command::Refresh => {
            let report = build_refresher(store, &config)?.refresh().await?;
            for snapshot in report.committed {
                println!("{} {}", snapshot.language, snapshot.taken_at.to_rfc3339());
            }
        }
        Command::Latest { lang, period } => match store.latest(lang, period) {
            Ok((items, taken_at)) => {
                println!("{} {} scraped at {}", lang, period, taken_at.to_rfc3339());
                print!("{}", format_table(&items));
            }
            Err(e) if e.is_absence() => println!("{}", e),
            Err(e) => return Err(e.into()),
        },
        Command::History { lang } => {
            for taken_at in store.scrape_history(lang)? {
                println!("{}", taken_at.to_rfc3339());
            }
        }
        Command::Serve => {
            web::serve(store, &config.server_address()).await?;
        }
        Command::ServeAndRefresh => {
            let refresher = Arc::new(build_refresher(store.clone(), &config)?);
            let mut scheduler = RefreshScheduler::new(
                SchedulerConfig {
                    interval: config.refresh_interval(),
                    timeout: config.refresh_timeout(),
                    initial_refresh: config.initial_refresh,
                },
                refresher,
            );
            scheduler.start();

            let served = web::serve(store, &config.server_address()).await;
            scheduler.shutdown().await;
            served?;
        }
    }
    Ok(())
}

fn build_refresher(store: Arc<SnapshotStore>, config: &TrendwatchConfig) -> anyhow::Result<Refresher> {
    let client = TrendingClient::new(&config.base_url, config.http_timeout(), &config.user_agent)?;
    Ok(Refresher::new(
        store,
        Arc::new(client),
        ExtractOptions { require_stars: config.require_stars },
    ))
}

/// One line per item: rank, stars, star delta, forks, language, repo and a
/// truncated description.
pub fn format_table(items: &[RankedItem]) -> String {
    let mut out = String::new();
    for (rank, item) in items.iter().enumerate() {
        let description = if item.description.chars().count() > DESCRIPTION_WIDTH {
            let cut: String = item.description.chars().take(DESCRIPTION_WIDTH).collect();
            format!("{cut}...")
        } else {
            item.description.clone()
        };
        out.push_str(&format!(
            "{:2}: {:7} : {:5} : {:7} : {:<10} : {:<50} : {}\n",
            rank,
            item.stars,
            item.stars_increase,
            item.forks,
            item.language,
            item.full_name(),
            description
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_follow_validates_languages() {
        let cli = Cli::try_parse_from(["trendwatch", "follow", "go", "Rust"]).unwrap();
        match cli.command {
            Command::Follow { langs } => assert_eq!(langs, vec![&Language::GO, &Language::RUST]),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["trendwatch", "follow", "go", "cobol"]).is_err());
        assert!(Cli::try_parse_from(["trendwatch", "follow"]).is_err());
    }

    #[test]
    fn test_latest_period_option() {
        let cli = Cli::try_parse_from(["trendwatch", "--db", "x.redb", "latest", "cpp", "--period", "monthly"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("x.redb")));
        match cli.command {
            Command::Latest { lang, period } => {
                assert_eq!(lang, &Language::CPP);
                assert_eq!(period, Period::Monthly);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["trendwatch", "latest", "go", "--period", "yearly"]).is_err());
    }

    #[test]
    fn test_one_shot_commands_keep_console_quiet() {
        let follows = Cli::try_parse_from(["trendwatch", "follows"]).unwrap();
        assert_eq!(follows.command.console_floor(), LevelFilter::WARN);
        let history = Cli::try_parse_from(["trendwatch", "history", "go"]).unwrap();
        assert_eq!(history.command.console_floor(), LevelFilter::WARN);
        let serve = Cli::try_parse_from(["trendwatch", "serve"]).unwrap();
        assert_eq!(serve.command.console_floor(), LevelFilter::TRACE);
    }

    #[test]
    fn test_format_table_truncates_description() {
        let item = RankedItem {
            repo_owner: "owner".to_string(),
            repo_name: "repo".to_string(),
            description: "x".repeat(80),
            language: "Rust".to_string(),
            forks: 12,
            stars: 3456,
            stars_increase: 78,
        };
        let table = format_table(&[item]);
        assert!(table.starts_with(" 0:    3456 :    78 :      12 : Rust       : owner/repo"));
        assert!(table.trim_end().ends_with(&format!("{}...", "x".repeat(70))));
    }
}
