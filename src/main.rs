use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

use geekdaily::bookmarks::{BookmarkSlot, BookmarkStore, PersistenceError};
use geekdaily::config::Config;
use geekdaily::feed::{fetch_pages, fetch_with_retry, Article, FeedClient, RetryPolicy, SortOrder};
use geekdaily::resolver::{self, Resolution};
use geekdaily::share::{self, ExportFormat, ShareData, ShareTarget};
use geekdaily::storage::{Database, DatabaseError};
use geekdaily::util::{highlight, strip_control_chars, truncate_to_width};
use geekdaily::view::{SearchQuery, ViewEngine, ViewStatus};

// Column budgets for the fields of one article line
const EPISODE_WIDTH: usize = 16;
const TITLE_WIDTH: usize = 56;
const AUTHOR_WIDTH: usize = 16;
const SUMMARY_WIDTH: usize = 88;

const EMPHASIS_ON: &str = "\x1b[1m";
const EMPHASIS_OFF: &str = "\x1b[22m";

#[derive(Parser, Debug)]
#[command(name = "geekdaily", about = "Browse, search and bookmark Geek Daily articles")]
struct Args {
    /// Config file (defaults to ~/.config/geekdaily/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List one page of articles
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Sort by id: asc or desc
        #[arg(long, default_value_t = SortOrder::Desc)]
        sort: SortOrder,

        /// Filter the loaded page by title, author, summary or episode
        #[arg(long)]
        search: Option<String>,

        /// Fetch every page inside the configured scan window
        #[arg(long)]
        all_pages: bool,

        /// Also print the publication date and summary of each article
        #[arg(long)]
        long: bool,
    },

    /// Show or change bookmarks
    Bookmarks {
        #[command(subcommand)]
        action: Option<BookmarkAction>,
    },

    /// Print a share link for one article
    Share {
        id: i64,

        /// wechat, weibo, qq, twitter, linkedin or facebook
        #[arg(long)]
        target: ShareTarget,
    },
}

#[derive(Subcommand, Debug)]
enum BookmarkAction {
    /// Resolve and print bookmarked articles (default)
    List,
    Add {
        id: i64,
    },
    Remove {
        id: i64,
    },
    /// Add if absent, remove if present
    Toggle {
        id: i64,
    },
    Clear,
    /// Export bookmarked articles for sharing
    Export {
        #[arg(long, default_value = "text")]
        format: ExportFormat,

        /// Print a one-line teaser instead of the full list
        #[arg(long)]
        summary: bool,

        /// Link appended to the teaser (defaults to the API origin)
        #[arg(long, value_name = "URL")]
        site_url: Option<String>,
    },
}

/// Everything a command needs, wired once at startup.
struct App {
    config: Config,
    client: FeedClient,
    bookmarks: BookmarkStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = Config::dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // User-only access for the bookmark database
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env_overrides();

    let base_url = config.api_base_url()?;
    let http = reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;
    let client = FeedClient::new(http, base_url)
        .with_timeout(config.request_timeout())
        .with_cache(config.cache_ttl(), config.cache_capacity);

    let db_path = config_dir.join("geekdaily.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The bookmark database is locked by another geekdaily process.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };
    let bookmarks = BookmarkStore::load(BookmarkSlot::new(db)).await;

    let ctx = App {
        config,
        client,
        bookmarks,
    };

    match args.command {
        Command::List {
            page,
            sort,
            search,
            all_pages,
            long,
        } => {
            let query = search.unwrap_or_default();
            if all_pages {
                list_window(&ctx, sort, &query, long).await
            } else {
                list_page(&ctx, page, sort, &query, long).await
            }
        }
        Command::Bookmarks { action } => {
            run_bookmarks(&ctx, action.unwrap_or(BookmarkAction::List)).await
        }
        Command::Share { id, target } => run_share(&ctx, id, target).await,
    }
}

// ============================================================================
// list
// ============================================================================

async fn list_page(ctx: &App, page: u32, sort: SortOrder, query: &str, long: bool) -> Result<()> {
    let mut engine = ViewEngine::new(ctx.config.page_size)
        .with_sort(sort)
        .with_query(query)
        .with_page(page);

    if let Some(ticket) = engine.initial_ticket() {
        let key = ticket.key;
        let result =
            fetch_with_retry(&ctx.client, key.page, key.page_size, key.sort, RetryPolicy::default())
                .await;
        engine.apply(ticket, result);
    }

    if let ViewStatus::Failed(notice) = engine.status() {
        anyhow::bail!(
            "Failed to load articles: {}. Run the command again to retry.",
            notice.message
        );
    }

    let state = engine.display();
    print_articles(ctx, &state.items, query, long).await;

    match SearchQuery::parse(query) {
        Some(_) => println!(
            "\n{} of {} articles on this page match; page {}/{}",
            state.filtered_count,
            engine.envelope().map_or(0, |e| e.data.len()),
            engine.page(),
            state.total_pages.max(1)
        ),
        None => println!(
            "\npage {}/{} ({} articles, sorted {})",
            engine.page(),
            state.total_pages,
            state.total,
            engine.sort()
        ),
    }
    Ok(())
}

async fn list_window(ctx: &App, sort: SortOrder, query: &str, long: bool) -> Result<()> {
    let window = ctx.config.scan_window();

    match SearchQuery::parse(query) {
        Some(parsed) => {
            let result = resolver::search_window(&ctx.client, &parsed, window, sort).await;
            print_articles(ctx, &result.items, query, long).await;
            println!(
                "\n{} matches across {}/{} pages",
                result.items.len(),
                result.pages_scanned,
                window.max_pages
            );
        }
        None => {
            let articles = fetch_pages(&ctx.client, window.page_size, sort, Some(window.max_pages))
                .await
                .context("Failed to fetch articles")?;
            print_articles(ctx, &articles, query, long).await;
            println!("\n{} articles", articles.len());
        }
    }
    Ok(())
}

async fn print_articles(ctx: &App, items: &[Article], query: &str, long: bool) {
    let emphasize = std::io::stdout().is_terminal();
    for article in items {
        let bookmarked = ctx.bookmarks.is_bookmarked(article.id).await;
        for line in format_article(article, bookmarked, query, emphasize, long) {
            println!("{}", line);
        }
    }
}

/// Render one article as terminal lines. Matches are emphasized per field,
/// never in the id column.
fn format_article(
    article: &Article,
    bookmarked: bool,
    query: &str,
    emphasize: bool,
    long: bool,
) -> Vec<String> {
    let marker = if bookmarked { '*' } else { ' ' };
    let mut lines = vec![format!(
        "{} {:>5}  {}  {} - {}",
        marker,
        article.id,
        field(&article.episode, EPISODE_WIDTH, query, emphasize),
        field(&article.title, TITLE_WIDTH, query, emphasize),
        field(&article.author, AUTHOR_WIDTH, query, emphasize),
    )];

    if long {
        let date = article.published_at().map_or_else(
            || field(&article.time, EPISODE_WIDTH, "", false),
            |t| t.format("%Y-%m-%d").to_string(),
        );
        let summary = field(&article.introduce, SUMMARY_WIDTH, query, emphasize);
        lines.push(format!("         {}  {}", date, summary).trim_end().to_string());
    }
    lines
}

/// Sanitize, flatten to one line, truncate, then emphasize matches.
fn field(text: &str, width: usize, query: &str, emphasize: bool) -> String {
    let flat = strip_control_chars(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let cut = truncate_to_width(&flat, width);
    if emphasize {
        highlight(&cut, query, EMPHASIS_ON, EMPHASIS_OFF).into_owned()
    } else {
        cut.into_owned()
    }
}

// ============================================================================
// bookmarks
// ============================================================================

async fn run_bookmarks(ctx: &App, action: BookmarkAction) -> Result<()> {
    match action {
        BookmarkAction::List => {
            let resolution = resolve_bookmarks(ctx).await;
            print_articles(ctx, &resolution.items, "", false).await;
            println!(
                "\n{}/{} bookmarks resolved",
                resolution.resolved(),
                resolution.requested
            );
            if resolution.is_partial() {
                let missing: Vec<String> =
                    resolution.missing.iter().map(|id| id.to_string()).collect();
                println!("Not found in recent pages: {}", missing.join(", "));
            }
        }
        BookmarkAction::Add { id } => {
            let changed = saved(ctx.bookmarks.add(id).await)?;
            println!("{}", if changed { "Bookmarked" } else { "Already bookmarked" });
        }
        BookmarkAction::Remove { id } => {
            let changed = saved(ctx.bookmarks.remove(id).await)?;
            println!("{}", if changed { "Removed" } else { "Not bookmarked" });
        }
        BookmarkAction::Toggle { id } => {
            let now = saved(ctx.bookmarks.toggle(id).await)?;
            println!("{}", if now { "Bookmarked" } else { "Removed" });
        }
        BookmarkAction::Clear => {
            let count = ctx.bookmarks.len().await;
            saved(ctx.bookmarks.clear().await)?;
            println!("Cleared {} bookmarks", count);
        }
        BookmarkAction::Export {
            format,
            summary,
            site_url,
        } => {
            let resolution = resolve_bookmarks(ctx).await;
            if resolution.items.is_empty() {
                anyhow::bail!("No bookmarked articles to export");
            }
            if summary {
                let site =
                    site_url.unwrap_or_else(|| ctx.client.base_url().origin().ascii_serialization());
                println!("{}", share::summary(&resolution.items, &site));
            } else {
                println!("{}", share::export(&resolution.items, format));
            }
        }
    }
    Ok(())
}

async fn resolve_bookmarks(ctx: &App) -> Resolution {
    let snapshot = ctx.bookmarks.snapshot().await;
    resolver::resolve(&ctx.client, &snapshot, ctx.config.scan_window()).await
}

/// The store keeps the change in memory when the write fails, but a CLI
/// process ends right after, so the failure is reported.
fn saved<T>(result: Result<T, PersistenceError>) -> Result<T> {
    result.context("Bookmark change was not saved")
}

// ============================================================================
// share
// ============================================================================

async fn run_share(ctx: &App, id: i64, target: ShareTarget) -> Result<()> {
    let wanted = geekdaily::bookmarks::BookmarkSet::from_ids([id]);
    let resolution = resolver::resolve(&ctx.client, &wanted, ctx.config.scan_window()).await;
    let article = resolution
        .items
        .first()
        .ok_or_else(|| anyhow::anyhow!("Article {} not found in recent pages", id))?;

    let url = target
        .build(&ShareData::from(article))
        .with_context(|| format!("Failed to build {} share link", target))?;
    println!("{}", url);
    Ok(())
}
