mod cli;

use std::error::Error;

use chrono::Utc;
use clap::Parser;
use log::info;

use cli::{Args, Command};
use hichat_client::api::events::EventKind;
use hichat_client::api::models::{BulkStatus, Conversation, ReviewStatus};
use hichat_client::sync::filter::{group_meetings_by_date, review_summary, upcoming_meetings};
use hichat_client::sync::{BulkMessageFilter, ConversationFilter, SyncedCollection};
use hichat_client::{ApiClient, ApiResultExt, ConversationCache, Settings, Transport, widget};

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let settings = args.settings();

    info!("--- Hi Chat ---");
    info!("API Base: {}", settings.api_base());
    info!("Socket Server: {}", settings.socket_base());
    info!("Token: {}", if settings.token.is_some() { "set" } else { "none" });
    info!("Reconnect: {}", settings.reconnect.enabled);
    info!("---------------");

    let api = ApiClient::from_settings(&settings)?;
    match args.command.clone() {
        Command::Conversations { status, search, unread, pages } => {
            let filter = ConversationFilter { search, status, unread_only: unread };
            conversations(&api, &filter, pages, !args.no_cache).await?
        }
        Command::Watch { rooms } => watch(&settings, &rooms).await?,
        Command::Campaigns { status } => campaigns(&api, status).await?,
        Command::Meetings { upcoming } => meetings(&api, upcoming).await?,
        Command::Reviews { status } => reviews(&api, status).await?,
        Command::Calls { page } => calls(&api, page).await?,
        Command::WidgetUrl { id } => {
            let app_url = settings
                .app_url
                .as_deref()
                .ok_or("no app_url configured (set HICHAT_APP_URL)")?;
            println!("{}", widget::embed_url(app_url, &id)?);
            println!("{}", widget::iframe_snippet(app_url, &id)?);
        }
        Command::Config { save } => {
            print!("{}", toml::to_string_pretty(&settings)?);
            if save {
                match &args.config {
                    Some(path) => settings.save_to(path)?,
                    None => settings.save()?,
                }
                info!("settings saved");
            }
        }
    }
    Ok(())
}

fn print_conversation(c: &Conversation) {
    println!(
        "{}{:<24} {:<10} {:<10} {}",
        if c.unread { "* " } else { "  " },
        c.display_name(),
        c.status.as_deref().unwrap_or("-"),
        format!("{:?}", c.platform).to_lowercase(),
        c.last_message.as_deref().unwrap_or("")
    );
}

async fn conversations(
    api: &ApiClient,
    filter: &ConversationFilter,
    pages: u32,
    use_cache: bool,
) -> Result<(), BoxError> {
    let mut cache = if use_cache {
        ConversationCache::open_default().map(Some).or_fallback("conversation cache", None)
    } else {
        None
    };
    if let Some(cache) = &cache {
        let cached = cache.recent(20).or_fallback("cached conversations", Vec::new());
        if !cached.is_empty() {
            info!("{} cached conversations", cached.len());
        }
    }

    let mut list: SyncedCollection<Conversation> = SyncedCollection::new();
    list.load_page(api.conversations(1, hichat_client::ui::inbox::PAGE_SIZE).await?);
    while list.has_more() && list.page() < pages.max(1) {
        let next = list.page() + 1;
        list.append_page(api.conversations(next, hichat_client::ui::inbox::PAGE_SIZE).await?);
    }

    if let Some(cache) = cache.as_mut() {
        cache.upsert(list.items()).or_fallback("cache update", 0);
    }

    let visible = list.view(|c| filter.matches(c));
    for c in &visible {
        print_conversation(c);
    }
    info!("{} of {} conversations shown", visible.len(), list.len());
    Ok(())
}

async fn watch(settings: &Settings, rooms: &[String]) -> Result<(), BoxError> {
    let transport = Transport::from_settings(settings);
    let socket = transport.initialize(settings.token.as_deref())?;
    let _subscriptions: Vec<_> = EventKind::ALL
        .into_iter()
        .map(|kind| socket.subscribe(kind, |ev| info!("{:?}", ev)))
        .collect();

    socket.connect();
    for room in rooms {
        socket.join_conversation(room);
    }

    let mut state = socket.watch_state();
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("connection: {:?}", *state.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }
    transport.shutdown();
    Ok(())
}

async fn campaigns(api: &ApiClient, status: Option<BulkStatus>) -> Result<(), BoxError> {
    let mut list = SyncedCollection::new();
    list.load_page(api.bulk_messages(1, hichat_client::ui::campaigns::PAGE_SIZE, status).await?);
    let filter = BulkMessageFilter { status, ..Default::default() };
    for b in list.view(|b| filter.matches(b)) {
        println!(
            "{:<28} {:<12} {:>3}% ({}/{} sent, {} failed)",
            b.title,
            b.status.as_str(),
            b.progress(),
            b.sent_count,
            b.total_count,
            b.failed_count
        );
    }
    let stats = api.bulk_message_stats().await.or_fallback("campaign stats", Default::default());
    info!(
        "total {} completed {} pending {} scheduled {} failed {}",
        stats.total, stats.completed, stats.pending, stats.scheduled, stats.failed
    );
    Ok(())
}

async fn meetings(api: &ApiClient, upcoming: bool) -> Result<(), BoxError> {
    let all = api.meetings().await?;
    let shown = if upcoming {
        upcoming_meetings(&all, Utc::now())
    } else {
        all.iter().collect()
    };
    for (day, meetings) in group_meetings_by_date(shown) {
        println!("{}", day.format("%A, %B %-d %Y"));
        for m in meetings {
            println!(
                "  {}-{}  {:<32} {:?}",
                m.start.format("%H:%M"),
                m.end().format("%H:%M"),
                m.title,
                m.status
            );
        }
    }
    Ok(())
}

async fn reviews(api: &ApiClient, status: Option<ReviewStatus>) -> Result<(), BoxError> {
    let all = api.reviews(status).await?;
    for r in &all {
        println!(
            "{} {:<20} {:<10} {}",
            "*".repeat(r.rating.min(5) as usize),
            r.reviewer_name,
            r.platform,
            r.text
        );
    }
    let summary = review_summary(&all);
    info!(
        "{} reviews, average {:.1}, {} awaiting reply",
        summary.count, summary.average, summary.awaiting_reply
    );
    Ok(())
}

async fn calls(api: &ApiClient, page: u32) -> Result<(), BoxError> {
    let history = api.call_history(page, 20).await?;
    for c in &history.items {
        println!(
            "{:<20} {:?} {} -> {} {:?} {}s",
            c.started_at.map(|t| t.format("%F %H:%M").to_string()).unwrap_or_default(),
            c.direction,
            c.from,
            c.to,
            c.status,
            c.duration_secs
        );
    }
    if let Some(total) = history.total_pages {
        info!("page {} of {}", history.page, total);
    }
    Ok(())
}
