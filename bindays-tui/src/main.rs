//! Terminal client for bindays: resolves a postcode to its council, lists the
//! addresses it serves and shows upcoming bin collections.
//!
//! This binary is the trusted side of the relay. Every HTTP request a collector
//! asks for is executed here and its response fed back until a result arrives.

mod app;
mod input;
mod relay;
mod ui;

use std::{
    fs::File,
    io,
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use anyhow::{Context, Result};
use bindays_core::{BinDaysService, CollectorRegistry, RelayConfig};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::input::Action;
use crate::relay::{Relay, ReqwestExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RelayConfig::from_vars(std::env::vars())?;
    init_tracing(&config)?;

    // HTTP + service setup
    let collectors = vec![
        bindays_collector_encrypted::plugin(),
        bindays_collector_formrelay::plugin(),
        bindays_collector_json::plugin(),
        bindays_collector_portal::plugin(),
    ];
    let registry = Arc::new(CollectorRegistry::new(collectors));
    tracing::info!(collectors = registry.len(), "registry ready");

    let service = Arc::new(BinDaysService::new(registry));
    let relay = Relay::new(service, ReqwestExecutor::new(&config)?, config.max_steps);

    let app = App::new(relay);

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

/// Log to a file when one is configured; the terminal belongs to the UI.
fn init_tracing(config: &RelayConfig) -> Result<()> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };

    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid log filter {:?}", config.log_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Poll for input (non-blocking, small timeout to keep CPU low)
        if event::poll(StdDuration::from_millis(100))?
            && let CEvent::Key(key) = event::read()?
        {
            match input::handle_key_event(key, &mut app) {
                Action::Quit => break,
                Action::None => {}
                Action::LookupPostcode => {
                    let postcode = app.postcode_input.trim().to_owned();
                    if postcode.is_empty() {
                        app.error_message = Some("Type a postcode, then press Enter".into());
                        continue;
                    }

                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let res = lookup_postcode(&app.relay, &postcode).await;

                    app.is_loading = false;
                    match res {
                        Ok((collector, addresses)) => app.show_addresses(collector, addresses),
                        Err(err) => {
                            tracing::warn!(%postcode, error = %err, "postcode lookup failed");
                            app.error_message = Some(format!("Lookup failed: {err}"));
                        }
                    }
                }
                Action::LoadBinDays => {
                    let Some(collector) = app.collector.clone() else {
                        app.error_message = Some("Look up a postcode first".into());
                        continue;
                    };
                    let Some(address) = app.select_current_address() else {
                        app.error_message = Some("No address selected".into());
                        continue;
                    };

                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let res = app.relay.bin_days(&collector.id, &address).await;

                    app.is_loading = false;
                    match res {
                        Ok(bin_days) => app.bin_days = bin_days,
                        Err(err) => {
                            app.bin_days.clear();
                            app.error_message = Some(format!("Failed to load bin days: {err}"));
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

async fn lookup_postcode(
    relay: &Relay<ReqwestExecutor>,
    postcode: &str,
) -> Result<(bindays_core::CollectorMeta, Vec<bindays_core::Address>)> {
    let collector = relay.collector(postcode).await?;
    let addresses = relay.addresses(&collector.id, postcode).await?;
    Ok((collector, addresses))
}
