//! Terminal seat booking client.
//!
//! Reads commands from stdin, renders the booking screen to stdout and logs to stderr.

use seatbook::api::{BookingApi, HttpBookingApi};
use seatbook::push::SeatFeed;
use seatbook::view::render;
use seatbook::{BookingAction, BookingEnvironment, BookingReducer, BookingState, Config, SeatId};
use seatbook_core::environment::Clock;
use seatbook_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BookingStore = Store<BookingState, BookingAction, BookingEnvironment, BookingReducer>;

const HELP: &str = "\
commands:
  seats               reload the seat map
  toggle <id>         select or deselect a seat
  name <name>         set your name
  email <email>       set your email
  submit              continue to payment
  confirm             pay for the reservation
  cancel [reason]     cancel the payment
  restart             abandon the session
  ok                  dismiss the notice
  help                show this help
  quit                exit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(BookingAction),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let action = match word {
        "seats" => BookingAction::LoadSeats,
        "toggle" => {
            let id: u32 = rest
                .parse()
                .map_err(|_| format!("not a seat number: {rest:?}"))?;
            BookingAction::ToggleSeat {
                seat_id: SeatId::new(id),
            }
        },
        "name" => BookingAction::SetName {
            name: rest.to_string(),
        },
        "email" => BookingAction::SetEmail {
            email: rest.to_string(),
        },
        "submit" => BookingAction::Submit,
        "confirm" => BookingAction::Confirm,
        "cancel" if rest.is_empty() => BookingAction::cancel(),
        "cancel" => BookingAction::Cancel {
            reason: rest.to_string(),
        },
        "restart" => BookingAction::Restart,
        "ok" => BookingAction::DismissNotice,
        "help" | "" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Command::Send(action))
}

/// Redraw after every applied action
async fn render_loop(store: BookingStore, clock: Arc<dyn Clock>, ttl: Duration) {
    let mut actions = store.subscribe_actions();
    loop {
        match actions.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {
                let view = store.state(|state| render(state, clock.now(), ttl)).await;
                println!("\n{view}");
            },
            Err(RecvError::Closed) => return,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seatbook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting seat booking client");

    let config = Config::from_env();
    config.validate()?;
    info!(
        booking_url = %config.api.booking_url,
        payments_url = %config.api.payments_url,
        reservation_ttl_secs = config.session.reservation_ttl.as_secs(),
        poll_attempts = config.session.poll.max_attempts,
        "Configuration loaded"
    );

    let api: Arc<dyn BookingApi> = Arc::new(HttpBookingApi::new(&config.api));
    match api.health().await {
        Ok(health) => info!(%health, "Booking backend reachable"),
        Err(e) => warn!(error = %e, "Booking backend health check failed"),
    }

    let environment = BookingEnvironment::new(Arc::clone(&api), config.session);
    let clock = Arc::clone(&environment.clock);
    let store: BookingStore = Store::new(BookingState::new(), BookingReducer::new(), environment);

    let renderer = tokio::spawn(render_loop(
        store.clone(),
        clock,
        config.session.reservation_ttl,
    ));

    let feed_store = store.clone();
    let feed = tokio::spawn(SeatFeed::new(Arc::clone(&api)).run(move |seats| {
        let store = feed_store.clone();
        async move {
            store
                .send(BookingAction::SeatsReplaced { seats })
                .await
                .is_ok()
        }
    }));

    store.send(BookingAction::LoadSeats).await?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Command::Send(action)) => {
                        store.send(action).await?;
                    },
                    Ok(Command::Help) => println!("{HELP}"),
                    Ok(Command::Quit) => break,
                    Err(message) => println!("{message}"),
                }
            },
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C");
                break;
            },
        }
    }

    info!("Shutting down");
    feed.abort();
    if let Err(e) = store.shutdown(config.shutdown_timeout).await {
        error!(error = %e, "Shutdown did not complete cleanly");
    }
    renderer.abort();

    Ok(())
}
