//! StepSummit - Stair-Climbing Summit Challenge
//!
//! Command-line entry point. Scans arrive as arguments from whatever
//! delivers them (badge reader, QR relay, shell); everything else is
//! inspection and administration of the shared climb.

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stepsummit::admin::ResetRequest;
use stepsummit::config::{load_config, AppConfig};
use stepsummit::remote::{MemoryRemoteStore, RemoteStore, RestRemoteStore};
use stepsummit::route;
use stepsummit::session::ClimbSession;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting StepSummit v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let admin = args.iter().any(|a| a == "--admin");
    args.retain(|a| a != "--admin");

    if args.is_empty() {
        print_usage(admin);
        return Ok(());
    }

    if config.remote.base_url.is_empty() {
        tracing::warn!("No remote endpoint configured, running offline");
        let store = MemoryRemoteStore::new();
        run(config, store, admin, args).await
    } else {
        let store = RestRemoteStore::new(&config.remote);
        run(config, store, admin, args).await
    }
}

async fn run<S>(config: AppConfig, store: S, admin: bool, args: Vec<String>) -> Result<()>
where
    S: RemoteStore + Clone + Send + Sync + 'static,
{
    let roster_limit = config.roster.ranking_limit;
    let max_display = config.roster.max_display;

    let mut session =
        ClimbSession::new(config, store).context("Failed to open the local ledger")?;
    if admin {
        session = session.with_admin_access();
    }

    match args[0].as_str() {
        "scan" => {
            let location = args.get(1).context("Usage: scan <checkpoint-id> <steps>")?;
            let steps: u64 = args
                .get(2)
                .context("Usage: scan <checkpoint-id> <steps>")?
                .parse()
                .context("Steps must be a positive integer")?;

            // The shared view is best-effort; scanning works offline.
            if let Err(e) = session.connect().await {
                tracing::warn!("Remote unavailable: {}", e);
            }

            match session.process_scan(location, steps).await {
                Ok(accepted) => {
                    println!(
                        "Climbed {} steps! Total {} steps, {:.1} m — {}",
                        accepted.gained_steps,
                        accepted.total_steps,
                        accepted.elevation_m,
                        accepted.transition.station.name
                    );
                    if accepted.transition.is_new {
                        println!(
                            "You reached {}. Congratulations!",
                            accepted.transition.station.name
                        );
                    }
                }
                Err(e) => println!("Scan not counted: {}", e),
            }

            session.shutdown().await;
        }

        "status" => {
            let progress = session.progress();
            println!("Total steps: {}", progress.total_steps);
            println!("Elevation:   {:.1} m", progress.elevation_m);
            println!("Remaining:   {:.1} m", progress.remaining_m);
            println!("Station:     {}", progress.station_name);
            if let Some(name) = &session.ledger().participant_name {
                println!("Climbing as: {}", name);
            } else {
                println!("Not registered; progress stays on this device");
            }
        }

        "history" => {
            let history = &session.ledger().history;
            if history.is_empty() {
                println!("No climbs recorded yet");
            }
            for entry in history.iter().take(10) {
                println!(
                    "{}  {:>16}  +{} steps",
                    entry.occurred_at_ms, entry.location_id, entry.gained_steps
                );
            }
        }

        "register" => {
            let name = args.get(1).context("Usage: register <name>")?;
            if let Err(e) = session.connect().await {
                tracing::warn!("Remote unavailable: {}", e);
            }
            session
                .register(name)
                .await
                .with_context(|| format!("Could not register as '{}'", name))?;
            println!("Welcome, {}!", name);
            session.shutdown().await;
        }

        "roster" => {
            if let Err(e) = session.connect().await {
                tracing::warn!("Remote unavailable: {}", e);
            }
            let ranked = session
                .roster()
                .top_ranked(roster_limit)
                .await
                .context("Failed to load the roster")?;

            if ranked.is_empty() {
                println!("No climbers yet");
            }
            for entry in &ranked {
                let marker = if entry.is_self { "*" } else { " " };
                let elevation = route::elevation_m(entry.record.total_steps);
                println!(
                    "{:>3}.{} {:<24} {:>8.1} m",
                    entry.rank, marker, entry.record.name, elevation
                );
            }

            let visible = session.roster().visualizer_set(max_display);
            tracing::debug!("Visualizer would show {} climbers", visible.len());
            session.shutdown().await;
        }

        "reset" => {
            if !confirm("Really reset your local climb data?")? {
                println!("Reset cancelled");
                return Ok(());
            }
            session.reset_local().context("Failed to reset the ledger")?;
            println!("Local climb data reset");
        }

        "grant" if admin => {
            let ops = session.admin().context("Admin surface missing")?;
            let name = args.get(1).context("Usage: --admin grant <name> <steps>")?;
            let steps: u64 = args
                .get(2)
                .context("Usage: --admin grant <name> <steps>")?
                .parse()
                .context("Steps must be a positive integer")?;

            let updated = ops
                .grant_steps(name, steps)
                .await
                .with_context(|| format!("Could not grant steps to '{}'", name))?;
            println!(
                "Granted {} steps to {} (total {}, {})",
                steps, updated.name, updated.total_steps, updated.station
            );
        }

        "remove" if admin => {
            let ops = session.admin().context("Admin surface missing")?;
            let name = args.get(1).context("Usage: --admin remove <name>")?;
            ops.delete_participant(name)
                .await
                .with_context(|| format!("Could not remove '{}'", name))?;
            println!("Removed {}", name);
        }

        "reset-all" if admin => {
            let ops = session.admin().context("Admin surface missing")?;

            if !confirm("Really delete EVERY climber's record? This cannot be undone.")? {
                println!("Reset cancelled");
                return Ok(());
            }
            let request = ResetRequest::new();

            if !confirm("Confirm again: all climb records will be lost. Continue?")? {
                println!("Reset cancelled");
                return Ok(());
            }
            let confirmed = request.confirm();

            ops.reset_all(confirmed)
                .await
                .context("Failed to reset the shared climb")?;
            println!("All climber records deleted");
        }

        other => {
            print_usage(admin);
            bail!("Unknown command: {}", other);
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;

    print!("{} [y/N] ", prompt);
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read confirmation")?;

    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn print_usage(admin: bool) {
    println!("Usage: stepsummit <command>");
    println!();
    println!("Commands:");
    println!("  scan <checkpoint-id> <steps>   Record a checkpoint scan");
    println!("  status                         Show local progress");
    println!("  history                        Show recent climbs");
    println!("  register <name>                Join the shared climb");
    println!("  roster                         Show the ranking");
    println!("  reset                          Reset local climb data");
    if admin {
        println!();
        println!("Admin commands:");
        println!("  grant <name> <steps>           Grant steps to a participant");
        println!("  remove <name>                  Delete a participant");
        println!("  reset-all                      Delete every record");
    }
}
